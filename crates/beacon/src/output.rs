//! Output formatting: table, JSON, plain.
//!
//! Table uses `tabled`, structured formats use serde, plain emits one
//! identifier per line.

use std::borrow::Borrow;
use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use beacon_core::{IncidentRecord, Priority, SyncState, Toast, ToastChannel};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Incident rows ────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct IncidentRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Priority")]
    pub priority: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Type")]
    pub kind: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Location")]
    pub location: String,
    #[tabled(rename = "Ack")]
    pub ack: String,
}

impl IncidentRow {
    pub fn from_record(record: &IncidentRecord, color: bool) -> Self {
        let ack = &record.acknowledgment;
        Self {
            id: record.id.clone(),
            priority: paint_priority(record.priority, color),
            status: record.status.to_string(),
            kind: record.incident_type.clone(),
            title: record.title.clone().unwrap_or_default(),
            location: record.location.clone().unwrap_or_default(),
            ack: format!(
                "{}/{} ({:.0}%)",
                ack.acknowledged_count(),
                ack.total_notified(),
                ack.percentage()
            ),
        }
    }
}

fn paint_priority(priority: Priority, color: bool) -> String {
    let label = priority.to_string();
    if !color {
        return label;
    }
    match priority {
        Priority::Critical => label.red().bold().to_string(),
        Priority::High => label.yellow().to_string(),
        Priority::Medium => label.cyan().to_string(),
        Priority::Low => label.dimmed().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render incidents in the chosen format.
pub fn render_incidents<R>(
    format: OutputFormat,
    records: &[R],
    color: bool,
) -> Result<String, CliError>
where
    R: Borrow<IncidentRecord> + serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<IncidentRow> = records
                .iter()
                .map(|r| IncidentRow::from_record(r.borrow(), color))
                .collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(records)?,
        OutputFormat::JsonCompact => serde_json::to_string(records)?,
        OutputFormat::Plain => records
            .iter()
            .map(|r| r.borrow().id.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

/// One-line toast rendering for the live watcher.
pub fn render_toast(toast: &Toast, color: bool) -> String {
    let head = format!("[{}] {}", toast.priority, toast.title);
    let head = if color {
        match toast.channel {
            ToastChannel::Error => head.red().bold().to_string(),
            ToastChannel::Warning => head.yellow().bold().to_string(),
            ToastChannel::Info => head.cyan().to_string(),
            ToastChannel::Success => head.green().to_string(),
        }
    } else {
        head
    };
    let action = toast
        .action
        .as_ref()
        .map(|a| format!("  -> {} {}", a.label, a.target))
        .unwrap_or_default();
    format!(
        "{} {head}: {}{action}",
        toast.created_at.format("%H:%M:%S"),
        toast.message
    )
}

pub fn render_sync(state: &SyncState) -> String {
    let last = state
        .last_successful_sync
        .map_or_else(|| "never".into(), |t| t.format("%H:%M:%S").to_string());
    match (&state.last_error, state.next_retry_in) {
        (Some(err), Some(delay)) => format!(
            "sync failed ({err}); retry #{} in {}s, last good {last}",
            state.retry_count,
            delay.as_secs()
        ),
        _ if !state.connection_healthy => format!("server unreachable, last good {last}"),
        _ => format!("synced at {last}"),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use beacon_core::{AckStats, IncidentStatus};

    use super::*;

    fn record() -> IncidentRecord {
        let mut r = IncidentRecord::new("I1", IncidentStatus::Reported, Priority::Critical);
        r.title = Some("Structure fire".into());
        r.acknowledgment = AckStats::new(2, 5);
        r
    }

    #[test]
    fn plain_lists_ids() {
        let out = render_incidents(OutputFormat::Plain, &[record()], false).unwrap();
        assert_eq!(out, "I1");
    }

    #[test]
    fn table_shows_ack_percentage() {
        let out = render_incidents(OutputFormat::Table, &[std::sync::Arc::new(record())], false)
            .unwrap();
        assert!(out.contains("2/5 (40%)"));
        assert!(out.contains("CRITICAL"));
    }

    #[test]
    fn sync_line_reports_pending_retry() {
        let state = SyncState {
            retry_count: 2,
            last_error: Some("HTTP 503".into()),
            next_retry_in: Some(Duration::from_secs(120)),
            ..SyncState::default()
        };
        assert_eq!(
            render_sync(&state),
            "sync failed (HTTP 503); retry #2 in 120s, last good never"
        );
    }
}
