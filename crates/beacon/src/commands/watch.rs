//! `beacon watch`: run the engine and stream the live view until Ctrl-C.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use beacon_core::{ChannelState, Engine, IncidentView};

use crate::bell::TerminalBell;
use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let mut engine_config = resolved.engine;
    engine_config.initial_filter =
        config::filter_from_args(&args.filter, &engine_config.initial_filter)?;
    if args.pull_only {
        engine_config.push_enabled = false;
    }
    if let Some(secs) = args.interval {
        engine_config.resync.interval = std::time::Duration::from_secs(secs.max(1));
    }
    engine_config.sound_enabled = !args.mute && config::sound_preference().load(&resolved.user)?;

    let engine = Engine::connect(engine_config, Arc::new(TerminalBell))?;
    engine.notifications().start_session(resolved.user.as_str());
    tracing::info!(profile = %resolved.profile, user = %resolved.user, "watching incidents");

    let result = stream(&engine, global).await;

    engine.notifications().end_session();
    engine.shutdown().await;
    result
}

async fn stream(engine: &Engine, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let mut view = engine.subscribe_incidents();
    let mut toasts = engine.toasts();
    let mut sync = engine.subscribe_sync();
    let mut connection = engine.health().subscribe();

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            biased;

            _ = &mut interrupt => break,

            toast = toasts.recv() => match toast {
                Ok(toast) => {
                    let line = match global.output {
                        OutputFormat::Json | OutputFormat::JsonCompact => {
                            serde_json::to_string(&toast)?
                        }
                        OutputFormat::Table | OutputFormat::Plain => {
                            output::render_toast(&toast, color)
                        }
                    };
                    output::print_output(&line, global.quiet);
                }
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "toast stream lagged"),
                Err(RecvError::Closed) => break,
            },

            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                print_view(&snapshot, global, color)?;
            }

            Ok(()) = sync.changed() => {
                let state = sync.borrow_and_update().clone();
                if !state.in_flight {
                    eprintln!("{}", output::render_sync(&state));
                }
            }

            Ok(()) = connection.changed() => {
                let state = connection.borrow_and_update().clone();
                match state {
                    ChannelState::Failed => tracing::error!("push channel gave up reconnecting"),
                    ChannelState::Error { ref message } => {
                        tracing::warn!(error = %message, "push channel error");
                    }
                    _ => tracing::info!(state = ?state, "push channel state"),
                }
            }
        }
    }
    Ok(())
}

fn print_view(view: &IncidentView, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let rendered = match global.output {
        OutputFormat::JsonCompact => serde_json::to_string(view.items.as_slice())?,
        format => {
            let body = output::render_incidents(format, view.items.as_slice(), color)?;
            if matches!(format, OutputFormat::Table) {
                format!("{} active incident(s), v{}\n{body}", view.total, view.version)
            } else {
                body
            }
        }
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}
