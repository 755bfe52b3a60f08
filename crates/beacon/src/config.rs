//! Resolves the active profile plus CLI overrides into an `EngineConfig`.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use beacon_config::{Config, SoundPreference};
use beacon_core::{EngineConfig, IncidentFilter, IncidentStatus, Priority};

use crate::cli::{FilterArgs, GlobalOpts};
use crate::error::CliError;

/// Everything a connected command needs.
pub struct Resolved {
    pub engine: EngineConfig,
    pub profile: String,
    /// Operator identity for the notification session and sound preference.
    pub user: String,
}

pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the engine config from the config file, profile, and CLI flags.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = beacon_config::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let (mut engine, user) = if let Some(profile) = cfg.profiles.get(&profile_name) {
        let mut engine =
            beacon_config::profile_to_engine_config(profile, &profile_name, &cfg.defaults)?;
        if let Some(ref server) = global.server {
            engine.server_url = parse_server(server)?;
        }
        (engine, profile.user.clone())
    } else if let Some(ref server) = global.server {
        (EngineConfig::new(parse_server(server)?), None)
    } else if global.profile.is_some() {
        let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
        available.sort();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    } else {
        return Err(CliError::NoConfig {
            path: beacon_config::config_path().display().to_string(),
        });
    };

    if let Some(ref token) = global.token {
        engine.token = Some(SecretString::from(token.clone()));
    }
    if let Some(secs) = global.timeout {
        engine.timeout = Duration::from_secs(secs);
    }

    Ok(Resolved {
        engine,
        user: user.unwrap_or_else(|| current_user(&profile_name)),
        profile: profile_name,
    })
}

/// Sound preference store at the platform state path.
pub fn sound_preference() -> SoundPreference {
    SoundPreference::default()
}

/// User key for the sound preference when no profile is configured.
pub fn user_for(global: &GlobalOpts) -> String {
    let cfg = beacon_config::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);
    cfg.profiles
        .get(&profile_name)
        .and_then(|p| p.user.clone())
        .unwrap_or_else(|| current_user(&profile_name))
}

fn current_user(profile: &str) -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .map_or_else(|_| profile.to_owned(), |user| format!("{profile}/{user}"))
}

fn parse_server(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "server".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Apply CLI filter flags on top of `base`. Any flag replaces the profile
/// filter entirely.
pub fn filter_from_args(args: &FilterArgs, base: &IncidentFilter) -> Result<IncidentFilter, CliError> {
    if args.is_empty() {
        return Ok(base.clone());
    }
    Ok(IncidentFilter::default()
        .with_statuses(parse_each::<IncidentStatus>("--status", &args.statuses)?)
        .with_priorities(parse_each::<Priority>("--priority", &args.priorities)?)
        .with_types(args.types.iter().cloned())
        .include_closed(args.include_closed))
}

fn parse_each<T: FromStr>(flag: &str, values: &[String]) -> Result<Vec<T>, CliError> {
    values
        .iter()
        .map(|v| {
            T::from_str(v).map_err(|_| CliError::Validation {
                field: flag.into(),
                reason: format!("unknown value '{v}'"),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn filter_flags_replace_profile_filter() {
        let base = IncidentFilter::default().with_types(["fire"]);
        let args = FilterArgs {
            priorities: vec!["critical".into()],
            ..FilterArgs::default()
        };
        let filter = filter_from_args(&args, &base).unwrap();
        assert!(filter.types.is_empty());
        assert!(filter.priorities.contains(&Priority::Critical));
    }

    #[test]
    fn no_flags_keeps_profile_filter() {
        let base = IncidentFilter::default().with_types(["fire"]);
        let filter = filter_from_args(&FilterArgs::default(), &base).unwrap();
        assert_eq!(filter, base);
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let args = FilterArgs {
            statuses: vec!["PENDING".into()],
            ..FilterArgs::default()
        };
        assert!(matches!(
            filter_from_args(&args, &IncidentFilter::default()),
            Err(CliError::Validation { .. })
        ));
    }
}
