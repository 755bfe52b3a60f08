//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use beacon_config::ConfigError;
use beacon_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the dispatch server{url}")]
    #[diagnostic(
        code(beacon::connection_failed),
        help("Check that the server is running and reachable.\nReason: {reason}")
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Push channel is not available")]
    #[diagnostic(
        code(beacon::push_unavailable),
        help("Broadcasts need the push channel. Remove `push = false` from the profile.")
    )]
    PushUnavailable,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed for profile '{profile}'")]
    #[diagnostic(
        code(beacon::auth_failed),
        help(
            "Verify the bearer token.\n\
             Set BEACON_TOKEN, `token_env` in the profile, or store it in the system keyring."
        )
    )]
    AuthFailed { profile: String },

    // ── Operations ───────────────────────────────────────────────────
    #[error("Server rejected the request: {message}")]
    #[diagnostic(code(beacon::rejected))]
    Rejected { message: String },

    #[error("Resync failed: {message}")]
    #[diagnostic(code(beacon::resync_failed))]
    ResyncFailed { message: String },

    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(beacon::timeout),
        help("Increase the timeout with --timeout or check server responsiveness.")
    )]
    Timeout { millis: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(beacon::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(beacon::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No dispatch server configured")]
    #[diagnostic(
        code(beacon::no_config),
        help(
            "Pass --server <URL>, set BEACON_SERVER, or add a profile to:\n{path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(beacon::config))]
    Config(Box<ConfigError>),

    #[error("{0}")]
    #[diagnostic(code(beacon::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::PushUnavailable => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url: if url.is_empty() {
                    url
                } else {
                    format!(" at {url}")
                },
                reason,
            },
            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                profile: "current".into(),
            },
            CoreError::Timeout { timeout_ms } => CliError::Timeout { millis: timeout_ms },
            CoreError::PushUnavailable => CliError::PushUnavailable,
            CoreError::BroadcastRejected { message } => CliError::Rejected { message },
            CoreError::ResyncFailed { message, status } => CliError::ResyncFailed {
                message: match status {
                    Some(code) => format!("HTTP {code}: {message}"),
                    None => message,
                },
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Aborted | CoreError::EngineStopped => {
                CliError::Internal("engine stopped before the request completed".into())
            }
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_stable_exit_codes() {
        let auth: CliError = CoreError::AuthenticationFailed {
            message: "401".into(),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let rejected: CliError = CoreError::BroadcastRejected {
            message: "no".into(),
        }
        .into();
        assert_eq!(rejected.exit_code(), exit_code::REJECTED);

        let down: CliError = CoreError::ConnectionFailed {
            url: "https://dispatch.example/".into(),
            reason: "refused".into(),
        }
        .into();
        assert_eq!(down.exit_code(), exit_code::CONNECTION);
        assert!(down.to_string().contains("at https://dispatch.example/"));
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err: CliError = ConfigError::Validation {
            field: "server".into(),
            reason: "bad".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
