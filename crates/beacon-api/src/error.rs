use thiserror::Error;

/// Top-level error type for the `beacon-api` crate.
///
/// Covers the HTTP pull surface, the push channel, and the outbound
/// acknowledgement round-trip. `beacon-core` maps these into engine errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token rejected (HTTP 401/403 on a request or on the upgrade handshake).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Non-success HTTP status from the server.
    #[error("Server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request was superseded and cancelled before it completed.
    #[error("Request aborted")]
    Aborted,

    // ── Push channel ────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// No acknowledgement arrived for an outbound event in time.
    #[error("No acknowledgement for '{event}' within {timeout_ms}ms")]
    AckTimeout { event: String, timeout_ms: u64 },

    /// The push channel background task is gone.
    #[error("Push channel closed")]
    ChannelClosed,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Outbound payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this error means the request was superseded rather
    /// than failed. Aborts never count against retry budgets.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout { .. } | Self::WebSocketConnect(_) | Self::AckTimeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the server rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_is_not_transient() {
        assert!(Error::Aborted.is_aborted());
        assert!(!Error::Aborted.is_transient());
    }

    #[test]
    fn server_faults_are_transient() {
        let err = Error::Status {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());

        let err = Error::Status {
            status: 400,
            message: "bad filter".into(),
        };
        assert!(!err.is_transient());
    }
}
