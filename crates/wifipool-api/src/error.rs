use thiserror::Error;

/// Top-level error type for the `wifipool-api` crate.
///
/// Covers every failure mode of the vendor wire boundary: missing
/// configuration, login/session problems, unusable responses, non-2xx
/// statuses, and transport failures. `wifipool-core` maps these into its
/// own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// Credentials or other required settings are absent.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected, or a request came back 401 (session expired).
    #[error("Authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    // ── Protocol ────────────────────────────────────────────────────
    /// The vendor answered but the response shape is unusable.
    #[error("Protocol error: {message}")]
    Protocol { message: String, body: String },

    // ── Telemetry ───────────────────────────────────────────────────
    /// Non-2xx, non-404 response from a telemetry endpoint.
    #[error("Telemetry request failed (HTTP {status}): {body}")]
    Telemetry { status: u16, body: String },

    /// The channel does not exist on the controller (HTTP 404).
    #[error("Channel unavailable: {channel}")]
    ChannelUnavailable { channel: String },

    /// `setManualIO` refused because the channel is a sensor input.
    #[error("Manual IO rejected for {channel}: {message}")]
    ManualIoRejected { channel: String, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Returns `true` if this error indicates the session has expired
    /// and a fresh login might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { status: 401, .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Telemetry { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ChannelUnavailable { .. })
    }

    /// Returns `true` if the vendor refused a manual write on a sensor channel.
    pub fn is_sensor_rejection(&self) -> bool {
        matches!(self, Self::ManualIoRejected { .. })
    }
}

/// Truncate a response body for error messages and logs.
pub(crate) fn excerpt(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_owned();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…({} bytes)", &body[..end], body.len())
}
