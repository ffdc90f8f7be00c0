// ── Core error types ──
//
// Errors surfaced by discovery, polling and switch commands. Wire-level
// failures from `wifipool-api` are folded into this taxonomy by the
// `From` impl below; callers only see HTTP detail where it matters
// (status of a failed login or telemetry call).

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Setup / credentials ──────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    // ── Vendor responses ─────────────────────────────────────────────
    #[error("Unexpected response from vendor: {message}")]
    Protocol { message: String, body: String },

    #[error("Telemetry request failed (HTTP {status}): {body}")]
    Telemetry { status: u16, body: String },

    #[error("Channel unavailable: {channel}")]
    ChannelUnavailable { channel: String },

    #[error("Channel {channel} is a sensor and cannot be switched: {message}")]
    SensorChannel { channel: String, message: String },

    // ── Discovery ────────────────────────────────────────────────────
    #[error("No accessible groups returned for this account")]
    NoGroups,

    #[error("Could not resolve a pool domain (tried {tried} candidates)")]
    DomainResolution { tried: usize },

    #[error("No device listed for domain {domain}")]
    DeviceNotFound { domain: String },

    // ── Transport ────────────────────────────────────────────────────
    #[error("Cannot reach vendor API: {reason}")]
    Connection { reason: String },

    #[error("Vendor API timed out")]
    Timeout,

    // ── Collaborators ────────────────────────────────────────────────
    #[error("Setup store error: {message}")]
    Store { message: String },

    #[error("Host error: {message}")]
    Host { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },
}

impl CoreError {
    /// A 401 on an authenticated call. The cached session is already gone,
    /// so the next call logs in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Authentication { status: 401, .. })
    }

    /// Whether the error aborts a discovery run rather than skipping one probe.
    ///
    /// Missing settings and a refused login abort; an expired session does not.
    pub fn is_fatal_for_discovery(&self) -> bool {
        match self {
            Self::Configuration { .. } => true,
            Self::Authentication { .. } => !self.is_session_expired(),
            _ => false,
        }
    }
}

// ── Conversion from wire-level errors ────────────────────────────────

impl From<wifipool_api::Error> for CoreError {
    fn from(err: wifipool_api::Error) -> Self {
        use wifipool_api::Error as Api;

        match err {
            Api::Configuration { message } => Self::Configuration { message },
            Api::Authentication { status, message } => Self::Authentication { status, message },
            Api::Protocol { message, body } => Self::Protocol { message, body },
            Api::Telemetry { status, body } => Self::Telemetry { status, body },
            Api::ChannelUnavailable { channel } => Self::ChannelUnavailable { channel },
            Api::ManualIoRejected { channel, message } => {
                Self::SensorChannel { channel, message }
            }
            Api::Transport(e) => {
                if e.is_timeout() {
                    Self::Timeout
                } else {
                    Self::Connection {
                        reason: e.to_string(),
                    }
                }
            }
            Api::InvalidUrl(e) => Self::Configuration {
                message: format!("invalid base URL: {e}"),
            },
            Api::Tls(message) => Self::Connection { reason: message },
        }
    }
}
