//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use wifipool_config::ConfigError;
use wifipool_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the WiFiPool API: {reason}")]
    #[diagnostic(
        code(wifipool::connection_failed),
        help("Check your network connection, or --base-url if you use a custom endpoint.")
    )]
    ConnectionFailed { reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(wifipool::timeout),
        help("Increase the timeout with --timeout or try again later.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(wifipool::auth_failed),
        help(
            "Verify the e-mail and password of profile '{profile}'.\n\
             Run: wifipool config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(wifipool::no_credentials),
        help(
            "Configure credentials with: wifipool config init\n\
             Or set WIFIPOOL_EMAIL and WIFIPOOL_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Discovery / setup ────────────────────────────────────────────

    #[error("No setup saved yet")]
    #[diagnostic(
        code(wifipool::no_setup),
        help("Run: wifipool setup")
    )]
    NoSetup,

    #[error("Discovery failed: {message}")]
    #[diagnostic(
        code(wifipool::discovery),
        help("Check that the account can see the pool in the vendor app, then retry with -vv.")
    )]
    Discovery { message: String },

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(wifipool::not_found),
        help("Run: wifipool {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Channel {channel} refused the command: {message}")]
    #[diagnostic(
        code(wifipool::rejected),
        help("The channel is a sensor input and cannot be switched.")
    )]
    Rejected { channel: String, message: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error: {message}")]
    #[diagnostic(code(wifipool::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wifipool::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(wifipool::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: wifipool config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(wifipool::config))]
    Config(ConfigError),

    #[error("Local state error: {message}")]
    #[diagnostic(code(wifipool::state))]
    State { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::NoSetup | Self::ProfileNotFound { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to authentication failures.
    pub fn for_profile(self, name: &str) -> Self {
        match self {
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                profile: name.into(),
                message,
            },
            Self::NoCredentials { .. } => Self::NoCredentials {
                profile: name.into(),
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration { message } => {
                if message.contains("setup") {
                    CliError::NoSetup
                } else if message.contains("email") || message.contains("password") {
                    CliError::NoCredentials {
                        profile: "current".into(),
                    }
                } else {
                    CliError::Validation {
                        field: "config".into(),
                        reason: message,
                    }
                }
            }

            CoreError::Authentication { message, .. } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },

            CoreError::Connection { reason } => CliError::ConnectionFailed { reason },

            CoreError::Timeout => CliError::Timeout,

            CoreError::NoGroups => CliError::Discovery {
                message: "the account has no accessible groups".into(),
            },

            e @ (CoreError::DomainResolution { .. } | CoreError::DeviceNotFound { .. }) => {
                CliError::Discovery {
                    message: e.to_string(),
                }
            }

            CoreError::ChannelUnavailable { channel } => CliError::NotFound {
                resource_type: "channel".into(),
                identifier: channel,
                list_command: "discover".into(),
            },

            CoreError::SensorChannel { channel, message } => {
                CliError::Rejected { channel, message }
            }

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            e @ (CoreError::Store { .. } | CoreError::Host { .. }) => CliError::State {
                message: e.to_string(),
            },

            e @ (CoreError::Protocol { .. } | CoreError::Telemetry { .. }) => {
                CliError::ApiError {
                    message: e.to_string(),
                }
            }
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            other => CliError::Config(other),
        }
    }
}
