// ── Runtime pool configuration ──
//
// Describes how to reach the vendor API and how to interpret what comes
// back. Never touches disk: `wifipool-config` (or an embedding host)
// builds a `PoolConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;
use wifipool_api::{Credentials, TlsMode, TransportConfig};

use crate::error::CoreError;

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Longest accepted poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(600);
/// Poll interval when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Classification and polling thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Analog values in `[0, ph_max]` are pH.
    pub ph_max: f64,
    /// Analog values in `(redox_min, redox_max)` are redox/ORP in mV.
    pub redox_min: f64,
    pub redox_max: f64,
    /// Analog magnitude at or above which a channel reads as "flowing".
    pub flow_analog: f64,
    /// Maximum sample age for a scalar reading to be published.
    pub staleness: Duration,
    /// How far back discovery probes look for samples.
    pub discovery_lookback: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ph_max: 14.0,
            redox_min: 100.0,
            redox_max: 1500.0,
            flow_analog: 0.5,
            staleness: Duration::from_secs(5 * 60),
            discovery_lookback: Duration::from_secs(72 * 3600),
        }
    }
}

/// Configuration for one pool installation.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Vendor API root (e.g. `https://api.wifipool.eu/native_mobile`).
    pub base_url: Url,
    pub email: Option<String>,
    pub password: Option<SecretString>,
    pub tls: TlsMode,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How long a login stays cached.
    pub session_ttl: Duration,
    /// Poll interval as configured; see [`PoolConfig::effective_poll_interval`].
    pub poll_interval: Duration,
    pub thresholds: Thresholds,
}

impl PoolConfig {
    /// A config with defaults for everything except the credentials.
    pub fn new(email: Option<String>, password: Option<SecretString>) -> Result<Self, CoreError> {
        let base_url = wifipool_api::default_base_url().map_err(CoreError::from)?;
        Ok(Self {
            base_url,
            email,
            password,
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            session_ttl: wifipool_api::DEFAULT_SESSION_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            thresholds: Thresholds::default(),
        })
    }

    /// Poll interval clamped to `[15s, 600s]`.
    pub fn effective_poll_interval(&self) -> Duration {
        clamp_poll_interval(self.poll_interval)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.timeout,
        }
    }
}

/// Clamp an interval to the accepted poll range. Zero falls back to the
/// default rather than the minimum.
pub fn clamp_poll_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        return DEFAULT_POLL_INTERVAL;
    }
    interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}
