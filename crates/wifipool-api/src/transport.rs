// Shared transport configuration for building reqwest::Client instances.
//
// The session manager and the telemetry client share one HTTP client,
// built here with the configured timeout and TLS roots.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Production endpoint of the vendor's mobile API.
pub const DEFAULT_BASE_URL: &str = "https://api.wifipool.eu/native_mobile";

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the built-in webpki root store.
    #[default]
    System,
    /// Additionally trust a CA certificate from the given PEM file
    /// (e.g. an intercepting proxy).
    CustomCa(PathBuf),
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// Redirects are disabled: the login endpoint answers with the session
    /// cookie directly, and following a redirect would drop `Set-Cookie`.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("wifipool/", env!("CARGO_PKG_VERSION")));

        if let TlsMode::CustomCa(path) = &self.tls {
            let cert_pem = std::fs::read(path)
                .map_err(|e| crate::error::Error::Tls(format!("failed to read CA cert: {e}")))?;
            let cert = reqwest::Certificate::from_pem(&cert_pem)
                .map_err(|e| crate::error::Error::Tls(format!("invalid CA cert: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| crate::error::Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// Parse the default vendor base URL.
pub fn default_base_url() -> Result<Url, crate::error::Error> {
    Ok(Url::parse(DEFAULT_BASE_URL)?)
}

/// Join an endpoint path onto a base URL that itself carries a path
/// prefix (`/native_mobile`). `Url::join` would discard the prefix.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, crate::error::Error> {
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(Url::parse(&format!("{base}/{path}"))?)
}
