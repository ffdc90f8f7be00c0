//! Async client for the WiFiPool cloud telemetry API.
//!
//! Two layers:
//!
//! - [`SessionManager`] logs in with e-mail and password and caches the
//!   `connect.sid` session cookie for its TTL.
//! - [`TelemetryClient`] wraps the four vendor operations used by discovery
//!   and polling: accessible groups, group info, per-channel samples and
//!   manual IO writes.
//!
//! Payloads are kept close to the wire; interpretation lives in
//! `wifipool-core`.

pub mod client;
pub mod error;
pub mod models;
pub mod session;
pub mod transport;

pub use client::TelemetryClient;
pub use error::Error;
pub use models::{GroupInfo, IoEntry, LoginUser, Sample, newest_timestamp, parse_timestamp};
pub use session::{Credentials, DEFAULT_SESSION_TTL, Session, SessionManager, mask_email};
pub use transport::{DEFAULT_BASE_URL, TlsMode, TransportConfig, default_base_url};
