//! Discovery, classification and polling logic for WiFiPool pool controllers.
//!
//! Sits between `wifipool-api` and a home-automation host:
//!
//! - **[`PoolController`]** is the facade a host drives. It runs auto setup
//!   (domain resolution plus channel probing), persists the resulting
//!   [`IoMap`] through a [`SetupStore`], and keeps a background poll timer
//!   that publishes readings through a [`CapabilityHost`].
//!
//! - **Resolution** ([`resolver`]) picks the pool domain out of the loosely
//!   structured `groups/accessible` payload and confirms it against the
//!   group's IO inventory.
//!
//! - **Classification** ([`classifier`]) labels each probed channel as a
//!   switch, pH, redox, flow or temperature source from recent samples.
//!
//! - **Reconciliation** ([`reconciler`]) fetches new samples each cycle,
//!   publishes changed values, derives pump flow and reports health.
//!
//! - **Writability** ([`writability`]) learns which switches accept manual
//!   writes from the vendor's responses.

pub mod classifier;
pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod host;
pub mod json_walk;
pub mod model;
pub mod reconciler;
pub mod resolver;
pub mod samples;
pub mod writability;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL, PoolConfig, Thresholds,
    clamp_poll_interval,
};
pub use controller::{
    CapabilityDiff, ConnectionInfo, Discovery, PairingDescriptor, PoolController, SetupReport,
    required_capabilities,
};
pub use error::CoreError;
pub use host::{
    CapabilityHost, CapabilityValue, HostEvent, MemoryHost, MemorySetupStore, SetupStore,
    onoff_capability,
};
pub use reconciler::{FlowEvidence, PollReport, Publication, Reconciler};
pub use writability::WritabilityLearner;

// ── Model re-exports ────────────────────────────────────────────────
pub use model::{
    ChannelClassification, ChannelId, ChannelKind, Direction, IoMap, ParseChannelIdError,
    SensorSlot,
};

pub use wifipool_api::{Credentials, TelemetryClient, TlsMode};
