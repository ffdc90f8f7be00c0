// ── Pool controller ──
//
// Facade the host talks to. Owns the telemetry client, the polling state
// and the writability learner for one pool installation, and exposes the
// host-triggerable operations: connection test, discovery, auto setup,
// switch commands and the polling lifecycle.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wifipool_api::{GroupInfo, SessionManager, TelemetryClient};

use crate::classifier::probe_channels;
use crate::config::{PoolConfig, clamp_poll_interval};
use crate::error::CoreError;
use crate::host::{
    ALARM_FLOW, ALARM_HEALTH, CapabilityHost, CapabilityValue, MEASURE_FLOW, MEASURE_PH,
    MEASURE_REDOX, MEASURE_TEMPERATURE, ONOFF_PREFIX, SetupStore, onoff_capability,
};
use crate::model::{ChannelClassification, IoMap};
use crate::reconciler::{PollReport, Reconciler};
use crate::resolver;
use crate::writability::WritabilityLearner;

// ── Operation results ───────────────────────────────────────────────

/// Result of `test_connection`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub ok: bool,
    /// Account e-mail as reported by the vendor, else the configured one.
    pub identity: Option<String>,
}

/// Result of `discover_channels`: the raw IO inventory, not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Discovery {
    pub domain: String,
    pub device_uuid: Option<String>,
    pub channels: Vec<String>,
}

impl Discovery {
    fn from_info(domain: String, info: &GroupInfo) -> Self {
        Self {
            domain,
            device_uuid: info.first_device_id(),
            channels: info.io().into_iter().map(|e| e.id).collect(),
        }
    }
}

/// Result of `run_auto_setup`.
#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub name: String,
    pub io_map: IoMap,
    pub classifications: Vec<ChannelClassification>,
}

/// What a host needs to create a device from the persisted setup.
#[derive(Debug, Clone, Serialize)]
pub struct PairingDescriptor {
    pub name: String,
    pub id: String,
    pub store: IoMap,
}

/// Capabilities added and removed by `sync_capabilities`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

// ── Controller ──────────────────────────────────────────────────────

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct PoolController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: PoolConfig,
    client: TelemetryClient,
    host: Arc<dyn CapabilityHost>,
    store: Arc<dyn SetupStore>,
    reconciler: Mutex<Reconciler>,
    writability: Mutex<WritabilityLearner>,
    poll_interval: Mutex<Duration>,
    cancel: CancellationToken,
    /// Token for the running poll task; replaced on every restart.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    reports: watch::Sender<Arc<PollReport>>,
}

impl PoolController {
    /// Build a controller and its HTTP client from configuration. Does not
    /// contact the vendor.
    pub fn new(
        config: PoolConfig,
        host: Arc<dyn CapabilityHost>,
        store: Arc<dyn SetupStore>,
    ) -> Result<Self, CoreError> {
        let http = config.transport().build_client()?;
        let session = SessionManager::new(http.clone(), config.base_url.clone(), config.credentials())
            .with_ttl(config.session_ttl);
        let client = TelemetryClient::with_session(http, config.base_url.clone(), Arc::new(session));
        Ok(Self::with_client(config, client, host, store))
    }

    /// Build a controller around an existing client.
    pub fn with_client(
        config: PoolConfig,
        client: TelemetryClient,
        host: Arc<dyn CapabilityHost>,
        store: Arc<dyn SetupStore>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let (reports, _) = watch::channel(Arc::new(PollReport::default()));
        let reconciler = Reconciler::new(client.clone(), config.thresholds.clone());
        let poll_interval = config.effective_poll_interval();

        Self {
            inner: Arc::new(ControllerInner {
                config,
                client,
                host,
                store,
                reconciler: Mutex::new(reconciler),
                writability: Mutex::new(WritabilityLearner::default()),
                poll_interval: Mutex::new(poll_interval),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
                reports,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &TelemetryClient {
        &self.inner.client
    }

    pub fn host(&self) -> &Arc<dyn CapabilityHost> {
        &self.inner.host
    }

    /// The persisted setup, if any.
    pub fn current_setup(&self) -> Result<Option<IoMap>, CoreError> {
        self.inner.store.load()
    }

    /// Load the persisted setup and bring capabilities and switch listeners
    /// in line with it. Call once after construction.
    pub async fn initialize(&self) -> Result<(), CoreError> {
        if let Some(map) = self.inner.store.load()? {
            self.apply_setup(&map).await?;
        } else {
            debug!("no persisted setup yet");
        }
        Ok(())
    }

    // ── Exposed operations ───────────────────────────────────────

    /// Force a fresh login and report the account identity.
    pub async fn test_connection(&self) -> Result<ConnectionInfo, CoreError> {
        let client = &self.inner.client;
        client.session().invalidate().await;
        let session = client.login().await?;

        let identity = session
            .identity()
            .map(String::from)
            .or_else(|| self.inner.config.email.clone());
        info!("connection test passed");
        Ok(ConnectionInfo { ok: true, identity })
    }

    /// List the raw IO inventory without persisting anything. The stored
    /// domain is tried first; resolution runs only if it is absent or
    /// unusable.
    pub async fn discover_channels(&self) -> Result<Discovery, CoreError> {
        let client = &self.inner.client;

        if let Some(map) = self.inner.store.load()?.filter(|m| !m.domain.is_empty()) {
            match client.get_group_info(&map.domain).await {
                Ok(info) if info.io_len() > 0 => {
                    return Ok(Discovery::from_info(map.domain, &info));
                }
                Ok(_) => debug!(domain = %map.domain, "stored domain lists no io, resolving"),
                Err(e) => {
                    let err = CoreError::from(e);
                    if err.is_fatal_for_discovery() {
                        return Err(err);
                    }
                    warn!(domain = %map.domain, error = %err, "stored domain unusable, resolving");
                }
            }
        }

        let session = client.login().await?;
        let resolution = resolver::resolve(client, session.user_id()).await?;
        Ok(Discovery::from_info(resolution.domain, &resolution.info))
    }

    /// Resolve the domain, probe all channels, persist the resulting map
    /// and bring the host in line with it.
    pub async fn run_auto_setup(&self) -> Result<SetupReport, CoreError> {
        let client = &self.inner.client;
        let session = client.login().await?;
        let resolution = resolver::resolve(client, session.user_id()).await?;

        let (mut map, classifications) = probe_channels(
            client,
            &resolution.domain,
            &resolution.device_uuid,
            &self.inner.config.thresholds,
            Utc::now(),
        )
        .await?;

        if let Some(previous) = self.inner.store.load()? {
            map.writability = previous
                .writability
                .into_iter()
                .filter(|(ch, _)| map.switches.contains(ch))
                .collect();
        }

        self.inner.store.save(&map)?;
        info!(
            domain = %map.domain,
            device = %map.device_uuid,
            populated = map.populated_count(),
            "auto setup saved"
        );

        self.apply_setup(&map).await?;

        Ok(SetupReport {
            name: map.device_name(),
            io_map: map,
            classifications,
        })
    }

    /// Descriptor for creating a host device from the persisted setup.
    pub fn pairing_descriptor(&self) -> Result<Option<PairingDescriptor>, CoreError> {
        Ok(self.inner.store.load()?.map(|map| PairingDescriptor {
            name: map.device_name(),
            id: map.device_uuid.clone(),
            store: map,
        }))
    }

    /// Add the capabilities the persisted setup implies and remove switch
    /// capabilities whose channel is no longer mapped.
    pub fn sync_capabilities(&self) -> Result<CapabilityDiff, CoreError> {
        let map = self.inner.store.load()?;
        sync_capabilities_for(self.inner.host.as_ref(), map.as_ref())
    }

    /// Flow condition: current flow value strictly above `threshold`.
    pub fn flow_above(&self, threshold: f64) -> bool {
        self.current_flow()
            .is_some_and(|v| threshold.is_finite() && v > threshold)
    }

    /// Flow condition: current flow value strictly below `threshold`.
    pub fn flow_below(&self, threshold: f64) -> bool {
        self.current_flow()
            .is_some_and(|v| threshold.is_finite() && v < threshold)
    }

    fn current_flow(&self) -> Option<f64> {
        let host = &self.inner.host;
        host.capability_value(MEASURE_FLOW)
            .and_then(CapabilityValue::as_f64)
            .or_else(|| {
                host.capability_value(ALARM_FLOW)
                    .and_then(CapabilityValue::as_bool)
                    .map(|b| if b { 1.0 } else { 0.0 })
            })
            .filter(|v| v.is_finite())
    }

    /// Switch a mapped channel on or off. `channel` is a full channel id or
    /// its suffix (`o3`).
    pub async fn set_switch(&self, channel: &str, on: bool) -> Result<(), CoreError> {
        let map = self.inner.store.load()?.ok_or_else(|| CoreError::Configuration {
            message: "no setup has been run yet".into(),
        })?;
        let channel = map
            .find_switch(channel)
            .cloned()
            .ok_or_else(|| CoreError::Validation {
                message: format!("{channel} is not a mapped switch"),
            })?;

        let host = self.inner.host.as_ref();
        let result = self
            .inner
            .client
            .set_manual_value(&map.domain, &channel.to_string(), on)
            .await
            .map_err(CoreError::from);

        let mut learner = self.inner.writability.lock().await;
        match result {
            Ok(()) => {
                if learner.record_success(&channel) {
                    learner.sync_listeners(host);
                }
                self.persist_writability(&learner)?;
                drop(learner);

                let capability = onoff_capability(&channel);
                if host.has_capability(&capability) {
                    host.set_capability(&capability, on.into())?;
                    self.inner
                        .reconciler
                        .lock()
                        .await
                        .note_published(&capability, on.into());
                }
                info!(channel = %channel, on, "switch set");
                Ok(())
            }
            Err(err) => {
                if matches!(err, CoreError::SensorChannel { .. }) {
                    if learner.record_rejection(&channel) {
                        learner.sync_listeners(host);
                    }
                    self.persist_writability(&learner)?;
                }
                warn!(channel = %channel, error = %err, "switch command failed");
                Err(err)
            }
        }
    }

    /// Whether a mapped switch currently accepts commands.
    pub async fn is_writable(&self, channel: &str) -> Result<bool, CoreError> {
        let map = self.inner.store.load()?.unwrap_or_default();
        let Some(channel) = map.find_switch(channel) else {
            return Ok(false);
        };
        Ok(self.inner.writability.lock().await.is_writable(channel))
    }

    // ── Polling lifecycle ────────────────────────────────────────

    /// Run one poll cycle now.
    pub async fn poll_once(&self) -> PollReport {
        let map = match self.inner.store.load() {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "could not load setup");
                None
            }
        };

        let report = self
            .inner
            .reconciler
            .lock()
            .await
            .poll_once(self.inner.host.as_ref(), map.as_ref())
            .await;

        let _ = self.inner.reports.send(Arc::new(report.clone()));
        report
    }

    /// Subscribe to the report of every completed cycle.
    pub fn reports(&self) -> watch::Receiver<Arc<PollReport>> {
        self.inner.reports.subscribe()
    }

    /// The effective poll interval.
    pub async fn poll_interval(&self) -> Duration {
        *self.inner.poll_interval.lock().await
    }

    pub async fn is_polling(&self) -> bool {
        self.inner
            .task_handles
            .lock()
            .await
            .iter()
            .any(|h| !h.is_finished())
    }

    /// Start the background poll timer. The first cycle runs immediately.
    /// No-op if already running.
    pub async fn start_polling(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        if !handles.is_empty() {
            debug!("polling already running");
            return;
        }

        let interval = *self.inner.poll_interval.lock().await;
        let cancel = self.inner.cancel_child.lock().await.clone();
        info!(interval_secs = interval.as_secs(), "polling started");
        handles.push(tokio::spawn(poll_task(self.clone(), interval, cancel)));
    }

    /// Stop the background poll timer and wait for it to finish.
    pub async fn stop_polling(&self) {
        {
            let mut child = self.inner.cancel_child.lock().await;
            child.cancel();
            *child = self.inner.cancel.child_token();
        }

        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        debug!("polling stopped");
    }

    /// Replace the poll timer, optionally with a new interval (clamped to
    /// the accepted range).
    pub async fn restart_polling(&self, interval: Option<Duration>) {
        if let Some(interval) = interval {
            *self.inner.poll_interval.lock().await = clamp_poll_interval(interval);
        }
        self.stop_polling().await;
        self.start_polling().await;
    }

    /// Stop polling and drop every switch listener.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.stop_polling().await;
        self.inner
            .writability
            .lock()
            .await
            .clear_listeners(self.inner.host.as_ref());
        debug!("controller shut down");
    }

    // ── Internals ────────────────────────────────────────────────

    async fn apply_setup(&self, map: &IoMap) -> Result<(), CoreError> {
        self.inner.reconciler.lock().await.reset();

        let host = self.inner.host.as_ref();
        sync_capabilities_for(host, Some(map))?;

        let mut learner = self.inner.writability.lock().await;
        learner.clear_listeners(host);
        *learner = WritabilityLearner::from_io_map(map);
        learner.sync_listeners(host);
        Ok(())
    }

    fn persist_writability(&self, learner: &WritabilityLearner) -> Result<(), CoreError> {
        let Some(mut map) = self.inner.store.load()? else {
            return Ok(());
        };
        if map.writability == *learner.learned() {
            return Ok(());
        }
        map.writability = learner.learned().clone();
        self.inner.store.save(&map)
    }
}

/// Capabilities implied by a setup: sensor slots, one `onoff.*` per switch,
/// `alarm_flow` when any flow source exists, and always `alarm_health`.
pub fn required_capabilities(map: Option<&IoMap>) -> BTreeSet<String> {
    let mut caps = BTreeSet::from([ALARM_HEALTH.to_owned()]);
    let Some(map) = map else {
        return caps;
    };
    if map.ph.is_some() {
        caps.insert(MEASURE_PH.to_owned());
    }
    if map.redox.is_some() {
        caps.insert(MEASURE_REDOX.to_owned());
    }
    if map.temperature.is_some() {
        caps.insert(MEASURE_TEMPERATURE.to_owned());
    }
    if map.has_flow_source() {
        caps.insert(ALARM_FLOW.to_owned());
    }
    caps.extend(map.switches.iter().map(onoff_capability));
    caps
}

fn sync_capabilities_for(
    host: &dyn CapabilityHost,
    map: Option<&IoMap>,
) -> Result<CapabilityDiff, CoreError> {
    let required = required_capabilities(map);
    let present: BTreeSet<String> = host.capabilities().into_iter().collect();
    let mut diff = CapabilityDiff::default();

    for cap in required.difference(&present) {
        host.add_capability(cap)?;
        diff.added.push(cap.clone());
    }
    for cap in present
        .iter()
        .filter(|c| c.starts_with(ONOFF_PREFIX) && !required.contains(*c))
    {
        host.remove_capability(cap)?;
        diff.removed.push(cap.clone());
    }

    if !diff.added.is_empty() || !diff.removed.is_empty() {
        info!(added = ?diff.added, removed = ?diff.removed, "capabilities synchronized");
    }
    Ok(diff)
}

// ── Background task ─────────────────────────────────────────────────

async fn poll_task(controller: PoolController, interval: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let report = controller.poll_once().await;
                if !report.healthy && !report.skipped {
                    warn!(errors = report.errors.len(), "poll cycle unhealthy");
                }
            }
        }
    }
}
