// ── Polling reconciler ──
//
// One poll cycle re-reads every mapped channel, turns samples into typed
// readings and pushes them to the host when, and only when, they changed.
// A failing sensor marks the cycle unhealthy but never stops the others.
//
// State kept between cycles: per-channel watermarks (newest sample seen)
// and the last value published per capability.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, trace, warn};
use wifipool_api::{Sample, TelemetryClient, newest_timestamp};

use crate::config::Thresholds;
use crate::decode::{Via, latest_analog, latest_temperature, switch_state};
use crate::error::CoreError;
use crate::host::{
    ALARM_FLOW, ALARM_HEALTH, CapabilityHost, CapabilityValue, MEASURE_FLOW, MEASURE_PH,
    MEASURE_REDOX, MEASURE_TEMPERATURE, TRIGGER_FLOW, TRIGGER_HEALTH, TRIGGER_PH, TRIGGER_REDOX,
    TRIGGER_TEMPERATURE, onoff_capability,
};
use crate::model::{ChannelId, Direction, IoMap, SensorSlot};
use crate::samples::{fetch_latest, fetch_with_fallback};

/// A capability write performed during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Publication {
    pub capability: String,
    pub value: CapabilityValue,
}

/// Where a flow reading came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEvidence {
    pub flowing: bool,
    pub source: ChannelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<Via>,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollReport {
    /// No setup was available; nothing was fetched.
    pub skipped: bool,
    pub healthy: bool,
    pub published: Vec<Publication>,
    pub flow: Option<FlowEvidence>,
    pub errors: Vec<String>,
}

/// Scalar sensor roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Ph,
    Redox,
    Temperature,
}

impl Scalar {
    const ALL: [Self; 3] = [Self::Ph, Self::Redox, Self::Temperature];

    fn capability(self) -> &'static str {
        match self {
            Self::Ph => MEASURE_PH,
            Self::Redox => MEASURE_REDOX,
            Self::Temperature => MEASURE_TEMPERATURE,
        }
    }

    fn trigger(self) -> &'static str {
        match self {
            Self::Ph => TRIGGER_PH,
            Self::Redox => TRIGGER_REDOX,
            Self::Temperature => TRIGGER_TEMPERATURE,
        }
    }

    fn slot(self, map: &IoMap) -> Option<&SensorSlot> {
        match self {
            Self::Ph => map.ph.as_ref(),
            Self::Redox => map.redox.as_ref(),
            Self::Temperature => map.temperature.as_ref(),
        }
    }

    fn read(self, samples: &[Sample]) -> Option<(f64, Option<DateTime<Utc>>)> {
        match self {
            Self::Ph | Self::Redox => latest_analog(samples),
            Self::Temperature => latest_temperature(samples),
        }
    }
}

/// Per-device polling state.
pub struct Reconciler {
    client: TelemetryClient,
    thresholds: Thresholds,
    watermarks: HashMap<ChannelId, DateTime<Utc>>,
    last_published: HashMap<String, CapabilityValue>,
}

impl Reconciler {
    pub fn new(client: TelemetryClient, thresholds: Thresholds) -> Self {
        Self {
            client,
            thresholds,
            watermarks: HashMap::new(),
            last_published: HashMap::new(),
        }
    }

    /// Forget watermarks and published values (after a new setup run).
    pub fn reset(&mut self) {
        self.watermarks.clear();
        self.last_published.clear();
    }

    /// Newest sample timestamp seen for a channel.
    pub fn watermark(&self, channel: &ChannelId) -> Option<DateTime<Utc>> {
        self.watermarks.get(channel).copied()
    }

    /// Record a value published outside the poll loop (e.g. a switch command)
    /// so the next cycle does not write it again.
    pub fn note_published(&mut self, capability: &str, value: CapabilityValue) {
        self.last_published.insert(capability.to_owned(), value);
    }

    /// Run one cycle against the current time.
    pub async fn poll_once(&mut self, host: &dyn CapabilityHost, map: Option<&IoMap>) -> PollReport {
        self.poll_once_at(host, map, Utc::now()).await
    }

    /// Run one cycle, judging staleness against `now`.
    pub async fn poll_once_at(
        &mut self,
        host: &dyn CapabilityHost,
        map: Option<&IoMap>,
        now: DateTime<Utc>,
    ) -> PollReport {
        let mut report = PollReport::default();

        let Some(map) = map.filter(|m| !m.domain.is_empty() && !m.device_uuid.is_empty()) else {
            warn!("no persisted setup, skipping poll");
            report.skipped = true;
            self.publish_health(host, false, &mut report);
            return report;
        };

        let mut ok = true;

        for role in Scalar::ALL {
            if let Err(e) = self.poll_scalar(host, map, role, now, &mut report).await {
                warn!(capability = role.capability(), error = %e, "sensor poll failed");
                report.errors.push(format!("{}: {e}", role.capability()));
                ok = false;
            }
        }

        let switch_samples = self.poll_switches(host, map, &mut report, &mut ok).await;

        if let Err(e) = self.poll_flow(host, map, &switch_samples, &mut report).await {
            warn!(error = %e, "flow poll failed");
            report.errors.push(format!("flow: {e}"));
            ok = false;
        }

        self.publish_health(host, ok, &mut report);
        report
    }

    // ── Scalars ─────────────────────────────────────────────────────

    async fn poll_scalar(
        &mut self,
        host: &dyn CapabilityHost,
        map: &IoMap,
        role: Scalar,
        now: DateTime<Utc>,
        report: &mut PollReport,
    ) -> Result<(), CoreError> {
        let Some(slot) = role.slot(map) else {
            return Ok(());
        };
        let capability = role.capability();
        if !host.has_capability(capability) {
            trace!(capability, "capability absent, not polling");
            return Ok(());
        }

        // Step back one second so a sample sharing the watermark is re-read.
        let after_ms = self
            .watermarks
            .get(&slot.io)
            .map_or(0, |t| (t.timestamp_millis() - 1000).max(0));

        let samples = fetch_with_fallback(&self.client, &map.domain, &slot.io, after_ms).await?;
        self.advance_watermark(&slot.io, &samples);

        let Some((value, taken_at)) = role.read(&samples) else {
            debug!(capability, samples = samples.len(), "no reading");
            return Ok(());
        };
        let Some(taken_at) = taken_at else {
            debug!(capability, value, "reading has no timestamp, suppressed");
            return Ok(());
        };
        let age = now.signed_duration_since(taken_at);
        if age.to_std().is_ok_and(|age| age > self.thresholds.staleness) {
            debug!(capability, value, age_secs = age.num_seconds(), "reading stale, suppressed");
            return Ok(());
        }

        self.publish(host, capability, value.into(), Some(role.trigger()), report)?;
        Ok(())
    }

    fn advance_watermark(&mut self, channel: &ChannelId, samples: &[Sample]) {
        if let Some(newest) = newest_timestamp(samples) {
            let entry = self.watermarks.entry(channel.clone()).or_insert(newest);
            if newest > *entry {
                *entry = newest;
            }
        }
    }

    // ── Switches ────────────────────────────────────────────────────

    /// Read every mapped switch once. Each switch's samples are returned
    /// for flow evaluation; its `onoff.*` capability is updated on change.
    async fn poll_switches(
        &mut self,
        host: &dyn CapabilityHost,
        map: &IoMap,
        report: &mut PollReport,
        ok: &mut bool,
    ) -> Vec<(ChannelId, Vec<Sample>)> {
        let mut out = Vec::with_capacity(map.switches.len());

        for channel in &map.switches {
            let samples = match fetch_latest(&self.client, &map.domain, channel).await {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "switch poll failed");
                    report.errors.push(format!("{channel}: {e}"));
                    *ok = false;
                    continue;
                }
            };

            let capability = onoff_capability(channel);
            let state = samples
                .last()
                .and_then(|s| switch_state(s, self.thresholds.flow_analog));
            if let Some((on, _)) = state {
                if host.has_capability(&capability) {
                    if let Err(e) = self.publish(host, &capability, on.into(), None, report) {
                        warn!(channel = %channel, error = %e, "switch publish failed");
                        report.errors.push(format!("{capability}: {e}"));
                        *ok = false;
                    }
                }
            }

            out.push((channel.clone(), samples));
        }
        out
    }

    // ── Flow ────────────────────────────────────────────────────────

    async fn poll_flow(
        &mut self,
        host: &dyn CapabilityHost,
        map: &IoMap,
        switch_samples: &[(ChannelId, Vec<Sample>)],
        report: &mut PollReport,
    ) -> Result<(), CoreError> {
        let mut evidence = flow_from_switches(switch_samples, self.thresholds.flow_analog);

        if evidence.is_none() {
            if let Some(slot) = &map.flow {
                let samples = fetch_latest(&self.client, &map.domain, &slot.io).await?;
                evidence = latest_analog(&samples).map(|(v, _)| FlowEvidence {
                    flowing: v.abs() >= self.thresholds.flow_analog,
                    source: slot.io.clone(),
                    via: Some(Via::Analog),
                });
            }
        }

        let Some(evidence) = evidence else {
            debug!("flow: no conclusive evidence this round");
            return Ok(());
        };

        debug!(source = %evidence.source, flowing = evidence.flowing, "flow evidence");
        let flowing = evidence.flowing;
        report.flow = Some(evidence);

        if host.has_capability(ALARM_FLOW) {
            self.publish(host, ALARM_FLOW, flowing.into(), Some(TRIGGER_FLOW), report)?;
        } else if host.has_capability(MEASURE_FLOW) {
            let value = if flowing { 1.0 } else { 0.0 };
            self.publish(host, MEASURE_FLOW, value.into(), Some(TRIGGER_FLOW), report)?;
        }
        Ok(())
    }

    // ── Publication ─────────────────────────────────────────────────

    fn publish_health(&mut self, host: &dyn CapabilityHost, healthy: bool, report: &mut PollReport) {
        report.healthy = healthy;
        if !host.has_capability(ALARM_HEALTH) {
            return;
        }
        match self.publish(host, ALARM_HEALTH, (!healthy).into(), None, report) {
            Ok(true) => {
                if let Err(e) = host.trigger(TRIGGER_HEALTH, json!({ "healthy": healthy })) {
                    warn!(error = %e, "health trigger failed");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "health publish failed"),
        }
    }

    /// Write `value` if it differs from the last published one (or, before
    /// the first publish, from the host's current value). Returns whether a
    /// write happened.
    fn publish(
        &mut self,
        host: &dyn CapabilityHost,
        capability: &str,
        value: CapabilityValue,
        trigger: Option<&str>,
        report: &mut PollReport,
    ) -> Result<bool, CoreError> {
        let previous = self
            .last_published
            .get(capability)
            .copied()
            .or_else(|| host.capability_value(capability));
        if previous == Some(value) {
            trace!(capability, %value, "unchanged");
            return Ok(false);
        }

        host.set_capability(capability, value)?;
        self.last_published.insert(capability.to_owned(), value);
        report.published.push(Publication {
            capability: capability.to_owned(),
            value,
        });
        info!(capability, %value, "updated");

        if let Some(trigger) = trigger {
            host.trigger(trigger, json!({ "value": value.to_json() }))?;
        }
        Ok(true)
    }
}

/// Flow evidence from switch samples: outputs first, then inputs, each in
/// mapping order. The newest sample of the first channel that decodes wins.
pub fn flow_from_switches(
    switch_samples: &[(ChannelId, Vec<Sample>)],
    analog_threshold: f64,
) -> Option<FlowEvidence> {
    let ordered = [Direction::Output, Direction::Input].into_iter().flat_map(|dir| {
        switch_samples
            .iter()
            .filter(move |(ch, _)| ch.direction() == dir)
    });

    for (channel, samples) in ordered {
        let Some(newest) = samples.last() else {
            trace!(channel = %channel, "flow: no samples");
            continue;
        };
        if let Some((flowing, via)) = switch_state(newest, analog_threshold) {
            return Some(FlowEvidence {
                flowing,
                source: channel.clone(),
                via: Some(via),
            });
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn samples(sensor: Value) -> Vec<Sample> {
        vec![
            serde_json::from_value(json!({
                "device_sensor_time": "2024-06-15T10:30:00Z",
                "device_sensor_data": sensor
            }))
            .unwrap(),
        ]
    }

    #[test]
    fn outputs_are_consulted_before_inputs() {
        let data = vec![
            (ChannelId::input("dev", 1), samples(json!({ "switch": { "1": true } }))),
            (ChannelId::output("dev", 3), samples(json!({ "switch": { "3": false } }))),
        ];
        let ev = flow_from_switches(&data, 0.5).unwrap();
        assert_eq!(ev.source, ChannelId::output("dev", 3));
        assert!(!ev.flowing);
    }

    #[test]
    fn undecodable_switch_falls_through() {
        let data = vec![
            (ChannelId::output("dev", 0), samples(json!({ "other": "x" }))),
            (ChannelId::output("dev", 1), Vec::new()),
            (ChannelId::input("dev", 4), samples(json!({ "power": 1 }))),
        ];
        let ev = flow_from_switches(&data, 0.5).unwrap();
        assert_eq!(ev.source, ChannelId::input("dev", 4));
        assert!(ev.flowing);
        assert_eq!(ev.via, Some(Via::Direct));
    }

    #[test]
    fn no_switches_no_evidence() {
        assert!(flow_from_switches(&[], 0.5).is_none());
    }
}
