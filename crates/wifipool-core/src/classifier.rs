// ── Channel classification ──
//
// The vendor exposes no per-channel type. Each candidate channel is probed
// for recent samples and typed by payload shape (`switch`, `ds18b20`,
// `analog`) and, for analog channels, by the range of the value.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use wifipool_api::{Sample, TelemetryClient};

use crate::config::Thresholds;
use crate::decode::{ds18b20_temperature, number};
use crate::error::CoreError;
use crate::model::{
    ChannelClassification, ChannelId, ChannelKind, IoMap, SensorSlot, candidate_channels,
};
use crate::samples::fetch_with_fallback;

/// Payload marker found in a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    /// A `switch` object, or a populated `device_state_data.power`.
    Switch { key: Option<String> },
    /// A DS18B20 probe carrying a temperature.
    Ds18b20 { key: Option<String>, temperature: f64 },
    /// An `analog` object; `value` is `None` when it is not a finite number.
    Analog { key: String, value: Option<f64> },
}

fn has_content(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Object(m) => !m.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        _ => true,
    }
}

fn marker_of(sample: &Sample) -> Option<Marker> {
    if let Some(switch) = sample.sensor_data.get("switch").filter(|v| has_content(v)) {
        let key = switch.as_object().and_then(|m| m.keys().next().cloned());
        return Some(Marker::Switch { key });
    }
    if let Some(power) = sample.state_data.get("power").filter(|v| has_content(v)) {
        let key = power.as_object().and_then(|m| m.keys().next().cloned());
        return Some(Marker::Switch { key });
    }
    if let Some((key, temperature)) = ds18b20_temperature(sample) {
        return Some(Marker::Ds18b20 { key, temperature });
    }
    if let Some((key, raw)) = sample
        .sensor_object("analog")
        .and_then(|analog| analog.iter().next())
    {
        return Some(Marker::Analog {
            key: key.clone(),
            value: number(raw),
        });
    }
    None
}

/// Find the marker that types a channel: the newest sample carrying any
/// marker decides.
pub fn detect(samples: &[Sample]) -> Option<Marker> {
    samples.iter().rev().find_map(marker_of)
}

/// Type an analog value by range: `[0, ph_max]` is pH, `(redox_min,
/// redox_max)` is redox, anything else finite is flow.
pub fn kind_for_analog(value: f64, thresholds: &Thresholds) -> ChannelKind {
    if !value.is_finite() {
        ChannelKind::Unknown
    } else if (0.0..=thresholds.ph_max).contains(&value) {
        ChannelKind::AnalogPh
    } else if value > thresholds.redox_min && value < thresholds.redox_max {
        ChannelKind::AnalogRedox
    } else {
        ChannelKind::AnalogFlow
    }
}

/// Accumulates probe results into an `IoMap`.
///
/// Switches accumulate; each sensor role keeps its first channel and later
/// hits of the same role are recorded as `Unknown`.
#[derive(Debug, Clone)]
pub struct Classifier {
    thresholds: Thresholds,
    map: IoMap,
    results: Vec<ChannelClassification>,
}

impl Classifier {
    pub fn new(
        domain: impl Into<String>,
        device_uuid: impl Into<String>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            thresholds,
            map: IoMap::new(domain, device_uuid),
            results: Vec::new(),
        }
    }

    /// Classify one channel from its samples. Channels without samples or
    /// without a usable marker produce no result.
    pub fn observe(
        &mut self,
        channel: &ChannelId,
        samples: &[Sample],
    ) -> Option<&ChannelClassification> {
        let marker = detect(samples)?;

        let (kind, key, reading) = match marker {
            Marker::Switch { key } => {
                if !self.map.switches.contains(channel) {
                    self.map.switches.push(channel.clone());
                }
                (ChannelKind::Switch, key, None)
            }
            Marker::Ds18b20 { key, temperature } => {
                let kind = fill(
                    &mut self.map.temperature,
                    channel,
                    key.as_ref(),
                    ChannelKind::Ds18b20Temperature,
                );
                (kind, key, Some(temperature))
            }
            Marker::Analog { key, value: Some(value) } => {
                let kind = kind_for_analog(value, &self.thresholds);
                let slot = match kind {
                    ChannelKind::AnalogPh => Some(&mut self.map.ph),
                    ChannelKind::AnalogRedox => Some(&mut self.map.redox),
                    ChannelKind::AnalogFlow => Some(&mut self.map.flow),
                    _ => None,
                };
                let kind = match slot {
                    Some(slot) => fill(slot, channel, Some(&key), kind),
                    None => kind,
                };
                (kind, Some(key), Some(value))
            }
            Marker::Analog { value: None, .. } => {
                debug!(channel = %channel, "analog value not finite, skipping");
                return None;
            }
        };

        debug!(channel = %channel, kind = %kind, "classified");
        self.results.push(ChannelClassification {
            channel: channel.clone(),
            kind,
            key,
            reading,
        });
        self.results.last()
    }

    pub fn results(&self) -> &[ChannelClassification] {
        &self.results
    }

    /// Finish and return the assembled map with per-channel results.
    pub fn finish(self) -> (IoMap, Vec<ChannelClassification>) {
        (self.map, self.results)
    }
}

fn fill(
    slot: &mut Option<SensorSlot>,
    channel: &ChannelId,
    key: Option<&String>,
    kind: ChannelKind,
) -> ChannelKind {
    if slot.is_some() {
        return ChannelKind::Unknown;
    }
    *slot = Some(SensorSlot::new(channel.clone(), key.cloned()));
    kind
}

/// Probe every candidate channel of `device_uuid`, one at a time, and
/// assemble the IO map.
///
/// Empty channels are skipped. A probe that hits an expired session is
/// retried once under a fresh login. Telemetry errors on a single probe are
/// logged and skipped; configuration errors and a refused login abort.
pub async fn probe_channels(
    client: &TelemetryClient,
    domain: &str,
    device_uuid: &str,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Result<(IoMap, Vec<ChannelClassification>), CoreError> {
    let lookback = chrono::Duration::from_std(thresholds.discovery_lookback)
        .unwrap_or_else(|_| chrono::Duration::hours(72));
    let after_ms = (now - lookback).timestamp_millis();

    let mut classifier = Classifier::new(domain, device_uuid, thresholds.clone());

    for channel in candidate_channels(device_uuid) {
        let mut fetched = fetch_with_fallback(client, domain, &channel, after_ms).await;
        if fetched.as_ref().is_err_and(CoreError::is_session_expired) {
            debug!(channel = %channel, "session expired mid-probe, retrying");
            fetched = fetch_with_fallback(client, domain, &channel, after_ms).await;
        }
        let samples = match fetched {
            Ok(samples) => samples,
            Err(e) if e.is_fatal_for_discovery() => return Err(e),
            Err(e) => {
                warn!(channel = %channel, error = %e, "probe failed, skipping");
                continue;
            }
        };
        if samples.is_empty() {
            continue;
        }
        classifier.observe(&channel, &samples);
    }

    let (map, results) = classifier.finish();
    info!(
        populated = map.populated_count(),
        switches = map.switches.len(),
        "channel discovery complete"
    );
    Ok((map, results))
}
