// ── Discovery results ──
//
// `IoMap` is what a setup run produces and what every poll cycle
// consumes. It is persisted by the host's setup store; learned switch
// writability rides along in the same record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::channel::ChannelId;

/// Semantic type inferred for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Switch,
    AnalogPh,
    AnalogRedox,
    AnalogFlow,
    Ds18b20Temperature,
    Unknown,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Switch => "switch",
            Self::AnalogPh => "ph",
            Self::AnalogRedox => "redox",
            Self::AnalogFlow => "flow",
            Self::Ds18b20Temperature => "temperature",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classification of one probed channel, with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelClassification {
    pub channel: ChannelId,
    pub kind: ChannelKind,
    /// Nested payload key that held the value (`analog` / `ds18b20` sub-key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Reading that justified the classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<f64>,
}

/// One populated sensor role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSlot {
    pub io: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl SensorSlot {
    pub fn new(io: ChannelId, key: Option<String>) -> Self {
        Self { io, key }
    }
}

/// Aggregate discovery result for one pool installation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IoMap {
    pub domain: String,
    pub device_uuid: String,
    #[serde(default)]
    pub switches: Vec<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph: Option<SensorSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redox: Option<SensorSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<SensorSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<SensorSlot>,
    /// Learned switch writability, keyed by channel.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub writability: BTreeMap<ChannelId, bool>,
}

impl IoMap {
    pub fn new(domain: impl Into<String>, device_uuid: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            device_uuid: device_uuid.into(),
            ..Self::default()
        }
    }

    /// Number of populated sensor slots plus discovered switches.
    pub fn populated_count(&self) -> usize {
        [&self.ph, &self.redox, &self.flow, &self.temperature]
            .iter()
            .filter(|slot| slot.is_some())
            .count()
            + self.switches.len()
    }

    /// Whether any flow evidence source exists (switches or an analog flow channel).
    pub fn has_flow_source(&self) -> bool {
        self.flow.is_some() || !self.switches.is_empty()
    }

    /// Human-readable device name, e.g. `WiFiPool Temp pH ORP 2xSwitch`.
    pub fn device_name(&self) -> String {
        let mut parts = vec!["WiFiPool".to_owned()];
        if self.temperature.is_some() {
            parts.push("Temp".into());
        }
        if self.ph.is_some() {
            parts.push("pH".into());
        }
        if self.redox.is_some() {
            parts.push("ORP".into());
        }
        if !self.switches.is_empty() {
            parts.push(format!("{}xSwitch", self.switches.len()));
        }
        parts.join(" ")
    }

    /// Find a switch by full id or by its local suffix (`o3`).
    pub fn find_switch(&self, id_or_suffix: &str) -> Option<&ChannelId> {
        self.switches
            .iter()
            .find(|s| s.to_string() == id_or_suffix || s.suffix() == id_or_suffix)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_map() -> IoMap {
        let mut map = IoMap::new("dom", "dev");
        map.switches = vec![ChannelId::output("dev", 3), ChannelId::output("dev", 4)];
        map.ph = Some(SensorSlot::new(ChannelId::input("dev", 0), Some("0".into())));
        map.temperature = Some(SensorSlot::new(ChannelId::input("dev", 2), None));
        map
    }

    #[test]
    fn device_name_lists_roles() {
        assert_eq!(sample_map().device_name(), "WiFiPool Temp pH 2xSwitch");
        assert_eq!(IoMap::new("d", "x").device_name(), "WiFiPool");
    }

    #[test]
    fn persists_with_plain_channel_strings() {
        let mut map = sample_map();
        map.writability.insert(ChannelId::output("dev", 4), false);

        let value = serde_json::to_value(&map).unwrap();
        assert_eq!(
            value,
            json!({
                "domain": "dom",
                "device_uuid": "dev",
                "switches": ["dev.o3", "dev.o4"],
                "ph": { "io": "dev.i0", "key": "0" },
                "temperature": { "io": "dev.i2" },
                "writability": { "dev.o4": false }
            })
        );

        let back: IoMap = serde_json::from_value(value).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn find_switch_by_suffix() {
        let map = sample_map();
        assert_eq!(map.find_switch("o4").unwrap().index(), 4);
        assert!(map.find_switch("dev.o3").is_some());
        assert!(map.find_switch("o9").is_none());
        assert_eq!(map.populated_count(), 4);
    }
}
