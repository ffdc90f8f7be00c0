// ── Host collaborators ──
//
// The home-automation host owns capabilities, flow triggers, command
// listeners and persistent storage. Core talks to it only through the two
// traits below; `MemoryHost` and `MemorySetupStore` are in-process
// implementations for embedding, the CLI, and tests.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::model::{ChannelId, IoMap};

// ── Capability names ────────────────────────────────────────────────

pub const MEASURE_PH: &str = "measure_ph";
pub const MEASURE_REDOX: &str = "measure_redox";
pub const MEASURE_TEMPERATURE: &str = "measure_temperature";
pub const MEASURE_FLOW: &str = "measure_flow";
pub const ALARM_FLOW: &str = "alarm_flow";
pub const ALARM_HEALTH: &str = "alarm_health";
/// Prefix of per-switch capabilities (`onoff.o3`).
pub const ONOFF_PREFIX: &str = "onoff.";

// ── Flow trigger names ──────────────────────────────────────────────

pub const TRIGGER_PH: &str = "ph_updated";
pub const TRIGGER_REDOX: &str = "redox_updated";
pub const TRIGGER_TEMPERATURE: &str = "temp_updated";
pub const TRIGGER_FLOW: &str = "flow_updated";
pub const TRIGGER_HEALTH: &str = "health_changed";

/// Capability name for a switch channel.
pub fn onoff_capability(channel: &ChannelId) -> String {
    format!("{ONOFF_PREFIX}{}", channel.suffix())
}

/// A capability value as published to the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Bool(bool),
    Number(f64),
}

impl CapabilityValue {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(n),
            Self::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            Self::Number(_) => None,
        }
    }

    pub fn to_json(self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(b),
            Self::Number(n) => serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
        }
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<bool> for CapabilityValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for CapabilityValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

// ── Traits ──────────────────────────────────────────────────────────

/// The host's capability surface for one managed device.
pub trait CapabilityHost: Send + Sync {
    fn has_capability(&self, name: &str) -> bool;

    /// Current value, `None` if unset or absent.
    fn capability_value(&self, name: &str) -> Option<CapabilityValue>;

    fn set_capability(&self, name: &str, value: CapabilityValue) -> Result<(), CoreError>;

    fn add_capability(&self, name: &str) -> Result<(), CoreError>;

    fn remove_capability(&self, name: &str) -> Result<(), CoreError>;

    /// Fire a flow trigger with its tokens.
    fn trigger(&self, name: &str, tokens: Value) -> Result<(), CoreError>;

    /// Start accepting host-issued commands for a switch capability.
    fn register_listener(&self, capability: &str, channel: &ChannelId);

    fn unregister_listener(&self, capability: &str);

    /// Names of all present capabilities.
    fn capabilities(&self) -> Vec<String>;
}

/// Persistence for the discovery result.
pub trait SetupStore: Send + Sync {
    fn load(&self) -> Result<Option<IoMap>, CoreError>;

    fn save(&self, map: &IoMap) -> Result<(), CoreError>;

    fn clear(&self) -> Result<(), CoreError>;
}

// ── In-memory implementations ───────────────────────────────────────

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Something the host was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Set { capability: String, value: CapabilityValue },
    Trigger { name: String, tokens: Value },
    Added { capability: String },
    Removed { capability: String },
    ListenerRegistered { capability: String, channel: String },
    ListenerUnregistered { capability: String },
}

/// In-process capability host that records every interaction.
#[derive(Debug, Default)]
pub struct MemoryHost {
    values: Mutex<IndexMap<String, Option<CapabilityValue>>>,
    listeners: Mutex<BTreeSet<String>>,
    events: Mutex<Vec<HostEvent>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that already has the given capabilities (unset).
    pub fn with_capabilities<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = Self::new();
        {
            let mut values = lock(&host.values);
            for name in names {
                values.insert(name.into(), None);
            }
        }
        host
    }

    /// All recorded events so far.
    pub fn events(&self) -> Vec<HostEvent> {
        lock(&self.events).clone()
    }

    /// Take and clear the recorded events.
    pub fn drain_events(&self) -> Vec<HostEvent> {
        std::mem::take(&mut *lock(&self.events))
    }

    /// Number of `Set` events for one capability.
    pub fn set_count(&self, capability: &str) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| matches!(e, HostEvent::Set { capability: c, .. } if c == capability))
            .count()
    }

    /// Names of trigger events in order.
    pub fn triggers(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                HostEvent::Trigger { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Capabilities with an active command listener.
    pub fn listeners(&self) -> BTreeSet<String> {
        lock(&self.listeners).clone()
    }

    /// Snapshot of capability values in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Option<CapabilityValue>)> {
        lock(&self.values)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    fn record(&self, event: HostEvent) {
        lock(&self.events).push(event);
    }
}

impl CapabilityHost for MemoryHost {
    fn has_capability(&self, name: &str) -> bool {
        lock(&self.values).contains_key(name)
    }

    fn capability_value(&self, name: &str) -> Option<CapabilityValue> {
        lock(&self.values).get(name).copied().flatten()
    }

    fn set_capability(&self, name: &str, value: CapabilityValue) -> Result<(), CoreError> {
        {
            let mut values = lock(&self.values);
            let Some(slot) = values.get_mut(name) else {
                return Err(CoreError::Host {
                    message: format!("capability {name} is not present"),
                });
            };
            *slot = Some(value);
        }
        self.record(HostEvent::Set {
            capability: name.to_owned(),
            value,
        });
        Ok(())
    }

    fn add_capability(&self, name: &str) -> Result<(), CoreError> {
        let added = {
            let mut values = lock(&self.values);
            if values.contains_key(name) {
                false
            } else {
                values.insert(name.to_owned(), None);
                true
            }
        };
        if added {
            self.record(HostEvent::Added {
                capability: name.to_owned(),
            });
        }
        Ok(())
    }

    fn remove_capability(&self, name: &str) -> Result<(), CoreError> {
        if lock(&self.values).shift_remove(name).is_some() {
            self.record(HostEvent::Removed {
                capability: name.to_owned(),
            });
        }
        Ok(())
    }

    fn trigger(&self, name: &str, tokens: Value) -> Result<(), CoreError> {
        self.record(HostEvent::Trigger {
            name: name.to_owned(),
            tokens,
        });
        Ok(())
    }

    fn register_listener(&self, capability: &str, channel: &ChannelId) {
        if lock(&self.listeners).insert(capability.to_owned()) {
            self.record(HostEvent::ListenerRegistered {
                capability: capability.to_owned(),
                channel: channel.to_string(),
            });
        }
    }

    fn unregister_listener(&self, capability: &str) {
        if lock(&self.listeners).remove(capability) {
            self.record(HostEvent::ListenerUnregistered {
                capability: capability.to_owned(),
            });
        }
    }

    fn capabilities(&self) -> Vec<String> {
        lock(&self.values).keys().cloned().collect()
    }
}

/// In-process setup store.
#[derive(Debug, Default)]
pub struct MemorySetupStore {
    map: Mutex<Option<IoMap>>,
}

impl MemorySetupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(map: IoMap) -> Self {
        Self {
            map: Mutex::new(Some(map)),
        }
    }
}

impl SetupStore for MemorySetupStore {
    fn load(&self) -> Result<Option<IoMap>, CoreError> {
        Ok(lock(&self.map).clone())
    }

    fn save(&self, map: &IoMap) -> Result<(), CoreError> {
        *lock(&self.map) = Some(map.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        *lock(&self.map) = None;
        Ok(())
    }
}
