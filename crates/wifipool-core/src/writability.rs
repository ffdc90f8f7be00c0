// ── Switch writability ──
//
// Outputs are assumed writable and inputs read-only until a write says
// otherwise. Evidence is kept per channel and survives restarts through
// `IoMap::writability`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::host::{CapabilityHost, onoff_capability};
use crate::model::{ChannelId, IoMap};

/// Tracks which switch channels accept manual writes and keeps host
/// command listeners in step with that.
#[derive(Debug, Clone, Default)]
pub struct WritabilityLearner {
    switches: Vec<ChannelId>,
    learned: BTreeMap<ChannelId, bool>,
    registered: BTreeSet<ChannelId>,
}

impl WritabilityLearner {
    pub fn new(switches: Vec<ChannelId>, learned: BTreeMap<ChannelId, bool>) -> Self {
        Self {
            switches,
            learned,
            registered: BTreeSet::new(),
        }
    }

    /// Build from a persisted setup, keeping only evidence for switches
    /// that are still mapped.
    pub fn from_io_map(map: &IoMap) -> Self {
        let learned = map
            .writability
            .iter()
            .filter(|(ch, _)| map.switches.contains(ch))
            .map(|(ch, w)| (ch.clone(), *w))
            .collect();
        Self::new(map.switches.clone(), learned)
    }

    /// Default by direction: outputs writable, inputs read-only.
    pub fn default_for(channel: &ChannelId) -> bool {
        channel.is_output()
    }

    pub fn is_writable(&self, channel: &ChannelId) -> bool {
        self.learned
            .get(channel)
            .copied()
            .unwrap_or_else(|| Self::default_for(channel))
    }

    /// Channels currently considered writable, in switch order.
    pub fn writable_channels(&self) -> Vec<ChannelId> {
        self.switches
            .iter()
            .filter(|ch| self.is_writable(ch))
            .cloned()
            .collect()
    }

    /// A write succeeded. Returns `true` if writability changed.
    pub fn record_success(&mut self, channel: &ChannelId) -> bool {
        self.record(channel, true)
    }

    /// A write was refused because the channel is a sensor. Returns `true`
    /// if writability changed.
    pub fn record_rejection(&mut self, channel: &ChannelId) -> bool {
        self.record(channel, false)
    }

    fn record(&mut self, channel: &ChannelId, writable: bool) -> bool {
        let before = self.is_writable(channel);
        self.learned.insert(channel.clone(), writable);
        if before != writable {
            info!(channel = %channel, writable, "switch writability changed");
        }
        before != writable
    }

    /// Learned evidence, for persisting into the `IoMap`.
    pub fn learned(&self) -> &BTreeMap<ChannelId, bool> {
        &self.learned
    }

    /// Register listeners for writable switches and drop them for the rest.
    pub fn sync_listeners(&mut self, host: &dyn CapabilityHost) {
        let wanted: BTreeSet<ChannelId> = self.writable_channels().into_iter().collect();

        for stale in self.registered.difference(&wanted) {
            debug!(channel = %stale, "unregistering switch listener");
            host.unregister_listener(&onoff_capability(stale));
        }
        for fresh in wanted.difference(&self.registered) {
            debug!(channel = %fresh, "registering switch listener");
            host.register_listener(&onoff_capability(fresh), fresh);
        }
        self.registered = wanted;
    }

    /// Drop every listener this learner registered.
    pub fn clear_listeners(&mut self, host: &dyn CapabilityHost) {
        for ch in std::mem::take(&mut self.registered) {
            host.unregister_listener(&onoff_capability(&ch));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    fn learner() -> WritabilityLearner {
        WritabilityLearner::new(
            vec![
                ChannelId::output("dev", 3),
                ChannelId::input("dev", 1),
                ChannelId::output("dev", 4),
            ],
            BTreeMap::new(),
        )
    }

    #[test]
    fn defaults_follow_direction() {
        let l = learner();
        assert!(l.is_writable(&ChannelId::output("dev", 3)));
        assert!(!l.is_writable(&ChannelId::input("dev", 1)));
        assert_eq!(l.writable_channels().len(), 2);
    }

    #[test]
    fn rejection_demotes_and_success_promotes() {
        let mut l = learner();
        let x = ChannelId::output("dev", 4);
        let y = ChannelId::input("dev", 1);

        assert!(l.record_rejection(&x));
        assert!(!l.record_rejection(&x));
        assert!(l.record_success(&y));

        let writable = l.writable_channels();
        assert!(!writable.contains(&x));
        assert!(writable.contains(&y));
    }

    #[test]
    fn listeners_follow_writability_mid_session() {
        let host = MemoryHost::new();
        let mut l = learner();
        l.sync_listeners(&host);
        assert_eq!(
            host.listeners().into_iter().collect::<Vec<_>>(),
            vec!["onoff.o3", "onoff.o4"]
        );

        l.record_rejection(&ChannelId::output("dev", 4));
        l.record_success(&ChannelId::input("dev", 1));
        l.sync_listeners(&host);
        assert_eq!(
            host.listeners().into_iter().collect::<Vec<_>>(),
            vec!["onoff.i1", "onoff.o3"]
        );

        l.clear_listeners(&host);
        assert!(host.listeners().is_empty());
    }

    #[test]
    fn persisted_evidence_for_unmapped_switches_is_dropped() {
        let mut map = IoMap::new("dom", "dev");
        map.switches = vec![ChannelId::output("dev", 3)];
        map.writability.insert(ChannelId::output("dev", 3), false);
        map.writability.insert(ChannelId::output("dev", 9), true);

        let l = WritabilityLearner::from_io_map(&map);
        assert_eq!(l.learned().len(), 1);
        assert!(l.writable_channels().is_empty());
    }
}
