use std::collections::HashMap;
use shared::types::{AggregateRecord, ServiceEvent};
use crate::discovery::keys::{is_supported_protocol, split_top_level, AggregateKey, SubscriptionKey};
use crate::error::{DiscoveryError, Result};

/// What the coordinator should do after a meta-query event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopLevelAction {
    /// Make sure an instance browse is open for `key` in `domain`
    Subscribe { key: SubscriptionKey, domain: String },
    /// Withdrawn registration types keep their record for the session
    Ignore,
}

struct Slot {
    /// First-insertion order, kept across overwrites
    seq: u64,
    record: AggregateRecord,
}

/// Counted records keyed by [`AggregateKey`]
pub struct AggregateStore {
    records: HashMap<AggregateKey, Slot>,
    next_seq: u64,
    clamp_counts: bool,
}

impl AggregateStore {
    pub fn new(clamp_counts: bool) -> Self {
        Self {
            records: HashMap::new(),
            next_seq: 0,
            clamp_counts,
        }
    }

    /// Record a registration-type announcement.
    ///
    /// Errors mean the event was not usable; nothing was changed.
    pub fn observe_top_level(&mut self, event: &ServiceEvent) -> Result<TopLevelAction> {
        if event.is_lost {
            return Ok(TopLevelAction::Ignore);
        }

        let (protocol, service_domain) = split_top_level(&event.registration_type)?;
        if !is_supported_protocol(protocol) {
            return Err(DiscoveryError::UnsupportedProtocol {
                protocol: protocol.to_string(),
                registration_type: event.registration_type.clone(),
            });
        }

        let record = AggregateRecord {
            registration_type: event.registration_type.clone(),
            domain: event.domain.clone(),
            service_name: event.service_name.clone(),
            live_count: 0,
        };

        let key = AggregateKey::from_top_level(event);
        match self.records.get_mut(&key) {
            Some(slot) => slot.record = record,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.records.insert(key, Slot { seq, record });
            }
        }

        Ok(TopLevelAction::Subscribe {
            key: SubscriptionKey::new(protocol, &event.service_name),
            domain: service_domain.to_string(),
        })
    }

    /// Count an instance arriving or leaving. Returns the new live count.
    pub fn observe_second_level(&mut self, event: &ServiceEvent) -> Result<i64> {
        let key = AggregateKey::from_instance(event)?;
        let slot = self
            .records
            .get_mut(&key)
            .ok_or_else(|| DiscoveryError::OrphanedEvent(key.to_string()))?;

        let record = &mut slot.record;
        if event.is_lost {
            if self.clamp_counts && record.live_count <= 0 {
                tracing::debug!("Loss of {} before any arrival, count stays at 0", event.service_name);
                record.live_count = 0;
            } else {
                record.live_count -= 1;
            }
        } else {
            record.live_count += 1;
        }

        Ok(record.live_count)
    }

    /// Records with at least one live instance, in first-insertion order
    pub fn snapshot(&self) -> Vec<AggregateRecord> {
        let mut live: Vec<&Slot> = self
            .records
            .values()
            .filter(|slot| slot.record.live_count > 0)
            .collect();
        live.sort_by_key(|slot| slot.seq);
        live.into_iter().map(|slot| slot.record.clone()).collect()
    }

    #[cfg(test)]
    pub fn get(&self, key: &AggregateKey) -> Option<&AggregateRecord> {
        self.records.get(key).map(|slot| &slot.record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.next_seq = 0;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announce(store: &mut AggregateStore, service: &str) {
        let event = ServiceEvent::found("local.", "_tcp.local.", service);
        store.observe_top_level(&event).unwrap();
    }

    fn instance(service: &str, name: &str, lost: bool) -> ServiceEvent {
        let reg_type = format!("{}._tcp.", service);
        if lost {
            ServiceEvent::lost("local.", &reg_type, name)
        } else {
            ServiceEvent::found("local.", &reg_type, name)
        }
    }

    #[test]
    fn test_top_level_requests_subscription() {
        let mut store = AggregateStore::new(true);
        let event = ServiceEvent::found("local.", "_tcp.local.", "_http");

        let action = store.observe_top_level(&event).unwrap();
        assert_eq!(
            action,
            TopLevelAction::Subscribe {
                key: SubscriptionKey::new("_tcp", "_http"),
                domain: "local.".to_string(),
            }
        );

        let record = store.get(&AggregateKey::from_top_level(&event)).unwrap();
        assert_eq!(record.live_count, 0);
    }

    #[test]
    fn test_unknown_protocol_is_dropped() {
        let mut store = AggregateStore::new(true);
        let event = ServiceEvent::found("local.", "_unknown.local.", "_http");

        let result = store.observe_top_level(&event);
        assert!(matches!(result, Err(DiscoveryError::UnsupportedProtocol { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_lost_top_level_is_ignored() {
        let mut store = AggregateStore::new(true);
        announce(&mut store, "_http");
        store.observe_second_level(&instance("_http", "a", false)).unwrap();

        let lost = ServiceEvent::lost("local.", "_tcp.local.", "_http");
        assert_eq!(store.observe_top_level(&lost).unwrap(), TopLevelAction::Ignore);
        assert_eq!(store.snapshot().len(), 1, "Record should survive a lost registration type");
    }

    #[test]
    fn test_count_conservation() {
        let mut store = AggregateStore::new(true);
        announce(&mut store, "_http");

        for name in ["a", "b", "c", "d"] {
            store.observe_second_level(&instance("_http", name, false)).unwrap();
        }
        for name in ["a", "b"] {
            store.observe_second_level(&instance("_http", name, true)).unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].live_count, 2);

        for name in ["c", "d"] {
            store.observe_second_level(&instance("_http", name, true)).unwrap();
        }
        assert!(store.snapshot().is_empty(), "Record should leave snapshot at zero");
        assert_eq!(store.len(), 1, "Record itself is kept for the session");
    }

    #[test]
    fn test_orphaned_event_changes_nothing() {
        let mut store = AggregateStore::new(true);
        announce(&mut store, "_http");

        let result = store.observe_second_level(&instance("_ipp", "printer", false));
        assert!(matches!(result, Err(DiscoveryError::OrphanedEvent(_))));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_clamped_count_never_negative() {
        let mut store = AggregateStore::new(true);
        announce(&mut store, "_http");

        assert_eq!(store.observe_second_level(&instance("_http", "a", true)).unwrap(), 0);
        assert_eq!(store.observe_second_level(&instance("_http", "a", false)).unwrap(), 1);
    }

    #[test]
    fn test_unclamped_count_goes_negative() {
        let mut store = AggregateStore::new(false);
        announce(&mut store, "_http");

        assert_eq!(store.observe_second_level(&instance("_http", "a", true)).unwrap(), -1);
        assert!(store.snapshot().is_empty(), "Negative counts should never be listed");
        assert_eq!(store.observe_second_level(&instance("_http", "a", false)).unwrap(), 0);
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let mut store = AggregateStore::new(true);
        for service in ["_ssh", "_http", "_ipp"] {
            announce(&mut store, service);
        }
        for service in ["_ipp", "_http", "_ssh"] {
            store.observe_second_level(&instance(service, "x", false)).unwrap();
        }

        // Re-announcement resets the count but keeps the position
        announce(&mut store, "_ssh");
        store.observe_second_level(&instance("_ssh", "x", false)).unwrap();

        let names: Vec<String> = store.snapshot().into_iter().map(|r| r.service_name).collect();
        assert_eq!(names, vec!["_ssh", "_http", "_ipp"]);
    }

    #[test]
    fn test_clear_empties_store() {
        let mut store = AggregateStore::new(true);
        announce(&mut store, "_http");
        store.clear();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }
}
