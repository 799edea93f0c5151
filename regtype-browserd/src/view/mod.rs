//! Presenter that keeps the latest registration-type list for the API.

pub mod hash;

use std::collections::HashMap;
use chrono::Utc;
use tokio::sync::watch;
use shared::types::{AggregateRecord, RegTypeEntry, RegTypeSnapshot};
use crate::discovery::coordinator::DiscoveryState;
use crate::discovery::presenter::Presenter;
use crate::error::DiscoveryError;

#[derive(Debug, Clone)]
pub struct ViewState {
    pub snapshot: RegTypeSnapshot,
    pub hash: String,
    pub state: DiscoveryState,
    /// Cleared when discovery is restarted
    pub last_error: Option<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            snapshot: RegTypeSnapshot::default(),
            hash: String::new(),
            state: DiscoveryState::Idle,
            last_error: None,
        }
    }
}

pub struct ViewPresenter {
    descriptions: HashMap<String, String>,
    tx: watch::Sender<ViewState>,
}

impl ViewPresenter {
    pub fn new(descriptions: HashMap<String, String>) -> (Self, watch::Receiver<ViewState>) {
        let (tx, rx) = watch::channel(ViewState::default());
        (Self { descriptions, tx }, rx)
    }

    fn entry(&self, record: AggregateRecord) -> RegTypeEntry {
        let label = record.label();
        RegTypeEntry {
            description: self.descriptions.get(&label).cloned(),
            label,
            registration_type: record.registration_type,
            domain: record.domain,
            service_name: record.service_name,
            live_count: record.live_count,
        }
    }
}

impl Presenter for ViewPresenter {
    fn on_snapshot_ready(&mut self, records: Vec<AggregateRecord>, previous_item_count: usize) {
        let entries: Vec<RegTypeEntry> = records.into_iter().map(|r| self.entry(r)).collect();
        let hash = match hash::compute_hash(&entries) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!("Failed to hash snapshot: {}", e);
                String::new()
            }
        };

        tracing::debug!(
            "Publishing {} registration types (was {})",
            entries.len(),
            previous_item_count
        );

        self.tx.send_modify(|view| {
            view.snapshot = RegTypeSnapshot {
                entries,
                previous_item_count,
                published_at: Utc::now(),
            };
            view.hash = hash;
        });
    }

    fn on_error(&mut self, cause: DiscoveryError) {
        self.tx.send_modify(|view| view.last_error = Some(cause.to_string()));
    }

    fn on_state_changed(&mut self, state: DiscoveryState) {
        self.tx.send_modify(|view| {
            if state == DiscoveryState::Browsing {
                view.last_error = None;
            }
            view.state = state;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(service_name: &str, live_count: i64) -> AggregateRecord {
        AggregateRecord {
            registration_type: "_tcp.local.".to_string(),
            domain: "local.".to_string(),
            service_name: service_name.to_string(),
            live_count,
        }
    }

    #[test]
    fn test_snapshot_gets_labels_and_descriptions() {
        let descriptions = HashMap::from([("_http._tcp.".to_string(), "Web Site".to_string())]);
        let (mut presenter, rx) = ViewPresenter::new(descriptions);

        presenter.on_snapshot_ready(vec![record("_http", 3), record("_ipp", 1)], 0);

        let view = rx.borrow().clone();
        assert_eq!(view.snapshot.entries.len(), 2);
        assert_eq!(view.snapshot.entries[0].label, "_http._tcp.");
        assert_eq!(view.snapshot.entries[0].description.as_deref(), Some("Web Site"));
        assert_eq!(view.snapshot.entries[0].live_count, 3);
        assert!(view.snapshot.entries[1].description.is_none());
        assert!(!view.hash.is_empty());
    }

    #[test]
    fn test_error_cleared_on_restart() {
        let (mut presenter, rx) = ViewPresenter::new(HashMap::new());

        presenter.on_error(DiscoveryError::OrphanedEvent("x".to_string()));
        assert!(rx.borrow().last_error.is_some());

        presenter.on_state_changed(DiscoveryState::Idle);
        assert!(rx.borrow().last_error.is_some(), "Stopping should keep the error visible");

        presenter.on_state_changed(DiscoveryState::Browsing);
        let view = rx.borrow().clone();
        assert!(view.last_error.is_none());
        assert_eq!(view.state, DiscoveryState::Browsing);
    }

    #[test]
    fn test_empty_snapshot_records_previous_count() {
        let (mut presenter, rx) = ViewPresenter::new(HashMap::new());

        presenter.on_snapshot_ready(vec![record("_http", 1)], 0);
        presenter.on_snapshot_ready(Vec::new(), 1);

        let view = rx.borrow().clone();
        assert!(view.snapshot.entries.is_empty());
        assert_eq!(view.snapshot.previous_item_count, 1);
    }
}
