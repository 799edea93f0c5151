//! Boundary towards whatever renders the registration-type list.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use shared::types::AggregateRecord;
use crate::discovery::coordinator::DiscoveryState;
use crate::error::DiscoveryError;

/// Messages queued by the coordinator, consumed in order by one presenter
#[derive(Debug, Clone)]
pub enum PresentationEvent {
    Snapshot {
        records: Vec<AggregateRecord>,
        previous_item_count: usize,
    },
    Error(DiscoveryError),
    StateChanged(DiscoveryState),
}

pub trait Presenter: Send + 'static {
    fn on_snapshot_ready(&mut self, records: Vec<AggregateRecord>, previous_item_count: usize);

    fn on_error(&mut self, cause: DiscoveryError);

    fn on_state_changed(&mut self, _state: DiscoveryState) {}
}

/// Presenter event loop - delivers coordinator output one message at a time
pub async fn run<P: Presenter>(
    mut presenter: P,
    mut rx: mpsc::UnboundedReceiver<PresentationEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(PresentationEvent::Snapshot { records, previous_item_count }) => {
                        presenter.on_snapshot_ready(records, previous_item_count);
                    }
                    Some(PresentationEvent::Error(cause)) => presenter.on_error(cause),
                    Some(PresentationEvent::StateChanged(state)) => presenter.on_state_changed(state),
                    None => {
                        tracing::debug!("Coordinator gone, presenter exiting");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Presenter shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Presenter for Recorder {
        fn on_snapshot_ready(&mut self, records: Vec<AggregateRecord>, previous_item_count: usize) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("snapshot {} {}", records.len(), previous_item_count));
        }

        fn on_error(&mut self, cause: DiscoveryError) {
            self.seen.lock().unwrap().push(format!("error {}", cause));
        }

        fn on_state_changed(&mut self, state: DiscoveryState) {
            self.seen.lock().unwrap().push(format!("state {:?}", state));
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let recorder = Recorder::default();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(PresentationEvent::StateChanged(DiscoveryState::Browsing)).unwrap();
        tx.send(PresentationEvent::Snapshot { records: Vec::new(), previous_item_count: 2 }).unwrap();
        tx.send(PresentationEvent::Error(DiscoveryError::AlreadyStarted)).unwrap();
        drop(tx);

        run(recorder.clone(), rx, CancellationToken::new()).await;

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "state Browsing".to_string(),
                "snapshot 0 2".to_string(),
                "error Discovery is already running".to_string(),
            ]
        );
    }
}
