//! Cancellable browse subscriptions.
//!
//! A [`BrowseSource`] hands out a [`Subscription`] per browse. The producer
//! side keeps a [`SubscriptionSink`] to emit events or fail the stream; the
//! consumer can cancel through a [`SubscriptionHandle`]. Cancellation stops
//! delivery cooperatively, events already queued may still be read.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use shared::types::ServiceEvent;
use crate::error::{DiscoveryError, Result};

/// Opens browses against the discovery protocol
pub trait BrowseSource: Send + Sync + 'static {
    /// Returns immediately; events arrive on the subscription later.
    fn browse(&self, domain: &str, registration_type: &str) -> Result<Subscription>;
}

enum BrowseMessage {
    Event(ServiceEvent),
    Failed(DiscoveryError),
}

/// Create a connected sink/subscription pair
pub fn subscription() -> (SubscriptionSink, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    (
        SubscriptionSink {
            tx,
            cancel: cancel.clone(),
        },
        Subscription { rx, cancel },
    )
}

/// Producer side of a subscription
#[derive(Clone)]
pub struct SubscriptionSink {
    tx: mpsc::UnboundedSender<BrowseMessage>,
    cancel: CancellationToken,
}

impl SubscriptionSink {
    /// Returns false once the subscription is cancelled or dropped
    pub fn emit(&self, event: ServiceEvent) -> bool {
        !self.cancel.is_cancelled() && self.tx.send(BrowseMessage::Event(event)).is_ok()
    }

    /// Terminate the stream with an error
    pub fn fail(&self, error: DiscoveryError) {
        let _ = self.tx.send(BrowseMessage::Failed(error));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }
}

/// Consumer side of a subscription
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<BrowseMessage>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Next event, `Some(Err)` on terminal failure, `None` once cancelled or
    /// the producer went away.
    pub async fn next(&mut self) -> Option<Result<ServiceEvent>> {
        let message = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            message = self.rx.recv() => message?,
        };

        match message {
            BrowseMessage::Event(event) => Some(Ok(event)),
            BrowseMessage::Failed(error) => {
                self.cancel.cancel();
                Some(Err(error))
            }
        }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            cancel: self.cancel.clone(),
        }
    }
}

/// Cancels a subscription without owning its receiver
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
