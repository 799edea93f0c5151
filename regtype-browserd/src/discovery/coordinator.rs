//! Two-level DNS-SD browse.
//!
//! The meta-query browse announces registration types; each new type gets
//! one instance browse whose events are counted in the [`AggregateStore`].
//! A session task multiplexes every open subscription, and all registry and
//! store mutation happens under `Inner::state`.

use std::pin::Pin;
use std::sync::Arc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use shared::types::ServiceEvent;
use crate::config::DiscoveryConfig;
use crate::discovery::keys::SubscriptionKey;
use crate::discovery::presenter::PresentationEvent;
use crate::discovery::registry::SubscriptionRegistry;
use crate::discovery::source::{BrowseSource, Subscription, SubscriptionHandle};
use crate::discovery::store::{AggregateStore, TopLevelAction};
use crate::error::{DiscoveryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryState {
    Idle,
    Browsing,
}

enum Origin {
    TopLevel,
    Instances { key: SubscriptionKey, domain: String },
}

type RecvResult = (Origin, Subscription, Option<Result<ServiceEvent>>);
type RecvFuture = Pin<Box<dyn Future<Output = RecvResult> + Send>>;

/// Each future owns its subscription and hands it back with the result so
/// it can be re-armed.
fn make_recv_future(origin: Origin, mut sub: Subscription) -> RecvFuture {
    Box::pin(async move {
        let result = sub.next().await;
        (origin, sub, result)
    })
}

struct Session {
    generation: u64,
    top_level: SubscriptionHandle,
    cancel: CancellationToken,
}

struct State {
    generation: u64,
    session: Option<Session>,
    registry: SubscriptionRegistry,
    store: AggregateStore,
    /// Entry count of the last published snapshot
    published: usize,
}

impl State {
    fn is_current(&self, generation: u64) -> bool {
        matches!(&self.session, Some(session) if session.generation == generation)
    }
}

struct Inner<S> {
    source: S,
    config: DiscoveryConfig,
    presenter: mpsc::UnboundedSender<PresentationEvent>,
    state: Mutex<State>,
}

/// Handle to the discovery state machine. Cheap to clone.
pub struct DiscoveryCoordinator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for DiscoveryCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: BrowseSource> DiscoveryCoordinator<S> {
    pub fn new(
        source: S,
        config: DiscoveryConfig,
        presenter: mpsc::UnboundedSender<PresentationEvent>,
    ) -> Self {
        let store = AggregateStore::new(config.clamp_counts);
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                presenter,
                state: Mutex::new(State {
                    generation: 0,
                    session: None,
                    registry: SubscriptionRegistry::new(),
                    store,
                    published: 0,
                }),
            }),
        }
    }

    /// Idle -> Browsing. Opens the meta-query browse and returns without
    /// waiting for any answer.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.session.is_some() {
            return Err(DiscoveryError::AlreadyStarted);
        }

        let config = &self.inner.config;
        let top_level = self
            .inner
            .source
            .browse(&config.browse_domain, &config.services_type)?;

        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();
        state.session = Some(Session {
            generation,
            top_level: top_level.handle(),
            cancel: cancel.clone(),
        });

        tokio::spawn(run_session(self.inner.clone(), generation, top_level, cancel));

        tracing::info!(
            "Browsing {} in {} (session {})",
            config.services_type,
            config.browse_domain,
            generation
        );
        self.inner
            .notify(PresentationEvent::StateChanged(DiscoveryState::Browsing));
        Ok(())
    }

    /// Browsing -> Idle. Cancels every browse and clears all counts.
    /// No-op when idle; does not wait for the network side to wind down.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        let Some(session) = state.session.take() else {
            return;
        };

        session.top_level.cancel();
        session.cancel.cancel();
        let closed = state.registry.shutdown_all();
        state.store.clear();
        let previous = std::mem::take(&mut state.published);

        tracing::info!(
            "Stopped session {}, closed {} instance browses",
            session.generation,
            closed
        );

        self.inner
            .notify(PresentationEvent::StateChanged(DiscoveryState::Idle));
        if previous > 0 {
            self.inner.notify(PresentationEvent::Snapshot {
                records: Vec::new(),
                previous_item_count: previous,
            });
        }
    }

    pub async fn state(&self) -> DiscoveryState {
        if self.inner.state.lock().await.session.is_some() {
            DiscoveryState::Browsing
        } else {
            DiscoveryState::Idle
        }
    }

    /// Number of open instance browses
    pub async fn subscription_count(&self) -> usize {
        self.inner.state.lock().await.registry.len()
    }

    /// Number of registration types seen this session, live or not
    pub async fn record_count(&self) -> usize {
        self.inner.state.lock().await.store.len()
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> Vec<shared::types::AggregateRecord> {
        self.inner.state.lock().await.store.snapshot()
    }
}

impl<S: BrowseSource> Inner<S> {
    fn notify(&self, event: PresentationEvent) {
        if self.presenter.send(event).is_err() {
            tracing::debug!("Presenter is gone, dropping update");
        }
    }

    /// Returns the instance browse opened for a newly seen registration type
    async fn handle_top_level(
        &self,
        generation: u64,
        event: &ServiceEvent,
    ) -> Option<(Origin, Subscription)> {
        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            tracing::debug!("Dropping event from finished session {}", generation);
            return None;
        }

        let (key, domain) = match state.store.observe_top_level(event) {
            Ok(TopLevelAction::Subscribe { key, domain }) => (key, domain),
            Ok(TopLevelAction::Ignore) => return None,
            Err(e) => {
                tracing::warn!("Ignoring service type {}: {}", event.service_name, e);
                return None;
            }
        };

        let browse_type = key.browse_type();
        let mut opened = None;
        let result = state.registry.ensure_subscribed(&key, || {
            let sub = self.source.browse(&domain, &browse_type)?;
            let handle = sub.handle();
            opened = Some(sub);
            Ok(handle)
        });

        match result {
            Ok(true) => tracing::info!("Discovered new service type: {} in {}", browse_type, domain),
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Failed to browse {}: {}", browse_type, e);
                self.notify(PresentationEvent::Error(e));
            }
        }

        opened.map(|sub| (Origin::Instances { key, domain }, sub))
    }

    async fn handle_second_level(&self, generation: u64, event: &ServiceEvent) {
        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            tracing::debug!("Dropping event from finished session {}", generation);
            return;
        }

        match state.store.observe_second_level(event) {
            Ok(live_count) => {
                tracing::debug!(
                    "{} {} {}: {} live",
                    if event.is_lost { "Lost" } else { "Found" },
                    event.service_name,
                    event.registration_type,
                    live_count
                );
                let records = state.store.snapshot();
                let previous_item_count = std::mem::replace(&mut state.published, records.len());
                self.notify(PresentationEvent::Snapshot {
                    records,
                    previous_item_count,
                });
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }

    /// Browsed (registration type, domain) of a stream
    fn describe(&self, origin: &Origin) -> (String, String) {
        match origin {
            Origin::TopLevel => (
                self.config.services_type.clone(),
                self.config.browse_domain.clone(),
            ),
            Origin::Instances { key, domain } => (key.browse_type(), domain.clone()),
        }
    }

    async fn handle_failure(&self, generation: u64, error: DiscoveryError) {
        if !self.state.lock().await.is_current(generation) {
            return;
        }
        tracing::error!("Discovery error: {}", error);
        self.notify(PresentationEvent::Error(error));
    }
}

async fn run_session<S: BrowseSource>(
    inner: Arc<Inner<S>>,
    generation: u64,
    top_level: Subscription,
    cancel: CancellationToken,
) {
    let mut streams: FuturesUnordered<RecvFuture> = FuturesUnordered::new();
    streams.push(make_recv_future(Origin::TopLevel, top_level));

    loop {
        tokio::select! {
            Some((origin, sub, result)) = streams.next() => {
                match result {
                    Some(Ok(event)) => {
                        match &origin {
                            Origin::TopLevel => {
                                if let Some((opened_origin, opened)) = inner.handle_top_level(generation, &event).await {
                                    streams.push(make_recv_future(opened_origin, opened));
                                }
                            }
                            Origin::Instances { .. } => inner.handle_second_level(generation, &event).await,
                        }
                        streams.push(make_recv_future(origin, sub));
                    }
                    Some(Err(e)) => inner.handle_failure(generation, e).await,
                    None if sub.handle().is_cancelled() => {
                        tracing::debug!("Browse of {} closed", inner.describe(&origin).0);
                    }
                    None => {
                        let (registration_type, domain) = inner.describe(&origin);
                        let error = DiscoveryError::StreamFailed {
                            registration_type,
                            domain,
                            reason: "stream ended unexpectedly".to_string(),
                        };
                        inner.handle_failure(generation, error).await;
                    }
                }
            }

            _ = cancel.cancelled() => {
                tracing::debug!("Session {} shutting down", generation);
                break;
            }
        }
    }
}
