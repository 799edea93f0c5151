//! In-memory [`BrowseSource`] for driving the coordinator from tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use crate::discovery::source::{subscription, BrowseSource, Subscription, SubscriptionSink};
use crate::error::{DiscoveryError, Result};

#[derive(Clone)]
pub struct OpenedBrowse {
    pub domain: String,
    pub registration_type: String,
    pub sink: SubscriptionSink,
}

#[derive(Clone, Default)]
pub struct ScriptedSource {
    opened: Arc<Mutex<Vec<OpenedBrowse>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl ScriptedSource {
    /// Make future browses of `registration_type` fail to open
    pub fn fail_browse(&self, registration_type: &str) {
        self.failing.lock().unwrap().insert(registration_type.to_string());
    }

    /// Drop the producer side of every browse of `registration_type`
    pub fn close(&self, registration_type: &str) {
        self.opened
            .lock()
            .unwrap()
            .retain(|b| b.registration_type != registration_type);
    }

    pub fn opened(&self) -> Vec<OpenedBrowse> {
        self.opened.lock().unwrap().clone()
    }

    pub fn browse_count(&self, registration_type: &str) -> usize {
        self.opened()
            .iter()
            .filter(|b| b.registration_type == registration_type)
            .count()
    }

    /// Latest browse of `registration_type`, waiting up to two seconds
    pub async fn wait_for_browse(&self, registration_type: &str) -> OpenedBrowse {
        self.wait_for_browses(registration_type, 1).await
    }

    /// Wait until `count` browses of `registration_type` were opened and
    /// return the latest one
    pub async fn wait_for_browses(&self, registration_type: &str, count: usize) -> OpenedBrowse {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let matching: Vec<OpenedBrowse> = self
                .opened()
                .into_iter()
                .filter(|b| b.registration_type == registration_type)
                .collect();
            if matching.len() >= count {
                if let Some(browse) = matching.into_iter().last() {
                    return browse;
                }
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Expected {} browses of {}", count, registration_type);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}


impl BrowseSource for ScriptedSource {
    fn browse(&self, domain: &str, registration_type: &str) -> Result<Subscription> {
        if self.failing.lock().unwrap().contains(registration_type) {
            return Err(DiscoveryError::BrowseFailed {
                registration_type: registration_type.to_string(),
                domain: domain.to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        let (sink, sub) = subscription();
        self.opened.lock().unwrap().push(OpenedBrowse {
            domain: domain.to_string(),
            registration_type: registration_type.to_string(),
            sink,
        });
        Ok(sub)
    }
}
