use std::collections::HashMap;
use crate::discovery::keys::SubscriptionKey;
use crate::discovery::source::SubscriptionHandle;
use crate::error::Result;

/// Open instance browses, at most one per [`SubscriptionKey`].
///
/// Callers hold the coordinator lock across `ensure_subscribed`, so the
/// check and the open happen as one step.
#[derive(Default)]
pub struct SubscriptionRegistry {
    browsers: HashMap<SubscriptionKey, SubscriptionHandle>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a browse for `key` unless one is already stored.
    /// Returns true when a new browse was opened. A failed open stores
    /// nothing, so the next announcement tries again.
    pub fn ensure_subscribed<F>(&mut self, key: &SubscriptionKey, open: F) -> Result<bool>
    where
        F: FnOnce() -> Result<SubscriptionHandle>,
    {
        if self.browsers.contains_key(key) {
            return Ok(false);
        }

        let handle = open()?;
        self.browsers.insert(key.clone(), handle);
        Ok(true)
    }

    /// Cancel every browse and forget them. Returns how many were open.
    pub fn shutdown_all(&mut self) -> usize {
        let count = self.browsers.len();
        for (_, handle) in self.browsers.drain() {
            handle.cancel();
        }
        count
    }

    #[cfg(test)]
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.browsers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.browsers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.browsers.is_empty()
    }
}
