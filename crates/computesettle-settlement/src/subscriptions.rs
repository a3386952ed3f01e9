//! In-memory [`SubscriptionSource`] for embedding and tests.

use std::collections::HashMap;

use computesettle_types::{Result, SettleError, Subscription, SubscriptionId, SubscriptionSource};

#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptions {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    /// Current interval per subscription. Absent means not yet active.
    intervals: HashMap<SubscriptionId, u32>,
}

impl InMemorySubscriptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a subscription. Its schedule is left untouched.
    pub fn insert(&mut self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id, subscription);
    }

    /// Register a subscription that is already active at `interval`.
    pub fn insert_active(&mut self, subscription: Subscription, interval: u32) {
        self.intervals.insert(subscription.id, interval);
        self.insert(subscription);
    }

    pub fn set_current_interval(&mut self, id: SubscriptionId, interval: u32) {
        self.intervals.insert(id, interval);
    }

    /// Move a subscription to its next interval. One-shot subscriptions
    /// never advance.
    ///
    /// # Errors
    /// `SubscriptionNotFound` or `SubscriptionNotActive`.
    pub fn advance(&mut self, id: SubscriptionId) -> Result<u32> {
        let subscription = self.subscription(id)?;
        let current = self.current_interval(id)?;
        if subscription.is_one_shot() {
            return Ok(current);
        }
        let next = current.saturating_add(1);
        self.intervals.insert(id, next);
        Ok(next)
    }

    pub fn remove(&mut self, id: SubscriptionId) -> Option<Subscription> {
        self.intervals.remove(&id);
        self.subscriptions.remove(&id)
    }
}

impl SubscriptionSource for InMemorySubscriptions {
    fn subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        self.subscriptions
            .get(&id)
            .cloned()
            .ok_or(SettleError::SubscriptionNotFound(id))
    }

    fn current_interval(&self, id: SubscriptionId) -> Result<u32> {
        if !self.subscriptions.contains_key(&id) {
            return Err(SettleError::SubscriptionNotFound(id));
        }
        self.intervals
            .get(&id)
            .copied()
            .ok_or(SettleError::SubscriptionNotActive(id))
    }
}
