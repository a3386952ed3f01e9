//! Delivery tracker: redundancy counters and per-node dedup.
//!
//! Unlike commitment fingerprints, tracker records outlive the request so
//! that late deliveries to a completed interval are rejected with a precise
//! error.

use std::collections::HashSet;

use computesettle_types::{
    DeliveryKey, KeyValueStore, MemoryStore, RequestId, Result, SettleError,
};

/// Per-request delivery progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryRecord {
    /// Deliveries required.
    pub target: u16,
    /// Deliveries accepted so far.
    pub delivered: u16,
}

impl DeliveryRecord {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.delivered >= self.target
    }
}

pub struct DeliveryTracker<S = MemoryStore<RequestId, DeliveryRecord>> {
    records: S,
    responded: HashSet<DeliveryKey>,
}

impl DeliveryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for DeliveryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KeyValueStore<RequestId, DeliveryRecord>> DeliveryTracker<S> {
    pub fn with_store(records: S) -> Self {
        Self {
            records,
            responded: HashSet::new(),
        }
    }

    /// Start tracking a request. Re-opening keeps existing progress.
    pub fn open(&mut self, request_id: RequestId, target: u16) {
        if !self.records.contains(&request_id) {
            self.records.insert(
                request_id,
                DeliveryRecord {
                    target,
                    delivered: 0,
                },
            );
        }
    }

    /// Whether `key`'s node may still deliver for `request_id`.
    ///
    /// # Errors
    /// - `NodeRespondedAlready` if the node already delivered this interval
    /// - `IntervalCompleted` if the request already has its full redundancy
    pub fn check(&self, request_id: &RequestId, key: &DeliveryKey) -> Result<()> {
        if self.responded.contains(key) {
            return Err(SettleError::NodeRespondedAlready {
                subscription_id: key.subscription_id,
                interval: key.interval,
            });
        }
        if self.is_complete(request_id) {
            return Err(SettleError::IntervalCompleted(*request_id));
        }
        Ok(())
    }

    /// Record an accepted delivery. Returns the new delivered count.
    ///
    /// # Errors
    /// Same as [`Self::check`], plus `InvalidCommitment` if the request is
    /// not tracked.
    pub fn record(&mut self, request_id: RequestId, key: DeliveryKey) -> Result<u16> {
        self.check(&request_id, &key)?;
        let record = self
            .records
            .get_mut(&request_id)
            .ok_or(SettleError::InvalidCommitment(request_id))?;
        record.delivered += 1;
        let delivered = record.delivered;
        self.responded.insert(key);
        Ok(delivered)
    }

    #[must_use]
    pub fn record_for(&self, request_id: &RequestId) -> Option<DeliveryRecord> {
        self.records.get(request_id).copied()
    }

    #[must_use]
    pub fn delivered(&self, request_id: &RequestId) -> u16 {
        self.records.get(request_id).map_or(0, |r| r.delivered)
    }

    #[must_use]
    pub fn is_complete(&self, request_id: &RequestId) -> bool {
        self.records
            .get(request_id)
            .is_some_and(DeliveryRecord::is_complete)
    }

    #[must_use]
    pub fn has_responded(&self, key: &DeliveryKey) -> bool {
        self.responded.contains(key)
    }
}
