//! Commitment registry: the tamper-detection gate.
//!
//! Only the fingerprint of each open request is stored. Every delivery
//! re-supplies the full [`Commitment`]; if it does not hash to the stored
//! fingerprint the delivery is rejected before anything else happens.

use computesettle_types::{
    AccountId, Commitment, Fingerprint, KeyValueStore, MemoryStore, RequestId, Result,
    SettleError, Subscription,
};

/// Result of [`CommitmentRegistry::start_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub commitment: Commitment,
    /// `false` if the request was already open and this call was a replay.
    pub fresh: bool,
}

/// Fingerprints of open requests, keyed by request id.
pub struct CommitmentRegistry<S = MemoryStore<RequestId, Fingerprint>> {
    fingerprints: S,
}

impl CommitmentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for CommitmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KeyValueStore<RequestId, Fingerprint>> CommitmentRegistry<S> {
    pub fn with_store(fingerprints: S) -> Self {
        Self { fingerprints }
    }

    /// Build the commitment for `interval` and store its fingerprint.
    ///
    /// Re-issuing for a request that is already open rebuilds the same
    /// commitment and returns it with `fresh == false`.
    ///
    /// # Errors
    /// Returns `InvalidCommitment` if the request is open under different
    /// terms.
    pub fn start_request(
        &mut self,
        subscription: &Subscription,
        interval: u32,
        authority: AccountId,
    ) -> Result<Started> {
        let commitment = Commitment::for_interval(subscription, interval, authority);
        if self.fingerprints.contains(&commitment.request_id) {
            self.validate(&commitment)?;
            return Ok(Started {
                commitment,
                fresh: false,
            });
        }
        self.fingerprints
            .insert(commitment.request_id, commitment.fingerprint());
        Ok(Started {
            commitment,
            fresh: true,
        })
    }

    /// Check `commitment` against the stored fingerprint.
    ///
    /// # Errors
    /// Returns `InvalidCommitment` if nothing is stored for the request or
    /// the fingerprints differ.
    pub fn validate(&self, commitment: &Commitment) -> Result<()> {
        match self.fingerprints.get(&commitment.request_id) {
            Some(stored) if *stored == commitment.fingerprint() => Ok(()),
            _ => Err(SettleError::InvalidCommitment(commitment.request_id)),
        }
    }

    #[must_use]
    pub fn is_open(&self, request_id: &RequestId) -> bool {
        self.fingerprints.contains(request_id)
    }

    /// Forget a request. Returns whether it was open.
    pub fn remove(&mut self, request_id: &RequestId) -> bool {
        self.fingerprints.remove(request_id).is_some()
    }

    /// Number of open requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}
