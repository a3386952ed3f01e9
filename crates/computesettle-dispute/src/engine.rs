//! The optimistic verifier.
//!
//! The settlement authority submits a delivery with the node's signed
//! execution proof. Anyone may then challenge it with a trace leaf and its
//! inclusion proof until the challenge window closes; a successful
//! challenge slashes the submission. An unchallenged submission is
//! finalized once the window has closed. Either verdict is reported back to
//! the settlement authority on a best-effort basis. A finalized node's bond
//! is handed back only after the longer bond-lock period.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use computesettle_types::{
    AccountId, Amount, AssetId, Clock, DeliveryKey, DisputeConfig, ExecutionProof, KeyValueStore,
    MemoryStore, Result, SettleError, SettlementAuthority, SystemClock, VerificationRequest,
    Verifier, VerifierId, WalletId,
};

use crate::{
    merkle::{InclusionProof, LeafKind, TraceLeaf},
    submission::{DisputeEvent, Notification, Submission},
};

/// Records submissions, runs challenge windows and reports verdicts.
pub struct DisputeEngine<C = SystemClock, S = MemoryStore<DeliveryKey, Submission>> {
    id: VerifierId,
    /// The only account allowed to submit.
    authority: AccountId,
    payout_wallet: WalletId,
    fees: HashMap<AssetId, Amount>,
    challenge_window: TimeDelta,
    bond_lock: TimeDelta,
    clock: C,
    submissions: S,
    events: Vec<DisputeEvent>,
}

impl<C: Clock> DisputeEngine<C> {
    /// Create an engine with in-memory submission storage.
    ///
    /// # Errors
    /// Returns `Configuration` if `config` is invalid.
    pub fn new(
        authority: AccountId,
        payout_wallet: WalletId,
        config: &DisputeConfig,
        clock: C,
    ) -> Result<Self> {
        Self::with_store(authority, payout_wallet, config, clock, MemoryStore::new())
    }
}

impl<C: Clock, S: KeyValueStore<DeliveryKey, Submission>> DisputeEngine<C, S> {
    /// # Errors
    /// Returns `Configuration` if `config` is invalid.
    pub fn with_store(
        authority: AccountId,
        payout_wallet: WalletId,
        config: &DisputeConfig,
        clock: C,
        submissions: S,
    ) -> Result<Self> {
        config.validate()?;
        let to_delta = |d: std::time::Duration| {
            TimeDelta::from_std(d).map_err(|e| SettleError::Configuration(e.to_string()))
        };
        Ok(Self {
            id: VerifierId::new(),
            authority,
            payout_wallet,
            fees: HashMap::new(),
            challenge_window: to_delta(config.challenge_window())?,
            bond_lock: to_delta(config.bond_lock())?,
            clock,
            submissions,
            events: Vec::new(),
        })
    }

    /// Accept `asset` and charge `fee` per verification in it.
    #[must_use]
    pub fn with_fee(mut self, asset: AssetId, fee: Amount) -> Self {
        self.fees.insert(asset, fee);
        self
    }

    /// Record a provisional submission. Settlement authority only.
    ///
    /// # Errors
    /// - `Unauthorized` if `caller` is not the settlement authority
    /// - `DuplicateSubmission` if `key` was already submitted
    /// - `InvalidProofSignature` if the node did not sign `proof`
    pub fn submit(
        &mut self,
        caller: AccountId,
        key: DeliveryKey,
        proof: &ExecutionProof,
    ) -> Result<()> {
        if caller != self.authority {
            return Err(SettleError::Unauthorized {
                reason: format!("{caller} is not the settlement authority"),
            });
        }
        if self.submissions.contains(&key) {
            return Err(SettleError::DuplicateSubmission(key.to_string()));
        }
        proof.verify(&key.node, key.subscription_id, key.interval)?;

        let now = self.clock.now();
        let challenge_window_end = deadline(now, self.challenge_window)?;
        let bond_lock_end = deadline(now, self.bond_lock)?;

        self.submissions.insert(
            key,
            Submission {
                key,
                execution_root: proof.execution_root,
                result_digest: proof.result_digest,
                submitted_at: now,
                challenge_window_end,
                bond_lock_end,
                finalized: false,
                slashed: false,
                bond_released: false,
            },
        );
        self.events.push(DisputeEvent::Submitted {
            key,
            challenge_window_end,
            bond_lock_end,
        });

        tracing::info!(
            %key,
            execution_root = hex::encode(proof.execution_root),
            result_digest = hex::encode(proof.result_digest),
            %challenge_window_end,
            "Submission recorded"
        );
        Ok(())
    }

    /// Challenge a submission with one leaf of its execution trace.
    ///
    /// The leaf must be an output leaf proven to be under the submission's
    /// execution root, and its data must disagree with the claimed result
    /// digest. On success the submission is slashed and the settlement
    /// authority is told the delivery was invalid.
    ///
    /// # Errors
    /// - `SubmissionNotFound`, `AlreadyFinalized`, `AlreadySlashed`
    /// - `ChallengeWindowClosed` at or after `challenge_window_end`
    /// - `InvalidInclusionProof` if the leaf is not under the root
    /// - `ChallengeRejected` if the leaf does not contradict the result
    pub fn challenge(
        &mut self,
        challenger: AccountId,
        key: DeliveryKey,
        leaf: &TraceLeaf,
        proof: &InclusionProof,
        authority: &mut dyn SettlementAuthority,
    ) -> Result<Notification> {
        let now = self.clock.now();
        let submission = self.open_submission(&key)?;
        if !submission.is_challengeable(now) {
            return Err(SettleError::ChallengeWindowClosed(key.to_string()));
        }
        if !proof.verify(leaf.hash(), &submission.execution_root) {
            return Err(SettleError::InvalidInclusionProof);
        }
        if leaf.kind != LeafKind::Output {
            tracing::warn!(%key, %challenger, kind = ?leaf.kind, "Challenge rejected: not an output leaf");
            return Err(SettleError::ChallengeRejected {
                reason: format!("{:?} leaf cannot contradict a result", leaf.kind),
            });
        }
        if leaf.data == submission.result_digest {
            tracing::warn!(%key, %challenger, "Challenge rejected: output matches claimed result");
            return Err(SettleError::ChallengeRejected {
                reason: "output leaf matches the claimed result".to_string(),
            });
        }

        if let Some(submission) = self.submissions.get_mut(&key) {
            submission.slashed = true;
        }
        self.events.push(DisputeEvent::Slashed { key, challenger });
        tracing::info!(%key, %challenger, "Submission slashed");

        Ok(self.notify(authority, key, false))
    }

    /// Finalize an unchallenged submission once its window has closed.
    ///
    /// # Errors
    /// - `SubmissionNotFound`, `AlreadyFinalized`, `AlreadySlashed`
    /// - `ChallengeWindowOpen` at or before `challenge_window_end`
    pub fn finalize(
        &mut self,
        key: DeliveryKey,
        authority: &mut dyn SettlementAuthority,
    ) -> Result<Notification> {
        let now = self.clock.now();
        let submission = self.open_submission(&key)?;
        if now <= submission.challenge_window_end {
            return Err(SettleError::ChallengeWindowOpen(key.to_string()));
        }

        if let Some(submission) = self.submissions.get_mut(&key) {
            submission.finalized = true;
        }
        self.events.push(DisputeEvent::Finalized { key });
        tracing::info!(%key, "Submission finalized");

        Ok(self.notify(authority, key, true))
    }

    /// Finalize every eligible key, silently skipping the rest.
    pub fn finalize_batch(
        &mut self,
        keys: &[DeliveryKey],
        authority: &mut dyn SettlementAuthority,
    ) -> Vec<(DeliveryKey, Notification)> {
        let now = self.clock.now();
        let mut finalized = Vec::new();
        for key in keys {
            let eligible = self
                .submissions
                .get(key)
                .is_some_and(|s| s.is_finalizable(now));
            if !eligible {
                tracing::debug!(%key, "Skipping submission not eligible for finalization");
                continue;
            }
            if let Ok(notification) = self.finalize(*key, authority) {
                finalized.push((*key, notification));
            }
        }
        finalized
    }

    /// Hand a finalized node's bond back once `bond_lock_end` is reached.
    ///
    /// Unlike verdicts, this is not best effort: if the settlement authority
    /// fails, the bond stays held and the call may be retried.
    ///
    /// # Errors
    /// - `SubmissionNotFound`, `AlreadySlashed`
    /// - `BondLocked` before finalization or before `bond_lock_end`
    /// - `BondNotHeld` if the bond was already released
    /// - any error returned by the settlement authority
    pub fn release_bond(
        &mut self,
        key: DeliveryKey,
        authority: &mut dyn SettlementAuthority,
    ) -> Result<()> {
        let now = self.clock.now();
        let submission = self
            .submissions
            .get(&key)
            .ok_or_else(|| SettleError::SubmissionNotFound(key.to_string()))?;
        if submission.slashed {
            return Err(SettleError::AlreadySlashed(key.to_string()));
        }
        if submission.bond_released {
            return Err(SettleError::BondNotHeld(key.to_string()));
        }
        if !submission.is_bond_releasable(now) {
            return Err(SettleError::BondLocked(key.to_string()));
        }

        authority.release_bond(self.id, key)?;

        if let Some(submission) = self.submissions.get_mut(&key) {
            submission.bond_released = true;
        }
        self.events.push(DisputeEvent::BondReleased { key });
        tracing::info!(%key, "Node bond released");
        Ok(())
    }

    /// Finalized keys whose bond lock has ended and which still hold a bond.
    #[must_use]
    pub fn releasable_bonds(&self) -> Vec<DeliveryKey> {
        let now = self.clock.now();
        let mut keys: Vec<DeliveryKey> = self
            .submissions
            .values()
            .filter(|s| s.is_bond_releasable(now))
            .map(|s| s.key)
            .collect();
        keys.sort();
        keys
    }

    /// Keys whose window has closed and which still await finalization.
    #[must_use]
    pub fn finalizable(&self) -> Vec<DeliveryKey> {
        let now = self.clock.now();
        let mut keys: Vec<DeliveryKey> = self
            .submissions
            .values()
            .filter(|s| s.is_finalizable(now))
            .map(|s| s.key)
            .collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn submission(&self, key: &DeliveryKey) -> Option<&Submission> {
        self.submissions.get(key)
    }

    /// Whether the node's bond for `key` is still inside its lock period.
    #[must_use]
    pub fn is_bond_locked(&self, key: &DeliveryKey) -> bool {
        self.submissions
            .get(key)
            .is_some_and(|s| {
                !s.slashed && !s.bond_released && self.clock.now() < s.bond_lock_end
            })
    }

    /// Drain the event log.
    pub fn take_events(&mut self) -> Vec<DisputeEvent> {
        std::mem::take(&mut self.events)
    }

    fn open_submission(&self, key: &DeliveryKey) -> Result<&Submission> {
        let submission = self
            .submissions
            .get(key)
            .ok_or_else(|| SettleError::SubmissionNotFound(key.to_string()))?;
        if submission.finalized {
            return Err(SettleError::AlreadyFinalized(key.to_string()));
        }
        if submission.slashed {
            return Err(SettleError::AlreadySlashed(key.to_string()));
        }
        Ok(submission)
    }

    fn notify(
        &mut self,
        authority: &mut dyn SettlementAuthority,
        key: DeliveryKey,
        valid: bool,
    ) -> Notification {
        let notification =
            Notification::from_result(authority.finalize_verification(self.id, key, valid));
        if let Notification::Failed { reason } = &notification {
            tracing::warn!(%key, valid, %reason, "Settlement authority notification failed");
            self.events.push(DisputeEvent::NotificationFailed {
                key,
                reason: reason.clone(),
            });
        }
        notification
    }
}

impl<C: Clock, S: KeyValueStore<DeliveryKey, Submission>> Verifier for DisputeEngine<C, S> {
    fn id(&self) -> VerifierId {
        self.id
    }

    fn is_supported_asset(&self, asset: AssetId) -> bool {
        self.fees.contains_key(&asset)
    }

    fn fee(&self, asset: AssetId) -> Amount {
        self.fees.get(&asset).copied().unwrap_or(0)
    }

    fn payout_wallet(&self) -> WalletId {
        self.payout_wallet
    }

    fn request_verification(&mut self, request: VerificationRequest) -> Result<()> {
        self.submit(request.requested_by, request.key, &request.proof)
    }
}

fn deadline(now: DateTime<Utc>, span: TimeDelta) -> Result<DateTime<Utc>> {
    now.checked_add_signed(span)
        .ok_or_else(|| SettleError::Internal(format!("deadline overflows: {now} + {span}")))
}
