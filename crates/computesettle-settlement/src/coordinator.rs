//! # Settlement coordinator
//!
//! Drives each request (one interval of one subscription) through its
//! lifecycle by composing the escrow ledger, the fee policy, the commitment
//! registry and the delivery tracker.
//!
//! ```text
//! start ──► Started ──deliver──► PartiallyDelivered ──deliver──► Completed
//!              │                        │                 │
//!              │                        │                 └─(verifier)─► PendingVerification
//!              │                        │                                    │ verdicts
//!              │                        │                                    ▼
//!              │                        │                                 Completed
//!              └──────── cancel / timeout ───────────────────────────────► TimedOut
//! ```
//!
//! ## Delivery ordering
//!
//! Every check runs before the first mutation. On a verified delivery the
//! verifier hand-off is the first mutation; the bond lock, the disbursement
//! and the tracker update follow and cannot fail once the checks passed.

use std::fmt;

use computesettle_escrow::{EscrowLedger, Payment};
use computesettle_fees::{FeeEngine, StandardSplit, VerifiedSplit};
use computesettle_types::{
    AccountId, Amount, AssetId, Commitment, DeliveryKey, ExecutionProof, KeyValueStore,
    MemoryStore, NodeId, RequestId, Result, SettleError, SettlementAuthority, SettlementConfig,
    SettlementEvent, SubscriptionId, SubscriptionSource, VerificationRequest, Verifier,
    VerifierId, WalletDirectory, WalletId,
};
use serde::{Deserialize, Serialize};

use crate::{
    registry::CommitmentRegistry, subscriptions::InMemorySubscriptions, tracker::DeliveryTracker,
};

/// Position of a request in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Funds locked, no delivery yet.
    Started,
    /// Some but not all deliveries accepted.
    PartiallyDelivered,
    /// All deliveries accepted, at least one verifier verdict outstanding.
    PendingVerification,
    Completed,
    /// Cancelled by its owner or timed out after its interval lapsed.
    TimedOut,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::PartiallyDelivered => write!(f, "PARTIALLY_DELIVERED"),
            Self::PendingVerification => write!(f, "PENDING_VERIFICATION"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// One node's response to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub node: NodeId,
    /// Wallet the node is paid into. On verified deliveries it also holds
    /// the node's bond.
    pub node_wallet: WalletId,
    /// Interval the node claims to be delivering for.
    pub interval: u32,
    /// The full commitment, re-supplied for fingerprint validation.
    pub commitment: Commitment,
    /// Opaque output payload.
    pub output: Vec<u8>,
    /// Required when the commitment names a verifier.
    pub proof: Option<ExecutionProof>,
}

/// How a delivery was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payout {
    Standard(StandardSplit),
    /// Fees paid now; the node share and the bond wait for the verdict.
    Verified {
        verifier: VerifierId,
        split: VerifiedSplit,
        bond: Amount,
    },
}

impl Payout {
    /// Amount credited to the node right away.
    #[must_use]
    pub fn node_payout(&self) -> Amount {
        match self {
            Self::Standard(split) => split.node_payout,
            Self::Verified { .. } => 0,
        }
    }

    /// Amount credited to the protocol fee wallet.
    #[must_use]
    pub fn protocol_fee(&self) -> Amount {
        match self {
            Self::Standard(split) => split.protocol_fee,
            Self::Verified { split, .. } => split.protocol_total,
        }
    }

    /// Net amount credited to the verifier.
    #[must_use]
    pub fn verifier_fee(&self) -> Amount {
        match self {
            Self::Standard(_) => 0,
            Self::Verified { split, .. } => split.verifier_payout,
        }
    }

    #[must_use]
    pub fn bond(&self) -> Amount {
        match self {
            Self::Standard(_) => 0,
            Self::Verified { bond, .. } => *bond,
        }
    }
}

/// Result of an accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub request_id: RequestId,
    pub key: DeliveryKey,
    /// Deliveries accepted for the request so far, including this one.
    pub redundancy_count: u16,
    pub payout: Payout,
    /// This delivery reached the redundancy target.
    pub target_reached: bool,
}

/// Node share and bond held while a verifier decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingVerification {
    pub request_id: RequestId,
    pub verifier: VerifierId,
    pub payer_wallet: WalletId,
    /// Account the node share is escrowed for in the payer wallet.
    pub spender: AccountId,
    pub node_wallet: WalletId,
    pub asset: AssetId,
    pub node_share: Amount,
    /// Held in the node wallet for the node's own account.
    pub bond: Amount,
}

/// Bond of a node whose delivery was settled as valid, still inside its
/// lock period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldBond {
    pub verifier: VerifierId,
    pub node_wallet: WalletId,
    pub asset: AssetId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestRecord {
    subscription_id: SubscriptionId,
    interval: u32,
    spender: AccountId,
    /// Verifier verdicts still outstanding.
    outstanding: u16,
    timed_out: bool,
}

/// The settlement state machine.
pub struct SettlementCoordinator<Q = InMemorySubscriptions> {
    config: SettlementConfig,
    fees: FeeEngine,
    ledger: EscrowLedger,
    registry: CommitmentRegistry,
    tracker: DeliveryTracker,
    requests: MemoryStore<RequestId, RequestRecord>,
    pending: MemoryStore<DeliveryKey, PendingVerification>,
    bonds: MemoryStore<DeliveryKey, HeldBond>,
    subscriptions: Q,
    events: Vec<SettlementEvent>,
}

impl<Q: SubscriptionSource> SettlementCoordinator<Q> {
    /// # Errors
    /// Returns `Configuration` if the config is invalid or its protocol fee
    /// wallet does not exist in `ledger`.
    pub fn new(config: SettlementConfig, ledger: EscrowLedger, subscriptions: Q) -> Result<Self> {
        config.validate()?;
        let fees = FeeEngine::new(config.protocol_fee_bps)?;
        if !ledger.is_valid_wallet(config.protocol_fee_wallet) {
            return Err(SettleError::Configuration(format!(
                "protocol fee wallet {} is not open in the ledger",
                config.protocol_fee_wallet
            )));
        }

        tracing::info!(
            authority = %config.authority,
            protocol_fee_bps = config.protocol_fee_bps,
            protocol_fee_wallet = %config.protocol_fee_wallet,
            "Settlement coordinator created"
        );

        Ok(Self {
            config,
            fees,
            ledger,
            registry: CommitmentRegistry::new(),
            tracker: DeliveryTracker::new(),
            requests: MemoryStore::new(),
            pending: MemoryStore::new(),
            bonds: MemoryStore::new(),
            subscriptions,
            events: Vec::new(),
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open the request for the subscription's current interval.
    ///
    /// Locks `payment_amount × redundancy` from the payer wallet against
    /// the owner's allowance. Calling again while the request is open
    /// returns the same commitment without locking twice.
    ///
    /// # Errors
    /// - `SubscriptionNotFound` / `SubscriptionNotActive` from the source
    /// - `IntervalCompleted` if the request already completed or timed out
    /// - `RedundancyExhausted` if the subscription asks for zero deliveries
    /// - `AmountOverflow`, `InsufficientFunds`, `InsufficientAllowance`
    pub fn start(&mut self, subscription_id: SubscriptionId) -> Result<Commitment> {
        let subscription = self.subscriptions.subscription(subscription_id)?;
        let interval = self.subscriptions.current_interval(subscription_id)?;
        let request_id = RequestId::derive(subscription_id, interval);

        if self.registry.is_open(&request_id) {
            let replay = self
                .registry
                .start_request(&subscription, interval, self.config.authority)?;
            tracing::debug!(request = %request_id, "Start replayed for open request");
            return Ok(replay.commitment);
        }
        if self.requests.contains(&request_id) {
            return Err(SettleError::IntervalCompleted(request_id));
        }
        if subscription.redundancy == 0 {
            return Err(SettleError::RedundancyExhausted(request_id));
        }

        let commitment = Commitment::for_interval(&subscription, interval, self.config.authority);
        let total = commitment.total_amount()?;
        if total > 0 {
            self.ledger.lock_for_request(
                commitment.payer_wallet,
                subscription.owner,
                commitment.payment_asset,
                total,
                request_id,
                commitment.redundancy,
            )?;
        }

        let started = self
            .registry
            .start_request(&subscription, interval, self.config.authority)?;
        self.tracker.open(request_id, commitment.redundancy);
        self.requests.insert(
            request_id,
            RequestRecord {
                subscription_id,
                interval,
                spender: subscription.owner,
                outstanding: 0,
                timed_out: false,
            },
        );
        self.events.push(SettlementEvent::RequestStarted {
            request_id,
            subscription_id,
            interval,
            locked: total,
        });

        tracing::info!(
            request = %request_id,
            subscription = %subscription_id,
            interval,
            locked = total,
            fingerprint = %started.commitment.fingerprint(),
            "Request started"
        );
        Ok(started.commitment)
    }

    /// Accept one node's delivery and pay it out.
    ///
    /// With no verifier on the commitment the node is paid in full minus
    /// the protocol fee. With a verifier, only the protocol and verifier
    /// fees are paid now; the node share stays escrowed in the payer wallet
    /// and the node's bond (one payment amount) is locked in the node
    /// wallet until [`SettlementAuthority::finalize_verification`].
    ///
    /// # Errors
    /// - `NodeRespondedAlready` / `IntervalCompleted` for late or repeated
    ///   deliveries
    /// - `InvalidCommitment` if the commitment fails the fingerprint check
    /// - `IntervalMismatch` if the delivery is not for the current interval
    /// - `InvalidWallet` for an unknown node wallet
    /// - `VerifierMismatch`, `MissingProof`, `UnsupportedVerifierAsset`,
    ///   `InsufficientForVerifierFee` on the verified path
    /// - ledger errors if the bond cannot be locked
    /// - any error the verifier returns from the hand-off
    pub fn deliver(
        &mut self,
        delivery: Delivery,
        verifier: Option<&mut dyn Verifier>,
    ) -> Result<DeliveryOutcome> {
        let Delivery {
            node,
            node_wallet,
            interval,
            commitment,
            output,
            proof,
        } = delivery;
        let request_id = commitment.request_id;
        let key = DeliveryKey::new(commitment.subscription_id, commitment.interval, node);

        // A completed request has no fingerprint left to check against.
        if self.tracker.is_complete(&request_id) {
            self.tracker.check(&request_id, &key)?;
        }
        self.registry.validate(&commitment)?;
        if interval != commitment.interval {
            return Err(SettleError::IntervalMismatch {
                delivered: interval,
                current: commitment.interval,
            });
        }
        let current = self
            .subscriptions
            .current_interval(commitment.subscription_id)?;
        if interval != current {
            return Err(SettleError::IntervalMismatch {
                delivered: interval,
                current,
            });
        }
        self.tracker.check(&request_id, &key)?;
        if !self.ledger.is_valid_wallet(node_wallet) {
            return Err(SettleError::InvalidWallet(node_wallet));
        }
        let spender = self
            .requests
            .get(&request_id)
            .map(|record| record.spender)
            .ok_or(SettleError::InvalidCommitment(request_id))?;

        let amount = commitment.payment_amount;
        let asset = commitment.payment_asset;
        let protocol_wallet = self.config.protocol_fee_wallet;
        let (payout, payments) = match (commitment.verifier, verifier.as_deref()) {
            (None, None) => {
                let split = self.fees.standard_split(amount);
                let payments = vec![
                    Payment::to_wallet(protocol_wallet, asset, split.protocol_fee),
                    Payment::to_wallet(node_wallet, asset, split.node_payout),
                ];
                (Payout::Standard(split), payments)
            }
            (Some(expected), Some(plugin)) if plugin.id() == expected => {
                if proof.is_none() {
                    return Err(SettleError::MissingProof);
                }
                if !plugin.is_supported_asset(asset) {
                    return Err(SettleError::UnsupportedVerifierAsset {
                        verifier: expected,
                        asset,
                    });
                }
                let split = self.fees.verified_split(amount, plugin.fee(asset))?;
                let payments = vec![
                    Payment::to_wallet(protocol_wallet, asset, split.protocol_total),
                    Payment::to_wallet(plugin.payout_wallet(), asset, split.verifier_payout),
                    Payment::to_escrow(spender, asset, split.node_share),
                ];
                let payout = Payout::Verified {
                    verifier: expected,
                    split,
                    bond: amount,
                };
                (payout, payments)
            }
            (expected, actual) => {
                return Err(SettleError::VerifierMismatch {
                    expected,
                    actual: actual.map(|plugin| plugin.id()),
                });
            }
        };

        if amount > 0 {
            self.ledger.check_disbursement(request_id, &payments)?;
        }
        let bond = payout.bond();
        if bond > 0 {
            self.ledger
                .check_lock_escrow(node_wallet, node.account(), asset, bond)?;
        }

        if let (Some(plugin), Some(proof)) = (verifier, proof) {
            plugin.request_verification(VerificationRequest {
                requested_by: self.config.authority,
                key,
                proof,
            })?;
        }
        if bond > 0 {
            self.ledger
                .lock_escrow(node_wallet, node.account(), asset, bond)?;
        }
        if amount > 0 {
            let committed = self.ledger.commit_disbursement(request_id, &payments)?;
            let receipt = self.ledger.apply_transfer(committed);
            tracing::debug!(
                request = %request_id,
                disbursed = receipt.total,
                refunded = receipt.refunded,
                lock_closed = receipt.completed,
                "Delivery disbursed"
            );
        }
        let redundancy_count = self.tracker.record(request_id, key)?;

        self.events.push(SettlementEvent::Delivered {
            request_id,
            node,
            redundancy_count,
            node_payout: payout.node_payout(),
            protocol_fee: payout.protocol_fee(),
            verifier_fee: payout.verifier_fee(),
        });
        if let Payout::Verified {
            verifier,
            split,
            bond,
        } = payout
        {
            self.pending.insert(
                key,
                PendingVerification {
                    request_id,
                    verifier,
                    payer_wallet: commitment.payer_wallet,
                    spender,
                    node_wallet,
                    asset,
                    node_share: split.node_share,
                    bond,
                },
            );
            if let Some(record) = self.requests.get_mut(&request_id) {
                record.outstanding += 1;
            }
            self.events.push(SettlementEvent::VerificationRequested {
                key,
                verifier,
                escrowed: split.node_share,
            });
        }

        tracing::info!(
            request = %request_id,
            %node,
            redundancy_count,
            redundancy = commitment.redundancy,
            output_len = output.len(),
            verified = commitment.is_verified(),
            "Delivery accepted"
        );

        let target_reached = redundancy_count >= commitment.redundancy;
        if target_reached {
            self.registry.remove(&request_id);
            self.complete_if_settled(request_id);
        }

        Ok(DeliveryOutcome {
            request_id,
            key,
            redundancy_count,
            payout,
            target_reached,
        })
    }

    /// Cancel an open request. Only the account that funded it may cancel.
    /// Returns the amount refunded to its allowance.
    ///
    /// # Errors
    /// - `InvalidCommitment` for an unknown request
    /// - `Unauthorized` if `caller` did not fund the request
    /// - `IntervalCompleted` if the request already completed
    pub fn cancel(&mut self, caller: AccountId, request_id: RequestId) -> Result<Amount> {
        let record = self
            .requests
            .get(&request_id)
            .ok_or(SettleError::InvalidCommitment(request_id))?;
        if caller != record.spender {
            return Err(SettleError::Unauthorized {
                reason: format!("{caller} did not fund request {request_id}"),
            });
        }
        self.close(request_id)
    }

    /// Time out an open request whose interval has lapsed. Anyone may call.
    /// Returns the amount refunded.
    ///
    /// # Errors
    /// - `InvalidCommitment` for an unknown request
    /// - `CommitmentNotTimeoutable` while the request's interval is current
    /// - `IntervalCompleted` if the request already completed
    pub fn timeout(&mut self, request_id: RequestId) -> Result<Amount> {
        let (subscription_id, interval) = self
            .requests
            .get(&request_id)
            .map(|record| (record.subscription_id, record.interval))
            .ok_or(SettleError::InvalidCommitment(request_id))?;
        let current = self.subscriptions.current_interval(subscription_id)?;
        if current <= interval {
            return Err(SettleError::CommitmentNotTimeoutable(request_id));
        }
        self.close(request_id)
    }

    fn close(&mut self, request_id: RequestId) -> Result<Amount> {
        if !self.registry.is_open(&request_id) {
            return Err(if self.tracker.is_complete(&request_id) {
                SettleError::IntervalCompleted(request_id)
            } else {
                SettleError::InvalidCommitment(request_id)
            });
        }

        let refunded = if self.ledger.lock(&request_id).is_some() {
            self.ledger.release_for_request(request_id)?
        } else {
            0
        };
        self.registry.remove(&request_id);
        if let Some(record) = self.requests.get_mut(&request_id) {
            record.timed_out = true;
        }
        self.events.push(SettlementEvent::RequestTimedOut {
            request_id,
            refunded,
        });

        tracing::info!(request = %request_id, refunded, "Request timed out");
        Ok(refunded)
    }

    fn complete_if_settled(&mut self, request_id: RequestId) {
        let settled = self
            .requests
            .get(&request_id)
            .is_some_and(|record| record.outstanding == 0 && !record.timed_out);
        if settled && self.tracker.is_complete(&request_id) {
            self.events
                .push(SettlementEvent::RequestCompleted { request_id });
            tracing::info!(request = %request_id, "Request completed");
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[must_use]
    pub fn request_state(&self, request_id: &RequestId) -> Option<RequestState> {
        let record = self.requests.get(request_id)?;
        if record.timed_out {
            return Some(RequestState::TimedOut);
        }
        let progress = self.tracker.record_for(request_id)?;
        Some(if progress.delivered == 0 {
            RequestState::Started
        } else if !progress.is_complete() {
            RequestState::PartiallyDelivered
        } else if record.outstanding > 0 {
            RequestState::PendingVerification
        } else {
            RequestState::Completed
        })
    }

    #[must_use]
    pub fn pending_verification(&self, key: &DeliveryKey) -> Option<&PendingVerification> {
        self.pending.get(key)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn held_bond(&self, key: &DeliveryKey) -> Option<&HeldBond> {
        self.bonds.get(key)
    }

    #[must_use]
    pub fn held_bond_count(&self) -> usize {
        self.bonds.len()
    }

    #[must_use]
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    #[must_use]
    pub fn fees(&self) -> &FeeEngine {
        &self.fees
    }

    #[must_use]
    pub fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    /// Wallet operations (deposits, approvals, withdrawals) go through here.
    pub fn ledger_mut(&mut self) -> &mut EscrowLedger {
        &mut self.ledger
    }

    #[must_use]
    pub fn registry(&self) -> &CommitmentRegistry {
        &self.registry
    }

    #[must_use]
    pub fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    #[must_use]
    pub fn subscriptions(&self) -> &Q {
        &self.subscriptions
    }

    pub fn subscriptions_mut(&mut self) -> &mut Q {
        &mut self.subscriptions
    }

    /// Drain the event log.
    pub fn take_events(&mut self) -> Vec<SettlementEvent> {
        std::mem::take(&mut self.events)
    }

    /// Check ledger conservation.
    ///
    /// # Errors
    /// Returns `SupplyInvariantViolation` describing the first violation.
    pub fn verify_invariants(&self) -> Result<()> {
        self.ledger.verify_invariants()
    }
}

impl<Q: SubscriptionSource> SettlementAuthority for SettlementCoordinator<Q> {
    /// Settle the escrowed node share and bond of a verified delivery.
    ///
    /// Valid: the node share goes to the node wallet and the bond stays
    /// escrowed until the verifier calls [`Self::release_bond`]. Invalid:
    /// the node share returns to the payer's allowance and the bond is paid
    /// to the payer wallet.
    fn finalize_verification(
        &mut self,
        verifier: VerifierId,
        key: DeliveryKey,
        valid: bool,
    ) -> Result<()> {
        let pending = self
            .pending
            .get(&key)
            .cloned()
            .ok_or_else(|| SettleError::VerificationNotPending(key.to_string()))?;
        if pending.verifier != verifier {
            return Err(SettleError::VerifierMismatch {
                expected: Some(pending.verifier),
                actual: Some(verifier),
            });
        }

        let node_account = key.node.account();
        let slashed = if valid {
            if pending.node_share > 0 {
                self.ledger.transfer_escrowed(
                    pending.payer_wallet,
                    pending.spender,
                    pending.asset,
                    pending.node_wallet,
                    pending.node_share,
                )?;
            }
            self.bonds.insert(
                key,
                HeldBond {
                    verifier,
                    node_wallet: pending.node_wallet,
                    asset: pending.asset,
                    amount: pending.bond,
                },
            );
            0
        } else {
            if pending.node_share > 0 {
                self.ledger.release_escrow(
                    pending.payer_wallet,
                    pending.spender,
                    pending.asset,
                    pending.node_share,
                )?;
            }
            if pending.bond > 0 {
                self.ledger.transfer_escrowed(
                    pending.node_wallet,
                    node_account,
                    pending.asset,
                    pending.payer_wallet,
                    pending.bond,
                )?;
            }
            pending.bond
        };

        self.pending.remove(&key);
        if let Some(record) = self.requests.get_mut(&pending.request_id) {
            record.outstanding = record.outstanding.saturating_sub(1);
        }
        self.events.push(SettlementEvent::VerificationSettled {
            key,
            valid,
            amount: pending.node_share,
            slashed,
        });

        if valid {
            tracing::info!(%key, %verifier, paid = pending.node_share, "Verification settled");
        } else {
            tracing::warn!(
                %key,
                %verifier,
                refunded = pending.node_share,
                slashed,
                "Verification failed, bond slashed"
            );
        }
        self.complete_if_settled(pending.request_id);
        Ok(())
    }

    fn release_bond(&mut self, verifier: VerifierId, key: DeliveryKey) -> Result<()> {
        let bond = self
            .bonds
            .get(&key)
            .cloned()
            .ok_or_else(|| SettleError::BondNotHeld(key.to_string()))?;
        if bond.verifier != verifier {
            return Err(SettleError::VerifierMismatch {
                expected: Some(bond.verifier),
                actual: Some(verifier),
            });
        }
        if bond.amount > 0 {
            self.ledger.release_escrow(
                bond.node_wallet,
                key.node.account(),
                bond.asset,
                bond.amount,
            )?;
        }

        self.bonds.remove(&key);
        self.events.push(SettlementEvent::BondReleased {
            key,
            amount: bond.amount,
        });
        tracing::info!(%key, %verifier, amount = bond.amount, "Node bond released");
        Ok(())
    }
}
