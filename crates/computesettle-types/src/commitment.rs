//! # Commitment: the tamper-evident request binding
//!
//! A [`Commitment`] is the full parameter set of one request (one interval of
//! one subscription). When a request starts, only its [`Fingerprint`] is
//! persisted. Every later delivery must re-supply the full commitment, and
//! the engine recomputes the fingerprint and compares.
//!
//! ## Security Properties
//!
//! - **Field-complete**: every field feeds the hash, so changing any one of
//!   them changes the fingerprint
//! - **Domain-separated**: the hash is tagged, so a fingerprint can never
//!   collide with another hash the engine computes
//! - **Fixed encoding**: integers are little-endian and optional fields carry
//!   a presence byte, so the encoding is unambiguous

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    AccountId, Amount, AssetId, ContainerId, RequestId, SettleError, Subscription,
    SubscriptionId, VerifierId, WalletId,
};

/// How a node hands over its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Output is delivered straight to the consumer.
    Eager,
    /// Output is parked in a per-node mailbox for the consumer to collect.
    Lazy,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager => write!(f, "EAGER"),
            Self::Lazy => write!(f, "LAZY"),
        }
    }
}

/// SHA-256 fingerprint of a [`Commitment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The immutable terms of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    /// `RequestId::derive(subscription_id, interval)`.
    pub request_id: RequestId,
    pub subscription_id: SubscriptionId,
    /// Workload the nodes must run.
    pub container_id: ContainerId,
    /// Interval this request belongs to.
    pub interval: u32,
    /// Number of independent deliveries required.
    pub redundancy: u16,
    pub delivery_mode: DeliveryMode,
    /// Wallet the payment is drawn from.
    pub payer_wallet: WalletId,
    /// Payment per delivery.
    pub payment_amount: Amount,
    pub payment_asset: AssetId,
    /// Optional verifier that must check each delivery.
    pub verifier: Option<VerifierId>,
    /// The coordinator that issued this commitment.
    pub settlement_authority: AccountId,
}

impl Commitment {
    /// Build the commitment for `interval` of a subscription.
    #[must_use]
    pub fn for_interval(
        subscription: &Subscription,
        interval: u32,
        settlement_authority: AccountId,
    ) -> Self {
        Self {
            request_id: RequestId::derive(subscription.id, interval),
            subscription_id: subscription.id,
            container_id: subscription.container_id,
            interval,
            redundancy: subscription.redundancy,
            delivery_mode: subscription.delivery_mode,
            payer_wallet: subscription.payer_wallet,
            payment_amount: subscription.payment_amount,
            payment_asset: subscription.payment_asset,
            verifier: subscription.verifier,
            settlement_authority,
        }
    }

    /// Canonical bytes hashed into the fingerprint.
    ///
    /// Format: `"computesettle:commitment:v1:" || request_id || subscription_id || container_id
    /// || interval || redundancy || mode || payer_wallet || amount || asset || verifier? || authority`
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(256);
        payload.extend_from_slice(b"computesettle:commitment:v1:");
        payload.extend_from_slice(self.request_id.as_bytes());
        payload.extend_from_slice(&self.subscription_id.0.to_le_bytes());
        payload.extend_from_slice(&self.container_id.0);
        payload.extend_from_slice(&self.interval.to_le_bytes());
        payload.extend_from_slice(&self.redundancy.to_le_bytes());
        payload.push(match self.delivery_mode {
            DeliveryMode::Eager => 0u8,
            DeliveryMode::Lazy => 1u8,
        });
        payload.extend_from_slice(self.payer_wallet.0.as_bytes());
        payload.extend_from_slice(&self.payment_amount.to_le_bytes());
        payload.extend_from_slice(&self.payment_asset.0.to_le_bytes());
        match &self.verifier {
            Some(verifier) => {
                payload.push(1u8);
                payload.extend_from_slice(verifier.0.as_bytes());
            }
            None => payload.push(0u8),
        }
        payload.extend_from_slice(self.settlement_authority.as_bytes());
        payload
    }

    /// Compute the fingerprint over all fields.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(Sha256::digest(self.canonical_bytes()).into())
    }

    /// Total to lock for the request: `payment_amount × redundancy`.
    ///
    /// # Errors
    /// Returns [`SettleError::AmountOverflow`] if the product overflows.
    pub fn total_amount(&self) -> crate::Result<Amount> {
        self.payment_amount
            .checked_mul(Amount::from(self.redundancy))
            .ok_or(SettleError::AmountOverflow)
    }

    /// Whether deliveries must go through a verifier.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verifier.is_some()
    }
}

/// Dummy commitment for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Commitment {
    pub fn dummy(subscription_id: SubscriptionId, interval: u32) -> Self {
        let subscription = Subscription::dummy(subscription_id);
        Self::for_interval(&subscription, interval, AccountId([0xAA; 32]))
    }
}
