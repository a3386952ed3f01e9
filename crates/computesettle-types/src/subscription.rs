//! Subscription terms as read from the external subscription store.
//!
//! The engine never creates or edits subscriptions; it only reads the terms
//! it needs to build a [`Commitment`](crate::Commitment).

use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount, AssetId, ContainerId, DeliveryMode, SubscriptionId, VerifierId, WalletId};

/// A recurring or one-shot compute subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// The consumer that owns the subscription. Its allowance on the payer
    /// wallet funds each request.
    pub owner: AccountId,
    /// Wallet payments are drawn from.
    pub payer_wallet: WalletId,
    pub container_id: ContainerId,
    pub payment_asset: AssetId,
    /// Payment per delivery.
    pub payment_amount: Amount,
    /// Deliveries required per interval.
    pub redundancy: u16,
    /// Seconds between intervals. Zero means one-shot.
    pub interval_seconds: u32,
    pub verifier: Option<VerifierId>,
    pub delivery_mode: DeliveryMode,
}

impl Subscription {
    /// Whether this subscription runs only a single interval.
    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        self.interval_seconds == 0
    }
}

/// Dummy subscription for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Subscription {
    pub fn dummy(id: SubscriptionId) -> Self {
        Self {
            id,
            owner: AccountId([0x11; 32]),
            payer_wallet: WalletId::from_bytes([0x22; 16]),
            container_id: ContainerId::from_names(&["echo"]),
            payment_asset: AssetId::NATIVE,
            payment_amount: 1_000_000,
            redundancy: 1,
            interval_seconds: 60,
            verifier: None,
            delivery_mode: DeliveryMode::Eager,
        }
    }
}
