//! Contracts with the engine's external collaborators.
//!
//! The settlement core consumes subscriptions, wallet validity and verifier
//! capabilities through these traits, and the dispute engine reports its
//! verdicts back through [`SettlementAuthority`]. Nothing here owns state;
//! implementations are passed in explicitly by the caller.

use serde::{Deserialize, Serialize};

use crate::{
    AccountId, Amount, AssetId, DeliveryKey, ExecutionProof, Result, Subscription,
    SubscriptionId, VerifierId, WalletId,
};

/// Read-only view of the subscription store.
pub trait SubscriptionSource {
    /// Look up a subscription.
    ///
    /// # Errors
    /// Returns `SubscriptionNotFound` for an unknown id.
    fn subscription(&self, id: SubscriptionId) -> Result<Subscription>;

    /// The interval currently open for delivery.
    ///
    /// # Errors
    /// Returns `SubscriptionNotActive` if the subscription has not started.
    fn current_interval(&self, id: SubscriptionId) -> Result<u32>;
}

/// Authorization layer: which wallets may receive node payouts.
pub trait WalletDirectory {
    fn is_valid_wallet(&self, wallet: WalletId) -> bool;
}

/// Everything a verifier needs to check one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// The settlement authority handing the delivery off.
    pub requested_by: AccountId,
    pub key: DeliveryKey,
    pub proof: ExecutionProof,
}

/// A verifier plugin attached to a subscription.
pub trait Verifier {
    fn id(&self) -> VerifierId;

    fn is_supported_asset(&self, asset: AssetId) -> bool;

    /// Fee charged per verification in `asset`.
    fn fee(&self, asset: AssetId) -> Amount;

    /// Wallet the verifier's fee is paid into.
    fn payout_wallet(&self) -> WalletId;

    /// Accept a delivery for verification.
    fn request_verification(&mut self, request: VerificationRequest) -> Result<()>;
}

/// Receiver of verification verdicts.
///
/// Implemented by the settlement coordinator; called by verifiers once a
/// delivery has been proven valid or invalid, and again when a valid
/// delivery's bond may be unlocked.
pub trait SettlementAuthority {
    fn finalize_verification(
        &mut self,
        verifier: VerifierId,
        key: DeliveryKey,
        valid: bool,
    ) -> Result<()>;

    /// Unlock the bond of a delivery that was settled as valid. Called by
    /// the verifier once the bond's lock period has elapsed.
    fn release_bond(&mut self, verifier: VerifierId, key: DeliveryKey) -> Result<()>;
}
