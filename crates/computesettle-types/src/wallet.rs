//! Ledger record types for the escrow model.
//!
//! Every wallet holds, per asset, a `holdings` total of which `locked` is
//! reserved by request locks and unscoped escrows. The unlocked part is
//! implicit: `holdings - locked`.

use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount, AssetId, RequestId, WalletId};

/// A single balance entry for a (wallet, asset) pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetBalance {
    /// Everything the wallet holds in this asset.
    pub holdings: Amount,
    /// Portion of `holdings` reserved by locks and escrows.
    pub locked: Amount,
}

impl AssetBalance {
    /// Holdings not reserved by any lock.
    #[must_use]
    pub fn unlocked(&self) -> Amount {
        self.holdings - self.locked
    }
}

/// Funds reserved against one request, paid out as deliveries arrive.
///
/// Invariants:
/// - `remaining == total - Σ disbursed`
/// - `paid_count <= redundancy`
/// - the lock is deleted exactly when `remaining == 0 || paid_count == redundancy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowLock {
    pub request_id: RequestId,
    /// Wallet the funds are locked in.
    pub wallet: WalletId,
    /// Account whose allowance funded the lock and receives any refund.
    pub spender: AccountId,
    pub asset: AssetId,
    pub total: Amount,
    pub remaining: Amount,
    pub redundancy: u16,
    pub paid_count: u16,
}

impl EscrowLock {
    /// Whether the lock has nothing more to pay out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0 || self.paid_count == self.redundancy
    }
}
