//! Supply conservation invariant checker.
//!
//! Mathematical invariant enforced after every ledger mutation:
//! ```text
//! ∀ asset: Σ holdings == Σ(deposits) - Σ(withdrawals)
//! ```
//!
//! Value only enters the ledger through deposits and only leaves through
//! withdrawals. Locks, disbursements, escrows and slashes move value
//! between wallets and must never create or destroy it.

use std::collections::{BTreeSet, HashMap};

use computesettle_types::{Amount, AssetId, Result, SettleError};

/// Tracks per-asset inflow and outflow and validates conservation.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    /// Total deposits per asset since genesis.
    deposits: HashMap<AssetId, Amount>,
    /// Total withdrawals per asset since genesis.
    withdrawals: HashMap<AssetId, Amount>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deposit(&mut self, asset: AssetId, amount: Amount) {
        let entry = self.deposits.entry(asset).or_default();
        *entry = entry.saturating_add(amount);
    }

    pub fn record_withdrawal(&mut self, asset: AssetId, amount: Amount) {
        let entry = self.withdrawals.entry(asset).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Expected total supply for an asset: deposits - withdrawals.
    #[must_use]
    pub fn expected_supply(&self, asset: AssetId) -> Amount {
        self.total_deposits(asset)
            .saturating_sub(self.total_withdrawals(asset))
    }

    /// Verify that the actual supply (sum of all wallet holdings) matches
    /// the expected supply for `asset`.
    ///
    /// # Errors
    /// Returns [`SettleError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, asset: AssetId, actual_supply: Amount) -> Result<()> {
        let expected = self.expected_supply(asset);
        if actual_supply != expected {
            return Err(SettleError::SupplyInvariantViolation {
                reason: format!(
                    "{asset}: actual supply {actual_supply} != expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.total_deposits(asset),
                    self.total_withdrawals(asset),
                ),
            });
        }
        Ok(())
    }

    /// All assets that have ever been deposited or withdrawn, in order.
    #[must_use]
    pub fn tracked_assets(&self) -> Vec<AssetId> {
        let assets: BTreeSet<AssetId> = self
            .deposits
            .keys()
            .chain(self.withdrawals.keys())
            .copied()
            .collect();
        assets.into_iter().collect()
    }

    #[must_use]
    pub fn total_deposits(&self, asset: AssetId) -> Amount {
        self.deposits.get(&asset).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_withdrawals(&self, asset: AssetId) -> Amount {
        self.withdrawals.get(&asset).copied().unwrap_or(0)
    }
}
