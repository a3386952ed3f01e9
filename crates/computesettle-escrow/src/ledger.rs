//! The escrow ledger: the only component that moves value.
//!
//! Tracks per-(wallet, asset) holdings with a locked portion, allowances
//! granted by wallet owners to spenders, per-request locks, and unscoped
//! escrows held for a spender.
//!
//! ## Accounting
//!
//! For every (wallet, asset):
//! ```text
//! locked == Σ lock.remaining (locks in that wallet/asset)
//!         + Σ escrowed       (any spender, that wallet/asset)
//! locked <= holdings
//! ```
//!
//! ## Disbursement ordering
//!
//! Disbursements are two-phase. [`EscrowLedger::commit_disbursement`]
//! validates every leg and then updates lock and source-wallet bookkeeping
//! before any recipient is credited; [`EscrowLedger::apply_transfer`]
//! credits recipients and cannot fail. A failed validation leaves the
//! ledger untouched.

use std::collections::HashMap;

use computesettle_types::{
    AccountId, Amount, AssetBalance, AssetId, EscrowLock, KeyValueStore, MemoryStore, RequestId,
    Result, SettleError, WalletDirectory, WalletId,
};

use crate::{
    supply_conservation::SupplyConservation,
    transfer::{CommittedDisbursement, DisbursementReceipt, Payee, Payment},
};

/// (wallet, spender, asset)
type SpenderKey = (WalletId, AccountId, AssetId);

/// Wallet balances, allowances, request locks and escrows.
pub struct EscrowLedger<S = MemoryStore<RequestId, EscrowLock>> {
    owners: HashMap<WalletId, AccountId>,
    balances: HashMap<(WalletId, AssetId), AssetBalance>,
    allowances: HashMap<SpenderKey, Amount>,
    escrows: HashMap<SpenderKey, Amount>,
    locks: S,
    supply: SupplyConservation,
}

impl EscrowLedger {
    /// Create an empty ledger with in-memory lock storage.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for EscrowLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KeyValueStore<RequestId, EscrowLock>> EscrowLedger<S> {
    /// Create an empty ledger persisting locks in `locks`.
    pub fn with_store(locks: S) -> Self {
        Self {
            owners: HashMap::new(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
            escrows: HashMap::new(),
            locks,
            supply: SupplyConservation::new(),
        }
    }

    // ── Wallet lifecycle ────────────────────────────────────────────

    /// Open a new empty wallet owned by `owner`.
    pub fn open_wallet(&mut self, owner: AccountId) -> WalletId {
        let wallet = WalletId::new();
        self.owners.insert(wallet, owner);
        tracing::info!(%wallet, %owner, "Wallet opened");
        wallet
    }

    /// The account that owns `wallet`.
    ///
    /// # Errors
    /// Returns `WalletNotFound` for an unknown wallet.
    pub fn owner_of(&self, wallet: WalletId) -> Result<AccountId> {
        self.owners
            .get(&wallet)
            .copied()
            .ok_or(SettleError::WalletNotFound(wallet))
    }

    fn ensure_owner(&self, caller: AccountId, wallet: WalletId) -> Result<()> {
        let owner = self.owner_of(wallet)?;
        if owner != caller {
            return Err(SettleError::Unauthorized {
                reason: format!("{caller} does not own {wallet}"),
            });
        }
        Ok(())
    }

    fn ensure_wallet(&self, wallet: WalletId) -> Result<()> {
        self.owner_of(wallet).map(|_| ())
    }

    /// Deposit external funds into a wallet.
    ///
    /// # Errors
    /// - `WalletNotFound` for an unknown wallet
    /// - `ZeroAmount` if `amount == 0`
    /// - `AmountOverflow` if the asset's total supply would overflow
    pub fn deposit(&mut self, wallet: WalletId, asset: AssetId, amount: Amount) -> Result<()> {
        self.ensure_wallet(wallet)?;
        if amount == 0 {
            return Err(SettleError::ZeroAmount);
        }
        self.supply
            .expected_supply(asset)
            .checked_add(amount)
            .ok_or(SettleError::AmountOverflow)?;

        self.entry_mut(wallet, asset).holdings += amount;
        self.supply.record_deposit(asset, amount);
        tracing::debug!(%wallet, %asset, amount, "Deposit");
        Ok(())
    }

    /// Withdraw unlocked funds out of the ledger. Owner only.
    ///
    /// # Errors
    /// - `WalletNotFound` / `Unauthorized` if `caller` does not own `wallet`
    /// - `ZeroAmount` if `amount == 0`
    /// - `InsufficientFunds` if unlocked funds are short
    pub fn withdraw(
        &mut self,
        caller: AccountId,
        wallet: WalletId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<()> {
        self.ensure_owner(caller, wallet)?;
        if amount == 0 {
            return Err(SettleError::ZeroAmount);
        }
        self.ensure_unlocked(wallet, asset, amount)?;

        self.entry_mut(wallet, asset).holdings -= amount;
        self.supply.record_withdrawal(asset, amount);
        tracing::debug!(%wallet, %asset, amount, "Withdrawal");
        Ok(())
    }

    /// Move unlocked funds to another wallet. Owner only.
    ///
    /// # Errors
    /// - `WalletNotFound` / `Unauthorized` for an unknown or foreign source
    /// - `WalletNotFound` for an unknown destination
    /// - `ZeroAmount`, `InsufficientFunds`
    pub fn transfer(
        &mut self,
        caller: AccountId,
        from: WalletId,
        to: WalletId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<()> {
        self.ensure_owner(caller, from)?;
        self.ensure_wallet(to)?;
        if amount == 0 {
            return Err(SettleError::ZeroAmount);
        }
        self.ensure_unlocked(from, asset, amount)?;

        self.entry_mut(from, asset).holdings -= amount;
        self.entry_mut(to, asset).holdings += amount;
        tracing::debug!(%from, %to, %asset, amount, "Transfer");
        Ok(())
    }

    /// Set the allowance `spender` may consume from `wallet`. Owner only;
    /// overwrites any previous allowance.
    ///
    /// # Errors
    /// Returns `WalletNotFound` / `Unauthorized` if `caller` does not own
    /// `wallet`.
    pub fn approve(
        &mut self,
        caller: AccountId,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<()> {
        self.ensure_owner(caller, wallet)?;
        if amount == 0 {
            self.allowances.remove(&(wallet, spender, asset));
        } else {
            self.allowances.insert((wallet, spender, asset), amount);
        }
        tracing::debug!(%wallet, %spender, %asset, amount, "Allowance set");
        Ok(())
    }

    // ── Request locks ───────────────────────────────────────────────

    /// Reserve `total` for `request_id`, consuming the spender's allowance.
    ///
    /// # Errors
    /// - `LockAlreadyExists` if the request already holds a lock
    /// - `WalletNotFound` for an unknown wallet
    /// - `ZeroAmount` if `total == 0`
    /// - `RedundancyExhausted` if `redundancy == 0`
    /// - `InsufficientFunds` if `total` exceeds the unlocked balance
    /// - `InsufficientAllowance` if the spender's allowance is short
    pub fn lock_for_request(
        &mut self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        total: Amount,
        request_id: RequestId,
        redundancy: u16,
    ) -> Result<()> {
        if self.locks.contains(&request_id) {
            return Err(SettleError::LockAlreadyExists(request_id));
        }
        self.ensure_wallet(wallet)?;
        if total == 0 {
            return Err(SettleError::ZeroAmount);
        }
        if redundancy == 0 {
            return Err(SettleError::RedundancyExhausted(request_id));
        }
        self.ensure_unlocked(wallet, asset, total)?;
        self.ensure_allowance(wallet, spender, asset, total)?;

        self.debit_allowance(wallet, spender, asset, total);
        self.entry_mut(wallet, asset).locked += total;
        self.locks.insert(
            request_id,
            EscrowLock {
                request_id,
                wallet,
                spender,
                asset,
                total,
                remaining: total,
                redundancy,
                paid_count: 0,
            },
        );

        tracing::info!(
            request = %request_id,
            %wallet,
            %spender,
            %asset,
            total,
            redundancy,
            "Request lock created"
        );
        Ok(())
    }

    /// Validate a disbursement against the lock and, if every leg is
    /// acceptable, commit the lock and source-wallet bookkeeping.
    ///
    /// Increments `paid_count` exactly once regardless of how many legs
    /// there are. If the lock becomes exhausted, the leftover is refunded
    /// to the spender's allowance and the lock is deleted.
    ///
    /// # Errors
    /// - `LockNotFound` if no lock exists
    /// - `RedundancyExhausted` if the lock already paid `redundancy` times
    /// - `AssetMismatch` if any leg names a different asset
    /// - `WalletNotFound` if any wallet leg names an unknown wallet
    /// - `AmountOverflow` if the legs do not sum
    /// - `ZeroAmount` if the legs sum to zero
    /// - `ExceedsRemaining` if the legs sum past the remaining amount
    pub fn commit_disbursement(
        &mut self,
        request_id: RequestId,
        payments: &[Payment],
    ) -> Result<CommittedDisbursement> {
        let mut lock = self.check_disbursement(request_id, payments)?;

        let mut credits = Vec::with_capacity(payments.len());
        let mut outflow: Amount = 0;
        let mut total: Amount = 0;
        for payment in payments {
            total += payment.amount;
            match payment.payee {
                Payee::Wallet(to) => {
                    outflow += payment.amount;
                    if payment.amount > 0 {
                        credits.push((to, payment.amount));
                    }
                }
                Payee::Escrow(spender) => {
                    if payment.amount > 0 {
                        *self
                            .escrows
                            .entry((lock.wallet, spender, lock.asset))
                            .or_default() += payment.amount;
                    }
                }
            }
        }

        lock.remaining -= total;
        lock.paid_count += 1;

        let source = self.entry_mut(lock.wallet, lock.asset);
        source.locked -= outflow;
        source.holdings -= outflow;

        let mut refunded = 0;
        let completed = lock.is_exhausted();
        if completed {
            refunded = lock.remaining;
            self.entry_mut(lock.wallet, lock.asset).locked -= refunded;
            self.credit_allowance(lock.wallet, lock.spender, lock.asset, refunded);
            self.locks.remove(&request_id);
        } else {
            self.locks.insert(request_id, lock.clone());
        }

        tracing::debug!(
            request = %request_id,
            total,
            paid_count = lock.paid_count,
            remaining = lock.remaining,
            refunded,
            completed,
            "Disbursement committed"
        );

        Ok(CommittedDisbursement {
            request_id,
            source: lock.wallet,
            asset: lock.asset,
            credits,
            total,
            refunded,
            completed,
        })
    }

    /// Validate a disbursement without mutating anything. Returns a copy of
    /// the lock it would draw from.
    ///
    /// # Errors
    /// Same as [`Self::commit_disbursement`].
    pub fn check_disbursement(
        &self,
        request_id: RequestId,
        payments: &[Payment],
    ) -> Result<EscrowLock> {
        let lock = self
            .locks
            .get(&request_id)
            .cloned()
            .ok_or(SettleError::LockNotFound(request_id))?;
        if lock.paid_count >= lock.redundancy {
            return Err(SettleError::RedundancyExhausted(request_id));
        }

        let mut total: Amount = 0;
        for payment in payments {
            if payment.asset != lock.asset {
                return Err(SettleError::AssetMismatch {
                    expected: lock.asset,
                    actual: payment.asset,
                });
            }
            if let Payee::Wallet(to) = payment.payee {
                self.ensure_wallet(to)?;
            }
            total = total
                .checked_add(payment.amount)
                .ok_or(SettleError::AmountOverflow)?;
        }

        if total == 0 {
            return Err(SettleError::ZeroAmount);
        }
        if total > lock.remaining {
            return Err(SettleError::ExceedsRemaining {
                request_id,
                requested: total,
                remaining: lock.remaining,
            });
        }
        Ok(lock)
    }

    /// Credit the recipients of a committed disbursement.
    pub fn apply_transfer(&mut self, committed: CommittedDisbursement) -> DisbursementReceipt {
        let receipt = DisbursementReceipt::from(&committed);
        for (to, amount) in committed.credits {
            self.entry_mut(to, committed.asset).holdings += amount;
        }
        receipt
    }

    /// Pay a single recipient out of a request lock.
    ///
    /// # Errors
    /// See [`Self::commit_disbursement`].
    pub fn disburse_for_request(
        &mut self,
        request_id: RequestId,
        to: WalletId,
        amount: Amount,
    ) -> Result<DisbursementReceipt> {
        let asset = self
            .locks
            .get(&request_id)
            .map(|lock| lock.asset)
            .ok_or(SettleError::LockNotFound(request_id))?;
        self.disburse_for_fulfillment(request_id, &[Payment::to_wallet(to, asset, amount)])
    }

    /// Pay every party of one fulfillment out of a request lock.
    ///
    /// # Errors
    /// See [`Self::commit_disbursement`].
    pub fn disburse_for_fulfillment(
        &mut self,
        request_id: RequestId,
        payments: &[Payment],
    ) -> Result<DisbursementReceipt> {
        let committed = self.commit_disbursement(request_id, payments)?;
        Ok(self.apply_transfer(committed))
    }

    /// Release a request lock, refunding everything remaining to the
    /// spender's allowance. Returns the refunded amount.
    ///
    /// # Errors
    /// Returns `LockNotFound` if no lock exists.
    pub fn release_for_request(&mut self, request_id: RequestId) -> Result<Amount> {
        let lock = self
            .locks
            .remove(&request_id)
            .ok_or(SettleError::LockNotFound(request_id))?;

        self.entry_mut(lock.wallet, lock.asset).locked -= lock.remaining;
        self.credit_allowance(lock.wallet, lock.spender, lock.asset, lock.remaining);

        tracing::info!(
            request = %request_id,
            refunded = lock.remaining,
            "Request lock released"
        );
        Ok(lock.remaining)
    }

    // ── Unscoped escrow ─────────────────────────────────────────────

    /// Validate [`Self::lock_escrow`] without mutating anything.
    ///
    /// # Errors
    /// `WalletNotFound`, `ZeroAmount`, `InsufficientFunds`,
    /// `InsufficientAllowance`.
    pub fn check_lock_escrow(
        &self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<()> {
        self.ensure_wallet(wallet)?;
        if amount == 0 {
            return Err(SettleError::ZeroAmount);
        }
        self.ensure_unlocked(wallet, asset, amount)?;
        self.ensure_allowance(wallet, spender, asset, amount)
    }

    /// Hold `amount` in `wallet` for `spender`, outside any request.
    ///
    /// # Errors
    /// See [`Self::check_lock_escrow`].
    pub fn lock_escrow(
        &mut self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<()> {
        self.check_lock_escrow(wallet, spender, asset, amount)?;

        self.debit_allowance(wallet, spender, asset, amount);
        self.entry_mut(wallet, asset).locked += amount;
        *self.escrows.entry((wallet, spender, asset)).or_default() += amount;

        tracing::debug!(%wallet, %spender, %asset, amount, "Escrow locked");
        Ok(())
    }

    /// Return escrowed funds to the unlocked balance and the spender's
    /// allowance.
    ///
    /// # Errors
    /// `ZeroAmount`, or `InsufficientEscrow` if less is held.
    pub fn release_escrow(
        &mut self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<()> {
        self.take_escrow(wallet, spender, asset, amount)?;
        self.entry_mut(wallet, asset).locked -= amount;
        self.credit_allowance(wallet, spender, asset, amount);

        tracing::debug!(%wallet, %spender, %asset, amount, "Escrow released");
        Ok(())
    }

    /// Pay escrowed funds out to another wallet.
    ///
    /// # Errors
    /// `WalletNotFound` for an unknown destination, `ZeroAmount`, or
    /// `InsufficientEscrow` if less is held.
    pub fn transfer_escrowed(
        &mut self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        to: WalletId,
        amount: Amount,
    ) -> Result<()> {
        self.ensure_wallet(to)?;
        self.take_escrow(wallet, spender, asset, amount)?;

        let source = self.entry_mut(wallet, asset);
        source.locked -= amount;
        source.holdings -= amount;
        self.entry_mut(to, asset).holdings += amount;

        tracing::debug!(from = %wallet, %to, %spender, %asset, amount, "Escrow transferred");
        Ok(())
    }

    fn take_escrow(
        &mut self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Err(SettleError::ZeroAmount);
        }
        let key = (wallet, spender, asset);
        let escrowed = self.escrows.get(&key).copied().unwrap_or(0);
        if escrowed < amount {
            return Err(SettleError::InsufficientEscrow {
                spender,
                needed: amount,
                escrowed,
            });
        }
        if escrowed == amount {
            self.escrows.remove(&key);
        } else {
            self.escrows.insert(key, escrowed - amount);
        }
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Balance of a (wallet, asset) pair. Unknown pairs read as zero.
    #[must_use]
    pub fn balance(&self, wallet: WalletId, asset: AssetId) -> AssetBalance {
        self.balances
            .get(&(wallet, asset))
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn allowance(&self, wallet: WalletId, spender: AccountId, asset: AssetId) -> Amount {
        self.allowances
            .get(&(wallet, spender, asset))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn escrowed(&self, wallet: WalletId, spender: AccountId, asset: AssetId) -> Amount {
        self.escrows
            .get(&(wallet, spender, asset))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn lock(&self, request_id: &RequestId) -> Option<&EscrowLock> {
        self.locks.get(request_id)
    }

    /// Number of open request locks.
    #[must_use]
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Sum of all wallet holdings of `asset`.
    #[must_use]
    pub fn total_supply(&self, asset: AssetId) -> Amount {
        self.balances
            .iter()
            .filter(|((_, a), _)| *a == asset)
            .map(|(_, entry)| entry.holdings)
            .sum()
    }

    #[must_use]
    pub fn supply(&self) -> &SupplyConservation {
        &self.supply
    }

    /// Check supply conservation for every asset and that every wallet's
    /// locked balance is exactly accounted for by its locks and escrows.
    ///
    /// # Errors
    /// Returns `SupplyInvariantViolation` describing the first mismatch.
    pub fn verify_invariants(&self) -> Result<()> {
        for asset in self.supply.tracked_assets() {
            self.supply.verify(asset, self.total_supply(asset))?;
        }

        let mut expected_locked: HashMap<(WalletId, AssetId), Amount> = HashMap::new();
        for lock in self.locks.values() {
            *expected_locked.entry((lock.wallet, lock.asset)).or_default() += lock.remaining;
        }
        for ((wallet, _, asset), amount) in &self.escrows {
            *expected_locked.entry((*wallet, *asset)).or_default() += amount;
        }

        for (key, entry) in &self.balances {
            let expected = expected_locked.remove(key).unwrap_or(0);
            if entry.locked != expected {
                return Err(SettleError::SupplyInvariantViolation {
                    reason: format!(
                        "{} {}: locked {} != locks+escrows {expected}",
                        key.0, key.1, entry.locked
                    ),
                });
            }
            if entry.locked > entry.holdings {
                return Err(SettleError::SupplyInvariantViolation {
                    reason: format!(
                        "{} {}: locked {} exceeds holdings {}",
                        key.0, key.1, entry.locked, entry.holdings
                    ),
                });
            }
        }
        if let Some(((wallet, asset), amount)) =
            expected_locked.into_iter().find(|(_, amount)| *amount > 0)
        {
            return Err(SettleError::SupplyInvariantViolation {
                reason: format!("{wallet} {asset}: {amount} locked without a balance entry"),
            });
        }
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn entry_mut(&mut self, wallet: WalletId, asset: AssetId) -> &mut AssetBalance {
        self.balances.entry((wallet, asset)).or_default()
    }

    fn ensure_unlocked(&self, wallet: WalletId, asset: AssetId, needed: Amount) -> Result<()> {
        let available = self.balance(wallet, asset).unlocked();
        if available < needed {
            return Err(SettleError::InsufficientFunds {
                wallet,
                needed,
                available,
            });
        }
        Ok(())
    }

    fn ensure_allowance(
        &self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        needed: Amount,
    ) -> Result<()> {
        let allowance = self.allowance(wallet, spender, asset);
        if allowance < needed {
            return Err(SettleError::InsufficientAllowance {
                spender,
                needed,
                allowance,
            });
        }
        Ok(())
    }

    fn debit_allowance(
        &mut self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        amount: Amount,
    ) {
        let key = (wallet, spender, asset);
        let remaining = self.allowance(wallet, spender, asset).saturating_sub(amount);
        if remaining == 0 {
            self.allowances.remove(&key);
        } else {
            self.allowances.insert(key, remaining);
        }
    }

    fn credit_allowance(
        &mut self,
        wallet: WalletId,
        spender: AccountId,
        asset: AssetId,
        amount: Amount,
    ) {
        if amount > 0 {
            let entry = self.allowances.entry((wallet, spender, asset)).or_default();
            *entry = entry.saturating_add(amount);
        }
    }
}

impl<S: KeyValueStore<RequestId, EscrowLock>> WalletDirectory for EscrowLedger<S> {
    fn is_valid_wallet(&self, wallet: WalletId) -> bool {
        self.owners.contains_key(&wallet)
    }
}

#[cfg(test)]
mod tests {
    use computesettle_types::SubscriptionId;

    use super::*;

    const USDC: AssetId = AssetId(1);

    struct Fixture {
        ledger: EscrowLedger,
        consumer: AccountId,
        spender: AccountId,
        payer: WalletId,
        node_wallet: WalletId,
    }

    /// Payer wallet holding 10 000 with a 6 000 allowance for `spender`.
    fn setup() -> Fixture {
        let mut ledger = EscrowLedger::new();
        let consumer = AccountId([1; 32]);
        let spender = AccountId([2; 32]);
        let payer = ledger.open_wallet(consumer);
        let node_wallet = ledger.open_wallet(AccountId([3; 32]));
        ledger.deposit(payer, USDC, 10_000).unwrap();
        ledger.approve(consumer, payer, spender, USDC, 6_000).unwrap();
        Fixture {
            ledger,
            consumer,
            spender,
            payer,
            node_wallet,
        }
    }

    fn rid(n: u32) -> RequestId {
        RequestId::derive(SubscriptionId(1), n)
    }

    #[test]
    fn deposit_and_withdraw() {
        let mut f = setup();
        f.ledger.withdraw(f.consumer, f.payer, USDC, 4_000).unwrap();
        assert_eq!(f.ledger.balance(f.payer, USDC).holdings, 6_000);
        assert_eq!(f.ledger.supply().expected_supply(USDC), 6_000);
        f.ledger.verify_invariants().unwrap();
    }

    #[test]
    fn withdraw_requires_owner() {
        let mut f = setup();
        let err = f
            .ledger
            .withdraw(f.spender, f.payer, USDC, 1)
            .unwrap_err();
        assert!(matches!(err, SettleError::Unauthorized { .. }));
    }

    #[test]
    fn withdraw_cannot_touch_locked_funds() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 6_000, rid(1), 2)
            .unwrap();
        let err = f
            .ledger
            .withdraw(f.consumer, f.payer, USDC, 4_001)
            .unwrap_err();
        assert!(matches!(
            err,
            SettleError::InsufficientFunds {
                available: 4_000,
                ..
            }
        ));
    }

    #[test]
    fn deposit_to_unknown_wallet_fails() {
        let mut f = setup();
        let err = f.ledger.deposit(WalletId::new(), USDC, 1).unwrap_err();
        assert!(matches!(err, SettleError::WalletNotFound(_)));
    }

    #[test]
    fn approve_overwrites() {
        let mut f = setup();
        f.ledger
            .approve(f.consumer, f.payer, f.spender, USDC, 10)
            .unwrap();
        assert_eq!(f.ledger.allowance(f.payer, f.spender, USDC), 10);
        f.ledger
            .approve(f.consumer, f.payer, f.spender, USDC, 0)
            .unwrap();
        assert_eq!(f.ledger.allowance(f.payer, f.spender, USDC), 0);
    }

    #[test]
    fn transfer_moves_unlocked_funds() {
        let mut f = setup();
        f.ledger
            .transfer(f.consumer, f.payer, f.node_wallet, USDC, 2_500)
            .unwrap();
        assert_eq!(f.ledger.balance(f.payer, USDC).holdings, 7_500);
        assert_eq!(f.ledger.balance(f.node_wallet, USDC).holdings, 2_500);
        f.ledger.verify_invariants().unwrap();
    }

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn transfer_is_logged() {
        let mut f = setup();
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            f.ledger
                .transfer(f.consumer, f.payer, f.node_wallet, USDC, 2_500)
                .unwrap();
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("Transfer"))
            .unwrap_or_else(|| panic!("no transfer event in: {output}"));
        assert!(line.contains("DEBUG"));
        assert!(line.contains("amount=2500"));
    }

    #[test]
    fn lock_consumes_allowance_and_locks_balance() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 3_000, rid(1), 3)
            .unwrap();

        let bal = f.ledger.balance(f.payer, USDC);
        assert_eq!(bal.locked, 3_000);
        assert_eq!(bal.unlocked(), 7_000);
        assert_eq!(f.ledger.allowance(f.payer, f.spender, USDC), 3_000);
        assert_eq!(f.ledger.lock(&rid(1)).unwrap().remaining, 3_000);
        f.ledger.verify_invariants().unwrap();
    }

    #[test]
    fn duplicate_lock_rejected() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 1_000, rid(1), 1)
            .unwrap();
        let err = f
            .ledger
            .lock_for_request(f.payer, f.spender, USDC, 1_000, rid(1), 1)
            .unwrap_err();
        assert!(matches!(err, SettleError::LockAlreadyExists(_)));
        assert_eq!(f.ledger.balance(f.payer, USDC).locked, 1_000);
    }

    #[test]
    fn lock_needs_allowance() {
        let mut f = setup();
        let err = f
            .ledger
            .lock_for_request(f.payer, f.spender, USDC, 6_001, rid(1), 1)
            .unwrap_err();
        assert!(matches!(
            err,
            SettleError::InsufficientAllowance {
                allowance: 6_000,
                ..
            }
        ));
        assert_eq!(f.ledger.lock_count(), 0);
    }

    #[test]
    fn lock_needs_unlocked_balance() {
        let mut f = setup();
        f.ledger
            .approve(f.consumer, f.payer, f.spender, USDC, 20_000)
            .unwrap();
        let err = f
            .ledger
            .lock_for_request(f.payer, f.spender, USDC, 10_001, rid(1), 1)
            .unwrap_err();
        assert!(matches!(err, SettleError::InsufficientFunds { .. }));
    }

    #[test]
    fn incremental_disbursement_completes_lock() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 3_000, rid(1), 3)
            .unwrap();

        for i in 1..=3u16 {
            let receipt = f
                .ledger
                .disburse_for_request(rid(1), f.node_wallet, 1_000)
                .unwrap();
            assert_eq!(receipt.completed, i == 3);
            if i < 3 {
                let lock = f.ledger.lock(&rid(1)).unwrap();
                assert_eq!(lock.paid_count, i);
                assert_eq!(lock.remaining, lock.total - Amount::from(i) * 1_000);
            }
            f.ledger.verify_invariants().unwrap();
        }

        assert!(f.ledger.lock(&rid(1)).is_none());
        assert_eq!(f.ledger.balance(f.node_wallet, USDC).holdings, 3_000);
        assert_eq!(f.ledger.balance(f.payer, USDC).holdings, 7_000);
        assert_eq!(f.ledger.balance(f.payer, USDC).locked, 0);
    }

    #[test]
    fn exhausted_by_count_refunds_leftover() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 3_000, rid(1), 2)
            .unwrap();
        f.ledger
            .disburse_for_request(rid(1), f.node_wallet, 500)
            .unwrap();
        let receipt = f
            .ledger
            .disburse_for_request(rid(1), f.node_wallet, 500)
            .unwrap();

        assert!(receipt.completed);
        assert_eq!(receipt.refunded, 2_000);
        assert!(f.ledger.lock(&rid(1)).is_none());
        // 6 000 - 3 000 locked + 2 000 refunded
        assert_eq!(f.ledger.allowance(f.payer, f.spender, USDC), 5_000);
        assert_eq!(f.ledger.balance(f.payer, USDC).locked, 0);
        f.ledger.verify_invariants().unwrap();
    }

    #[test]
    fn disburse_rejects_zero_and_excess() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 1_000, rid(1), 2)
            .unwrap();
        assert!(matches!(
            f.ledger.disburse_for_request(rid(1), f.node_wallet, 0),
            Err(SettleError::ZeroAmount)
        ));
        assert!(matches!(
            f.ledger.disburse_for_request(rid(1), f.node_wallet, 1_001),
            Err(SettleError::ExceedsRemaining {
                remaining: 1_000,
                ..
            })
        ));
        assert_eq!(f.ledger.lock(&rid(1)).unwrap().paid_count, 0);
    }

    #[test]
    fn disburse_without_lock_fails() {
        let mut f = setup();
        let err = f
            .ledger
            .disburse_for_request(rid(9), f.node_wallet, 1)
            .unwrap_err();
        assert!(matches!(err, SettleError::LockNotFound(_)));
    }

    #[test]
    fn fulfillment_counts_once_for_many_legs() {
        let mut f = setup();
        let protocol = f.ledger.open_wallet(AccountId([9; 32]));
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 2_000, rid(1), 2)
            .unwrap();

        let receipt = f
            .ledger
            .disburse_for_fulfillment(
                rid(1),
                &[
                    Payment::to_wallet(protocol, USDC, 100),
                    Payment::to_wallet(f.node_wallet, USDC, 900),
                ],
            )
            .unwrap();

        assert_eq!(receipt.total, 1_000);
        assert!(!receipt.completed);
        let lock = f.ledger.lock(&rid(1)).unwrap();
        assert_eq!(lock.paid_count, 1);
        assert_eq!(lock.remaining, 1_000);
        assert_eq!(f.ledger.balance(protocol, USDC).holdings, 100);
        assert_eq!(f.ledger.balance(f.node_wallet, USDC).holdings, 900);
        f.ledger.verify_invariants().unwrap();
    }

    #[test]
    fn fulfillment_asset_mismatch_rejects_whole_call() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 2_000, rid(1), 2)
            .unwrap();
        let err = f
            .ledger
            .disburse_for_fulfillment(
                rid(1),
                &[
                    Payment::to_wallet(f.node_wallet, USDC, 100),
                    Payment::to_wallet(f.node_wallet, AssetId::NATIVE, 100),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, SettleError::AssetMismatch { .. }));
        assert_eq!(f.ledger.balance(f.node_wallet, USDC).holdings, 0);
        assert_eq!(f.ledger.lock(&rid(1)).unwrap().remaining, 2_000);
    }

    #[test]
    fn escrow_leg_keeps_funds_locked() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 1_000, rid(1), 1)
            .unwrap();
        f.ledger
            .disburse_for_fulfillment(
                rid(1),
                &[
                    Payment::to_wallet(f.node_wallet, USDC, 300),
                    Payment::to_escrow(f.spender, USDC, 700),
                ],
            )
            .unwrap();

        assert!(f.ledger.lock(&rid(1)).is_none());
        assert_eq!(f.ledger.escrowed(f.payer, f.spender, USDC), 700);
        let bal = f.ledger.balance(f.payer, USDC);
        assert_eq!(bal.holdings, 9_700);
        assert_eq!(bal.locked, 700);
        f.ledger.verify_invariants().unwrap();
    }

    #[test]
    fn committed_bookkeeping_precedes_credit() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 1_000, rid(1), 1)
            .unwrap();
        let committed = f
            .ledger
            .commit_disbursement(rid(1), &[Payment::to_wallet(f.node_wallet, USDC, 1_000)])
            .unwrap();

        // Source already debited, recipient not yet credited.
        assert!(f.ledger.lock(&rid(1)).is_none());
        assert_eq!(f.ledger.balance(f.payer, USDC).holdings, 9_000);
        assert_eq!(f.ledger.balance(f.node_wallet, USDC).holdings, 0);

        let receipt = f.ledger.apply_transfer(committed);
        assert!(receipt.completed);
        assert_eq!(f.ledger.balance(f.node_wallet, USDC).holdings, 1_000);
        f.ledger.verify_invariants().unwrap();
    }

    #[test]
    fn release_refunds_remaining() {
        let mut f = setup();
        f.ledger
            .lock_for_request(f.payer, f.spender, USDC, 3_000, rid(1), 3)
            .unwrap();
        f.ledger
            .disburse_for_request(rid(1), f.node_wallet, 1_000)
            .unwrap();
        let refunded = f.ledger.release_for_request(rid(1)).unwrap();

        assert_eq!(refunded, 2_000);
        assert!(f.ledger.lock(&rid(1)).is_none());
        assert_eq!(f.ledger.allowance(f.payer, f.spender, USDC), 5_000);
        assert_eq!(f.ledger.balance(f.payer, USDC).locked, 0);
        assert!(matches!(
            f.ledger.release_for_request(rid(1)),
            Err(SettleError::LockNotFound(_))
        ));
        f.ledger.verify_invariants().unwrap();
    }

    #[test]
    fn escrow_lock_release_and_transfer() {
        let mut f = setup();
        f.ledger.lock_escrow(f.payer, f.spender, USDC, 2_000).unwrap();
        assert_eq!(f.ledger.escrowed(f.payer, f.spender, USDC), 2_000);
        assert_eq!(f.ledger.allowance(f.payer, f.spender, USDC), 4_000);
        f.ledger.verify_invariants().unwrap();

        f.ledger
            .release_escrow(f.payer, f.spender, USDC, 500)
            .unwrap();
        assert_eq!(f.ledger.allowance(f.payer, f.spender, USDC), 4_500);

        f.ledger
            .transfer_escrowed(f.payer, f.spender, USDC, f.node_wallet, 1_500)
            .unwrap();
        assert_eq!(f.ledger.escrowed(f.payer, f.spender, USDC), 0);
        assert_eq!(f.ledger.balance(f.node_wallet, USDC).holdings, 1_500);
        assert_eq!(f.ledger.balance(f.payer, USDC).locked, 0);
        f.ledger.verify_invariants().unwrap();

        assert!(matches!(
            f.ledger.release_escrow(f.payer, f.spender, USDC, 1),
            Err(SettleError::InsufficientEscrow { escrowed: 0, .. })
        ));
    }

    #[test]
    fn wallet_directory_knows_open_wallets() {
        let f = setup();
        assert!(f.ledger.is_valid_wallet(f.payer));
        assert!(!f.ledger.is_valid_wallet(WalletId::new()));
    }
}
