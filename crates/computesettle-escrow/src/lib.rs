//! # computesettle-escrow
//!
//! **Escrow ledger**: wallets, allowances, per-request locks and unscoped
//! escrow. This is the only crate that moves value.
//!
//! ## Architecture
//!
//! 1. **EscrowLedger**: holdings and locked balances per (wallet, asset),
//!    allowances per (wallet, spender, asset), request locks and escrows
//! 2. **Transfer**: payment legs and the committed disbursement passed from
//!    the bookkeeping phase to the credit phase
//! 3. **SupplyConservation**: per-asset deposit/withdrawal totals that the
//!    sum of all holdings must always match
//!
//! ## Request Flow
//!
//! ```text
//! approve() → lock_for_request() → commit_disbursement() → apply_transfer()
//!                                ↘ release_for_request()  (timeout / cancel)
//! ```

pub mod ledger;
pub mod supply_conservation;
pub mod transfer;

pub use ledger::EscrowLedger;
pub use supply_conservation::SupplyConservation;
pub use transfer::{CommittedDisbursement, DisbursementReceipt, Payee, Payment};
