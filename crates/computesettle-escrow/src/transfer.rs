//! Disbursement payloads and the committed transfer handed from the
//! bookkeeping phase to the transfer phase.
//!
//! ```text
//! commit_disbursement()  ──►  CommittedDisbursement  ──►  apply_transfer()
//!   validate + mutate            credits still owed          infallible
//!   lock accounting                                           credit step
//! ```
//!
//! By the time a [`CommittedDisbursement`] exists, the source lock and the
//! source wallet's holdings already reflect the payout. Applying it only
//! credits recipients.

use computesettle_types::{AccountId, Amount, AssetId, RequestId, WalletId};
use serde::{Deserialize, Serialize};

/// Where a single payment goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payee {
    /// Credit another wallet's holdings.
    Wallet(WalletId),
    /// Keep the funds locked in the source wallet as unscoped escrow held
    /// for this spender.
    Escrow(AccountId),
}

/// One leg of a disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payee: Payee,
    pub asset: AssetId,
    pub amount: Amount,
}

impl Payment {
    #[must_use]
    pub fn to_wallet(wallet: WalletId, asset: AssetId, amount: Amount) -> Self {
        Self {
            payee: Payee::Wallet(wallet),
            asset,
            amount,
        }
    }

    #[must_use]
    pub fn to_escrow(spender: AccountId, asset: AssetId, amount: Amount) -> Self {
        Self {
            payee: Payee::Escrow(spender),
            asset,
            amount,
        }
    }
}

/// Bookkeeping that has been committed but whose credits are not yet
/// applied.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a committed disbursement must be applied with `apply_transfer`"]
pub struct CommittedDisbursement {
    pub request_id: RequestId,
    /// Wallet the lock lives in.
    pub source: WalletId,
    pub asset: AssetId,
    /// Wallet credits still owed.
    pub credits: Vec<(WalletId, Amount)>,
    /// Sum of every payment leg, escrow legs included.
    pub total: Amount,
    /// Leftover returned to the spender's allowance when the lock closed.
    pub refunded: Amount,
    /// Whether this disbursement exhausted and deleted the lock.
    pub completed: bool,
}

/// What a disbursement did, once fully applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementReceipt {
    pub total: Amount,
    pub refunded: Amount,
    pub completed: bool,
}

impl From<&CommittedDisbursement> for DisbursementReceipt {
    fn from(committed: &CommittedDisbursement) -> Self {
        Self {
            total: committed.total,
            refunded: committed.refunded,
            completed: committed.completed,
        }
    }
}
