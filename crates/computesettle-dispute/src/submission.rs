//! Submission records, dispute events and notification outcomes.

use std::fmt;

use chrono::{DateTime, Utc};
use computesettle_types::{AccountId, DeliveryKey};
use serde::{Deserialize, Serialize};

/// Where a submission is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    /// Provisionally accepted, open to challenge.
    Open,
    /// A challenge proved the claimed result wrong.
    Slashed,
    /// The window closed unchallenged and the result stands.
    Finalized,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Slashed => write!(f, "SLASHED"),
            Self::Finalized => write!(f, "FINALIZED"),
        }
    }
}

/// A provisionally accepted delivery.
///
/// Transitions `Open → Slashed | Finalized` exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub key: DeliveryKey,
    /// Merkle root of the node's execution trace.
    pub execution_root: [u8; 32],
    /// Digest of the output the node claims.
    pub result_digest: [u8; 32],
    pub submitted_at: DateTime<Utc>,
    /// Challenges are accepted strictly before this instant.
    pub challenge_window_end: DateTime<Utc>,
    /// The node's bond stays locked until this instant.
    pub bond_lock_end: DateTime<Utc>,
    pub finalized: bool,
    pub slashed: bool,
    /// Set once a finalized submission's bond has been handed back.
    #[serde(default)]
    pub bond_released: bool,
}

impl Submission {
    #[must_use]
    pub fn status(&self) -> SubmissionStatus {
        if self.slashed {
            SubmissionStatus::Slashed
        } else if self.finalized {
            SubmissionStatus::Finalized
        } else {
            SubmissionStatus::Open
        }
    }

    /// Open and still inside the challenge window at `now`.
    #[must_use]
    pub fn is_challengeable(&self, now: DateTime<Utc>) -> bool {
        self.status() == SubmissionStatus::Open && now < self.challenge_window_end
    }

    /// Open and past the challenge window at `now`.
    #[must_use]
    pub fn is_finalizable(&self, now: DateTime<Utc>) -> bool {
        self.status() == SubmissionStatus::Open && now > self.challenge_window_end
    }

    /// Finalized, lock period over, bond not yet handed back.
    #[must_use]
    pub fn is_bond_releasable(&self, now: DateTime<Utc>) -> bool {
        self.status() == SubmissionStatus::Finalized
            && !self.bond_released
            && now >= self.bond_lock_end
    }
}

/// Outcome of telling the settlement authority about a verdict.
///
/// Delivery is best effort. A failed notification never rolls back the
/// local `finalized` / `slashed` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum Notification {
    Delivered,
    Failed { reason: String },
}

impl Notification {
    pub(crate) fn from_result(result: computesettle_types::Result<()>) -> Self {
        match result {
            Ok(()) => Self::Delivered,
            Err(err) => Self::Failed {
                reason: err.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Something that happened in the dispute engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeEvent {
    Submitted {
        key: DeliveryKey,
        challenge_window_end: DateTime<Utc>,
        bond_lock_end: DateTime<Utc>,
    },
    Slashed {
        key: DeliveryKey,
        challenger: AccountId,
    },
    Finalized {
        key: DeliveryKey,
    },
    BondReleased {
        key: DeliveryKey,
    },
    /// The settlement authority rejected a verdict notification.
    NotificationFailed {
        key: DeliveryKey,
        reason: String,
    },
}
