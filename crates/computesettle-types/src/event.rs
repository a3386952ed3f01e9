//! Settlement events for the audit trail.
//!
//! Every state transition of a request produces a [`SettlementEvent`]. The
//! coordinator appends them to an in-memory log that callers drain.

use serde::{Deserialize, Serialize};

use crate::{Amount, DeliveryKey, NodeId, RequestId, SubscriptionId, VerifierId};

/// Something that happened to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementEvent {
    /// Funds were locked and the commitment recorded.
    RequestStarted {
        request_id: RequestId,
        subscription_id: SubscriptionId,
        interval: u32,
        locked: Amount,
    },
    /// A node's delivery was accepted.
    Delivered {
        request_id: RequestId,
        node: NodeId,
        /// Deliveries accepted so far for this request, including this one.
        redundancy_count: u16,
        node_payout: Amount,
        protocol_fee: Amount,
        verifier_fee: Amount,
    },
    /// A delivery was handed to a verifier; the node's share stays escrowed.
    VerificationRequested {
        key: DeliveryKey,
        verifier: VerifierId,
        escrowed: Amount,
    },
    /// A verifier reported its verdict and the escrowed share was settled.
    VerificationSettled {
        key: DeliveryKey,
        valid: bool,
        /// Paid to the node on a valid verdict, refunded to the payer otherwise.
        amount: Amount,
        /// Node bond forfeited to the payer. Zero on a valid verdict.
        slashed: Amount,
    },
    /// A valid delivery's bond was unlocked after its lock period.
    BondReleased { key: DeliveryKey, amount: Amount },
    /// The request reached its redundancy target.
    RequestCompleted { request_id: RequestId },
    /// The request was cancelled or timed out and its lock released.
    RequestTimedOut {
        request_id: RequestId,
        refunded: Amount,
    },
}

impl SettlementEvent {
    /// Short machine-readable tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestStarted { .. } => "REQUEST_STARTED",
            Self::Delivered { .. } => "DELIVERED",
            Self::VerificationRequested { .. } => "VERIFICATION_REQUESTED",
            Self::VerificationSettled { .. } => "VERIFICATION_SETTLED",
            Self::BondReleased { .. } => "BOND_RELEASED",
            Self::RequestCompleted { .. } => "REQUEST_COMPLETED",
            Self::RequestTimedOut { .. } => "REQUEST_TIMED_OUT",
        }
    }
}

impl std::fmt::Display for SettlementEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestStarted {
                request_id, locked, ..
            } => write!(f, "{} {request_id} locked={locked}", self.kind()),
            Self::Delivered {
                request_id,
                node,
                redundancy_count,
                ..
            } => write!(
                f,
                "{} {request_id} {node} count={redundancy_count}",
                self.kind()
            ),
            Self::VerificationRequested { key, verifier, .. } => {
                write!(f, "{} {key} {verifier}", self.kind())
            }
            Self::VerificationSettled { key, valid, .. } => {
                write!(f, "{} {key} valid={valid}", self.kind())
            }
            Self::BondReleased { key, amount } => {
                write!(f, "{} {key} amount={amount}", self.kind())
            }
            Self::RequestCompleted { request_id } => write!(f, "{} {request_id}", self.kind()),
            Self::RequestTimedOut {
                request_id,
                refunded,
            } => write!(f, "{} {request_id} refunded={refunded}", self.kind()),
        }
    }
}
