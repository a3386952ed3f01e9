//! Error types for the computesettle engine.
//!
//! All errors use the `CS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Commitment errors
//! - 2xx: Escrow / ledger errors
//! - 3xx: Delivery / schedule errors
//! - 4xx: Fee errors
//! - 5xx: Verification / dispute errors
//! - 6xx: Authorization errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{AccountId, Amount, AssetId, RequestId, SubscriptionId, VerifierId, WalletId};

/// Central error enum for all computesettle operations.
#[derive(Debug, Error)]
pub enum SettleError {
    // =================================================================
    // Commitment Errors (1xx)
    // =================================================================
    /// No fingerprint is stored for the request, or the supplied
    /// commitment does not hash to it.
    #[error("CS_ERR_100: Invalid commitment for {0}")]
    InvalidCommitment(RequestId),

    /// The subscription is unknown to the subscription store.
    #[error("CS_ERR_101: Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    /// The subscription has no active interval yet.
    #[error("CS_ERR_102: Subscription not active: {0}")]
    SubscriptionNotActive(SubscriptionId),

    /// The request's interval has not lapsed, so it cannot be timed out.
    #[error("CS_ERR_103: Commitment for {0} is not yet timeoutable")]
    CommitmentNotTimeoutable(RequestId),

    // =================================================================
    // Escrow / Ledger Errors (2xx)
    // =================================================================
    /// The wallet does not exist in the ledger.
    #[error("CS_ERR_200: Wallet not found: {0}")]
    WalletNotFound(WalletId),

    /// Not enough unlocked funds in the wallet.
    #[error("CS_ERR_201: Insufficient funds in {wallet}: need {needed}, unlocked {available}")]
    InsufficientFunds {
        wallet: WalletId,
        needed: Amount,
        available: Amount,
    },

    /// The spender's allowance on the wallet is too small.
    #[error("CS_ERR_202: Insufficient allowance for {spender}: need {needed}, have {allowance}")]
    InsufficientAllowance {
        spender: AccountId,
        needed: Amount,
        allowance: Amount,
    },

    /// A lock already exists for this request.
    #[error("CS_ERR_203: Lock already exists for {0}")]
    LockAlreadyExists(RequestId),

    /// No lock exists for this request.
    #[error("CS_ERR_204: No lock for {0}")]
    LockNotFound(RequestId),

    /// A disbursement of zero was requested.
    #[error("CS_ERR_205: Disbursement amount must be non-zero")]
    ZeroAmount,

    /// The disbursement exceeds what remains locked for the request.
    #[error("CS_ERR_206: Disbursement {requested} exceeds remaining {remaining} for {request_id}")]
    ExceedsRemaining {
        request_id: RequestId,
        requested: Amount,
        remaining: Amount,
    },

    /// The lock has already paid out `redundancy` times.
    #[error("CS_ERR_207: Redundancy exhausted for {0}")]
    RedundancyExhausted(RequestId),

    /// A payment names an asset other than the lock's asset.
    #[error("CS_ERR_208: Asset mismatch: expected {expected}, got {actual}")]
    AssetMismatch { expected: AssetId, actual: AssetId },

    /// Not enough unscoped escrow held for the spender.
    #[error("CS_ERR_209: Insufficient escrow for {spender}: need {needed}, have {escrowed}")]
    InsufficientEscrow {
        spender: AccountId,
        needed: Amount,
        escrowed: Amount,
    },

    /// An arithmetic operation would overflow the amount type.
    #[error("CS_ERR_210: Amount overflow")]
    AmountOverflow,

    // =================================================================
    // Delivery / Schedule Errors (3xx)
    // =================================================================
    /// The delivery targets an interval other than the current one.
    #[error("CS_ERR_300: Interval mismatch: delivered {delivered}, current {current}")]
    IntervalMismatch { delivered: u32, current: u32 },

    /// This node already responded for the interval.
    #[error("CS_ERR_301: Node already responded for {subscription_id} interval {interval}")]
    NodeRespondedAlready {
        subscription_id: SubscriptionId,
        interval: u32,
    },

    /// The interval has already received its full redundancy.
    #[error("CS_ERR_302: Interval completed for {0}")]
    IntervalCompleted(RequestId),

    /// The node wallet is not a valid wallet.
    #[error("CS_ERR_303: Invalid node wallet: {0}")]
    InvalidWallet(WalletId),

    // =================================================================
    // Fee Errors (4xx)
    // =================================================================
    /// After the base protocol fee there is not enough left for the verifier.
    #[error("CS_ERR_400: Insufficient payment for verifier fee: available {available}, fee {verifier_fee}")]
    InsufficientForVerifierFee {
        available: Amount,
        verifier_fee: Amount,
    },

    // =================================================================
    // Verification / Dispute Errors (5xx)
    // =================================================================
    /// The commitment names a verifier but none (or another) was supplied.
    #[error("CS_ERR_500: Verifier mismatch: expected {expected:?}, got {actual:?}")]
    VerifierMismatch {
        expected: Option<VerifierId>,
        actual: Option<VerifierId>,
    },

    /// The verifier does not accept the payment asset.
    #[error("CS_ERR_501: Verifier {verifier} does not support {asset}")]
    UnsupportedVerifierAsset { verifier: VerifierId, asset: AssetId },

    /// A verified delivery arrived without an execution proof.
    #[error("CS_ERR_502: Execution proof required for verified delivery")]
    MissingProof,

    /// The node's signature over its execution proof did not verify.
    #[error("CS_ERR_503: Execution proof signature invalid")]
    InvalidProofSignature,

    /// No submission exists for the key.
    #[error("CS_ERR_504: Submission not found: {0}")]
    SubmissionNotFound(String),

    /// A submission already exists for the key.
    #[error("CS_ERR_505: Submission already exists: {0}")]
    DuplicateSubmission(String),

    /// The submission was already finalized.
    #[error("CS_ERR_506: Submission already finalized: {0}")]
    AlreadyFinalized(String),

    /// The submission was already slashed.
    #[error("CS_ERR_507: Submission already slashed: {0}")]
    AlreadySlashed(String),

    /// The challenge window has closed.
    #[error("CS_ERR_508: Challenge window closed for {0}")]
    ChallengeWindowClosed(String),

    /// The challenge window is still open; cannot finalize yet.
    #[error("CS_ERR_509: Challenge window still open for {0}")]
    ChallengeWindowOpen(String),

    /// The leaf is not included in the submission's execution commitment.
    #[error("CS_ERR_510: Inclusion proof does not verify against execution root")]
    InvalidInclusionProof,

    /// The challenge proved nothing: the leaf agrees with the claimed result.
    #[error("CS_ERR_511: Challenge rejected: {reason}")]
    ChallengeRejected { reason: String },

    /// No verification is pending for the key.
    #[error("CS_ERR_512: No pending verification for {0}")]
    VerificationNotPending(String),

    /// The node's bond is still inside its lock period.
    #[error("CS_ERR_513: Node bond still locked for {0}")]
    BondLocked(String),

    /// No bond is held for the key, or it was already released.
    #[error("CS_ERR_514: No bond held for {0}")]
    BondNotHeld(String),

    // =================================================================
    // Authorization Errors (6xx)
    // =================================================================
    /// The caller is not allowed to perform this action.
    #[error("CS_ERR_600: Unauthorized: {reason}")]
    Unauthorized { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CS_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid values, missing fields, etc.).
    #[error("CS_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Ledger conservation invariant violated. Critical safety alert.
    #[error("CS_ERR_903: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SettleError>;

impl From<serde_json::Error> for SettleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
