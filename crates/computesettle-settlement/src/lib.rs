//! # computesettle-settlement
//!
//! **Settlement plane**: the request state machine tying commitments,
//! delivery tracking, fees and escrow together.
//!
//! ## Architecture
//!
//! [`SettlementCoordinator`] owns one [`EscrowLedger`](computesettle_escrow::EscrowLedger)
//! and one [`FeeEngine`](computesettle_fees::FeeEngine) by composition, and:
//! 1. Builds and fingerprints a commitment per request ([`CommitmentRegistry`])
//! 2. Locks `payment × redundancy` from the payer wallet
//! 3. Validates every delivery against the stored fingerprint
//! 4. Dedups nodes and counts toward the redundancy target ([`DeliveryTracker`])
//! 5. Splits and disburses each payment
//! 6. Hands verified deliveries to a verifier and settles its verdict
//!    through [`SettlementAuthority`](computesettle_types::SettlementAuthority)
//! 7. Holds a valid node's bond until the verifier releases it

pub mod coordinator;
pub mod registry;
pub mod subscriptions;
pub mod tracker;

pub use coordinator::{
    Delivery, DeliveryOutcome, HeldBond, Payout, PendingVerification, RequestState,
    SettlementCoordinator,
};
pub use registry::{CommitmentRegistry, Started};
pub use subscriptions::InMemorySubscriptions;
pub use tracker::{DeliveryRecord, DeliveryTracker};
