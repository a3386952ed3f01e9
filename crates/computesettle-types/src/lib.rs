//! # computesettle-types
//!
//! Shared types, errors, and configuration for the **computesettle**
//! settlement and dispute engine.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`NodeId`], [`WalletId`], [`VerifierId`], [`SubscriptionId`], [`AssetId`], [`RequestId`], [`ContainerId`], [`DeliveryKey`]
//! - **Commitment model**: [`Commitment`], [`Fingerprint`], [`DeliveryMode`]
//! - **Subscription model**: [`Subscription`]
//! - **Ledger model**: [`AssetBalance`], [`EscrowLock`]
//! - **Proofs**: [`ExecutionProof`]
//! - **Collaborator contracts**: [`SubscriptionSource`], [`WalletDirectory`], [`Verifier`], [`SettlementAuthority`]
//! - **Time**: [`Clock`], [`SystemClock`], [`ManualClock`]
//! - **Storage**: [`KeyValueStore`], [`MemoryStore`]
//! - **Events**: [`SettlementEvent`]
//! - **Configuration**: [`SettlementConfig`], [`DisputeConfig`]
//! - **Errors**: [`SettleError`] with `CS_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod clock;
pub mod collaborators;
pub mod commitment;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod proof;
pub mod store;
pub mod subscription;
pub mod wallet;

// Re-export all primary types at crate root for ergonomic imports:
//   use computesettle_types::{Commitment, EscrowLock, SettleError, ...};

pub use clock::*;
pub use collaborators::*;
pub use commitment::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use proof::*;
pub use store::*;
pub use subscription::*;
pub use wallet::*;

// Constants are accessed via `computesettle_types::constants::FOO`
// (not re-exported to avoid name collisions).
