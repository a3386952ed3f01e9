//! # computesettle-fees
//!
//! **Pure fee calculation for computesettle.**
//!
//! The fee engine takes a payment amount and produces the exact split
//! between protocol, verifier and node. It has:
//!
//! - **Zero side effects**: no ledger access, no state
//! - **Floor rounding**: every fee rounds down, so remainders stay with
//!   the node (or the payer, for escrowed shares)
//! - **Two policies**: standard (no verifier) and verified

pub mod fee;
pub mod split;

pub use fee::fee;
pub use split::{FeeEngine, StandardSplit, VerifiedSplit};
