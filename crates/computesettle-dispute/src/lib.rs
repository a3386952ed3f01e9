//! # computesettle-dispute
//!
//! **Optimistic verification** for computesettle deliveries.
//!
//! A delivery handed to the [`DisputeEngine`] is provisionally accepted.
//! It can be challenged until its window closes and is finalized after.
//!
//! ## Lifecycle
//!
//! ```text
//! submit() ──► Open ──challenge() before window end──► Slashed   (valid = false)
//!                   └─finalize()  after window end───► Finalized (valid = true)
//! ```
//!
//! Each verdict is pushed to the settlement authority. If that call fails,
//! the local verdict still stands and the failure is surfaced as a
//! [`Notification::Failed`].

pub mod engine;
pub mod merkle;
pub mod submission;

pub use engine::DisputeEngine;
pub use merkle::{InclusionProof, LeafKind, MerkleTree, Side, TraceLeaf};
pub use submission::{DisputeEvent, Notification, Submission, SubmissionStatus};
