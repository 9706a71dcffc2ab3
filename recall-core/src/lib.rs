//! # recall-core
//!
//! Spaced-repetition review schedule over the headings of tracked documents.
//!
//! Every heading of a tracked document becomes a [`Card`]. Reviews of a card
//! feed an SM-2 style [`scheduler`] that decides when it is shown next.
//!
//! - **Identity**: cards are keyed by a stable hash of document path and
//!   heading text ([`identity::identify`]).
//! - **Scheduler**: pure next-state computation from a [`Rating`].
//! - **Card store**: in-memory source of truth with debounced snapshots
//!   to a durable [`persistence::SnapshotBackend`] ([`CardStore`]).
//! - **Reconciler**: keeps a document's cards aligned with its live
//!   headings ([`reconcile`]).
//!
//! The store degrades instead of failing: when its backend cannot be opened
//! it enters a permanent not-ready state in which every operation is a no-op.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod identity;
pub mod persistence;
pub mod reconcile;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod tracking;
pub mod types;

pub use config::RecallConfig;
pub use error::RecallError;
pub use store::{CardStore, FlushPolicy};
pub use tracking::Tracker;
pub use types::*;
