//! Cache Store subsystem.
//!
//! Holds card status snapshots, daily spending accumulators,
//! fast-validation results, notification feeds and the admin alert list.
//! Everything here is derived state: the ledger store stays authoritative,
//! and any entry downstream of a transaction commit is invalidated in the
//! same logical operation that performs the commit.

pub mod keys;
pub mod store;

pub use store::{CacheStore, SpendReading};
