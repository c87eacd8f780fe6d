//! Ledger Store subsystem.
//!
//! Durable records (cards, users, merchants, transactions) behind
//! repository-style functions. The pipeline treats this as the
//! authoritative debit path; the cache only ever holds derived state.

pub mod memory;
pub mod models;

use thiserror::Error;

pub use memory::Ledger;
pub use models::{Card, Merchant, Transaction, TransactionStatus, User};

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A status update would move a transaction backwards.
    #[error("illegal transaction transition: {from} -> {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// A debit would push a counter past its ceiling.
    #[error("{scope} limit exceeded: {attempted} > {limit}")]
    LimitExceeded {
        scope: &'static str,
        attempted: u64,
        limit: u64,
    },

    /// A transaction id was submitted twice at creation time.
    #[error("duplicate transaction: {0}")]
    DuplicateTransaction(String),
}

/// Result type for ledger operations.
pub type StoreResult<T> = Result<T, StoreError>;
