//! Ledger record types.
//!
//! Plain data records; behavior is limited to invariant checks (status
//! transition legality, calendar rollover). All mutation goes through the
//! repository functions in [`crate::store::memory`].

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// Wire representation (matches the HTTP and realtime payloads).
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Whether this status ends the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }

    /// Legal forward transitions. Terminal states accept nothing.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment card with its spending limits and running counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    /// Unique card identifier (the NFC tag UUID).
    pub card_uuid: String,
    /// Owning user.
    pub user_id: String,
    /// Whether the card is usable at all.
    pub is_active: bool,
    /// Block reason, when administratively blocked.
    pub blocked_reason: Option<String>,
    /// When the block was applied.
    pub blocked_at: Option<DateTime<Utc>>,
    /// Spend committed today, in minor units.
    pub daily_spent: u64,
    /// Spend committed this month, in minor units.
    pub monthly_spent: u64,
    /// Daily spending ceiling.
    pub daily_limit: u64,
    /// Monthly spending ceiling.
    pub monthly_limit: u64,
    /// Per-transaction ceiling.
    pub single_tx_limit: u64,
    /// Calendar day the counters were last reset for.
    pub last_reset: NaiveDate,
    /// Card expiry date, if any.
    pub expires_at: Option<NaiveDate>,
}

impl Card {
    /// True when the card is blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked_reason.is_some()
    }

    /// True when the card has expired as of `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry < today)
    }

    /// Lazily reset the counters if the calendar rolled over since the last
    /// committed debit. Day rollover clears the daily counter; month
    /// rollover additionally clears the monthly counter.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if today == self.last_reset {
            return;
        }
        self.daily_spent = 0;
        if today.year() != self.last_reset.year() || today.month() != self.last_reset.month() {
            self.monthly_spent = 0;
        }
        self.last_reset = today;
    }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    /// Settlement wallet address (hex).
    pub wallet_address: String,
    pub email: String,
}

/// A registered merchant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub merchant_id: String,
    pub name: String,
    /// Settlement wallet address (hex).
    pub wallet_address: String,
    /// Point-of-sale terminals owned by this merchant.
    pub terminal_ids: Vec<String>,
}

/// A payment transaction. Never deleted; terminal states are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub card_uuid: String,
    pub user_id: String,
    pub merchant_id: String,
    /// Requested amount, in minor units.
    pub amount: u64,
    /// Gas fee charged on top of the amount.
    pub gas_fee: u64,
    /// amount + gas_fee.
    pub total_amount: u64,
    pub status: TransactionStatus,
    /// Human-readable reason, set when status is Failed.
    pub failure_reason: Option<String>,
    /// On-chain transaction hash, set once settled.
    pub tx_hash: Option<String>,
    /// Block the settlement landed in.
    pub block_number: Option<u64>,
    /// Gas consumed by the settlement.
    pub gas_used: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a fresh pending transaction.
    pub fn new(
        transaction_id: String,
        card_uuid: String,
        user_id: String,
        merchant_id: String,
        amount: u64,
        gas_fee: u64,
    ) -> Self {
        Self {
            transaction_id,
            card_uuid,
            user_id,
            merchant_id,
            amount,
            gas_fee,
            total_amount: amount.saturating_add(gas_fee),
            status: TransactionStatus::Pending,
            failure_reason: None,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
        }
    }
}
