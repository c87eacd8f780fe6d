//! Notification event and feed entry types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Events consumed by the notification dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotificationEvent {
    PaymentProcessing {
        user_id: String,
        transaction_id: String,
        amount: u64,
    },
    PaymentSuccess {
        user_id: String,
        transaction_id: String,
        amount: u64,
        tx_hash: String,
    },
    PaymentFailed {
        user_id: String,
        transaction_id: String,
        amount: u64,
        reason: String,
    },
    /// Manual-review escalation, distinct from the user-facing failure.
    AlertFailedTransaction {
        user_id: String,
        transaction_id: String,
        amount: u64,
        reason: String,
        requires_manual_review: bool,
    },
    DailySpendingSummary {
        user_id: String,
        date: NaiveDate,
        total_spent: u64,
        transaction_count: u32,
    },
}

impl NotificationEvent {
    /// Stable kind tag, for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::PaymentProcessing { .. } => "paymentProcessing",
            NotificationEvent::PaymentSuccess { .. } => "paymentSuccess",
            NotificationEvent::PaymentFailed { .. } => "paymentFailed",
            NotificationEvent::AlertFailedTransaction { .. } => "alertFailedTransaction",
            NotificationEvent::DailySpendingSummary { .. } => "dailySpendingSummary",
        }
    }

    /// The user this event concerns.
    pub fn user_id(&self) -> &str {
        match self {
            NotificationEvent::PaymentProcessing { user_id, .. }
            | NotificationEvent::PaymentSuccess { user_id, .. }
            | NotificationEvent::PaymentFailed { user_id, .. }
            | NotificationEvent::AlertFailedTransaction { user_id, .. }
            | NotificationEvent::DailySpendingSummary { user_id, .. } => user_id,
        }
    }

    /// Whether this event routes through the admin alert queue.
    pub fn is_admin_alert(&self) -> bool {
        matches!(self, NotificationEvent::AlertFailedTransaction { .. })
    }
}

/// One entry in a user's notification feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    /// Event-specific extras (tx hash, amounts, reasons).
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, metadata: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            body: body.into(),
            metadata,
            created_at: Utc::now(),
            read: false,
        }
    }
}
