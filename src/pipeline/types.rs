//! Payment job payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment details carried by a job.
///
/// Field names are part of the queue's wire contract (the dashboard's job
/// inspector reads them), hence the camelCase renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    #[serde(rename = "cardUuid")]
    pub card_uuid: String,
    pub amount: u64,
    #[serde(rename = "merchantId")]
    pub merchant_id: String,
    #[serde(rename = "merchantWalletAddress")]
    pub merchant_wallet_address: String,
    #[serde(rename = "terminalId")]
    pub terminal_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "userWalletAddress")]
    pub user_wallet_address: String,
    #[serde(rename = "gasFee")]
    pub gas_fee: u64,
    #[serde(rename = "totalAmount")]
    pub total_amount: u64,
}

/// One unit of queued settlement work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentJob {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    #[serde(rename = "paymentData")]
    pub payment_data: PaymentData,
    /// Completed attempts so far; the running attempt is `retry_count + 1`.
    #[serde(rename = "retryCount")]
    pub retry_count: u32,
}

impl PaymentJob {
    /// The attempt number this job execution represents (1-based).
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }
}

/// Identifier assigned to a submitted job.
pub type JobId = Uuid;

/// Terminal outcome of one job execution, for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retried,
    Failed,
}
