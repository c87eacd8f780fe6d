//! Settlement types and error definitions.

use thiserror::Error;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur while settling a payment on-chain.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Transaction was not confirmed within the configured window.
    #[error("transaction not confirmed after {0} blocks")]
    ConfirmationTimeout(u32),

    /// Transaction was reverted on-chain.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// Gas price exceeded the configured maximum.
    #[error("gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Invalid private key format or signing failure.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Chain configuration mismatch.
    #[error("chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Destination address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Settlement is disabled in configuration.
    #[error("settlement disabled")]
    Disabled,
}

impl SettlementError {
    /// Whether the pipeline may retry after this error.
    ///
    /// Chain-side conditions (RPC faults, timeouts, gas spikes, reverts)
    /// can clear on a later attempt. Local configuration problems cannot.
    pub fn is_transient(&self) -> bool {
        match self {
            SettlementError::Rpc(_)
            | SettlementError::Timeout(_)
            | SettlementError::ConfirmationTimeout(_)
            | SettlementError::Reverted(_)
            | SettlementError::GasPriceTooHigh { .. } => true,
            SettlementError::Wallet(_)
            | SettlementError::ChainMismatch { .. }
            | SettlementError::InvalidAddress(_)
            | SettlementError::Disabled => false,
        }
    }
}

/// Result type for settlement operations.
pub type SettlementResult<T> = Result<T, SettlementError>;

/// A request to move funds for one payment.
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    /// The gateway transaction this settles.
    pub transaction_id: String,
    /// Destination (merchant) wallet address, hex.
    pub to_address: String,
    /// Value to transfer, in token minor units.
    pub amount: u64,
}

/// Proof of a confirmed settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    /// On-chain transaction hash.
    pub tx_hash: String,
    /// Block the transaction landed in.
    pub block_number: u64,
    /// Gas consumed.
    pub gas_used: u64,
}

/// The seam between the payment pipeline and the chain.
///
/// The production implementation is [`crate::blockchain::SettlementEngine`];
/// tests script this trait to drive retry and failure paths.
#[async_trait::async_trait]
pub trait ChainSubmitter: Send + Sync {
    /// Submit a settlement and wait for it to confirm.
    async fn submit_payment(&self, request: &SettlementRequest) -> SettlementResult<SettlementReceipt>;
}
