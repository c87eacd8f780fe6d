//! Settlement engine: builds, submits, and confirms payment transfers.
//!
//! # Responsibilities
//! - Build transfers with gas estimation and a max-gas-price guard
//! - Sign and broadcast through a wallet-attached provider
//! - Poll for confirmation up to the configured depth and timeout
//! - Bound concurrent submissions with a semaphore

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout};

use crate::blockchain::client::ChainClient;
use crate::blockchain::types::{
    ChainSubmitter, SettlementError, SettlementReceipt, SettlementRequest, SettlementResult,
};
use crate::blockchain::wallet::Wallet;
use crate::config::ChainConfig;
use crate::observability::metrics;

/// Production [`ChainSubmitter`] backed by an alloy provider.
pub struct SettlementEngine {
    client: ChainClient,
    /// Wallet-attached provider used for sends.
    sender: Arc<dyn Provider + Send + Sync>,
    wallet: Wallet,
    config: ChainConfig,
    /// Bounds concurrent submissions in flight.
    permits: Arc<Semaphore>,
}

impl SettlementEngine {
    /// Create a new engine from configuration and the settlement wallet.
    pub async fn new(config: ChainConfig, wallet: Wallet) -> SettlementResult<Self> {
        if !config.enabled {
            return Err(SettlementError::Disabled);
        }

        let client = ChainClient::new(config.clone()).await?;

        let url: url::Url = config.rpc_url.parse().map_err(|e| {
            SettlementError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let sender = Arc::new(
            ProviderBuilder::new()
                .wallet(EthereumWallet::from(wallet.signer()))
                .connect_http(url),
        ) as Arc<dyn Provider + Send + Sync>;

        Ok(Self {
            client,
            sender,
            wallet,
            permits: Arc::new(Semaphore::new(config.max_concurrent_submissions)),
            config,
        })
    }

    /// The underlying read client.
    pub fn client(&self) -> &ChainClient {
        &self.client
    }

    /// Build a transfer request with the gas-price guard applied.
    async fn build_transfer(&self, to: Address, value: U256) -> SettlementResult<TransactionRequest> {
        // Sync nonce from chain before every submission batch
        let chain_nonce = self.client.get_transaction_count(self.wallet.address()).await?;
        self.wallet.set_nonce(chain_nonce);

        let gas_price = self.client.get_gas_price().await?;
        let gas_price_gwei = gas_price / 1_000_000_000;
        if gas_price_gwei > self.config.max_gas_price_gwei as u128 {
            return Err(SettlementError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei: self.config.max_gas_price_gwei,
            });
        }
        let adjusted_gas_price = (gas_price as f64 * self.config.gas_price_multiplier) as u128;

        let nonce = self.wallet.get_and_increment_nonce();

        Ok(TransactionRequest::default()
            .with_to(to)
            .with_value(value)
            .with_nonce(nonce)
            .with_gas_price(adjusted_gas_price)
            .with_chain_id(self.wallet.chain_id())
            .with_gas_limit(21_000))
    }

    /// Poll for a receipt until the required confirmation depth or timeout.
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> SettlementResult<(u64, u64)> {
        let required = self.client.confirmation_blocks();
        let deadline = Duration::from_secs(self.config.confirmation_timeout_secs);
        let poll_interval = Duration::from_secs(2);

        let result = timeout(deadline, async {
            let mut ticker = interval(poll_interval);

            loop {
                ticker.tick().await;

                let receipt = match self.client.get_transaction_receipt(tx_hash).await? {
                    Some(r) => r,
                    None => {
                        tracing::debug!(tx_hash = %tx_hash, "Settlement pending");
                        continue;
                    }
                };

                if !receipt.status() {
                    return Err(SettlementError::Reverted(format!("tx {}", tx_hash)));
                }

                let current_block = self.client.get_block_number().await?;
                let tx_block = receipt.block_number.unwrap_or(current_block);
                let confirmations = current_block.saturating_sub(tx_block) as u32;

                if confirmations >= required {
                    return Ok((tx_block, receipt.gas_used));
                }

                tracing::debug!(
                    tx_hash = %tx_hash,
                    confirmations = confirmations,
                    required = required,
                    "Waiting for confirmations"
                );
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(SettlementError::ConfirmationTimeout(required)),
        }
    }
}

#[async_trait::async_trait]
impl ChainSubmitter for SettlementEngine {
    async fn submit_payment(&self, request: &SettlementRequest) -> SettlementResult<SettlementReceipt> {
        // Closed only on shutdown; treat as an RPC-level fault
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SettlementError::Rpc("submission pool closed".to_string()))?;
        let start = Instant::now();

        let to: Address = request
            .to_address
            .parse()
            .map_err(|_| SettlementError::InvalidAddress(request.to_address.clone()))?;
        let value = U256::from(request.amount);

        let tx = self.build_transfer(to, value).await?;

        let pending = self
            .sender
            .send_transaction(tx)
            .await
            .map_err(|e| SettlementError::Rpc(format!("send failed: {}", e)))?;
        let tx_hash = *pending.tx_hash();

        tracing::info!(
            transaction_id = %request.transaction_id,
            tx_hash = %tx_hash,
            amount = request.amount,
            "Settlement submitted"
        );

        let (block_number, gas_used) = self.wait_for_confirmation(tx_hash).await?;
        metrics::record_settlement_duration(start);

        Ok(SettlementReceipt {
            tx_hash: tx_hash.to_string(),
            block_number,
            gas_used,
        })
    }
}

/// Submitter used when settlement is disabled in configuration.
///
/// Every submission fails with a non-transient error, so jobs reach a
/// terminal Failed state immediately instead of burning retries.
pub struct DisabledSubmitter;

#[async_trait::async_trait]
impl ChainSubmitter for DisabledSubmitter {
    async fn submit_payment(&self, request: &SettlementRequest) -> SettlementResult<SettlementReceipt> {
        tracing::warn!(transaction_id = %request.transaction_id, "Settlement disabled; refusing payment");
        Err(SettlementError::Disabled)
    }
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("wallet", &self.wallet.address())
            .field("chain_id", &self.config.chain_id)
            .field("max_concurrent", &self.config.max_concurrent_submissions)
            .finish()
    }
}
