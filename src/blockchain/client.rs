//! Blockchain RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers)
//! - Query chain state (block number, gas price, nonces, receipts)
//! - Bound every call with a timeout, falling through the provider list

use alloy::primitives::{Address, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::types::{ChainId, SettlementError, SettlementResult};
use crate::config::ChainConfig;

/// Read-side RPC client used by the settlement engine.
#[derive(Clone)]
pub struct ChainClient {
    /// Providers in failover order.
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    config: ChainConfig,
    timeout_duration: Duration,
}

impl ChainClient {
    /// Create a new chain client from configuration.
    pub async fn new(config: ChainConfig) -> SettlementResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            SettlementError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(
            Arc::new(ProviderBuilder::new().connect_http(primary_url)) as Arc<dyn Provider + Send + Sync>
        );

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(
                    Arc::new(ProviderBuilder::new().connect_http(url)) as Arc<dyn Provider + Send + Sync>
                );
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let client = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        // Verify chain ID matches configuration; degrade rather than fail
        // so the gateway can come up while the node is still syncing.
        match client.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    "Chain client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Chain client initialized but chain verification failed"
                );
            }
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> SettlementResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(SettlementError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> SettlementResult<ChainId> {
        self.with_failover("chain id", |provider| async move {
            provider.get_chain_id().await.map(ChainId)
        })
        .await
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> SettlementResult<u64> {
        self.with_failover("block number", |provider| async move {
            provider.get_block_number().await
        })
        .await
    }

    /// Get the transaction count (nonce) for an address.
    pub async fn get_transaction_count(&self, address: Address) -> SettlementResult<u64> {
        self.with_failover("transaction count", move |provider| async move {
            provider.get_transaction_count(address).await
        })
        .await
    }

    /// Get a transaction receipt by hash.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> SettlementResult<Option<TransactionReceipt>> {
        self.with_failover("receipt", move |provider| async move {
            provider.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    /// Get current gas price in wei.
    pub async fn get_gas_price(&self) -> SettlementResult<u128> {
        self.with_failover("gas price", |provider| async move {
            provider.get_gas_price().await
        })
        .await
    }

    /// Check whether the chain is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.get_block_number().await.is_ok()
    }

    /// Number of confirmation blocks required.
    pub fn confirmation_blocks(&self) -> u32 {
        self.config.confirmation_blocks
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run `call` against each provider in order, bounding every attempt
    /// with the configured timeout.
    async fn with_failover<T, F, Fut>(&self, what: &'static str, call: F) -> SettlementResult<T>
    where
        F: Fn(Arc<dyn Provider + Send + Sync>) -> Fut,
        Fut: std::future::Future<Output = Result<T, alloy::transports::TransportError>>,
    {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, what = what, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, what = what, "RPC timeout, trying next provider");
                }
            }
        }
        Err(SettlementError::Rpc(format!("All RPC providers failed: {}", what)))
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ChainConfig {
        ChainConfig {
            enabled: true,
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 31337, // Anvil default
            rpc_timeout_secs: 2,
            ..ChainConfig::default()
        }
    }

    #[tokio::test]
    async fn test_client_creation_without_node() {
        // Creation succeeds even when no node is reachable
        let result = ChainClient::new(test_config()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failover_exhaustion_reports_rpc_error() {
        let mut config = test_config();
        config.rpc_url = "http://127.0.0.1:1".to_string();
        config.failover_urls.push("http://127.0.0.1:2".to_string());

        let client = ChainClient::new(config).await.unwrap();
        let result = client.get_chain_id().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("All RPC providers failed"));
    }
}
