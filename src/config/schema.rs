//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the payment gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request limits).
    pub listener: ListenerConfig,

    /// Cache TTLs and sweep interval.
    pub cache: CacheConfig,

    /// Payment pipeline settings (workers, retries).
    pub pipeline: PipelineConfig,

    /// Notification dispatcher settings.
    pub notifications: NotificationConfig,

    /// Risk policy settings for fast validation.
    pub risk: RiskConfig,

    /// Blockchain settlement settings.
    pub blockchain: ChainConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 35,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Cache TTL configuration.
///
/// The TTLs govern how long fast-validation reads may serve without
/// touching the ledger. Entries derived from a committed transaction are
/// invalidated by the pipeline regardless of TTL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for cached card status entries, in seconds.
    pub card_status_ttl_secs: u64,

    /// TTL for cached fast-validation results, in seconds.
    pub fast_validation_ttl_secs: u64,

    /// TTL for issued authorization codes, in seconds.
    pub auth_code_ttl_secs: u64,

    /// Interval between expired-entry sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            card_status_ttl_secs: 60,
            fast_validation_ttl_secs: 30,
            auth_code_ttl_secs: 60,
            sweep_interval_secs: 30,
        }
    }
}

/// Payment pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of concurrent payment worker tasks.
    pub payment_workers: usize,

    /// Maximum settlement attempts before escalating to manual review.
    pub max_attempts: u32,

    /// Base delay for retry backoff, in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single retry delay, in milliseconds.
    pub retry_max_delay_ms: u64,

    /// How long `process-direct` waits for a terminal state, in seconds.
    pub direct_wait_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            payment_workers: 5,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            direct_wait_secs: 30,
        }
    }
}

/// Notification dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Worker tasks consuming user-facing notification events.
    pub user_workers: usize,

    /// Worker tasks consuming admin alert events.
    pub admin_workers: usize,

    /// Maximum entries retained per user notification feed.
    pub feed_cap: usize,

    /// Retention of the user notification feed, in seconds.
    pub feed_ttl_secs: u64,

    /// Maximum entries retained in the admin alert list.
    pub admin_alert_cap: usize,

    /// Retention of the admin alert list, in seconds.
    pub admin_alert_ttl_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            user_workers: 10,
            admin_workers: 2,
            feed_cap: 50,
            feed_ttl_secs: 7 * 24 * 3600,
            admin_alert_cap: 100,
            admin_alert_ttl_secs: 30 * 24 * 3600,
        }
    }
}

/// Risk policy configuration for fast validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Score at or above which a tap is rejected (0.0..=1.0).
    pub threshold: f64,

    /// Taps a card may burst before velocity scoring kicks in.
    pub velocity_burst: f64,

    /// Sustained taps per minute considered normal for a card.
    pub velocity_per_minute: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            velocity_burst: 5.0,
            velocity_per_minute: 3.0,
        }
    }
}

/// Blockchain settlement configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Whether live settlement is enabled. When disabled the pipeline
    /// refuses submissions rather than pretending to settle.
    pub enabled: bool,

    /// Primary JSON-RPC endpoint.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoints, tried in order.
    pub failover_urls: Vec<String>,

    /// Expected chain ID.
    pub chain_id: u64,

    /// Per-RPC-call timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Block confirmations required before a settlement is final.
    pub confirmation_blocks: u32,

    /// Maximum time to wait for confirmation, in seconds.
    pub confirmation_timeout_secs: u64,

    /// Concurrent settlement submissions allowed in flight.
    pub max_concurrent_submissions: usize,

    /// Multiplier applied to the quoted gas price.
    pub gas_price_multiplier: f64,

    /// Refuse to submit above this gas price, in gwei.
    pub max_gas_price_gwei: u64,

    /// Flat gas fee charged to the payer, in minor currency units.
    pub flat_gas_fee: u64,

    /// Base URL for the block explorer, joined with the tx hash.
    pub explorer_base_url: String,
}

impl ChainConfig {
    /// Gas fee charged to the payer for a payment of `_amount`.
    ///
    /// Flat-rate for now; the payload carries the fee explicitly so a
    /// proportional schedule would not change the wire shape.
    pub fn fee_for(&self, _amount: u64) -> u64 {
        self.flat_gas_fee
    }

    /// Public explorer link for a settled transaction.
    pub fn explorer_url(&self, tx_hash: &str) -> String {
        format!("{}{}", self.explorer_base_url, tx_hash)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 31337,
            rpc_timeout_secs: 10,
            confirmation_blocks: 3,
            confirmation_timeout_secs: 120,
            max_concurrent_submissions: 3,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
            flat_gas_fee: 1000,
            explorer_base_url: "https://explorer.example.com/tx/".to_string(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Whether the Prometheus exporter is started.
    pub metrics_enabled: bool,

    /// Address the metrics endpoint binds to.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Whether admin routes are mounted.
    pub enabled: bool,

    /// Bearer key required on admin routes.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_preserve_pipeline_contract() {
        let config = GatewayConfig::default();
        assert_eq!(config.pipeline.max_attempts, 3);
        assert_eq!(config.pipeline.payment_workers, 5);
        assert_eq!(config.blockchain.max_concurrent_submissions, 3);
        assert_eq!(config.notifications.user_workers, 10);
    }

    #[test]
    fn test_defaults_preserve_retention() {
        let config = NotificationConfig::default();
        assert_eq!(config.feed_cap, 50);
        assert_eq!(config.feed_ttl_secs, 7 * 24 * 3600);
        assert_eq!(config.admin_alert_cap, 100);
        assert_eq!(config.admin_alert_ttl_secs, 30 * 24 * 3600);
    }

    #[test]
    fn test_minimal_toml_roundtrip() {
        let toml_src = r#"
            [listener]
            bind_address = "127.0.0.1:9999"

            [pipeline]
            max_attempts = 5
        "#;
        let config: GatewayConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9999");
        assert_eq!(config.pipeline.max_attempts, 5);
        // Untouched sections fall back to defaults
        assert_eq!(config.pipeline.payment_workers, 5);
        assert_eq!(config.risk.threshold, 0.8);
    }
}
