//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tap_gateway::blockchain::{
    ChainSubmitter, SettlementError, SettlementReceipt, SettlementRequest, SettlementResult,
};
use tap_gateway::cache::CacheStore;
use tap_gateway::config::GatewayConfig;
use tap_gateway::lifecycle::Shutdown;
use tap_gateway::notify::NotificationDispatcher;
use tap_gateway::pipeline::PaymentPipeline;
use tap_gateway::realtime::Broadcaster;
use tap_gateway::store::models::{Card, Merchant, User};
use tap_gateway::store::Ledger;
use tap_gateway::validation::{FastValidator, RiskPolicy};

pub const CARD: &str = "card-1";
pub const USER: &str = "user-1";
pub const MERCHANT: &str = "merchant-1";

/// Scripted chain submitter: the first `fail_first` calls fail with a
/// transient RPC error, the rest succeed.
pub struct MockSubmitter {
    calls: AtomicU32,
    fail_first: u32,
}

impl MockSubmitter {
    pub fn failing_first(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_first,
        })
    }

    pub fn always_ok() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing_first(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChainSubmitter for MockSubmitter {
    async fn submit_payment(&self, _request: &SettlementRequest) -> SettlementResult<SettlementReceipt> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(SettlementError::Rpc("injected RPC failure".to_string()));
        }
        Ok(SettlementReceipt {
            tx_hash: format!("0xmock{:06}", n),
            block_number: 1000 + n as u64,
            gas_used: 21_000,
        })
    }
}

/// A fully wired gateway over in-memory collaborators.
pub struct Gateway {
    pub config: GatewayConfig,
    pub ledger: Ledger,
    pub cache: CacheStore,
    pub broadcaster: Broadcaster,
    pub dispatcher: NotificationDispatcher,
    pub pipeline: PaymentPipeline,
    pub validator: FastValidator,
    pub submitter: Arc<MockSubmitter>,
    pub shutdown: Shutdown,
}

/// Low fixed-risk policy so validation never trips on velocity in tests
/// that are not about risk.
struct NoRisk;

#[async_trait::async_trait]
impl RiskPolicy for NoRisk {
    async fn assess(&self, _card_uuid: &str, _amount: u64) -> f64 {
        0.0
    }
}

impl Gateway {
    pub fn new(submitter: Arc<MockSubmitter>) -> Self {
        // Short retry delays keep the exhaustion tests fast; the bound
        // itself stays at the production default of 3 attempts.
        let mut config = GatewayConfig::default();
        config.pipeline.retry_base_delay_ms = 10;
        config.pipeline.retry_max_delay_ms = 50;
        config.pipeline.direct_wait_secs = 5;

        let ledger = seeded_ledger();
        let cache = CacheStore::new();
        let broadcaster = Broadcaster::new();
        let dispatcher = NotificationDispatcher::new(
            ledger.clone(),
            cache.clone(),
            broadcaster.clone(),
            config.notifications.clone(),
        );
        let pipeline = PaymentPipeline::new(
            ledger.clone(),
            cache.clone(),
            broadcaster.clone(),
            dispatcher.clone(),
            submitter.clone(),
            config.pipeline.clone(),
            config.blockchain.clone(),
        );
        let validator = FastValidator::new(
            ledger.clone(),
            cache.clone(),
            Arc::new(NoRisk),
            config.cache.clone(),
            config.risk.clone(),
            config.blockchain.clone(),
        );

        Self {
            config,
            ledger,
            cache,
            broadcaster,
            dispatcher,
            pipeline,
            validator,
            submitter,
            shutdown: Shutdown::new(),
        }
    }

    /// Start payment and notification workers, as production wiring does.
    pub fn start_workers(&self) {
        self.pipeline.spawn_workers(&self.shutdown);
        self.dispatcher.spawn_workers(&self.shutdown);
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn seeded_ledger() -> Ledger {
    let ledger = Ledger::new();
    ledger.upsert_card(Card {
        card_uuid: CARD.into(),
        user_id: USER.into(),
        is_active: true,
        blocked_reason: None,
        blocked_at: None,
        daily_spent: 0,
        monthly_spent: 0,
        daily_limit: 2_000_000,
        monthly_limit: 20_000_000,
        single_tx_limit: 500_000,
        last_reset: Utc::now().date_naive(),
        expires_at: None,
    });
    ledger.upsert_user(User {
        user_id: USER.into(),
        name: "Mina".into(),
        wallet_address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".into(),
        email: "mina@example.com".into(),
    });
    ledger.upsert_merchant(Merchant {
        merchant_id: MERCHANT.into(),
        name: "Corner Cafe".into(),
        wallet_address: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".into(),
        terminal_ids: vec!["terminal-1".into()],
    });
    ledger
}

/// Poll `cond` until it holds or the timeout elapses.
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
