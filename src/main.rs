//! Gateway binary: configuration, wiring, and serving.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tap_gateway::blockchain::settlement::DisabledSubmitter;
use tap_gateway::blockchain::{ChainSubmitter, SettlementEngine, Wallet};
use tap_gateway::cache::CacheStore;
use tap_gateway::config::{loader, GatewayConfig};
use tap_gateway::http::{AppState, HttpServer};
use tap_gateway::lifecycle::{shutdown, Shutdown};
use tap_gateway::notify::NotificationDispatcher;
use tap_gateway::pipeline::PaymentPipeline;
use tap_gateway::realtime::Broadcaster;
use tap_gateway::store::Ledger;
use tap_gateway::validation::{FastValidator, VelocityPolicy};

#[derive(Debug, Parser)]
#[command(name = "tap-gateway", about = "NFC payment settlement gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tap_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tap-gateway starting");

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => loader::load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        payment_workers = config.pipeline.payment_workers,
        max_attempts = config.pipeline.max_attempts,
        settlement_enabled = config.blockchain.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => tap_gateway::observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Shared stores and the realtime registry
    let cache = CacheStore::new();
    let ledger = Ledger::new();
    let broadcaster = Broadcaster::new();

    // Settlement seam: live engine when enabled, refusing stub otherwise
    let submitter: Arc<dyn ChainSubmitter> = if config.blockchain.enabled {
        let wallet = Wallet::from_env(config.blockchain.chain_id)?;
        Arc::new(SettlementEngine::new(config.blockchain.clone(), wallet).await?)
    } else {
        tracing::warn!("Settlement disabled; payments will be refused at the settle stage");
        Arc::new(DisabledSubmitter)
    };

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
        submitter,
        config.pipeline.clone(),
        config.blockchain.clone(),
    );
    let validator = FastValidator::new(
        ledger.clone(),
        cache.clone(),
        Arc::new(VelocityPolicy::new(&config.risk)),
        config.cache.clone(),
        config.risk.clone(),
        config.blockchain.clone(),
    );

    // Background work: workers, sweeper, signal handler
    let shutdown_coordinator = Shutdown::new();
    let _payment_workers = pipeline.spawn_workers(&shutdown_coordinator);
    let _notification_workers = dispatcher.spawn_workers(&shutdown_coordinator);
    let _sweeper = cache.spawn_sweeper(
        std::time::Duration::from_secs(config.cache.sweep_interval_secs),
        shutdown_coordinator.subscribe(),
    );
    tokio::spawn(shutdown::on_signal(shutdown_coordinator.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let state = AppState {
        validator,
        pipeline,
        ledger,
        cache,
        broadcaster,
        config: Arc::new(config),
    };
    HttpServer::new(state).run(listener, shutdown_coordinator).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
