//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum Router over the payment, realtime, and admin surfaces
//! - Wire middleware (request ID, tracing, timeout, body limit)
//! - Serve with graceful shutdown tied to the lifecycle coordinator

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cache::CacheStore;
use crate::config::GatewayConfig;
use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::pipeline::PaymentPipeline;
use crate::realtime::Broadcaster;
use crate::store::Ledger;
use crate::validation::FastValidator;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub validator: FastValidator,
    pub pipeline: PaymentPipeline,
    pub ledger: Ledger,
    pub cache: CacheStore,
    pub broadcaster: Broadcaster,
    pub config: Arc<GatewayConfig>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server over the wired services.
    pub fn new(state: AppState) -> Self {
        let config = state.config.clone();
        let router = Self::build_router(&config, state);
        Self { router }
    }

    /// Build the axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/payment/validate", post(handlers::validate_payment))
            .route("/payment/process-direct", post(handlers::process_direct))
            .route("/payment/status/{transaction_id}", get(handlers::transaction_status))
            .route("/ws", get(handlers::ws_upgrade))
            .route("/health", get(handlers::health));

        if config.admin.enabled {
            let admin = Router::new()
                .route("/alerts", get(handlers::admin_alerts))
                .route("/status", get(handlers::admin_status))
                .layer(middleware::from_fn_with_state(state.clone(), admin_auth));
            router = router.nest("/admin", admin);
        }

        router
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut signal = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Bearer-key gate on the admin routes.
async fn admin_auth(
    axum::extract::State(state): axum::extract::State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    if let Some(auth_val) = auth_header {
        if auth_val == format!("Bearer {}", state.config.admin.api_key) {
            return Ok(next.run(request).await);
        }
    }

    Err(StatusCode::UNAUTHORIZED)
}
