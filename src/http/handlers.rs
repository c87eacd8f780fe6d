//! Payment, realtime, and admin request handlers.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::cache::keys;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::pipeline::PaymentData;
use crate::realtime;
use crate::store::{Transaction, TransactionStatus};
use crate::validation::ValidationOutcome;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(rename = "cardUuid")]
    pub card_uuid: String,
    pub amount: u64,
    #[serde(rename = "merchantId")]
    pub merchant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    #[serde(rename = "cardUuid")]
    pub card_uuid: String,
    pub amount: u64,
    #[serde(rename = "merchantId")]
    pub merchant_id: String,
    #[serde(rename = "terminalId")]
    pub terminal_id: String,
    pub pin: String,
}

/// `POST /payment/validate`: the NFC tap pre-check.
pub async fn validate_payment(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Json<Value> {
    let outcome = state
        .validator
        .validate(&request.card_uuid, request.amount, &request.merchant_id)
        .await;

    match outcome {
        ValidationOutcome::Approved(approval) => Json(json!({
            "isValid": true,
            "cardInfo": approval.card,
            "merchantInfo": approval.merchant,
            "estimatedFees": approval.estimated_fee,
            "authorizationCode": approval.authorization_code,
        })),
        ValidationOutcome::Rejected { reason } => Json(json!({
            "isValid": false,
            "reason": reason,
        })),
    }
}

/// `POST /payment/process-direct`: validate, enqueue, and wait (bounded)
/// for the pipeline's terminal state.
pub async fn process_direct(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.pin.is_empty() {
        return Err(ApiError::bad_request("INVALID_PIN", "PIN is required"));
    }

    // Synchronous pre-check; rejections never reach the queue
    let outcome = state
        .validator
        .validate(&request.card_uuid, request.amount, &request.merchant_id)
        .await;
    let approval = match outcome {
        ValidationOutcome::Approved(approval) => approval,
        ValidationOutcome::Rejected { reason } => {
            return Err(ApiError::bad_request("VALIDATION_FAILED", reason));
        }
    };

    let card = state
        .ledger
        .card(&request.card_uuid)
        .map_err(|e| ApiError::not_found(e.to_string()))?;
    let user = state
        .ledger
        .user(&card.user_id)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let transaction_id = Uuid::new_v4().to_string();
    let gas_fee = approval.estimated_fee;
    let transaction = Transaction::new(
        transaction_id.clone(),
        request.card_uuid.clone(),
        user.user_id.clone(),
        request.merchant_id.clone(),
        request.amount,
        gas_fee,
    );
    let total_amount = transaction.total_amount;
    state
        .ledger
        .create_transaction(transaction)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let handle = state.pipeline.submit(
        &transaction_id,
        PaymentData {
            card_uuid: request.card_uuid.clone(),
            amount: request.amount,
            merchant_id: request.merchant_id.clone(),
            merchant_wallet_address: approval.merchant.wallet_address.clone(),
            terminal_id: request.terminal_id.clone(),
            user_id: user.user_id.clone(),
            user_wallet_address: user.wallet_address.clone(),
            gas_fee,
            total_amount,
        },
    );

    // Bounded wait on the status channel; on timeout we report the
    // transaction as it stands rather than holding the terminal hostage.
    let wait = Duration::from_secs(state.config.pipeline.direct_wait_secs);
    let _ = tokio::time::timeout(wait, await_terminal(handle.status)).await;

    let transaction = state
        .ledger
        .transaction(&transaction_id)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    match transaction.status {
        TransactionStatus::Completed => Ok(Json(json!({
            "success": true,
            "transaction": transaction_body(&transaction, &state),
        }))),
        TransactionStatus::Failed => Ok(Json(json!({
            "success": false,
            "error": transaction.failure_reason.clone().unwrap_or_else(|| "Payment failed".into()),
            "code": "PAYMENT_FAILED",
            "transaction": transaction_body(&transaction, &state),
        }))),
        _ => Ok(Json(json!({
            "success": false,
            "error": "Settlement still in progress",
            "code": "SETTLEMENT_PENDING",
            "transaction": transaction_body(&transaction, &state),
        }))),
    }
}

/// `GET /payment/status/{transaction_id}`: polling companion to the
/// realtime channel.
pub async fn transaction_status(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let transaction = state
        .ledger
        .transaction(&transaction_id)
        .map_err(|e| ApiError::not_found(e.to_string()))?;
    Ok(Json(json!({
        "success": true,
        "transaction": transaction_body(&transaction, &state),
    })))
}

/// `GET /ws`: the realtime channel.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| realtime::ws::serve_connection(socket, broadcaster))
        .into_response()
}

/// `GET /health`: liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /admin/alerts`: the capped manual-review list.
pub async fn admin_alerts(State(state): State<AppState>) -> Json<Value> {
    let alerts = state.cache.get_list(keys::ADMIN_FAILED_TRANSACTIONS);
    Json(json!({
        "count": alerts.len(),
        "alerts": alerts,
    }))
}

/// `GET /admin/status`: operational summary.
pub async fn admin_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
        "realtimeConnections": state.broadcaster.connection_count(),
        "cacheEntries": state.cache.len(),
    }))
}

async fn await_terminal(mut status: tokio::sync::watch::Receiver<TransactionStatus>) {
    loop {
        if status.borrow_and_update().is_terminal() {
            return;
        }
        // Channel closes once the worker publishes the terminal state
        if status.changed().await.is_err() {
            return;
        }
    }
}

fn transaction_body(tx: &Transaction, state: &AppState) -> Value {
    json!({
        "transactionId": tx.transaction_id,
        "txHash": tx.tx_hash,
        "amount": tx.amount,
        "gasFee": tx.gas_fee,
        "totalAmount": tx.total_amount,
        "status": tx.status.as_str(),
        "explorerUrl": tx.tx_hash.as_deref().map(|h| state.config.blockchain.explorer_url(h)),
        "failureReason": tx.failure_reason,
    })
}
