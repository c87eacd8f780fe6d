//! The payment settlement state machine.
//!
//! # Stages
//! ```text
//! submit ──▶ [verify] ──▶ [mark processing] ──▶ [settle] ──▶ [finalize]
//!               │                                  │
//!               ▼ (condition failed)               ▼ (transient, attempts left)
//!            failed, no chain interaction       re-enqueued with backoff
//! ```
//!
//! Terminal states always reach the ledger before a job completes, even if
//! notification delivery fails afterwards. Verification failures never
//! retry; settlement failures retry up to the configured bound and then
//! escalate to manual review.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::blockchain::{ChainSubmitter, SettlementReceipt, SettlementRequest};
use crate::cache::{keys, CacheStore};
use crate::config::{ChainConfig, PipelineConfig};
use crate::lifecycle::Shutdown;
use crate::notify::{NotificationDispatcher, NotificationEvent};
use crate::observability::metrics;
use crate::pipeline::queue::{JobQueue, Priority};
use crate::pipeline::types::{JobId, JobOutcome, PaymentData, PaymentJob};
use crate::realtime::{Broadcaster, TRANSACTION_UPDATE};
use crate::resilience::retry_delay;
use crate::store::{Ledger, TransactionStatus};

struct InFlight {
    job_id: JobId,
    status_tx: watch::Sender<TransactionStatus>,
}

/// Handle returned from [`PaymentPipeline::submit`].
pub struct SubmitHandle {
    /// Id of the (possibly pre-existing) job for this transaction.
    pub job_id: JobId,
    /// Live view of the transaction status; updated at every stage
    /// transition and closed after the terminal state is published.
    pub status: watch::Receiver<TransactionStatus>,
    /// True when this submission coalesced onto an in-flight job.
    pub coalesced: bool,
}

/// The asynchronous payment settlement pipeline.
#[derive(Clone)]
pub struct PaymentPipeline {
    ledger: Ledger,
    cache: CacheStore,
    broadcaster: Broadcaster,
    dispatcher: NotificationDispatcher,
    submitter: Arc<dyn ChainSubmitter>,
    config: PipelineConfig,
    chain_config: ChainConfig,
    queue: JobQueue<PaymentJob>,
    /// At most one live job per transaction id.
    in_flight: Arc<DashMap<String, InFlight>>,
}

impl PaymentPipeline {
    pub fn new(
        ledger: Ledger,
        cache: CacheStore,
        broadcaster: Broadcaster,
        dispatcher: NotificationDispatcher,
        submitter: Arc<dyn ChainSubmitter>,
        config: PipelineConfig,
        chain_config: ChainConfig,
    ) -> Self {
        Self {
            ledger,
            cache,
            broadcaster,
            dispatcher,
            submitter,
            config,
            chain_config,
            queue: JobQueue::new("payments"),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Enqueue settlement work for a transaction.
    ///
    /// Idempotent per transaction id: a second submission while the first
    /// job is live coalesces onto it instead of double-processing, and both
    /// callers observe the same status channel.
    pub fn submit(&self, transaction_id: &str, payment_data: PaymentData) -> SubmitHandle {
        match self.in_flight.entry(transaction_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let inflight = entry.get();
                tracing::debug!(
                    transaction_id = %transaction_id,
                    job_id = %inflight.job_id,
                    "Duplicate submission coalesced onto in-flight job"
                );
                SubmitHandle {
                    job_id: inflight.job_id,
                    status: inflight.status_tx.subscribe(),
                    coalesced: true,
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let job_id = Uuid::new_v4();
                let (status_tx, status) = watch::channel(TransactionStatus::Pending);
                slot.insert(InFlight { job_id, status_tx });

                self.queue.enqueue(
                    PaymentJob {
                        transaction_id: transaction_id.to_string(),
                        payment_data,
                        retry_count: 0,
                    },
                    Priority::Normal,
                );

                tracing::info!(transaction_id = %transaction_id, job_id = %job_id, "Payment job enqueued");
                SubmitHandle {
                    job_id,
                    status,
                    coalesced: false,
                }
            }
        }
    }

    /// Spawn the payment worker pool. Returns the join handles.
    pub fn spawn_workers(&self, shutdown: &Shutdown) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        for i in 0..self.config.payment_workers {
            let pipeline = self.clone();
            let queue = self.queue.clone();
            let mut shutdown = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        job = queue.next() => {
                            match job {
                                Some(job) => {
                                    pipeline.process(job).await;
                                }
                                None => break,
                            }
                        }
                        _ = shutdown.recv() => {
                            tracing::debug!(worker = i, "Payment worker draining");
                            break;
                        }
                    }
                }
            }));
        }
        tracing::info!(workers = self.config.payment_workers, "Payment workers started");
        handles
    }

    /// Execute one job through the stage machine.
    pub async fn process(&self, job: PaymentJob) -> JobOutcome {
        let transaction_id = job.transaction_id.clone();

        // A job delivered for an already-terminal transaction is a duplicate;
        // it must not touch the ledger or the chain again.
        match self.ledger.transaction(&transaction_id) {
            Ok(tx) if tx.status.is_terminal() => {
                tracing::warn!(transaction_id = %transaction_id, status = %tx.status, "Skipping job for settled transaction");
                self.finish(&transaction_id, tx.status);
                return JobOutcome::Completed;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(transaction_id = %transaction_id, error = %e, "Job references unknown transaction");
                self.finish(&transaction_id, TransactionStatus::Failed);
                metrics::record_job("orphaned");
                return JobOutcome::Failed;
            }
        }

        // Stage 1: verify conditions against the authoritative store
        if let Err(reason) = self.verify_conditions(&job) {
            tracing::warn!(transaction_id = %transaction_id, reason = %reason, "Verification failed");
            return self.fail_terminal(&job, reason, false).await;
        }

        // Stage 2: mark processing (first attempt only; retries resume an
        // already-processing transaction)
        if job.retry_count == 0 {
            match self.ledger.mark_processing(&transaction_id) {
                Ok(_) => {
                    self.publish_status(&transaction_id, TransactionStatus::Processing);
                    self.broadcaster.emit_to_user(
                        &job.payment_data.user_id,
                        TRANSACTION_UPDATE,
                        json!({
                            "transactionId": transaction_id,
                            "status": "processing",
                            "message": "Payment is being processed",
                        }),
                    );
                    self.dispatcher.enqueue(NotificationEvent::PaymentProcessing {
                        user_id: job.payment_data.user_id.clone(),
                        transaction_id: transaction_id.clone(),
                        amount: job.payment_data.amount,
                    });
                }
                Err(e) => {
                    return self
                        .fail_terminal(&job, format!("Failed to start processing: {}", e), false)
                        .await;
                }
            }
        }

        // Stage 3: settle on-chain
        let request = SettlementRequest {
            transaction_id: transaction_id.clone(),
            to_address: job.payment_data.merchant_wallet_address.clone(),
            amount: job.payment_data.amount,
        };

        match self.submitter.submit_payment(&request).await {
            Ok(receipt) => self.finalize_success(&job, receipt).await,
            Err(e) if e.is_transient() && job.attempt() < self.config.max_attempts => {
                let delay = retry_delay(
                    job.attempt(),
                    self.config.retry_base_delay_ms,
                    self.config.retry_max_delay_ms,
                );
                tracing::warn!(
                    transaction_id = %transaction_id,
                    attempt = job.attempt(),
                    max_attempts = self.config.max_attempts,
                    delay = ?delay,
                    error = %e,
                    "Settlement failed, scheduling retry"
                );
                metrics::record_job_retry();

                let mut retry = job.clone();
                retry.retry_count += 1;
                self.queue.enqueue_after(retry, delay, Priority::High);
                JobOutcome::Retried
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    attempt = job.attempt(),
                    error = %e,
                    "Settlement failed terminally"
                );
                self.fail_terminal(&job, format!("Blockchain error: {}", e), true).await
            }
        }
    }

    /// Stage 1: re-check card, user, and limits against the ledger.
    ///
    /// This runs on the authoritative debit path, so the card and user are
    /// read from the store, not the cache; only the daily accumulator uses
    /// its cached value (with the persisted counter as the floor).
    fn verify_conditions(&self, job: &PaymentJob) -> Result<(), String> {
        let data = &job.payment_data;

        let mut card = self
            .ledger
            .card(&data.card_uuid)
            .map_err(|_| "Card not found".to_string())?;
        if !card.is_active {
            return Err("Card is not active".to_string());
        }
        if card.is_blocked() {
            return Err("Card is blocked".to_string());
        }
        self.ledger
            .user(&data.user_id)
            .map_err(|_| "User not found".to_string())?;

        let today = Utc::now().date_naive();
        card.roll_over(today);

        let cached = self
            .cache
            .counter(&keys::daily_spending(&data.card_uuid, today))
            .or_zero();
        let daily_spent = cached.max(card.daily_spent);
        if daily_spent.saturating_add(data.amount) > card.daily_limit {
            return Err("Daily spending limit exceeded".to_string());
        }
        if card.monthly_spent.saturating_add(data.amount) > card.monthly_limit {
            return Err("Monthly spending limit exceeded".to_string());
        }

        Ok(())
    }

    /// Stage 4: commit the debit and fan out the completion.
    async fn finalize_success(&self, job: &PaymentJob, receipt: SettlementReceipt) -> JobOutcome {
        let data = &job.payment_data;
        let transaction_id = &job.transaction_id;

        if let Err(e) = self.ledger.complete_transaction(
            transaction_id,
            receipt.tx_hash.clone(),
            receipt.block_number,
            receipt.gas_used,
        ) {
            tracing::error!(transaction_id = %transaction_id, error = %e, "Could not record completion");
            self.finish(transaction_id, TransactionStatus::Failed);
            metrics::record_job("failed");
            return JobOutcome::Failed;
        }

        let now = Utc::now();
        let today = now.date_naive();
        if let Err(e) = self.ledger.apply_debit(&data.card_uuid, data.amount, today) {
            // The settlement is already on-chain; the counter discrepancy
            // needs an operator, not a rollback.
            tracing::error!(transaction_id = %transaction_id, error = %e, "Debit commit failed after settlement");
        }

        // Cache commit happens in the same logical operation as the ledger
        // write: bump the accumulator, drop everything derived from the
        // pre-payment state.
        self.cache.incr_by(
            &keys::daily_spending(&data.card_uuid, today),
            data.amount,
            Some(seconds_until_end_of_day(now)),
        );
        self.cache.delete(&keys::card_status(&data.card_uuid));
        self.cache.delete_prefix(&keys::fast_validation_prefix(&data.card_uuid));

        let explorer_url = self.chain_config.explorer_url(&receipt.tx_hash);
        self.broadcaster.emit_to_user(
            &data.user_id,
            TRANSACTION_UPDATE,
            json!({
                "transactionId": transaction_id,
                "status": "completed",
                "message": "Payment completed",
                "txHash": receipt.tx_hash,
                "explorerUrl": explorer_url,
            }),
        );
        self.dispatcher.enqueue(NotificationEvent::PaymentSuccess {
            user_id: data.user_id.clone(),
            transaction_id: transaction_id.clone(),
            amount: data.amount,
            tx_hash: receipt.tx_hash.clone(),
        });

        tracing::info!(
            transaction_id = %transaction_id,
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            "Payment completed"
        );
        metrics::record_job("completed");
        self.finish(transaction_id, TransactionStatus::Completed);
        JobOutcome::Completed
    }

    /// Drive the transaction to Failed and fan out the outcome.
    ///
    /// `escalate` raises the distinct manual-review alert on top of the
    /// user-facing failure notice.
    async fn fail_terminal(&self, job: &PaymentJob, reason: String, escalate: bool) -> JobOutcome {
        let transaction_id = &job.transaction_id;
        let data = &job.payment_data;

        if let Err(e) = self.ledger.fail_transaction(transaction_id, reason.clone()) {
            tracing::error!(transaction_id = %transaction_id, error = %e, "Could not record failure");
        }

        self.broadcaster.emit_to_user(
            &data.user_id,
            TRANSACTION_UPDATE,
            json!({
                "transactionId": transaction_id,
                "status": "failed",
                "message": "Payment failed",
                "error": reason,
            }),
        );
        self.dispatcher.enqueue(NotificationEvent::PaymentFailed {
            user_id: data.user_id.clone(),
            transaction_id: transaction_id.clone(),
            amount: data.amount,
            reason: reason.clone(),
        });
        if escalate {
            self.dispatcher.enqueue(NotificationEvent::AlertFailedTransaction {
                user_id: data.user_id.clone(),
                transaction_id: transaction_id.clone(),
                amount: data.amount,
                reason,
                requires_manual_review: true,
            });
        }

        metrics::record_job("failed");
        self.finish(transaction_id, TransactionStatus::Failed);
        JobOutcome::Failed
    }

    fn publish_status(&self, transaction_id: &str, status: TransactionStatus) {
        if let Some(inflight) = self.in_flight.get(transaction_id) {
            let _ = inflight.status_tx.send(status);
        }
    }

    /// Publish the terminal status and release the in-flight slot.
    fn finish(&self, transaction_id: &str, status: TransactionStatus) {
        if let Some((_, inflight)) = self.in_flight.remove(transaction_id) {
            let _ = inflight.status_tx.send(status);
        }
    }
}

/// Time remaining until the next UTC midnight, used as the accumulator TTL.
fn seconds_until_end_of_day(now: DateTime<Utc>) -> Duration {
    const FALLBACK: Duration = Duration::from_secs(24 * 3600);
    match now.date_naive().succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
        Some(midnight) => (midnight.and_utc() - now).to_std().unwrap_or(FALLBACK),
        None => FALLBACK,
    }
}
