//! Notification dispatcher.
//!
//! Consumes typed events from the pipeline, writes the capped per-user
//! feed, emits realtime events, maintains the admin alert list, and
//! attempts best-effort external delivery. User-facing events and admin
//! alerts run on independent queues so neither can starve the other.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::cache::{keys, CacheStore};
use crate::config::NotificationConfig;
use crate::lifecycle::Shutdown;
use crate::notify::delivery;
use crate::notify::types::{Notification, NotificationEvent};
use crate::observability::metrics;
use crate::pipeline::queue::{JobQueue, Priority};
use crate::realtime::{Broadcaster, ADMIN_ALERT};
use crate::store::Ledger;

/// Errors that fail a notification job.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The event references a user the ledger does not know. Never
    /// swallowed: an unknown user at this point is a data integrity bug.
    #[error("user not found: {0}")]
    UserNotFound(String),
}

/// Shared handle to the dispatcher.
#[derive(Clone)]
pub struct NotificationDispatcher {
    ledger: Ledger,
    cache: CacheStore,
    broadcaster: Broadcaster,
    config: NotificationConfig,
    user_queue: JobQueue<NotificationEvent>,
    admin_queue: JobQueue<NotificationEvent>,
}

impl NotificationDispatcher {
    pub fn new(
        ledger: Ledger,
        cache: CacheStore,
        broadcaster: Broadcaster,
        config: NotificationConfig,
    ) -> Self {
        Self {
            ledger,
            cache,
            broadcaster,
            config,
            user_queue: JobQueue::new("notifications"),
            admin_queue: JobQueue::new("admin-alerts"),
        }
    }

    /// Enqueue an event. Admin alerts take the dedicated queue at high
    /// priority; everything else rides the user queue.
    pub fn enqueue(&self, event: NotificationEvent) {
        if event.is_admin_alert() {
            self.admin_queue.enqueue(event, Priority::High);
        } else {
            self.user_queue.enqueue(event, Priority::Normal);
        }
    }

    /// Spawn the worker pools. Returns their join handles.
    pub fn spawn_workers(&self, shutdown: &Shutdown) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        for i in 0..self.config.user_workers {
            handles.push(self.spawn_worker(self.user_queue.clone(), shutdown.subscribe(), i));
        }
        for i in 0..self.config.admin_workers {
            handles.push(self.spawn_worker(self.admin_queue.clone(), shutdown.subscribe(), i));
        }
        tracing::info!(
            user_workers = self.config.user_workers,
            admin_workers = self.config.admin_workers,
            "Notification workers started"
        );
        handles
    }

    fn spawn_worker(
        &self,
        queue: JobQueue<NotificationEvent>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
        index: usize,
    ) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    job = queue.next() => {
                        match job {
                            Some(event) => {
                                let kind = event.kind();
                                if let Err(e) = dispatcher.handle(event).await {
                                    tracing::error!(kind = kind, error = %e, "Notification job failed");
                                }
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!(queue = queue.name(), worker = index, "Notification worker draining");
                        break;
                    }
                }
            }
        })
    }

    /// Process one event end to end.
    pub async fn handle(&self, event: NotificationEvent) -> Result<(), DispatchError> {
        let user = self
            .ledger
            .user(event.user_id())
            .map_err(|_| DispatchError::UserNotFound(event.user_id().to_string()))?;

        let notification = self.build_notification(&event);

        // Feed write and realtime push happen for every event kind
        self.cache.push_capped(
            &keys::user_notifications(&user.user_id),
            &notification,
            self.config.feed_cap,
            Some(Duration::from_secs(self.config.feed_ttl_secs)),
        );
        self.broadcaster.emit_to_user(
            &user.user_id,
            "notification:new",
            serde_json::to_value(&notification).unwrap_or_default(),
        );

        if let NotificationEvent::AlertFailedTransaction {
            transaction_id,
            amount,
            reason,
            requires_manual_review,
            ..
        } = &event
        {
            let alert = json!({
                "transactionId": transaction_id,
                "userId": user.user_id,
                "amount": amount,
                "reason": reason,
                "requiresManualReview": requires_manual_review,
                "raisedAt": chrono::Utc::now(),
            });
            self.cache.push_capped(
                keys::ADMIN_FAILED_TRANSACTIONS,
                &alert,
                self.config.admin_alert_cap,
                Some(Duration::from_secs(self.config.admin_alert_ttl_secs)),
            );
            self.broadcaster.broadcast(ADMIN_ALERT, alert);

            if let Err(e) = delivery::open_support_ticket(transaction_id, reason).await {
                tracing::warn!(error = %e, "Support ticket delivery failed (ignored)");
            }
        }

        // Side channel only; never affects the feed or transaction state
        if let Err(e) = delivery::send_email(&user.email, &notification.title, &notification.body).await {
            tracing::warn!(user_id = %user.user_id, error = %e, "Email delivery failed (ignored)");
        }

        metrics::record_notification(event.kind());
        Ok(())
    }

    fn build_notification(&self, event: &NotificationEvent) -> Notification {
        match event {
            NotificationEvent::PaymentProcessing {
                transaction_id,
                amount,
                ..
            } => Notification::new(
                "Payment processing",
                format!("Your payment of {} is being processed", amount),
                json!({ "transactionId": transaction_id, "amount": amount }),
            ),
            NotificationEvent::PaymentSuccess {
                transaction_id,
                amount,
                tx_hash,
                ..
            } => Notification::new(
                "Payment completed",
                format!("Your payment of {} has been completed", amount),
                json!({ "transactionId": transaction_id, "amount": amount, "txHash": tx_hash }),
            ),
            NotificationEvent::PaymentFailed {
                transaction_id,
                amount,
                reason,
                ..
            } => Notification::new(
                "Payment failed",
                format!("Your payment of {} failed: {}", amount, reason),
                json!({ "transactionId": transaction_id, "amount": amount, "reason": reason }),
            ),
            NotificationEvent::AlertFailedTransaction {
                transaction_id,
                amount,
                reason,
                ..
            } => Notification::new(
                "Transaction requires review",
                format!("Transaction {} for {} failed and needs manual review", transaction_id, amount),
                json!({ "transactionId": transaction_id, "amount": amount, "reason": reason }),
            ),
            NotificationEvent::DailySpendingSummary {
                date,
                total_spent,
                transaction_count,
                ..
            } => Notification::new(
                "Daily spending summary",
                format!("You spent {} across {} payments on {}", total_spent, transaction_count, date),
                json!({ "date": date, "totalSpent": total_spent, "transactionCount": transaction_count }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::User;

    fn fixture() -> (NotificationDispatcher, CacheStore, Broadcaster, Ledger) {
        let ledger = Ledger::new();
        ledger.upsert_user(User {
            user_id: "user-1".into(),
            name: "Mina".into(),
            wallet_address: "0xabc".into(),
            email: "mina@example.com".into(),
        });
        let cache = CacheStore::new();
        let broadcaster = Broadcaster::new();
        let dispatcher = NotificationDispatcher::new(
            ledger.clone(),
            cache.clone(),
            broadcaster.clone(),
            NotificationConfig::default(),
        );
        (dispatcher, cache, broadcaster, ledger)
    }

    #[tokio::test]
    async fn test_success_event_writes_feed_and_emits() {
        let (dispatcher, cache, broadcaster, _) = fixture();
        let (_conn, mut rx) = broadcaster.register("user-1");

        dispatcher
            .handle(NotificationEvent::PaymentSuccess {
                user_id: "user-1".into(),
                transaction_id: "tx-1".into(),
                amount: 100_000,
                tx_hash: "0xbeef".into(),
            })
            .await
            .unwrap();

        let feed = cache.get_list(&keys::user_notifications("user-1"));
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0]["title"], "Payment completed");
        assert_eq!(feed[0]["metadata"]["txHash"], "0xbeef");

        let event = rx.try_recv().unwrap();
        assert_eq!(event["event"], "notification:new");
    }

    #[tokio::test]
    async fn test_unknown_user_fails_the_job() {
        let (dispatcher, _, _, _) = fixture();
        let result = dispatcher
            .handle(NotificationEvent::PaymentFailed {
                user_id: "ghost".into(),
                transaction_id: "tx-1".into(),
                amount: 1,
                reason: "r".into(),
            })
            .await;
        assert!(matches!(result, Err(DispatchError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_admin_alert_reaches_list_and_broadcast() {
        let (dispatcher, cache, broadcaster, _) = fixture();
        let (_conn, mut rx) = broadcaster.register("admin-1");

        dispatcher
            .handle(NotificationEvent::AlertFailedTransaction {
                user_id: "user-1".into(),
                transaction_id: "tx-9".into(),
                amount: 50_000,
                reason: "Blockchain error: timeout".into(),
                requires_manual_review: true,
            })
            .await
            .unwrap();

        let alerts = cache.get_list(keys::ADMIN_FAILED_TRANSACTIONS);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["requiresManualReview"], true);

        let event = rx.try_recv().unwrap();
        assert_eq!(event["event"], ADMIN_ALERT);
        assert_eq!(event["data"]["transactionId"], "tx-9");
    }

    #[tokio::test]
    async fn test_daily_summary_lands_on_feed() {
        let (dispatcher, cache, _, _) = fixture();
        dispatcher
            .handle(NotificationEvent::DailySpendingSummary {
                user_id: "user-1".into(),
                date: chrono::NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
                total_spent: 350_000,
                transaction_count: 4,
            })
            .await
            .unwrap();

        let feed = cache.get_list(&keys::user_notifications("user-1"));
        assert_eq!(feed[0]["title"], "Daily spending summary");
        assert_eq!(feed[0]["metadata"]["totalSpent"], 350_000);
    }

    #[tokio::test]
    async fn test_feed_respects_cap() {
        let (dispatcher, cache, _, _) = fixture();
        for i in 0..60 {
            dispatcher
                .handle(NotificationEvent::PaymentProcessing {
                    user_id: "user-1".into(),
                    transaction_id: format!("tx-{}", i),
                    amount: i,
                })
                .await
                .unwrap();
        }
        let feed = cache.get_list(&keys::user_notifications("user-1"));
        assert_eq!(feed.len(), NotificationConfig::default().feed_cap);
        // Newest entry first
        assert_eq!(feed[0]["metadata"]["transactionId"], "tx-59");
    }
}
