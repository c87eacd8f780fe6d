//! End-to-end pipeline tests over in-memory stores and a scripted chain.

use std::time::Duration;

use chrono::Utc;
use tap_gateway::cache::keys;
use tap_gateway::pipeline::PaymentData;
use tap_gateway::store::{Transaction, TransactionStatus};

mod common;
use common::{wait_until, Gateway, MockSubmitter, CARD, MERCHANT, USER};

fn payment_data(amount: u64) -> PaymentData {
    PaymentData {
        card_uuid: CARD.into(),
        amount,
        merchant_id: MERCHANT.into(),
        merchant_wallet_address: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".into(),
        terminal_id: "terminal-1".into(),
        user_id: USER.into(),
        user_wallet_address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".into(),
        gas_fee: 1000,
        total_amount: amount + 1000,
    }
}

fn create_transaction(gateway: &Gateway, transaction_id: &str, amount: u64) {
    gateway
        .ledger
        .create_transaction(Transaction::new(
            transaction_id.into(),
            CARD.into(),
            USER.into(),
            MERCHANT.into(),
            amount,
            1000,
        ))
        .unwrap();
}

async fn settled(gateway: &Gateway, transaction_id: &str) -> TransactionStatus {
    let id = transaction_id.to_string();
    let ledger = gateway.ledger.clone();
    assert!(
        wait_until(
            || ledger.transaction(&id).map(|t| t.status.is_terminal()).unwrap_or(false),
            Duration::from_secs(5),
        )
        .await,
        "transaction {} never reached a terminal state",
        transaction_id
    );
    gateway.ledger.transaction(transaction_id).unwrap().status
}

#[tokio::test]
async fn test_happy_path_settles_and_commits() {
    let gateway = Gateway::new(MockSubmitter::always_ok());
    gateway.start_workers();
    let (_conn, mut events) = gateway.broadcaster.register(USER);

    create_transaction(&gateway, "tx-1", 100_000);
    let handle = gateway.pipeline.submit("tx-1", payment_data(100_000));
    assert!(!handle.coalesced);

    assert_eq!(settled(&gateway, "tx-1").await, TransactionStatus::Completed);

    let tx = gateway.ledger.transaction("tx-1").unwrap();
    assert!(tx.tx_hash.is_some());
    assert!(tx.block_number.is_some());
    assert!(tx.processing_started_at.is_some());
    assert!(tx.completed_at.is_some());

    // Debit committed to the card and the accumulator
    let card = gateway.ledger.card(CARD).unwrap();
    assert_eq!(card.daily_spent, 100_000);
    assert_eq!(card.monthly_spent, 100_000);
    let today = Utc::now().date_naive();
    assert_eq!(gateway.cache.counter(&keys::daily_spending(CARD, today)).or_zero(), 100_000);

    // Realtime events: processing first, then completed carrying the hash.
    // The ledger write lands before the emit, so give the fan-out a beat.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut saw_processing = false;
    let mut saw_completed_hash = false;
    while let Ok(event) = events.try_recv() {
        if event["event"] == "transaction:update" {
            match event["data"]["status"].as_str() {
                Some("processing") => saw_processing = true,
                Some("completed") => {
                    saw_completed_hash = event["data"]["txHash"].as_str().is_some_and(|h| !h.is_empty());
                }
                _ => {}
            }
        }
    }
    assert!(saw_processing, "no processing event observed");
    assert!(saw_completed_hash, "completed event missing txHash");

    // Success notification lands on the user's feed
    let feed_has_success = wait_until(
        || {
            gateway
                .cache
                .get_list(&keys::user_notifications(USER))
                .iter()
                .any(|n| n["title"] == "Payment completed")
        },
        Duration::from_secs(3),
    )
    .await;
    assert!(feed_has_success, "success notification never reached the feed");
}

#[tokio::test]
async fn test_retry_bound_exactly_three_attempts() {
    let gateway = Gateway::new(MockSubmitter::always_failing());
    gateway.start_workers();

    create_transaction(&gateway, "tx-1", 100_000);
    gateway.pipeline.submit("tx-1", payment_data(100_000));

    assert_eq!(settled(&gateway, "tx-1").await, TransactionStatus::Failed);

    // Never fewer, never more than the configured 3 attempts
    assert_eq!(gateway.submitter.calls(), 3);

    let tx = gateway.ledger.transaction("tx-1").unwrap();
    let reason = tx.failure_reason.unwrap();
    assert!(
        reason.starts_with("Blockchain error:"),
        "unexpected reason: {}",
        reason
    );

    // No debit on failure
    assert_eq!(gateway.ledger.card(CARD).unwrap().daily_spent, 0);

    // Exactly one manual-review alert
    let alert_recorded = wait_until(
        || gateway.cache.get_list(keys::ADMIN_FAILED_TRANSACTIONS).len() == 1,
        Duration::from_secs(3),
    )
    .await;
    assert!(alert_recorded, "manual-review alert never recorded");
    let alerts = gateway.cache.get_list(keys::ADMIN_FAILED_TRANSACTIONS);
    assert_eq!(alerts[0]["requiresManualReview"], true);
    assert_eq!(alerts[0]["transactionId"], "tx-1");
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let gateway = Gateway::new(MockSubmitter::failing_first(2));
    gateway.start_workers();

    create_transaction(&gateway, "tx-1", 100_000);
    gateway.pipeline.submit("tx-1", payment_data(100_000));

    assert_eq!(settled(&gateway, "tx-1").await, TransactionStatus::Completed);
    assert_eq!(gateway.submitter.calls(), 3);
    assert_eq!(gateway.ledger.card(CARD).unwrap().daily_spent, 100_000);

    // Recovery is not an escalation
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gateway.cache.get_list(keys::ADMIN_FAILED_TRANSACTIONS).is_empty());
}

#[tokio::test]
async fn test_duplicate_submission_coalesces() {
    let gateway = Gateway::new(MockSubmitter::always_ok());

    create_transaction(&gateway, "tx-1", 100_000);
    // Both submissions land before any worker runs
    let first = gateway.pipeline.submit("tx-1", payment_data(100_000));
    let second = gateway.pipeline.submit("tx-1", payment_data(100_000));
    assert!(!first.coalesced);
    assert!(second.coalesced);
    assert_eq!(first.job_id, second.job_id);

    gateway.start_workers();
    assert_eq!(settled(&gateway, "tx-1").await, TransactionStatus::Completed);

    // Exactly one settlement and one debit
    assert_eq!(gateway.submitter.calls(), 1);
    assert_eq!(gateway.ledger.card(CARD).unwrap().daily_spent, 100_000);
}

#[tokio::test]
async fn test_resubmission_after_terminal_state_is_inert() {
    let gateway = Gateway::new(MockSubmitter::always_ok());
    gateway.start_workers();

    create_transaction(&gateway, "tx-1", 100_000);
    gateway.pipeline.submit("tx-1", payment_data(100_000));
    assert_eq!(settled(&gateway, "tx-1").await, TransactionStatus::Completed);

    // A late duplicate (different job, same transaction) must not re-settle
    gateway.pipeline.submit("tx-1", payment_data(100_000));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(gateway.submitter.calls(), 1);
    assert_eq!(gateway.ledger.card(CARD).unwrap().daily_spent, 100_000);
    assert_eq!(
        gateway.ledger.transaction("tx-1").unwrap().status,
        TransactionStatus::Completed
    );
}

#[tokio::test]
async fn test_cache_consistency_after_commit() {
    let gateway = Gateway::new(MockSubmitter::always_ok());
    gateway.start_workers();

    // 1,850,000 of the 2,000,000 daily limit already spent; one more
    // 100,000 payment leaves exactly 50,000 of headroom.
    let today = Utc::now().date_naive();
    gateway.ledger.apply_debit(CARD, 1_850_000, today).unwrap();

    // Warm the caches with pre-payment state
    let outcome = gateway.validator.validate(CARD, 100_000, MERCHANT).await;
    assert!(outcome.is_valid());
    assert!(gateway
        .cache
        .get_json::<serde_json::Value>(&keys::card_status(CARD))
        .is_some());
    assert!(gateway
        .cache
        .get_json::<f64>(&keys::fast_validation(CARD, 100_000))
        .is_some());

    create_transaction(&gateway, "tx-1", 100_000);
    gateway.pipeline.submit("tx-1", payment_data(100_000));
    assert_eq!(settled(&gateway, "tx-1").await, TransactionStatus::Completed);

    // Derived entries were dropped in the same commit
    assert!(gateway
        .cache
        .get_json::<serde_json::Value>(&keys::card_status(CARD))
        .is_none());
    assert!(gateway
        .cache
        .get_json::<f64>(&keys::fast_validation(CARD, 100_000))
        .is_none());

    // A follow-up validation must see the post-payment figure: another
    // 100,000 would breach the limit now, and a cached pre-payment spend
    // of 1,850,000 would wrongly approve it.
    let outcome = gateway.validator.validate(CARD, 100_000, MERCHANT).await;
    match outcome {
        tap_gateway::validation::ValidationOutcome::Rejected { reason } => {
            assert_eq!(reason, "Daily spending limit exceeded")
        }
        _ => panic!("stale pre-payment spend served from cache"),
    }
}

#[tokio::test]
async fn test_verification_failure_is_terminal_without_chain_interaction() {
    let gateway = Gateway::new(MockSubmitter::always_ok());
    gateway.start_workers();

    let mut card = gateway.ledger.card(CARD).unwrap();
    card.blocked_reason = Some("reported stolen".into());
    gateway.ledger.upsert_card(card);

    create_transaction(&gateway, "tx-1", 100_000);
    gateway.pipeline.submit("tx-1", payment_data(100_000));

    assert_eq!(settled(&gateway, "tx-1").await, TransactionStatus::Failed);
    let tx = gateway.ledger.transaction("tx-1").unwrap();
    assert_eq!(tx.failure_reason.as_deref(), Some("Card is blocked"));

    // No settlement attempt, no retries, no manual-review escalation
    assert_eq!(gateway.submitter.calls(), 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gateway.cache.get_list(keys::ADMIN_FAILED_TRANSACTIONS).is_empty());
}

#[tokio::test]
async fn test_limit_invariant_across_payments() {
    let gateway = Gateway::new(MockSubmitter::always_ok());
    gateway.start_workers();

    // Four payments of 600,000 against a 2,000,000 daily limit: the fourth
    // must fail verification, leaving the counter at 1,800,000.
    for i in 0..4 {
        let id = format!("tx-{}", i);
        create_transaction(&gateway, &id, 600_000);
        gateway.pipeline.submit(&id, payment_data(600_000));
        let _ = settled(&gateway, &id).await;
    }

    let card = gateway.ledger.card(CARD).unwrap();
    assert_eq!(card.daily_spent, 1_800_000);
    assert!(card.daily_spent <= card.daily_limit);

    let statuses: Vec<_> = (0..4)
        .map(|i| gateway.ledger.transaction(&format!("tx-{}", i)).unwrap().status)
        .collect();
    assert_eq!(
        statuses.iter().filter(|s| **s == TransactionStatus::Completed).count(),
        3
    );
    let failed = gateway.ledger.transaction("tx-3").unwrap();
    assert_eq!(failed.status, TransactionStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("Daily spending limit exceeded"));
    assert_eq!(gateway.submitter.calls(), 3);
}
