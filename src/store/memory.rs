//! In-memory ledger repositories.
//!
//! Stands in for the external document database behind the same contract
//! the pipeline depends on: point reads by id, transaction status updates
//! that refuse regressions, and a debit commit that owns the limit
//! invariants. Per-key mutation goes through the map's entry API, so a
//! given card or transaction has at most one writer at a time.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;

use crate::store::models::{Card, Merchant, Transaction, TransactionStatus, User};
use crate::store::StoreError;

/// Shared handle to the ledger.
#[derive(Clone, Default)]
pub struct Ledger {
    cards: Arc<DashMap<String, Card>>,
    users: Arc<DashMap<String, User>>,
    merchants: Arc<DashMap<String, Merchant>>,
    transactions: Arc<DashMap<String, Transaction>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // --- cards ---

    pub fn upsert_card(&self, card: Card) {
        self.cards.insert(card.card_uuid.clone(), card);
    }

    pub fn card(&self, card_uuid: &str) -> Result<Card, StoreError> {
        self.cards
            .get(card_uuid)
            .map(|c| c.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: "card",
                id: card_uuid.to_string(),
            })
    }

    /// Commit a debit against a card.
    ///
    /// Performs the lazy calendar rollover, then enforces the daily and
    /// monthly ceilings before incrementing the counters. The invariant
    /// `daily_spent <= daily_limit && monthly_spent <= monthly_limit` holds
    /// after every successful return.
    pub fn apply_debit(&self, card_uuid: &str, amount: u64, today: NaiveDate) -> Result<Card, StoreError> {
        let mut entry = self.cards.get_mut(card_uuid).ok_or_else(|| StoreError::NotFound {
            kind: "card",
            id: card_uuid.to_string(),
        })?;

        entry.roll_over(today);

        let daily_next = entry.daily_spent.saturating_add(amount);
        if daily_next > entry.daily_limit {
            return Err(StoreError::LimitExceeded {
                scope: "daily",
                attempted: daily_next,
                limit: entry.daily_limit,
            });
        }
        let monthly_next = entry.monthly_spent.saturating_add(amount);
        if monthly_next > entry.monthly_limit {
            return Err(StoreError::LimitExceeded {
                scope: "monthly",
                attempted: monthly_next,
                limit: entry.monthly_limit,
            });
        }

        entry.daily_spent = daily_next;
        entry.monthly_spent = monthly_next;
        Ok(entry.clone())
    }

    // --- users / merchants ---

    pub fn upsert_user(&self, user: User) {
        self.users.insert(user.user_id.clone(), user);
    }

    pub fn user(&self, user_id: &str) -> Result<User, StoreError> {
        self.users
            .get(user_id)
            .map(|u| u.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: "user",
                id: user_id.to_string(),
            })
    }

    pub fn upsert_merchant(&self, merchant: Merchant) {
        self.merchants.insert(merchant.merchant_id.clone(), merchant);
    }

    pub fn merchant(&self, merchant_id: &str) -> Result<Merchant, StoreError> {
        self.merchants
            .get(merchant_id)
            .map(|m| m.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: "merchant",
                id: merchant_id.to_string(),
            })
    }

    // --- transactions ---

    /// Insert a fresh transaction. Ids are never reused.
    pub fn create_transaction(&self, tx: Transaction) -> Result<(), StoreError> {
        let id = tx.transaction_id.clone();
        match self.transactions.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::DuplicateTransaction(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
                Ok(())
            }
        }
    }

    pub fn transaction(&self, transaction_id: &str) -> Result<Transaction, StoreError> {
        self.transactions
            .get(transaction_id)
            .map(|t| t.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: "transaction",
                id: transaction_id.to_string(),
            })
    }

    /// Move a transaction to Processing and stamp `processing_started_at`.
    pub fn mark_processing(&self, transaction_id: &str) -> Result<Transaction, StoreError> {
        self.transition(transaction_id, TransactionStatus::Processing, |tx| {
            tx.processing_started_at = Some(Utc::now());
        })
    }

    /// Finalize a transaction as Completed with its settlement artifacts.
    pub fn complete_transaction(
        &self,
        transaction_id: &str,
        tx_hash: String,
        block_number: u64,
        gas_used: u64,
    ) -> Result<Transaction, StoreError> {
        self.transition(transaction_id, TransactionStatus::Completed, |tx| {
            tx.tx_hash = Some(tx_hash.clone());
            tx.block_number = Some(block_number);
            tx.gas_used = Some(gas_used);
            tx.completed_at = Some(Utc::now());
        })
    }

    /// Finalize a transaction as Failed with a human-readable reason.
    pub fn fail_transaction(&self, transaction_id: &str, reason: String) -> Result<Transaction, StoreError> {
        self.transition(transaction_id, TransactionStatus::Failed, |tx| {
            tx.failure_reason = Some(reason.clone());
            tx.completed_at = Some(Utc::now());
        })
    }

    fn transition(
        &self,
        transaction_id: &str,
        next: TransactionStatus,
        apply: impl Fn(&mut Transaction),
    ) -> Result<Transaction, StoreError> {
        let mut entry = self
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "transaction",
                id: transaction_id.to_string(),
            })?;

        if !entry.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: entry.status,
                to: next,
            });
        }
        entry.status = next;
        apply(&mut entry);
        Ok(entry.clone())
    }
}
