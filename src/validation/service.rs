//! Fast Validation Service.
//!
//! The synchronous pre-check behind an NFC tap, budgeted well under 100ms:
//! cache-first reads with ledger fallback, short-circuiting sub-checks,
//! and no spend-counter mutation (counters move only when the pipeline
//! commits). A cache miss degrades to a store read, never to approval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::{keys, CacheStore};
use crate::config::{CacheConfig, ChainConfig, RiskConfig};
use crate::observability::metrics;
use crate::store::{Card, Ledger, Merchant};
use crate::validation::risk::RiskPolicy;

/// Card summary returned to the terminal on approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSummary {
    #[serde(rename = "cardUuid")]
    pub card_uuid: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "dailyRemaining")]
    pub daily_remaining: u64,
    #[serde(rename = "singleTransactionLimit")]
    pub single_tx_limit: u64,
}

/// Merchant summary returned to the terminal on approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantSummary {
    #[serde(rename = "merchantId")]
    pub merchant_id: String,
    pub name: String,
    #[serde(rename = "walletAddress")]
    pub wallet_address: String,
}

/// Approval details for a validated tap.
#[derive(Debug, Clone)]
pub struct Approval {
    pub card: CardSummary,
    pub merchant: MerchantSummary,
    pub estimated_fee: u64,
    /// Short-lived code the terminal echoes back on processing.
    pub authorization_code: String,
}

/// Result of a fast validation.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Approved(Box<Approval>),
    Rejected { reason: String },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Approved(_))
    }

    fn rejected(reason: &str) -> Self {
        ValidationOutcome::Rejected {
            reason: reason.to_string(),
        }
    }
}

/// The fast validation service.
#[derive(Clone)]
pub struct FastValidator {
    ledger: Ledger,
    cache: CacheStore,
    risk: Arc<dyn RiskPolicy>,
    cache_config: CacheConfig,
    risk_config: RiskConfig,
    chain_config: ChainConfig,
}

impl FastValidator {
    pub fn new(
        ledger: Ledger,
        cache: CacheStore,
        risk: Arc<dyn RiskPolicy>,
        cache_config: CacheConfig,
        risk_config: RiskConfig,
        chain_config: ChainConfig,
    ) -> Self {
        Self {
            ledger,
            cache,
            risk,
            cache_config,
            risk_config,
            chain_config,
        }
    }

    /// Validate a tap. Sub-checks short-circuit on the first failure.
    pub async fn validate(&self, card_uuid: &str, amount: u64, merchant_id: &str) -> ValidationOutcome {
        let outcome = self.run_checks(card_uuid, amount, merchant_id).await;
        match &outcome {
            ValidationOutcome::Approved(_) => metrics::record_validation("approved"),
            ValidationOutcome::Rejected { reason } => {
                tracing::debug!(card_uuid = %card_uuid, amount = amount, reason = %reason, "Tap rejected");
                metrics::record_validation("rejected");
            }
        }
        outcome
    }

    async fn run_checks(&self, card_uuid: &str, amount: u64, merchant_id: &str) -> ValidationOutcome {
        // 1. Card status, cache-first
        let mut card = match self.card_status(card_uuid) {
            Some(card) => card,
            None => return ValidationOutcome::rejected("Card not found"),
        };

        // 2. Status and per-transaction checks
        let today = Utc::now().date_naive();
        if !card.is_active {
            return ValidationOutcome::rejected("Card is not active");
        }
        if card.is_blocked() {
            return ValidationOutcome::rejected("Card is blocked");
        }
        if card.is_expired(today) {
            return ValidationOutcome::rejected("Card is expired");
        }
        if amount > card.single_tx_limit {
            return ValidationOutcome::rejected("Amount exceeds single transaction limit");
        }

        // 3. Daily and monthly ceilings. The cached accumulator is the hot
        // source; the (possibly stale-cached) card counter is the floor.
        // Rollover happens on a local copy; counters only move at commit.
        card.roll_over(today);
        let accumulator = self
            .cache
            .counter(&keys::daily_spending(card_uuid, today))
            .or_zero();
        let daily_spent = accumulator.max(card.daily_spent);
        if daily_spent.saturating_add(amount) > card.daily_limit {
            return ValidationOutcome::rejected("Daily spending limit exceeded");
        }
        if card.monthly_spent.saturating_add(amount) > card.monthly_limit {
            return ValidationOutcome::rejected("Monthly spending limit exceeded");
        }

        // 4. Risk score, cached per (card, amount) fingerprint
        let score = self.risk_score(card_uuid, amount).await;
        if score >= self.risk_config.threshold {
            tracing::warn!(card_uuid = %card_uuid, score = score, "Tap rejected by risk policy");
            return ValidationOutcome::rejected("Transaction flagged as high risk");
        }

        // 5. Merchant summary and authorization code
        let merchant = match self.ledger.merchant(merchant_id) {
            Ok(m) => m,
            Err(_) => return ValidationOutcome::rejected("Merchant not found"),
        };

        let authorization_code = self.issue_auth_code(card_uuid, amount);

        ValidationOutcome::Approved(Box::new(Approval {
            card: summarize_card(&card),
            merchant: summarize_merchant(&merchant),
            estimated_fee: self.chain_config.fee_for(amount),
            authorization_code,
        }))
    }

    /// Cache-first card read; a miss populates the cache with a short TTL.
    fn card_status(&self, card_uuid: &str) -> Option<Card> {
        let key = keys::card_status(card_uuid);
        if let Some(card) = self.cache.get_json::<Card>(&key) {
            return Some(card);
        }

        let card = self.ledger.card(card_uuid).ok()?;
        self.cache.set_json(
            &key,
            &card,
            Some(Duration::from_secs(self.cache_config.card_status_ttl_secs)),
        );
        Some(card)
    }

    /// Risk score with the (card, amount) fingerprint cache in front.
    async fn risk_score(&self, card_uuid: &str, amount: u64) -> f64 {
        let key = keys::fast_validation(card_uuid, amount);
        if let Some(score) = self.cache.get_json::<f64>(&key) {
            return score;
        }

        let score = self.risk.assess(card_uuid, amount).await;
        self.cache.set_json(
            &key,
            &score,
            Some(Duration::from_secs(self.cache_config.fast_validation_ttl_secs)),
        );
        score
    }

    /// Issue a short-lived random authorization code, recorded in the cache
    /// so the processing endpoint can cross-check it.
    fn issue_auth_code(&self, card_uuid: &str, amount: u64) -> String {
        const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
        let code: String = (0..8)
            .map(|_| ALPHABET[fastrand::usize(..ALPHABET.len())] as char)
            .collect();

        self.cache.set_json(
            &keys::auth_code(&code),
            &serde_json::json!({ "cardUuid": card_uuid, "amount": amount }),
            Some(Duration::from_secs(self.cache_config.auth_code_ttl_secs)),
        );
        code
    }
}

fn summarize_card(card: &Card) -> CardSummary {
    CardSummary {
        card_uuid: card.card_uuid.clone(),
        user_id: card.user_id.clone(),
        daily_remaining: card.daily_limit.saturating_sub(card.daily_spent),
        single_tx_limit: card.single_tx_limit,
    }
}

fn summarize_merchant(merchant: &Merchant) -> MerchantSummary {
    MerchantSummary {
        merchant_id: merchant.merchant_id.clone(),
        name: merchant.name.clone(),
        wallet_address: merchant.wallet_address.clone(),
    }
}
