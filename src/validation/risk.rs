//! Pluggable fraud risk scoring.
//!
//! There is no single "correct" fraud model here; the gateway treats
//! scoring as a policy interface and ships a velocity-based default. A
//! deployment can swap in an anomaly model without touching the validator.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::RiskConfig;

/// Scores a prospective tap. Higher is riskier; the validator rejects at
/// or above the configured threshold.
#[async_trait::async_trait]
pub trait RiskPolicy: Send + Sync {
    /// Score the tap in the range 0.0..=1.0.
    async fn assess(&self, card_uuid: &str, amount: u64) -> f64;
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    /// Consume one token and return the remaining balance.
    fn drain(&mut self, capacity: f64, refill_per_sec: f64) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
        } else {
            self.tokens = 0.0;
        }
        self.tokens
    }
}

/// Default policy: per-card tap velocity.
///
/// Each card gets a token bucket sized by `velocity_burst`, refilled at
/// `velocity_per_minute`. The score is the bucket's depletion: an idle
/// card scores near zero, a card tapping faster than the refill rate
/// climbs toward 1.0.
pub struct VelocityPolicy {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    burst: f64,
    refill_per_sec: f64,
}

impl VelocityPolicy {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            burst: config.velocity_burst,
            refill_per_sec: config.velocity_per_minute / 60.0,
        }
    }
}

#[async_trait::async_trait]
impl RiskPolicy for VelocityPolicy {
    async fn assess(&self, card_uuid: &str, _amount: u64) -> f64 {
        let mut buckets = self.buckets.lock().expect("risk bucket mutex poisoned");
        let bucket = buckets
            .entry(card_uuid.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst));

        let remaining = bucket.drain(self.burst, self.refill_per_sec);
        (1.0 - remaining / self.burst).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> VelocityPolicy {
        VelocityPolicy::new(&RiskConfig {
            threshold: 0.8,
            velocity_burst: 5.0,
            velocity_per_minute: 3.0,
        })
    }

    #[tokio::test]
    async fn test_idle_card_scores_low() {
        let policy = policy();
        let score = policy.assess("card-1", 10_000).await;
        assert!(score < 0.3, "first tap scored {}", score);
    }

    #[tokio::test]
    async fn test_rapid_taps_climb_to_one() {
        let policy = policy();
        let mut last = 0.0;
        for _ in 0..6 {
            last = policy.assess("card-1", 10_000).await;
        }
        assert!(last >= 0.99, "burst exhaustion scored {}", last);
    }

    #[tokio::test]
    async fn test_cards_are_scored_independently() {
        let policy = policy();
        for _ in 0..6 {
            policy.assess("hot-card", 10_000).await;
        }
        let fresh = policy.assess("cold-card", 10_000).await;
        assert!(fresh < 0.3);
    }
}
