//! Exponential backoff with jitter for settlement retries.

use rand::Rng;
use std::time::Duration;

/// Calculate the delay before settlement attempt `attempt + 1`.
///
/// Attempt numbering follows the job's counter: the first retry (after
/// attempt 1 failed) waits roughly `base_ms`, the second roughly
/// `2 * base_ms`, capped at `max_ms`. Jitter of up to 10% is added so
/// simultaneous failures do not retry in lockstep.
pub fn retry_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
