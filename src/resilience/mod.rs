//! Resilience primitives for the settlement path.

pub mod backoff;

pub use backoff::retry_delay;
