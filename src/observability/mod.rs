//! Observability subsystem: metric names and recording helpers.
//!
//! Logging itself is initialized in `main` via `tracing-subscriber`; this
//! module owns everything metric-shaped so call sites never spell metric
//! names inline.

pub mod metrics;
