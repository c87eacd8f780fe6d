//! Payment Job Pipeline subsystem.
//!
//! Owns job lifecycle end to end: idempotent submission, queueing with
//! priority lanes, the staged settlement worker, bounded retries, and
//! post-commit cache consistency.

pub mod queue;
pub mod types;
pub mod worker;

pub use queue::{JobQueue, Priority};
pub use types::{JobId, JobOutcome, PaymentData, PaymentJob};
pub use worker::{PaymentPipeline, SubmitHandle};
