//! Fast Validation Service subsystem.

pub mod risk;
pub mod service;

pub use risk::{RiskPolicy, VelocityPolicy};
pub use service::{Approval, CardSummary, FastValidator, MerchantSummary, ValidationOutcome};
