//! Blockchain settlement subsystem.
//!
//! The pipeline talks to the chain exclusively through the
//! [`ChainSubmitter`] trait; [`SettlementEngine`] is the production
//! implementation on top of an alloy provider stack.

pub mod client;
pub mod settlement;
pub mod types;
pub mod wallet;

pub use client::ChainClient;
pub use settlement::SettlementEngine;
pub use types::{
    ChainId, ChainSubmitter, SettlementError, SettlementReceipt, SettlementRequest, SettlementResult,
};
pub use wallet::Wallet;
