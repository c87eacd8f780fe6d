//! NFC payment settlement gateway library.
//!
//! # Architecture Overview
//!
//! ```text
//!   NFC tap ──▶ POST /payment/validate ──▶ validation (cache-first, <100ms)
//!                                              │
//!   POST /payment/process-direct ──────────────┤
//!        │                                     ▼
//!        │                               ┌───────────┐     ┌───────────┐
//!        └── transaction created ───────▶│ pipeline  │────▶│blockchain │
//!                                        │ (queue +  │     │settlement │
//!                                        │  workers) │◀────│ (retries) │
//!                                        └─────┬─────┘     └───────────┘
//!                                              │ terminal state
//!                         ┌────────────────────┼────────────────────┐
//!                         ▼                    ▼                    ▼
//!                      ledger              cache commit          notify
//!                    (store/)             (invalidate +       (feeds, email,
//!                                          accumulator)        admin alerts)
//!                                              │                    │
//!                                              └──────▶ realtime ◀──┘
//!                                                    (websocket push)
//! ```

// Core subsystems
pub mod cache;
pub mod config;
pub mod http;
pub mod pipeline;
pub mod store;
pub mod validation;

// Collaborating services
pub mod blockchain;
pub mod notify;
pub mod realtime;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::GatewayConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
