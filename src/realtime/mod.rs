//! Realtime Broadcaster subsystem.

pub mod broadcaster;
pub mod ws;

pub use broadcaster::{Broadcaster, ConnectionId, ADMIN_ALERT, TRANSACTION_UPDATE};
