//! Notification Dispatcher subsystem.

pub mod delivery;
pub mod dispatcher;
pub mod types;

pub use dispatcher::{DispatchError, NotificationDispatcher};
pub use types::{Notification, NotificationEvent};
