//! HTTP surface: the boundary to out-of-scope routing and UI layers.

pub mod handlers;
pub mod response;
pub mod server;

pub use response::ApiError;
pub use server::{AppState, HttpServer};
