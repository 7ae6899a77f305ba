//! HTTP surface of the poller.
//!
//! # Data Flow
//! ```text
//! client request
//!     → server.rs (Axum router, middleware)
//!     → handlers.rs (service CRUD, breaker and status views)
//!     → websocket.rs (realtime status feed)
//! ```

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::{ApiServer, AppState};
