//! Service health poller library.
//!
//! ```text
//!     registry ──▶ poller (tick) ──▶ resilience (breaker) ──▶ health (probe)
//!                       │
//!                       ▼
//!                    fanout ──▶ persister ──▶ registry
//!                       └────▶ relay ──▶ /events websocket
//! ```

// Core pipeline
pub mod fanout;
pub mod health;
pub mod poller;
pub mod registry;
pub mod resilience;

// Surfaces
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::PollerConfig;
pub use lifecycle::{start, RunningPoller, Shutdown};
