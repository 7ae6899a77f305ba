//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Probe for service N:
//!     → BreakerBank::breaker(N)
//!     → CircuitBreaker::call (admit, run, record outcome)
//! ```
//!
//! # Design Decisions
//! - Breaker state is in-memory and per process; it is not persisted
//! - Breaker tracks reachability, not reported health

pub mod circuit_breaker;

pub use circuit_breaker::{
    BreakerBank, BreakerError, BreakerSettings, BreakerSnapshot, CircuitBreaker, CircuitState,
};
