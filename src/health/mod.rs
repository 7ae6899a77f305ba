//! Health probing subsystem.
//!
//! # Data Flow
//! ```text
//! Poll scheduler
//!     → circuit breaker admits the call
//!     → probe::execute (endpoint validation + deadline)
//!     → HealthProbe::probe (HTTP GET)
//!     → verdict or ProbeError
//! ```
//!
//! # Design Decisions
//! - Probes are stateless; breaker state lives in `resilience`
//! - A `FAIL` body is a verdict, not an error
//! - Every probe has a deadline

pub mod probe;

pub use probe::{HealthProbe, HttpProbe, ProbeError};
