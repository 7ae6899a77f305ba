//! Polling pipeline.
//!
//! # Data Flow
//! ```text
//! interval tick
//!     → registry.get_all_services()
//!     → per service (concurrent, bounded):
//!         breaker bank → probe executor → verdict
//!     → StatusEvent → fan-out
//! ```

pub mod scheduler;

pub use scheduler::{PollScheduler, TickSummary};
