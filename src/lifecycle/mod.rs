//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Open store → Breakers + fan-out → Consumers → Scheduler → API listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop ticking → Drain consumers → Persist store
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Consumers subscribe before the scheduler starts (no lost first tick)
//! - Listener binds last, traffic only when the pipeline is running

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, RunningPoller, StartupError};
