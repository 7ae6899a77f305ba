//! Status event emitted once per probe attempt.

use chrono::{DateTime, Utc};

use crate::registry::{Service, ServiceId, ServiceStatus};

/// How a probe attempt produced its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The service answered with a well-formed `OK` or `FAIL`.
    Verdict,
    /// The breaker was open; no network call was made.
    ShortCircuited,
    /// The probe failed; carries the `ProbeError::kind` label.
    Failed(&'static str),
}

impl ProbeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Verdict => "verdict",
            ProbeOutcome::ShortCircuited => "short_circuited",
            ProbeOutcome::Failed(kind) => kind,
        }
    }
}

/// Result of one probe attempt, handed to every fan-out consumer.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    /// Sequence number of the tick that produced the event.
    pub tick: u64,
    /// Start of the tick that produced the event. Later ticks always carry
    /// a later instant, however long an individual probe takes.
    pub observed_at: DateTime<Utc>,
    /// Registry snapshot with `current_status` set to the verdict.
    pub service: Service,
    pub outcome: ProbeOutcome,
}

impl StatusEvent {
    pub fn new(
        tick: u64,
        observed_at: DateTime<Utc>,
        mut service: Service,
        status: ServiceStatus,
        outcome: ProbeOutcome,
    ) -> Self {
        service.current_status = status;
        Self {
            tick,
            observed_at,
            service,
            outcome,
        }
    }

    pub fn service_id(&self) -> ServiceId {
        self.service.id
    }

    pub fn status(&self) -> ServiceStatus {
        self.service.current_status
    }
}
