//! Circuit breaker for service protection.
//!
//! # States
//! - Closed: normal operation, probes pass through
//! - Open: service assumed down, probes fail fast without a network call
//! - Half-Open: one trial probe tests whether the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: first call after open_cooldown has elapsed
//! Half-Open → Closed: trial probe succeeds
//! Half-Open → Open: trial probe fails (openedAt reset)
//! ```
//!
//! # Design Decisions
//! - Per-service breaker keyed by service id (not endpoint)
//! - Lock per breaker; the bank itself is a concurrent map
//! - Single trial in Half-Open; concurrent callers fail fast
//! - A trial that is dropped before it settles counts as a failure

use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::registry::ServiceId;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker policy.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Time an open breaker rejects calls before allowing a trial.
    pub open_cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_cooldown: Duration::from_millis(2000),
        }
    }
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            open_cooldown: Duration::from_millis(config.open_cooldown_ms),
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call; the operation was not started.
    #[error("circuit open")]
    Open,

    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub service_id: ServiceId,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Milliseconds since the breaker last opened, if it has.
    pub opened_ms_ago: Option<u64>,
    #[serde(skip)]
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Failure-isolation state machine for one service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service_id: ServiceId,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(service_id: ServiceId, settings: BreakerSettings) -> Self {
        Self {
            service_id,
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` through the breaker.
    ///
    /// `op` is only invoked when the breaker admits the call.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire().ok_or(BreakerError::Open)?;
        if permit.is_trial() {
            tracing::debug!(service_id = self.service_id, "Admitting half-open trial call");
        }
        match op().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) => {
                permit.fail();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Ask for admission. `None` means the call must fail fast.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(Permit::new(self, false)),
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.settings.open_cooldown);
                if !cooled_down {
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                Some(Permit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                Some(Permit::new(self, true))
            }
        }
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            // Late result of a call admitted before the breaker opened.
            _ => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.settings.failure_threshold {
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.trial_in_flight = false;
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        match to {
            CircuitState::Open => tracing::warn!(
                service_id = self.service_id,
                from = from.as_str(),
                failures = inner.consecutive_failures,
                "Circuit opened"
            ),
            _ => tracing::info!(
                service_id = self.service_id,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit state changed"
            ),
        }
        metrics::record_breaker_transition(to.as_str());
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            service_id: self.service_id,
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_ms_ago: inner.opened_at.map(|at| at.elapsed().as_millis() as u64),
            opened_at: inner.opened_at,
        }
    }
}

/// Admission granted by a breaker.
///
/// Must be settled with [`Permit::succeed`] or [`Permit::fail`]; dropping it
/// unsettled records a failure.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// True when this call is the Half-Open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_failure(self.trial);
        }
    }
}

/// One breaker per service id, created on first use.
#[derive(Debug)]
pub struct BreakerBank {
    breakers: DashMap<ServiceId, Arc<CircuitBreaker>>,
    settings: BreakerSettings,
}

impl BreakerBank {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
        }
    }

    /// Breaker for `id`, creating a closed one if none exists yet.
    pub fn breaker(&self, id: ServiceId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(id)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(id, self.settings.clone())))
            .value()
            .clone()
    }

    /// Snapshots of all breakers, ordered by service id.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|r| r.value().snapshot()).collect();
        snapshots.sort_by_key(|s| s.service_id);
        snapshots
    }
}
