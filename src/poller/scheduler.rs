//! Poll scheduler.
//!
//! # Responsibilities
//! - Fire a tick on a fixed interval
//! - Read a fresh service list from the registry every tick
//! - Probe every service concurrently through its breaker
//! - Publish exactly one status event per service per tick
//!
//! # Design Decisions
//! - Ticks run as independent tasks; a slow tick never delays the next one
//! - In-flight probes from an earlier tick are never cancelled
//! - A process-wide semaphore bounds probes in flight across all ticks
//! - The probe deadline covers the wait for a semaphore permit
//! - Events are stamped with the tick start, so a slow probe from an older
//!   tick never outranks a newer tick at the store
//! - A registry read failure skips the tick; nothing is retried mid-interval

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};

use crate::config::PollerConfig;
use crate::fanout::{ProbeOutcome, StatusEvent, StatusFanout};
use crate::health::probe::{self, HealthProbe, ProbeError};
use crate::observability::metrics;
use crate::registry::{RegistryError, Service, ServiceRegistry, ServiceStatus};
use crate::resilience::{BreakerBank, BreakerError};

/// Counts for one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick sequence number.
    pub tick: u64,
    /// Services read from the registry (= events published).
    pub services: usize,
    pub ok: usize,
    pub failed: usize,
    /// Failures that never reached the network because the breaker was open.
    pub short_circuited: usize,
}

/// Time-driven driver of the polling pipeline.
pub struct PollScheduler {
    registry: Arc<dyn ServiceRegistry>,
    probe: Arc<dyn HealthProbe>,
    breakers: Arc<BreakerBank>,
    fanout: StatusFanout,
    interval: Duration,
    probe_timeout: Duration,
    limiter: Arc<Semaphore>,
    tick_seq: AtomicU64,
}

impl PollScheduler {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        probe: Arc<dyn HealthProbe>,
        breakers: Arc<BreakerBank>,
        fanout: StatusFanout,
        config: &PollerConfig,
    ) -> Self {
        Self {
            registry,
            probe,
            breakers,
            fanout,
            interval: Duration::from_millis(config.poller.interval_ms),
            probe_timeout: Duration::from_millis(config.probe.timeout_ms),
            limiter: Arc::new(Semaphore::new(config.poller.max_concurrent_probes.max(1))),
            tick_seq: AtomicU64::new(0),
        }
    }

    pub fn breakers(&self) -> &Arc<BreakerBank> {
        &self.breakers
    }

    /// Tick until shutdown is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            max_concurrent_probes = self.limiter.available_permits(),
            "Poll scheduler starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while in_flight.try_join_next().is_some() {}
                    let scheduler = self.clone();
                    in_flight.spawn(async move {
                        // Errors are logged inside run_tick.
                        let _ = scheduler.run_tick().await;
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!(
                        in_flight = in_flight.len(),
                        "Poll scheduler received shutdown signal, draining ticks"
                    );
                    break;
                }
            }
        }

        // Every probe is bounded by the deadline, so draining terminates.
        while in_flight.join_next().await.is_some() {}
        tracing::info!("Poll scheduler stopped");
    }

    /// Run one tick to completion.
    pub async fn run_tick(&self) -> Result<TickSummary, RegistryError> {
        let tick = self.tick_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let start = Instant::now();
        let observed_at = Utc::now();

        let services = match self.registry.get_all_services().await {
            Ok(services) => services,
            Err(e) => {
                tracing::warn!(tick, error = %e, "Registry read failed, skipping tick");
                metrics::record_tick("registry_error", start);
                return Err(e);
            }
        };

        tracing::debug!(tick, services = services.len(), "Tick started");
        let mut summary = TickSummary {
            tick,
            services: services.len(),
            ..TickSummary::default()
        };

        let mut polls: FuturesUnordered<_> = services
            .into_iter()
            .map(|service| self.poll_service(tick, observed_at, service))
            .collect();

        while let Some((status, outcome)) = polls.next().await {
            match (status, outcome) {
                (_, ProbeOutcome::ShortCircuited) => summary.short_circuited += 1,
                (ServiceStatus::Ok, _) => summary.ok += 1,
                _ => summary.failed += 1,
            }
        }

        metrics::record_tick("ok", start);
        tracing::debug!(
            tick,
            ok = summary.ok,
            failed = summary.failed,
            short_circuited = summary.short_circuited,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tick completed"
        );
        Ok(summary)
    }

    /// Probe one service and publish its event. Never fails.
    async fn poll_service(
        &self,
        tick: u64,
        observed_at: DateTime<Utc>,
        service: Service,
    ) -> (ServiceStatus, ProbeOutcome) {
        let breaker = self.breakers.breaker(service.id);
        let limiter = &self.limiter;
        let health_probe = self.probe.as_ref();
        let endpoint = &service.endpoint;
        let deadline = self.probe_timeout;

        let result = breaker
            .call(move || async move {
                let attempt = async {
                    // The semaphore is never closed, so acquire cannot fail.
                    let _permit = limiter.acquire().await.ok();
                    probe::execute(health_probe, endpoint, deadline).await
                };
                time::timeout(deadline, attempt)
                    .await
                    .unwrap_or_else(|_| Err(ProbeError::Timeout(deadline)))
            })
            .await;

        let (status, outcome) = match result {
            Ok(verdict) => {
                tracing::debug!(service_id = service.id, verdict = %verdict, "Probe completed");
                (verdict, ProbeOutcome::Verdict)
            }
            Err(BreakerError::Open) => {
                tracing::debug!(service_id = service.id, "Circuit open, probe short-circuited");
                (ServiceStatus::Fail, ProbeOutcome::ShortCircuited)
            }
            Err(BreakerError::Inner(e)) => {
                log_probe_error(&service, &e);
                (ServiceStatus::Fail, ProbeOutcome::Failed(e.kind()))
            }
        };

        metrics::record_probe_result(status.as_str(), outcome.label());
        self.fanout.publish(StatusEvent::new(tick, observed_at, service, status, outcome));
        (status, outcome)
    }
}

fn log_probe_error(service: &Service, error: &ProbeError) {
    let url = service.endpoint.as_str();
    match error {
        ProbeError::UnhealthyStatus(code) => {
            tracing::info!(service_id = service.id, url, status = code, "Service reported unhealthy status code")
        }
        ProbeError::Protocol(body) => {
            tracing::warn!(service_id = service.id, url, body = %body, "Malformed health response")
        }
        ProbeError::InvalidEndpoint { reason, .. } => {
            tracing::error!(service_id = service.id, url, reason, "Service endpoint cannot be probed")
        }
        ProbeError::Transport(_) | ProbeError::Timeout(_) => {
            tracing::warn!(service_id = service.id, url, error = %error, "Service unreachable")
        }
    }
}
