//! Status persister.
//!
//! Writes each event's verdict into the registry. Failures are logged and
//! dropped; the next tick produces a fresh event.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::fanout::{EventReceiver, StatusEvent};
use crate::observability::metrics;
use crate::registry::{RegistryError, ServiceRegistry, StatusUpdate};

/// Fan-out consumer that keeps the registry's stored status current.
pub struct StatusPersister {
    registry: Arc<dyn ServiceRegistry>,
}

impl StatusPersister {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Persist one event.
    pub async fn handle(&self, event: &StatusEvent) -> Result<StatusUpdate, RegistryError> {
        let id = event.service_id();
        let status = event.status();

        match self.registry.update_status(id, status, event.observed_at).await {
            Ok(StatusUpdate::Applied) => {
                tracing::debug!(service_id = id, status = %status, tick = event.tick, "Service status stored");
                metrics::record_persist("applied");
                Ok(StatusUpdate::Applied)
            }
            Ok(StatusUpdate::Stale) => {
                tracing::debug!(service_id = id, tick = event.tick, "Discarded stale status write");
                metrics::record_persist("stale");
                Ok(StatusUpdate::Stale)
            }
            Ok(StatusUpdate::Missing) => {
                tracing::warn!(service_id = id, "Service no longer exists, status not stored");
                metrics::record_persist("missing");
                Ok(StatusUpdate::Missing)
            }
            Err(e) => {
                tracing::error!(service_id = id, status = %status, error = %e, "Failed to store service status");
                metrics::record_persist("error");
                Err(e)
            }
        }
    }

    /// Consume events until the queue closes or shutdown is signalled.
    ///
    /// On shutdown, events already queued are still written.
    pub async fn run(self, mut events: EventReceiver, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Status persister started");
        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { break };
                    // Errors are already logged; nothing is retried.
                    let _ = self.handle(&event).await;
                }
                _ = shutdown.recv() => {
                    let mut drained = 0usize;
                    while let Ok(event) = events.try_recv() {
                        let _ = self.handle(&event).await;
                        drained += 1;
                    }
                    tracing::info!(drained, "Status persister received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
