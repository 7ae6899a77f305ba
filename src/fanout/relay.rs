//! Notification relay.
//!
//! Forwards each event's service payload, unchanged, to a realtime sink.
//!
//! # Data Flow
//! ```text
//! fan-out queue → NotificationRelay → StatusSink::deliver
//!                                   → BroadcastSink → WebSocket subscribers
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::fanout::{EventReceiver, StatusEvent};
use crate::registry::Service;

/// Errors raised by a realtime sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// External realtime subscription boundary.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn deliver(&self, payload: &Service) -> Result<(), SinkError>;
}

/// Sink that publishes JSON payloads on a tokio broadcast channel.
///
/// Each WebSocket connection holds its own receiver.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Arc<str>>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl StatusSink for BroadcastSink {
    async fn deliver(&self, payload: &Service) -> Result<(), SinkError> {
        let json: Arc<str> = serde_json::to_string(payload)?.into();
        // No connected subscriber is not an error.
        if self.tx.send(json).is_err() {
            tracing::trace!(service_id = payload.id, "No realtime subscribers connected");
        }
        Ok(())
    }
}

/// Fan-out consumer that feeds a [`StatusSink`].
pub struct NotificationRelay {
    sink: Arc<dyn StatusSink>,
}

impl NotificationRelay {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    async fn relay(&self, event: &StatusEvent) {
        if let Err(e) = self.sink.deliver(&event.service).await {
            tracing::warn!(service_id = event.service_id(), error = %e, "Failed to relay status update");
        }
    }

    /// Consume events until the queue closes or shutdown is signalled.
    ///
    /// On shutdown, events already queued are still delivered.
    pub async fn run(self, mut events: EventReceiver, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Notification relay started");
        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { break };
                    self.relay(&event).await;
                }
                _ = shutdown.recv() => {
                    while let Ok(event) = events.try_recv() {
                        self.relay(&event).await;
                    }
                    tracing::info!("Notification relay received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
