//! Status fan-out subsystem.
//!
//! # Data Flow
//! ```text
//! Poll scheduler
//!     → StatusFanout::publish (never blocks)
//!     → one bounded queue per consumer
//!         → persister.rs (durable status write)
//!         → relay.rs (realtime subscribers)
//! ```
//!
//! # Design Decisions
//! - Independent queue per consumer; a slow consumer only loses its own events
//! - At-most-once: full queues drop, absent consumers miss events
//! - Consumer list is swapped atomically; publish takes no lock

pub mod event;
pub mod persister;
pub mod relay;

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::observability::metrics;

pub use event::{ProbeOutcome, StatusEvent};
pub use persister::StatusPersister;
pub use relay::{BroadcastSink, NotificationRelay, SinkError, StatusSink};

/// Receiving side of one consumer's queue.
pub type EventReceiver = mpsc::Receiver<Arc<StatusEvent>>;

#[derive(Debug)]
struct Consumer {
    name: String,
    tx: mpsc::Sender<Arc<StatusEvent>>,
}

/// Broadcast point for status events.
#[derive(Clone)]
pub struct StatusFanout {
    consumers: Arc<ArcSwap<Vec<Arc<Consumer>>>>,
    queue_capacity: usize,
}

impl StatusFanout {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            consumers: Arc::new(ArcSwap::from_pointee(Vec::new())),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a consumer. It receives events published from now on.
    pub fn subscribe(&self, name: impl Into<String>) -> EventReceiver {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let consumer = Arc::new(Consumer {
            name: name.into(),
            tx,
        });
        tracing::debug!(consumer = %consumer.name, "Fan-out consumer subscribed");
        self.consumers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(consumer.clone());
            next
        });
        rx
    }

    /// Deliver `event` to every consumer without waiting.
    ///
    /// Returns the number of consumers the event was queued for.
    pub fn publish(&self, event: StatusEvent) -> usize {
        let event = Arc::new(event);
        let consumers = self.consumers.load();
        let mut delivered = 0;
        let mut saw_closed = false;

        for consumer in consumers.iter() {
            match consumer.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        consumer = %consumer.name,
                        service_id = event.service_id(),
                        "Consumer queue full, dropping status event"
                    );
                    metrics::record_fanout_dropped(&consumer.name);
                }
                Err(TrySendError::Closed(_)) => saw_closed = true,
            }
        }

        if saw_closed {
            self.consumers.rcu(|current| {
                current
                    .iter()
                    .filter(|c| !c.tx.is_closed())
                    .cloned()
                    .collect::<Vec<_>>()
            });
        }
        delivered
    }

    /// Number of live consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers.load().iter().filter(|c| !c.tx.is_closed()).count()
    }
}
