//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the service store
//! - Initialize breakers, fan-out and its consumers in dependency order
//! - Start the poll scheduler
//! - Bind the management API listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::PollerConfig;
use crate::fanout::{BroadcastSink, NotificationRelay, StatusFanout, StatusPersister};
use crate::health::HttpProbe;
use crate::http::{ApiServer, AppState};
use crate::lifecycle::Shutdown;
use crate::poller::PollScheduler;
use crate::registry::{RegistryError, ServiceStore};
use crate::resilience::{BreakerBank, BreakerSettings};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open service store: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to bind API listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Handles to a running poller.
pub struct RunningPoller {
    pub store: ServiceStore,
    pub api_addr: Option<SocketAddr>,
    /// Stops the scheduler, its ticks, the API server and the store flusher.
    producers: Shutdown,
    /// Stops the fan-out consumers once nothing can publish anymore.
    consumers: Shutdown,
    producer_tasks: Vec<JoinHandle<()>>,
    consumer_tasks: Vec<JoinHandle<()>>,
}

impl RunningPoller {
    /// Stop in order: producers first, then consumers, then flush the store.
    pub async fn stop(self) -> Result<(), RegistryError> {
        self.producers.trigger();
        join_all(self.producer_tasks).await;

        // In-flight ticks have finished; whatever they published is queued.
        self.consumers.trigger();
        join_all(self.consumer_tasks).await;

        self.store.persist().await?;
        tracing::info!("Poller stopped");
        Ok(())
    }
}

async fn join_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task ended abnormally");
        }
    }
}

/// Build and start every subsystem.
pub async fn start(config: PollerConfig) -> Result<RunningPoller, StartupError> {
    let store = match config.storage.path.as_deref() {
        Some(path) => ServiceStore::open(Path::new(path))?,
        None => ServiceStore::new(None),
    };
    tracing::info!(services = store.len(), "Service store ready");

    let producers = Shutdown::new();
    let consumers = Shutdown::new();
    let breakers = Arc::new(BreakerBank::new(BreakerSettings::from(&config.breaker)));
    let fanout = StatusFanout::new(config.fanout.queue_capacity);
    let sink = BroadcastSink::new(config.fanout.queue_capacity);
    let mut producer_tasks = Vec::new();
    let mut consumer_tasks = Vec::new();

    let persister = StatusPersister::new(Arc::new(store.clone()));
    consumer_tasks.push(tokio::spawn(
        persister.run(fanout.subscribe("persister"), consumers.subscribe()),
    ));

    let relay = NotificationRelay::new(Arc::new(sink.clone()));
    consumer_tasks.push(tokio::spawn(
        relay.run(fanout.subscribe("relay"), consumers.subscribe()),
    ));

    if store.is_persistent() {
        let flush_every = Duration::from_millis(config.storage.flush_interval_ms);
        producer_tasks.push(tokio::spawn(
            store.clone().run_flusher(flush_every, producers.subscribe()),
        ));
    }

    let scheduler = Arc::new(PollScheduler::new(
        Arc::new(store.clone()),
        Arc::new(HttpProbe::new(config.probe.user_agent.clone())),
        breakers.clone(),
        fanout,
        &config,
    ));
    producer_tasks.push(tokio::spawn(scheduler.run(producers.subscribe())));

    let mut api_addr = None;
    if config.api.enabled {
        let listener = TcpListener::bind(&config.api.bind_address).await?;
        api_addr = Some(listener.local_addr()?);

        let state = AppState {
            store: store.clone(),
            breakers,
            sink,
        };
        let server = ApiServer::new(&config.api, state);
        let shutdown_rx = producers.subscribe();
        producer_tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(listener, shutdown_rx).await {
                tracing::error!(error = %e, "API server failed");
            }
        }));
    }

    Ok(RunningPoller {
        store,
        api_addr,
        producers,
        consumers,
        producer_tasks,
        consumer_tasks,
    })
}
