//! Concurrent service store with optional JSON file persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{self, MissedTickBehavior};
use url::Url;

use crate::registry::types::{
    RegistryResult, Service, ServiceId, ServiceStatus, StatusUpdate,
};
use crate::registry::ServiceRegistry;

/// A service row plus the time its status was last observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredService {
    #[serde(flatten)]
    service: Service,
    #[serde(default)]
    status_observed_at: Option<DateTime<Utc>>,
}

/// Thread-safe registry of monitored services.
///
/// CRUD mutations are written through to the backing file (when configured)
/// by replacing it atomically. Status writes only mark the store dirty and are
/// flushed by [`ServiceStore::run_flusher`] or an explicit [`ServiceStore::persist`].
#[derive(Clone)]
pub struct ServiceStore {
    inner: Arc<DashMap<ServiceId, StoredService>>,
    next_id: Arc<AtomicI64>,
    persistence_path: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
    dirty: Arc<AtomicBool>,
}

impl ServiceStore {
    /// Create an empty store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
            persistence_path,
            write_lock: Arc::new(Mutex::new(())),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a store, loading existing rows from `path` if the file exists.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let content = std::fs::read(path)?;
            let rows: Vec<StoredService> = serde_json::from_slice(&content)?;
            let mut max_id = 0;
            for row in rows {
                max_id = max_id.max(row.service.id);
                store.inner.insert(row.service.id, row);
            }
            store.next_id.store(max_id + 1, Ordering::SeqCst);
            tracing::info!(count = store.inner.len(), path = ?path, "Loaded services from store file");
        }
        Ok(store)
    }

    /// True when the store is backed by a file.
    pub fn is_persistent(&self) -> bool {
        self.persistence_path.is_some()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Look up one service.
    pub fn get(&self, id: ServiceId) -> Option<Service> {
        self.inner.get(&id).map(|r| r.value().service.clone())
    }

    /// Register a new service with status `UNKNOWN`.
    pub async fn insert(&self, name: String, endpoint: Url) -> RegistryResult<Service> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let service = Service {
            id,
            name,
            endpoint,
            created_date: Utc::now(),
            current_status: ServiceStatus::Unknown,
        };
        self.inner.insert(id, StoredService {
            service: service.clone(),
            status_observed_at: None,
        });
        tracing::debug!(id, name = %service.name, "Service inserted");
        self.persist().await?;
        Ok(service)
    }

    /// Change name and endpoint of an existing service.
    ///
    /// The id is kept, so the service's breaker history carries over.
    pub async fn update(&self, id: ServiceId, name: String, endpoint: Url) -> RegistryResult<bool> {
        let updated = match self.inner.get_mut(&id) {
            Some(mut row) => {
                row.service.name = name;
                row.service.endpoint = endpoint;
                true
            }
            None => false,
        };
        if updated {
            self.persist().await?;
        }
        Ok(updated)
    }

    /// Remove a service. Returns false if it did not exist.
    pub async fn delete(&self, id: ServiceId) -> RegistryResult<bool> {
        let removed = self.inner.remove(&id).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Write the current contents to the backing file.
    pub async fn persist(&self) -> RegistryResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        // Cleared before the snapshot so later status writes mark it again.
        self.dirty.store(false, Ordering::SeqCst);
        let mut rows: Vec<StoredService> = self.inner.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|r| r.service.id);
        let content = serde_json::to_vec_pretty(&rows)?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Write the file only if a status changed since the last write.
    pub async fn flush_if_dirty(&self) -> RegistryResult<bool> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.persist().await?;
        Ok(true)
    }

    /// Flush pending status changes every `period` until shutdown.
    pub async fn run_flusher(self, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush_if_dirty().await {
                        tracing::error!(error = %e, "Failed to flush service store");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}

#[async_trait]
impl ServiceRegistry for ServiceStore {
    async fn get_all_services(&self) -> RegistryResult<Vec<Service>> {
        let mut services: Vec<Service> = self.inner.iter().map(|r| r.value().service.clone()).collect();
        services.sort_by_key(|s| s.id);
        Ok(services)
    }

    async fn update_status(
        &self,
        id: ServiceId,
        status: ServiceStatus,
        observed_at: DateTime<Utc>,
    ) -> RegistryResult<StatusUpdate> {
        let outcome = match self.inner.get_mut(&id) {
            None => StatusUpdate::Missing,
            Some(mut row) => match row.status_observed_at {
                Some(stored) if observed_at < stored => StatusUpdate::Stale,
                _ => {
                    row.service.current_status = status;
                    row.status_observed_at = Some(observed_at);
                    StatusUpdate::Applied
                }
            },
        };

        if outcome == StatusUpdate::Applied {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}
