//! Service registry boundary.
//!
//! # Data Flow
//! ```text
//! Poll scheduler   → get_all_services() (fresh snapshot every tick)
//! Status persister → update_status()    (conditional on observation time)
//! Management API   → ServiceStore CRUD
//! ```
//!
//! # Design Decisions
//! - The core only depends on the `ServiceRegistry` trait
//! - Status writes are conditional: an older observation never overwrites a newer one
//! - `ServiceStore` is the bundled implementation (DashMap + JSON file)

pub mod store;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use store::ServiceStore;
pub use types::{RegistryError, RegistryResult, Service, ServiceId, ServiceStatus, StatusUpdate};

/// Read/write access to the registered services.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// All registered services, ordered by id.
    async fn get_all_services(&self) -> RegistryResult<Vec<Service>>;

    /// Store `status` for `id` unless a newer observation is already stored.
    async fn update_status(
        &self,
        id: ServiceId,
        status: ServiceStatus,
        observed_at: DateTime<Utc>,
    ) -> RegistryResult<StatusUpdate>;
}
