//! Registry data model and error definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Identity assigned to a service by the registry.
pub type ServiceId = i64;

/// Health classification of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Ok,
    Fail,
    #[default]
    Unknown,
}

impl ServiceStatus {
    /// Wire representation used by probes and the fan-out payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Ok => "OK",
            ServiceStatus::Fail => "FAIL",
            ServiceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored backend service.
///
/// Serializes to the fan-out wire schema:
/// `{id, name, url, createdDate, currentStatus}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    /// Health-check target.
    #[serde(rename = "url")]
    pub endpoint: Url,
    pub created_date: DateTime<Utc>,
    pub current_status: ServiceStatus,
}

/// Outcome of a conditional status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The stored status now reflects the write.
    Applied,
    /// A newer observation is already stored; the write was discarded.
    Stale,
    /// No service with that id exists (deleted concurrently).
    Missing,
}

/// Errors raised by registry storage.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be encoded or decoded.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The storage backend is not reachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_wire_format() {
        let service = Service {
            id: 1,
            name: "Service A".into(),
            endpoint: Url::parse("http://localhost:9090/health").unwrap(),
            created_date: DateTime::parse_from_rfc3339("2021-07-14T17:45:55Z")
                .unwrap()
                .with_timezone(&Utc),
            current_status: ServiceStatus::Ok,
        };

        let json = serde_json::to_value(&service).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["name"], "Service A");
        assert_eq!(json["url"], "http://localhost:9090/health");
        assert_eq!(json["currentStatus"], "OK");
        assert!(json.get("createdDate").is_some());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ServiceStatus::Fail.to_string(), "FAIL");
        assert_eq!(ServiceStatus::default(), ServiceStatus::Unknown);
        let parsed: ServiceStatus = serde_json::from_str("\"UNKNOWN\"").unwrap();
        assert_eq!(parsed, ServiceStatus::Unknown);
    }
}
