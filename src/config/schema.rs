//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the poller.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service poller.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PollerConfig {
    /// Tick scheduling.
    pub poller: ScheduleConfig,

    /// Per-service circuit breaker policy.
    pub breaker: BreakerConfig,

    /// Health probe settings.
    pub probe: ProbeConfig,

    /// Status fan-out queues.
    pub fanout: FanoutConfig,

    /// Service store location.
    pub storage: StorageConfig,

    /// Management API and realtime feed.
    pub api: ApiConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Tick scheduling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Poll interval in milliseconds.
    pub interval_ms: u64,

    /// Upper bound on probes in flight across all ticks.
    pub max_concurrent_probes: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            max_concurrent_probes: 64,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Time the breaker stays open before a trial probe, in milliseconds.
    pub open_cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_cooldown_ms: 2000,
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Deadline for a single probe in milliseconds.
    pub timeout_ms: u64,

    /// User-Agent header sent with every probe.
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            user_agent: "service-poller-health-check".to_string(),
        }
    }
}

/// Fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Capacity of each consumer's queue. Events beyond it are dropped.
    pub queue_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Service store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file backing the store. In-memory only when unset.
    pub path: Option<String>,

    /// How often status changes are flushed to the file.
    pub flush_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            flush_interval_ms: 1000,
        }
    }
}

/// Management API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Serve the management API and the realtime feed.
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:8090").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8090".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
