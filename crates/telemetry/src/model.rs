//! Data model for generation health: counters, error log, probe reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of entries kept in [`HealthStatus::error_log`].
pub const ERROR_LOG_CAPACITY: usize = 10;

/// Consecutive terminal failures at which the orchestrator reports unhealthy.
pub const UNHEALTHY_AFTER: u32 = 3;

/// One terminal failure, as remembered by the error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    /// The consecutive-failure count right after this failure.
    pub consecutive_failures: u32,
}

/// Snapshot of aggregate generation health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub consecutive_failures: u32,
    /// Running mean over successful requests only, in milliseconds.
    pub average_response_time_ms: f64,
    /// Oldest first, at most [`ERROR_LOG_CAPACITY`] entries.
    pub error_log: Vec<ErrorLogEntry>,
    pub is_healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl HealthStatus {
    /// Share of requests that succeeded, in `[0, 1]`. `1.0` before any traffic.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}

/// Outcome of an active health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthReport {
    Healthy { model: String, response_time_ms: u64 },
    Unhealthy { model: String, error: String },
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}
