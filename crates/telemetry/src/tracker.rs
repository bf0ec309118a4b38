//! Thread-safe health tracker shared by every generation task.
//!
//! Each update takes the lock once and finishes synchronously; callers must
//! never hold it across an `.await`.

use crate::model::*;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Accumulates passive (real traffic) and active (probe) health signals.
#[derive(Debug, Default)]
pub struct HealthTracker {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    total_requests: u64,
    successful_requests: u64,
    consecutive_failures: u32,
    average_response_time_ms: f64,
    error_log: VecDeque<ErrorLogEntry>,
    last_success_at: Option<chrono::DateTime<Utc>>,
    last_failure_at: Option<chrono::DateTime<Utc>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful request and fold its latency into the running mean.
    pub fn record_success(&self, response_time: Duration) {
        let ms = response_time.as_secs_f64() * 1000.0;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        state.total_requests += 1;
        state.successful_requests += 1;
        state.consecutive_failures = 0;
        let n = state.successful_requests as f64;
        state.average_response_time_ms += (ms - state.average_response_time_ms) / n;
        state.last_success_at = Some(Utc::now());
    }

    /// Record a terminal failure (retry budget exhausted or non-retryable).
    pub fn record_failure(&self, error: impl Into<String>) {
        let error = error.into();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        state.total_requests += 1;
        state.consecutive_failures += 1;
        let now = Utc::now();
        state.last_failure_at = Some(now);

        if state.error_log.len() == ERROR_LOG_CAPACITY {
            state.error_log.pop_front();
        }
        let consecutive_failures = state.consecutive_failures;
        state.error_log.push_back(ErrorLogEntry {
            timestamp: now,
            error,
            consecutive_failures,
        });

        if consecutive_failures == UNHEALTHY_AFTER {
            tracing::warn!(consecutive_failures, "Generation marked unhealthy");
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .consecutive_failures
            < UNHEALTHY_AFTER
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> HealthStatus {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        HealthStatus {
            total_requests: state.total_requests,
            successful_requests: state.successful_requests,
            consecutive_failures: state.consecutive_failures,
            average_response_time_ms: state.average_response_time_ms,
            error_log: state.error_log.iter().cloned().collect(),
            is_healthy: state.consecutive_failures < UNHEALTHY_AFTER,
            last_success_at: state.last_success_at,
            last_failure_at: state.last_failure_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fresh_tracker_is_healthy() {
        let tracker = HealthTracker::new();
        let status = tracker.snapshot();
        assert!(status.is_healthy);
        assert_eq!(status.total_requests, 0);
        assert_eq!(status.success_rate(), 1.0);
        assert!(status.error_log.is_empty());
    }

    #[test]
    fn health_accounting_mixed_outcomes() {
        let tracker = HealthTracker::new();
        tracker.record_success(Duration::from_millis(100));
        tracker.record_success(Duration::from_millis(300));
        tracker.record_failure("all models failed");

        let status = tracker.snapshot();
        assert_eq!(status.total_requests, 3);
        assert_eq!(status.successful_requests, 2);
        assert!((status.average_response_time_ms - 200.0).abs() < 1e-9);
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.is_healthy);
        assert!(status.last_success_at.is_some());
        assert!(status.last_failure_at.is_some());
    }

    #[test]
    fn failures_do_not_move_the_average() {
        let tracker = HealthTracker::new();
        tracker.record_success(Duration::from_millis(50));
        tracker.record_failure("boom");
        tracker.record_failure("boom");
        assert!((tracker.snapshot().average_response_time_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unhealthy_after_three_consecutive_failures() {
        let tracker = HealthTracker::new();
        tracker.record_failure("one");
        tracker.record_failure("two");
        assert!(tracker.is_healthy());
        tracker.record_failure("three");
        assert!(!tracker.is_healthy());
        assert!(!tracker.snapshot().is_healthy);

        tracker.record_success(Duration::from_millis(10));
        assert!(tracker.is_healthy());
        assert_eq!(tracker.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn error_log_keeps_ten_most_recent_in_order() {
        let tracker = HealthTracker::new();
        for i in 0..15 {
            tracker.record_failure(format!("failure {i}"));
        }

        let log = tracker.snapshot().error_log;
        assert_eq!(log.len(), ERROR_LOG_CAPACITY);
        assert_eq!(log[0].error, "failure 5");
        assert_eq!(log[9].error, "failure 14");
        assert_eq!(log[0].consecutive_failures, 6);
        assert_eq!(log[9].consecutive_failures, 15);
    }

    #[test]
    fn status_serializes_to_json() {
        let tracker = HealthTracker::new();
        tracker.record_failure("timeout");
        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json["consecutive_failures"], 1);
        assert_eq!(json["error_log"][0]["error"], "timeout");
        assert!(json.get("last_success_at").is_none());
    }

    #[test]
    fn report_tagged_by_status() {
        let report = HealthReport::Unhealthy {
            model: "m".into(),
            error: "down".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert!(!report.is_healthy());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_not_lost() {
        let tracker = Arc::new(HealthTracker::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    tracker.record_success(Duration::from_millis(10));
                } else {
                    tracker.record_failure("flaky");
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let status = tracker.snapshot();
        assert_eq!(status.total_requests, 50);
        assert_eq!(status.successful_requests, 25);
    }
}
