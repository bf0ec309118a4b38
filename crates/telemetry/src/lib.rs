//! Generation health tracking for Persona.
//!
//! The orchestrator is handed an `Arc<HealthTracker>` and updates it after
//! every request; probes and status endpoints read snapshots.

pub mod model;
pub mod tracker;

pub use model::{ERROR_LOG_CAPACITY, ErrorLogEntry, HealthReport, HealthStatus, UNHEALTHY_AFTER};
pub use tracker::HealthTracker;
