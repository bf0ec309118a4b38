//! Credential vault for Persona: encryption at rest, validated access, and audit logging.
//!
//! Provides:
//! - **Secrets**: AES-256-GCM encryption of per-owner API keys
//! - **Stores**: In-memory and JSON-file credential persistence
//! - **Vault**: Store / retrieve / revalidate / remove with upstream validation
//! - **Audit logging**: Structured record of every credential operation

pub mod audit;
pub mod secrets;
pub mod store;
pub mod vault;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use secrets::CredentialCipher;
pub use store::{CredentialRecord, CredentialStore, FileCredentialStore, InMemoryCredentialStore};
pub use vault::{CredentialStatus, CredentialVault, RemoveOutcome, StoreOutcome, Validation};
