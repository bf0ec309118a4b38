//! Credential vault: encrypt, validate, persist, and broker per-owner API keys.
//!
//! Encryption and validation are independent. A key that fails its live check
//! is still stored, but `retrieve` withholds it until a later revalidation
//! succeeds.

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::secrets::CredentialCipher;
use crate::store::{CredentialRecord, CredentialStore};
use chrono::{DateTime, Utc};
use persona_core::error::VaultError;
use persona_core::provider::ProviderFactory;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on the upstream model-list call.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of checking a raw key against the upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models_available: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of `store`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub success: bool,
    pub valid: bool,
    pub models_available: Option<usize>,
}

/// Result of `remove`. `success` is false when there was nothing to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOutcome {
    pub success: bool,
}

/// What is known about an owner's credential, without the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub has_credential: bool,
    pub is_valid: bool,
    pub last_validated_at: Option<DateTime<Utc>>,
}

pub struct CredentialVault {
    cipher: CredentialCipher,
    store: Arc<dyn CredentialStore>,
    providers: Arc<dyn ProviderFactory>,
    audit: Arc<AuditLogger>,
    validation_timeout: Duration,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("store", &self.store.name())
            .field("validation_timeout", &self.validation_timeout)
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    pub fn new(
        cipher: CredentialCipher,
        store: Arc<dyn CredentialStore>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            cipher,
            store,
            providers,
            audit: Arc::new(AuditLogger::with_tracing()),
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
        }
    }

    /// Share an audit logger with other components.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn encrypt(&self, raw_secret: &str) -> Result<String, VaultError> {
        self.cipher.encrypt(raw_secret)
    }

    pub fn decrypt(&self, payload: &str) -> Result<String, VaultError> {
        self.cipher.decrypt(payload)
    }

    /// Ask the upstream for its model list using `raw_secret`.
    ///
    /// Never fails: rejections, network errors and timeouts all come back as
    /// `valid: false` with the reason in `error`.
    pub async fn validate_upstream(&self, raw_secret: &str) -> Validation {
        let provider = self.providers.connect(raw_secret);
        match tokio::time::timeout(self.validation_timeout, provider.list_models()).await {
            Ok(Ok(models)) => Validation {
                valid: true,
                models_available: Some(models.len()),
                error: None,
            },
            Ok(Err(e)) => Validation {
                valid: false,
                models_available: None,
                error: Some(e.to_string()),
            },
            Err(_) => Validation {
                valid: false,
                models_available: None,
                error: Some(format!(
                    "validation timed out after {}s",
                    self.validation_timeout.as_secs()
                )),
            },
        }
    }

    /// Encrypt, validate, and persist `raw_secret` for `owner_id`,
    /// replacing any previous record.
    pub async fn store(&self, owner_id: &str, raw_secret: &str) -> Result<StoreOutcome, VaultError> {
        require_non_empty("owner id", owner_id)?;
        require_non_empty("credential", raw_secret)?;

        let encrypted_payload = self.cipher.encrypt(raw_secret)?;
        let validation = self.validate_upstream(raw_secret).await;

        let now = Utc::now();
        let created_at = self
            .store
            .get(owner_id)
            .await?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        self.store
            .put(CredentialRecord {
                owner_id: owner_id.to_string(),
                encrypted_payload,
                is_valid: validation.valid,
                last_validated_at: now,
                created_at,
                updated_at: now,
            })
            .await?;

        self.audit.log(
            AuditEvent::CredentialStored { valid: validation.valid },
            owner_id,
            AuditOutcome::Success,
            validation.error.clone(),
        );
        info!(
            owner = owner_id,
            valid = validation.valid,
            models = ?validation.models_available,
            "Credential stored"
        );

        Ok(StoreOutcome {
            success: true,
            valid: validation.valid,
            models_available: validation.models_available,
        })
    }

    /// Hand back the raw secret, or `None` when there is no record or its
    /// last validation failed.
    pub async fn retrieve(&self, owner_id: &str) -> Result<Option<String>, VaultError> {
        let Some(record) = self.store.get(owner_id).await? else {
            debug!(owner = owner_id, "No credential on file");
            self.audit.log(
                AuditEvent::CredentialAccessed,
                owner_id,
                AuditOutcome::Denied,
                Some("no credential on file".into()),
            );
            return Ok(None);
        };

        if !record.is_valid {
            self.audit.log(
                AuditEvent::CredentialAccessed,
                owner_id,
                AuditOutcome::Denied,
                Some("credential marked invalid".into()),
            );
            return Ok(None);
        }

        let secret = self.open(&record)?;
        self.audit.log(AuditEvent::CredentialAccessed, owner_id, AuditOutcome::Success, None);
        Ok(Some(secret))
    }

    /// Re-run upstream validation with the stored secret and record the result.
    pub async fn revalidate(&self, owner_id: &str) -> Result<Validation, VaultError> {
        let mut record = self
            .store
            .get(owner_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(owner_id.to_string()))?;

        let secret = self.open(&record)?;
        let validation = self.validate_upstream(&secret).await;

        let now = Utc::now();
        record.is_valid = validation.valid;
        record.last_validated_at = now;
        record.updated_at = now;
        self.store.put(record).await?;

        self.audit.log(
            AuditEvent::CredentialRevalidated { valid: validation.valid },
            owner_id,
            AuditOutcome::Success,
            validation.error.clone(),
        );
        if !validation.valid {
            warn!(owner = owner_id, error = ?validation.error, "Credential failed revalidation");
        }

        Ok(validation)
    }

    pub async fn remove(&self, owner_id: &str) -> Result<RemoveOutcome, VaultError> {
        let existed = self.store.delete(owner_id).await?;
        let outcome = if existed {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.audit.log(AuditEvent::CredentialRemoved, owner_id, outcome, None);
        if existed {
            info!(owner = owner_id, "Credential removed");
        }
        Ok(RemoveOutcome { success: existed })
    }

    pub async fn status(&self, owner_id: &str) -> Result<CredentialStatus, VaultError> {
        Ok(match self.store.get(owner_id).await? {
            Some(record) => CredentialStatus {
                has_credential: true,
                is_valid: record.is_valid,
                last_validated_at: Some(record.last_validated_at),
            },
            None => CredentialStatus {
                has_credential: false,
                is_valid: false,
                last_validated_at: None,
            },
        })
    }

    fn open(&self, record: &CredentialRecord) -> Result<String, VaultError> {
        self.cipher.decrypt(&record.encrypted_payload).inspect_err(|e| {
            self.audit.log(
                AuditEvent::DecryptionFailed,
                &record.owner_id,
                AuditOutcome::Failure,
                Some(e.to_string()),
            );
        })
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<(), VaultError> {
    if value.trim().is_empty() {
        return Err(VaultError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}
