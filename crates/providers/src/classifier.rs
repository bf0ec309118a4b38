//! Decides whether a provider failure is worth retrying.

use persona_config::OrchestratorConfig;
use persona_core::error::ProviderError;

/// How the orchestrator should react to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Try the next model, then back off and retry the chain.
    Retryable,
    /// Abort the whole chain and surface the error.
    NonRetryable,
}

/// Classifies provider errors.
///
/// `AuthenticationFailed` and `QuotaExceeded` are always non-retryable.
/// Beyond that, an error is non-retryable when its HTTP status is listed in
/// `status_codes` or its message contains one of `patterns`
/// (case-insensitive).
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    status_codes: Vec<u16>,
    patterns: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for ErrorClassifier {
    fn from(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.non_retryable_status_codes.clone(),
            config.non_retryable_patterns.clone(),
        )
    }
}

impl ErrorClassifier {
    pub fn new(status_codes: Vec<u16>, patterns: Vec<String>) -> Self {
        Self {
            status_codes,
            patterns: patterns
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Only the two built-in non-retryable kinds.
    pub fn strict_minimum() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn classify(&self, error: &ProviderError) -> FailureClass {
        if matches!(
            error,
            ProviderError::AuthenticationFailed(_) | ProviderError::QuotaExceeded(_)
        ) {
            return FailureClass::NonRetryable;
        }

        if error
            .status_code()
            .is_some_and(|code| self.status_codes.contains(&code))
        {
            return FailureClass::NonRetryable;
        }

        let message = error.to_string().to_lowercase();
        if self.patterns.iter().any(|p| message.contains(p)) {
            return FailureClass::NonRetryable;
        }

        FailureClass::Retryable
    }

    pub fn is_retryable(&self, error: &ProviderError) -> bool {
        self.classify(error) == FailureClass::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_and_quota_errors_never_retry() {
        let classifier = ErrorClassifier::strict_minimum();
        assert_eq!(
            classifier.classify(&ProviderError::AuthenticationFailed("bad".into())),
            FailureClass::NonRetryable
        );
        assert_eq!(
            classifier.classify(&ProviderError::QuotaExceeded("empty".into())),
            FailureClass::NonRetryable
        );
    }

    #[test]
    fn transient_errors_retry() {
        let classifier = ErrorClassifier::default();
        for error in [
            ProviderError::Timeout("slow".into()),
            ProviderError::Network("reset".into()),
            ProviderError::RateLimited { retry_after_secs: 1 },
            ProviderError::ApiError { status_code: 503, message: "overloaded".into() },
            ProviderError::ModelNotFound("gpt-9".into()),
        ] {
            assert!(classifier.is_retryable(&error), "{error:?} should retry");
        }
    }

    #[test]
    fn configured_status_codes() {
        let classifier = ErrorClassifier::new(vec![400], vec![]);
        assert!(!classifier.is_retryable(&ProviderError::ApiError {
            status_code: 400,
            message: "bad request".into(),
        }));
        assert!(classifier.is_retryable(&ProviderError::ApiError {
            status_code: 500,
            message: "oops".into(),
        }));
    }

    #[test]
    fn configured_patterns_are_case_insensitive() {
        let classifier = ErrorClassifier::new(vec![], vec!["Invalid API Key".into(), String::new()]);
        assert!(!classifier.is_retryable(&ProviderError::ApiError {
            status_code: 500,
            message: "proxy says: invalid api key".into(),
        }));
        assert!(classifier.is_retryable(&ProviderError::Network("refused".into())));
    }

    #[test]
    fn defaults_follow_config() {
        let classifier = ErrorClassifier::default();
        assert!(!classifier.is_retryable(&ProviderError::ApiError {
            status_code: 403,
            message: "forbidden".into(),
        }));
        assert!(!classifier.is_retryable(&ProviderError::ApiError {
            status_code: 400,
            message: "Incorrect API key provided".into(),
        }));
    }
}
