// 🚨 Error Taxonomy
// Every failure surfaced by the sync engine falls in exactly one category

use thiserror::Error;

/// Errors produced by the translation and synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed input or invariant violation. Never retried.
    #[error("validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    /// Tenant has no field map / enrichment config / webhook for the request.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// More than one configuration row matched a lookup that must be unique.
    #[error("ambiguous configuration: {what} matched {count} entries")]
    AmbiguousConfiguration { what: String, count: usize },

    /// Tenant must reconnect the external system.
    #[error("{provider} requires re-authentication")]
    ExternalAuthRequired { provider: String },

    /// The remote system rejected or errored.
    #[error("{provider} call failed: {message}")]
    ExternalCallFailure { provider: String, message: String },

    /// Enrichment quota exhausted.
    #[error("{provider} quota exhausted ({api_calls}/{api_limit})")]
    RateLimitExceeded {
        provider: String,
        api_calls: i64,
        api_limit: i64,
    },

    /// External call exceeded its deadline or the caller aborted.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Repository failure.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing(what: impl Into<String>) -> Self {
        SyncError::ConfigurationMissing(what.into())
    }

    pub fn external(provider: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::ExternalCallFailure {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Transient categories. The engine itself never retries; callers may.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Timeout { .. } | SyncError::Storage(_))
    }

    /// Conditions the tenant can fix from the admin UI.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            SyncError::ExternalAuthRequired { .. }
                | SyncError::ConfigurationMissing(_)
                | SyncError::AmbiguousConfiguration { .. }
        )
    }

    /// Short machine-readable category name
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Validation { .. } => "validation_error",
            SyncError::ConfigurationMissing(_) => "configuration_missing",
            SyncError::AmbiguousConfiguration { .. } => "ambiguous_configuration",
            SyncError::ExternalAuthRequired { .. } => "external_auth_required",
            SyncError::ExternalCallFailure { .. } => "external_call_failure",
            SyncError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            SyncError::Timeout { .. } => "timeout",
            SyncError::Storage(_) => "storage_error",
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Storage(format!("serialization: {}", err))
    }
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::Storage(format!("csv: {}", err))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(format!("io: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = SyncError::validation("emails", "duplicate primary");
        assert_eq!(err.kind(), "validation_error");
        assert!(!err.is_retryable());
        assert!(!err.is_user_actionable());

        let err = SyncError::ExternalAuthRequired {
            provider: "salesforce".to_string(),
        };
        assert!(err.is_user_actionable());
        assert_eq!(err.to_string(), "salesforce requires re-authentication");

        let err = SyncError::Timeout {
            operation: "updateLead".to_string(),
            timeout_ms: 100,
        };
        assert!(err.is_retryable());
    }
}
