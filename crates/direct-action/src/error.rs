//! Error types for direct-action operations

use thiserror::Error;

/// Result type alias for direct-action operations
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors raised while performing the background direct action
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Credential not found: {namespace}/{key}")]
    MissingCredential { namespace: String, key: String },

    #[error("Credential store error: {reason}")]
    CredentialStore { reason: String },

    #[error("Action config store error: {reason}")]
    ConfigStore { reason: String },

    #[error("Request failed with status {status}")]
    RequestFailed { status: u16 },

    #[error("Credential refresh failed: {reason}")]
    RefreshFailed { reason: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActionError {
    /// Create a credential store error
    pub fn credential_store(reason: impl Into<String>) -> Self {
        Self::CredentialStore { reason: reason.into() }
    }

    /// Create a config store error
    pub fn config_store(reason: impl Into<String>) -> Self {
        Self::ConfigStore { reason: reason.into() }
    }

    /// Create a refresh failed error
    pub fn refresh_failed(reason: impl Into<String>) -> Self {
        Self::RefreshFailed { reason: reason.into() }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            ActionError::MissingCredential { .. } | ActionError::CredentialStore { .. } => "credentials",
            ActionError::ConfigStore { .. } => "config",
            ActionError::RequestFailed { .. } | ActionError::Network(_) => "request",
            ActionError::RefreshFailed { .. } => "refresh",
            ActionError::Serialization(_) => "serialization",
        }
    }
}
