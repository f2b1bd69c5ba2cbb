//! Error types and handling for the bridge core
//!
//! # Error Categories
//!
//! - **Command Errors** - Malformed or unknown inbound commands; rejected
//!   before any state mutation
//! - **Call Errors** - Operations referencing calls the registry does not hold
//! - **Store Errors** - Durable pending-event or config persistence failures
//! - **Surface Errors** - The platform call-UI integration refused an operation
//!
//! Event delivery failures are deliberately NOT represented here: a failed
//! send is logged inside the dispatch channel and swallowed, because the
//! durable pending path or a later user action recovers it, and a dropped
//! live event must never crash the native layer.

use thiserror::Error;

/// Result type alias for bridge-core operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by bridge-core operations
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Store error: {reason}")]
    Store { reason: String },

    #[error("Platform surface error: {reason}")]
    Surface { reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create a call-not-found error
    pub fn call_not_found(call_id: impl Into<String>) -> Self {
        Self::CallNotFound { call_id: call_id.into() }
    }

    /// Create a missing-field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Create an invalid-command error
    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand { reason: reason.into() }
    }

    /// Create a store error
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store { reason: reason.into() }
    }

    /// Create a surface error
    pub fn surface(reason: impl Into<String>) -> Self {
        Self::Surface { reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            BridgeError::CallNotFound { .. } => "call",
            BridgeError::MissingField { .. } | BridgeError::InvalidCommand { .. } => "command",
            BridgeError::Store { .. } => "store",
            BridgeError::Surface { .. } => "surface",
            BridgeError::Internal { .. } => "system",
        }
    }
}
