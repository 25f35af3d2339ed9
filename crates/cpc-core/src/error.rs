//! Error types for Communication Panel Control.
//!
//! Internal layers propagate `CpcError` with `?`. The public command surface
//! logs the error and hands the caller a falsy result instead, so these
//! variants describe *why* something failed for logs and for the bridge's
//! JSON-RPC error codes, not a contract callers branch on.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the CPC library.
#[derive(Debug, Error)]
pub enum CpcError {
    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Protocol errors
    #[error("No response for action {action_id} after {waited:?}")]
    ActionTimeout { action_id: String, waited: Duration },

    #[error("Invalid action payload: {message}")]
    InvalidPayload { message: String },

    // Transport errors
    #[error("CPC is not initialized to interact with Communication Panel")]
    NotInitialized,

    #[error("Cannot send before the Communication Panel frame is loaded")]
    PeerDetached,

    #[error("No active interaction: {0}")]
    NoActiveInteraction(String),

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("{url} responded HTTP {status}")]
    Http { url: String, status: u16 },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Could not load Communication Panel into frame: {message}")]
    Mount { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // RPC errors
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Method not found: {0}")]
    MethodNotFound(String),
}

/// Result type alias for CPC operations.
pub type Result<T> = std::result::Result<T, CpcError>;

impl From<serde_json::Error> for CpcError {
    fn from(err: serde_json::Error) -> Self {
        CpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for CpcError {
    fn from(err: reqwest::Error) -> Self {
        CpcError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<url::ParseError> for CpcError {
    fn from(err: url::ParseError) -> Self {
        CpcError::Config {
            message: format!("Invalid URL: {}", err),
        }
    }
}

impl CpcError {
    /// Shorthand for a validation failure on a named argument.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CpcError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Network/connectivity error
    /// - -32001: Action timed out
    /// - -32002: Not initialized / peer not attached
    /// - -32005: Validation error
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            CpcError::Network { .. } | CpcError::Http { .. } => -32000,

            CpcError::ActionTimeout { .. } => -32001,

            CpcError::NotInitialized | CpcError::PeerDetached => -32002,

            CpcError::Validation { .. }
            | CpcError::InvalidPayload { .. }
            | CpcError::NoActiveInteraction(_) => -32005,

            CpcError::MethodNotFound(_) => -32601,

            CpcError::InvalidParams { .. } => -32602,

            _ => -32603,
        }
    }

    /// Whether the failure stems from caller input rather than the peer or network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CpcError::Validation { .. }
                | CpcError::InvalidPayload { .. }
                | CpcError::NoActiveInteraction(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CpcError::validation("tone", "Must provide a valid [tone]");
        assert_eq!(
            err.to_string(),
            "Validation error for tone: Must provide a valid [tone]"
        );
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            CpcError::ActionTimeout {
                action_id: "dtmf-action-0".into(),
                waited: Duration::from_millis(750),
            }
            .to_rpc_error_code(),
            -32001
        );
        assert_eq!(CpcError::NotInitialized.to_rpc_error_code(), -32002);
        assert_eq!(
            CpcError::MethodNotFound("explode".into()).to_rpc_error_code(),
            -32601
        );
        assert_eq!(
            CpcError::InvalidParams {
                message: "to".into()
            }
            .to_rpc_error_code(),
            -32602
        );
        assert_eq!(
            CpcError::Config {
                message: "bad".into()
            }
            .to_rpc_error_code(),
            -32603
        );
    }

    #[test]
    fn test_validation_classification() {
        assert!(CpcError::NoActiveInteraction("joinCalls".into()).is_validation());
        assert!(!CpcError::PeerDetached.is_validation());
    }
}
