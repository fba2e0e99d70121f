//! # Client Error Types
//!
//! Unified error handling for every call the client makes against the
//! W&B GraphQL API, the Weave trace server and the wandbot API.

use thiserror::Error;

/// Client operation result type
pub type ClientResult<T> = Result<T, ClientError>;

/// Comprehensive error types for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("GraphQL error: {}", messages.join("; "))]
    GraphQl { messages: Vec<String> },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid response: {field} - {reason}")]
    InvalidResponse { field: String, reason: String },

    #[error("{message}{}", format_details(processing_details))]
    Report {
        message: String,
        processing_details: Vec<String>,
    },

    #[error("Timeout waiting for operation: {operation}")]
    Timeout { operation: String },
}

fn format_details(details: &[String]) -> String {
    if details.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = details.iter().map(|d| format!("- {d}")).collect();
    format!("\n\nReport processing details:\n{}", lines.join("\n"))
}

impl ClientError {
    /// Create an API error from HTTP response
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid response error for protocol violations
    ///
    /// Use this when a response is missing required fields or contains
    /// malformed data. A broken response should not be silently defaulted.
    pub fn invalid_response(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Attach report processing details to a failure raised while building
    /// or saving a report.
    pub fn report(message: impl Into<String>, processing_details: Vec<String>) -> Self {
        Self::Report {
            message: message.into(),
            processing_details,
        }
    }

    /// Check if error is recoverable (worth retrying)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Timeout { .. } => true,
            ClientError::Api { status, .. } => *status >= 500,
            // Everything else fails the same way on retry
            _ => false,
        }
    }
}
