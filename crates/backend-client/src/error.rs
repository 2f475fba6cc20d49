//! Error types for the backend client

use telecare_call_core::TokenError;
use thiserror::Error;

/// Result type for backend requests
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// 401 or 403
    #[error("Not authorized (HTTP {status}): {message}")]
    Authorization { status: u16, message: String },

    /// 404
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Any other non-2xx status
    #[error("Backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 2xx with `success: false`
    #[error("Request rejected: {message}")]
    Rejected { message: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },
}

impl BackendError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Map a response status to its error, keeping the backend's message
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authorization { status, message },
            404 => Self::NotFound { message },
            _ => Self::Status { status, message },
        }
    }

    /// Classify this failure for the token endpoint of `appointment_id`
    pub fn into_token_error(self, appointment_id: &str) -> TokenError {
        match self {
            Self::Authorization { message, .. } => TokenError::Authorization {
                appointment_id: appointment_id.to_string(),
                message,
            },
            Self::NotFound { message } => TokenError::NotFound {
                appointment_id: appointment_id.to_string(),
                message,
            },
            other => TokenError::backend(other.to_string()),
        }
    }
}
