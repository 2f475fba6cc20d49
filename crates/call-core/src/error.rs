//! Error types for call session orchestration
//!
//! Only [`TokenError`] and [`JoinError`] ever reach the caller of
//! [`CallSession::start`](crate::CallSession::start). Device, teardown and
//! lifecycle-report failures are logged and absorbed so the call stays usable.

use std::fmt;

use thiserror::Error;

use crate::rtc::MediaKind;
use crate::session::CallState;

/// Result type for call session operations
pub type CallResult<T> = Result<T, CallError>;

/// Result type for RTC provider calls
pub type RtcResult<T> = Result<T, RtcError>;

/// Errors surfaced by the call session orchestrator
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Token endpoint failed; no session was created
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Provider rejected the join; the session is now `Failed`
    #[error(transparent)]
    Join(#[from] JoinError),

    /// Command issued in a state that does not accept it
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: CallState,
    },

    /// The consumer cancelled the session before it reached `Connected`
    #[error("Session was cancelled before it connected")]
    Cancelled,

    /// A local track rejected an enable/disable request
    #[error("Local {kind} track error: {source}")]
    Track {
        kind: MediaKind,
        #[source]
        source: RtcError,
    },
}

impl CallError {
    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, state: CallState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Whether this error should be shown to the user with a retry path
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Token(_) | Self::Join(_))
    }
}

/// Failure to obtain a join descriptor from the backend token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("No appointment ID provided")]
    MissingAppointment,

    #[error("Not authorized to join appointment {appointment_id}: {message}")]
    Authorization {
        appointment_id: String,
        message: String,
    },

    #[error("Appointment {appointment_id} not found: {message}")]
    NotFound {
        appointment_id: String,
        message: String,
    },

    #[error("Failed to initialize video call: {message}")]
    Backend { message: String },
}

impl TokenError {
    /// Create a generic backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// The provider rejected `join` (network or authorization failure)
#[derive(Debug, Clone, Error)]
#[error("Failed to join channel {channel}: {source}")]
pub struct JoinError {
    pub channel: String,
    #[source]
    pub source: RtcError,
}

/// Errors reported by the RTC provider adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtcError {
    #[error("Provider call `{operation}` failed: {reason}")]
    Provider {
        operation: &'static str,
        reason: String,
    },

    #[error("Provider client is closed")]
    Closed,
}

impl RtcError {
    /// Create a provider call failure
    pub fn provider(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Provider {
            operation,
            reason: reason.into(),
        }
    }
}

/// Camera or microphone could not be acquired
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("{device} is unavailable")]
    Unavailable { device: String },

    #[error("Permission to use {device} was denied")]
    PermissionDenied { device: String },

    #[error("{device} is already in use")]
    Busy { device: String },

    #[error("Platform media error: {message}")]
    Platform { message: String },
}

impl DeviceError {
    /// Create an unavailable-device error
    pub fn unavailable(device: impl Into<String>) -> Self {
        Self::Unavailable {
            device: device.into(),
        }
    }

    /// Create a permission-denied error
    pub fn permission_denied(device: impl Into<String>) -> Self {
        Self::PermissionDenied {
            device: device.into(),
        }
    }
}

/// Teardown step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    Unpublish,
    Leave,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownStep::Unpublish => write!(f, "unpublish"),
            TeardownStep::Leave => write!(f, "leave"),
        }
    }
}

/// A single failed teardown call; logged and swallowed
#[derive(Debug, Clone, Error)]
#[error("Teardown step {step} failed: {source}")]
pub struct TeardownError {
    pub step: TeardownStep,
    #[source]
    pub source: RtcError,
}

impl TeardownError {
    pub fn new(step: TeardownStep, source: RtcError) -> Self {
        Self { step, source }
    }
}
