//! Local media error types and handling
//!
//! Capture failures are expected: devices are missing, busy, or the user
//! denied permission. The manager walks its fallback ladder on any of them
//! and only reports [`MediaError::AllFallbacksExhausted`] at the end.

use meshrtc_core::{MeshRtcError, TrackKind};
use thiserror::Error;

/// Main error type for local media operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Device not found error
    #[error("Device not found: {kind}")]
    DeviceNotFound {
        /// Kind of device that is missing
        kind: TrackKind,
    },

    /// Device exists but could not be opened
    #[error("Device busy: {kind} - {reason}")]
    DeviceBusy {
        /// Kind of device
        kind: TrackKind,
        /// Failure reason
        reason: String,
    },

    /// Permission denied error
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Every rung of the fallback ladder failed
    #[error("All capture fallbacks exhausted, last error: {last_error}")]
    AllFallbacksExhausted {
        /// Error reported by the last attempt
        last_error: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if the next fallback rung is worth trying
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::DeviceNotFound { .. } => true,
            MediaError::DeviceBusy { .. } => true,
            MediaError::PermissionDenied { .. } => true,
            MediaError::InvalidConfiguration { .. } => false,
            MediaError::AllFallbacksExhausted { .. } => false,
        }
    }
}

impl From<MediaError> for MeshRtcError {
    fn from(err: MediaError) -> Self {
        MeshRtcError::Media {
            reason: err.to_string(),
        }
    }
}
