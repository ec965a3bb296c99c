use thiserror::Error;

use crate::types::MediaKind;

/// A capture device could not be acquired. Recoverable: the session goes on
/// without that source.
#[derive(Debug, Error)]
pub enum MediaAcquisitionError {
    #[error("no {0} device found")]
    NoDevice(MediaKind),

    #[error("{0} access was denied")]
    PermissionDenied(MediaKind),

    #[error("{kind} device failed: {message}")]
    Device { kind: MediaKind, message: String },
}

impl MediaAcquisitionError {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaAcquisitionError::NoDevice(k) | MediaAcquisitionError::PermissionDenied(k) => *k,
            MediaAcquisitionError::Device { kind, .. } => *kind,
        }
    }

    /// Short, actionable text for the front end. Details go to the log.
    pub fn user_message(&self) -> String {
        match self {
            MediaAcquisitionError::NoDevice(k) => format!("No {k} detected."),
            MediaAcquisitionError::PermissionDenied(k) => {
                format!("Access to the {k} appears blocked. Check your privacy settings.")
            }
            MediaAcquisitionError::Device { kind, .. } => {
                format!("The {kind} could not be started. Check logs for details.")
            }
        }
    }
}

/// A single audio window or video frame could not be encoded. Transient.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("frame buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    #[error("image encode failed: {0}")]
    Image(String),

    #[error("audio encode failed: {0}")]
    Audio(String),
}

/// An inbound invocation named a tool nobody registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no handler registered for tool `{name}`")]
pub struct DispatchMismatchError {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("you must be logged in to log activities")]
    NotAuthenticated,

    #[error("storage rejected the operation: {0}")]
    Rejected(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
