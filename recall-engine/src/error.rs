use thiserror::Error;

use crate::connection::ConnectionState;

/// The transport could not be opened, or the service never acknowledged
/// the session setup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandshakeError {
    pub message: String,
}

impl HandshakeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    #[error("cannot connect while the session is {0}")]
    InvalidState(ConnectionState),

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("connection attempt was cancelled")]
    Cancelled,

    #[error("you must be signed in to start a session")]
    NotAuthenticated,
}
