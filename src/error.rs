//! Error taxonomy for connection admission and event handling.
//!
//! Event handler failures never escape the originating connection: the
//! dispatcher converts an `EventError` into a scoped error event sent back
//! to the sender only.

use thiserror::Error;

use crate::store::StoreError;

/// Why an inbound connection was refused before any state was touched.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("missing credential")]
    MissingCredential,
    #[error("expired credential")]
    ExpiredCredential,
    #[error("invalid credential")]
    InvalidCredential,
}

impl AdmissionError {
    /// WebSocket close code sent when refusing the connection.
    /// 4001 = token expired, 4002 = token invalid/missing.
    pub fn close_code(&self) -> u16 {
        match self {
            AdmissionError::ExpiredCredential => 4001,
            AdmissionError::MissingCredential | AdmissionError::InvalidCredential => 4002,
        }
    }
}

/// Per-event failure. Scoped to the originating connection, never fatal.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Authorization(String),
    #[error("collaborator failure: {0}")]
    Collaborator(#[from] StoreError),
}

impl EventError {
    pub fn code(&self) -> u16 {
        match self {
            EventError::Validation(_) => 400,
            EventError::Authorization(_) => 403,
            EventError::NotFound(_) => 404,
            EventError::Collaborator(_) => 500,
        }
    }
}
