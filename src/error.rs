//! Error taxonomy shared by every module
//!
//! Decode faults of the wire codecs convert into `Protocol`; explicit error
//! replies from a server become `Remote`. Partially failed writes surface as
//! `Aggregate`, which keeps the outcome of every record.

use crate::protocol::RespError;
use crate::record::RecordOutcome;
use std::io;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Fan-out errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input, never retried
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed wire data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an explicit error reply
    #[error("remote error: {0}")]
    Remote(String),

    /// No slot or node owns a key
    #[error("routing error: {0}")]
    Routing(String),

    /// Transport-level failure (connect, read, write, timeout, early close)
    #[error("connection error: {0}")]
    Connection(String),

    /// At least one record of a write failed
    #[error("{message}")]
    Aggregate {
        message: String,
        outcomes: Vec<RecordOutcome>,
    },
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Error::Connection(msg.into())
    }

    /// Per-record outcomes carried by an aggregate failure
    pub fn outcomes(&self) -> Option<&[RecordOutcome]> {
        match self {
            Error::Aggregate { outcomes, .. } => Some(outcomes),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Connection(e.to_string())
    }
}

impl From<RespError> for Error {
    fn from(e: RespError) -> Self {
        Error::Protocol(e.to_string())
    }
}
