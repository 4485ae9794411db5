use std::io;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that abort the operation they were raised from.
#[derive(Debug, Error)]
pub enum Error {
    /// A sampling, imagery or concurrency parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A segment geometry cannot be sampled.
    #[error("invalid geometry for segment {segment_id}: {reason}")]
    InvalidGeometry { segment_id: String, reason: String },

    /// Missing credentials or a malformed provider endpoint.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }
}

/// Failure of a single request within a batch.
///
/// These never abort a batch; they are counted and reported by the stage
/// that produced them.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("received invalid status code {0}")]
    Status(StatusCode),

    #[error("failed decoding response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    #[error("request exceeded the batch deadline")]
    Timeout,

    /// Transport failure that does not originate from reqwest, e.g. a closed
    /// admission gate.
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout => true,
            FetchError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Whether another attempt at the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(e) => !e.is_builder(),
            FetchError::Status(s) => s.is_server_error(),
            _ => false,
        }
    }
}
