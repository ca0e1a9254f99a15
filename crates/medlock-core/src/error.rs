//! Error types for Medlock core primitives.

use thiserror::Error;

/// Errors that can occur while encoding or decoding core data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("unknown status encoding: {0}")]
    InvalidStatus(i64),

    #[error("unknown label: {0}")]
    InvalidLabel(String),
}
