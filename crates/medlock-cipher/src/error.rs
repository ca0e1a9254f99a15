//! Error types for the field cipher.

use thiserror::Error;

/// Errors that can occur during field encryption.
///
/// Decryption failures never surface as errors: the read path recovers
/// to the `[unavailable]` sentinel so a single corrupt row cannot fail a
/// list query.
#[derive(Debug, Error)]
pub enum CipherError {
    /// AEAD encryption failure.
    #[error("encryption failure: {0}")]
    Encrypt(String),

    /// Key material has the wrong length.
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// Result type for cipher operations.
pub type Result<T> = std::result::Result<T, CipherError>;
