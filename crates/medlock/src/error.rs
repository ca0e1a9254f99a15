//! Error types for the disclosure kernel.
//!
//! State-machine violations and permission failures surface to the
//! caller as typed, user-reportable errors. Audit and notification
//! failures are recovered locally and never reach this enum; decryption
//! failures degrade to a sentinel inside the cipher.

use thiserror::Error;

use medlock_core::RecordId;
use medlock_store::StoreError;

use crate::collaborators::ProviderError;

/// Errors that can occur during disclosure operations.
#[derive(Debug, Error)]
pub enum DisclosureError {
    /// The precondition relationship is missing or not approved.
    ///
    /// Returned uniformly before any record-specific check so callers
    /// without an approved allocation learn nothing about record
    /// existence.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Operation attempted from a state that forbids it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Duplicate allocation or grant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// The grant covering the record has expired.
    #[error("grant for record {record_id} has expired")]
    Expired {
        /// The record whose grant expired.
        record_id: RecordId,
    },

    /// The grant covering the record has spent its quota.
    #[error("access quota exhausted for record {record_id}")]
    QuotaExhausted {
        /// The record whose grant is exhausted.
        record_id: RecordId,
    },

    /// A collaborator (records store, notification sender) failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for disclosure operations.
pub type Result<T> = std::result::Result<T, DisclosureError>;
