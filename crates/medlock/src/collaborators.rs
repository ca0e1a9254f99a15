//! External collaborator seams: the records store and the notification
//! sender.
//!
//! Medlock only consumes these interfaces. Record content is owned by
//! the records collaborator; notification delivery is best-effort and a
//! failure never rolls back the state transition that triggered it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use medlock_core::RecordId;

/// Failure inside a collaborator.
#[derive(Debug, Error)]
#[error("collaborator failure: {0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    /// Wrap a collaborator failure message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A medical record as returned by the records collaborator.
///
/// Attributes declared sensitive arrive as ciphertext and are decrypted
/// by the service before the payload is returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPayload {
    /// Opaque record identifier.
    pub record_id: RecordId,
    /// Record kind, e.g. `lab-result`.
    pub kind: String,
    /// Attribute map.
    pub fields: BTreeMap<String, String>,
}

/// Read-only access to record content. Medlock never writes records.
#[async_trait]
pub trait RecordsProvider: Send + Sync {
    /// Fetch a record by its opaque identifier.
    async fn get_record(&self, id: &RecordId) -> Result<Option<RecordPayload>, ProviderError>;
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A company↔subject allocation was proposed.
    AllocationProposed,
    /// A disclosure request was submitted.
    RequestSubmitted,
    /// A disclosure request was reviewed.
    RequestReviewed,
}

/// Outbound notification delivery. Failures are swallowed by the
/// caller; the sender must never raise synchronously into a transition.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver one notification.
    async fn notify(
        &self,
        recipient: &str,
        kind: NotificationKind,
        body: &str,
    ) -> Result<(), ProviderError>;
}

/// Fire-and-forget delivery: any error is caught, logged at warning,
/// and dropped.
pub(crate) async fn notify_best_effort(
    notifier: &Arc<dyn NotificationSender>,
    recipient: &str,
    kind: NotificationKind,
    body: String,
) {
    if let Err(e) = notifier.notify(recipient, kind, &body).await {
        tracing::warn!(error = %e, ?kind, recipient, "notification failed; continuing");
    }
}
