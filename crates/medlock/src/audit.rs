//! The audit trail: best-effort, non-blocking event recording.
//!
//! Every mutating call and every sensitive read in the kernel passes
//! through here. A persistence failure is caught, reported to the
//! operational log, and never surfaces into the invoking operation.
//! This is an explicit, accepted data-loss window under storage
//! outages.

use std::sync::Arc;

use medlock_core::{AuditEvent, AuditEventId, Page, ResourceKind};
use medlock_store::Store;

use crate::error::Result;

/// Append-only event recorder over the shared store.
pub struct AuditTrail<S> {
    store: Arc<S>,
}

impl<S> Clone for AuditTrail<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> AuditTrail<S> {
    /// Build an audit trail over the given store handle.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist one event.
    ///
    /// Never raises into the caller: a store failure yields `None`
    /// after a warning-level operational log entry. No retry, no queue.
    pub async fn record(&self, event: AuditEvent) -> Option<AuditEventId> {
        let event_id = event.event_id;
        match self.store.append_audit_event(&event).await {
            Ok(()) => Some(event_id),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    action = %event.action,
                    resource = %event.resource_kind,
                    resource_id = %event.resource_id,
                    "audit write failed; continuing without it"
                );
                None
            }
        }
    }

    /// List events for a resource, newest first. Read-only.
    pub async fn query(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        page: Page,
    ) -> Result<Vec<AuditEvent>> {
        Ok(self.store.query_audit_events(kind, resource_id, page).await?)
    }
}
