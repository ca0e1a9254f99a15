//! The disclosure request ledger: submit, review, and read back
//! requests scoped to an approved allocation.

use std::sync::Arc;

use medlock_core::{
    now_millis, ActorContext, AuditAction, AuditEvent, CompanyId, DisclosureRequest, RequestId,
    RequestScope, RequestStatus, ResourceKind, ReviewDecision, SubjectId, UnixMillis,
};
use medlock_store::Store;

use crate::allocation::AllocationRegistry;
use crate::audit::AuditTrail;
use crate::collaborators::{notify_best_effort, NotificationKind, NotificationSender};
use crate::error::{DisclosureError, Result};

/// The request lifecycle, gated on the allocation registry.
pub struct DisclosureRequestLedger<S> {
    store: Arc<S>,
    allocations: AllocationRegistry<S>,
    audit: AuditTrail<S>,
    notifier: Arc<dyn NotificationSender>,
}

impl<S> Clone for DisclosureRequestLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            allocations: self.allocations.clone(),
            audit: self.audit.clone(),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S: Store> DisclosureRequestLedger<S> {
    /// Build a ledger over the shared store and allocation gate.
    pub fn new(
        store: Arc<S>,
        allocations: AllocationRegistry<S>,
        audit: AuditTrail<S>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            store,
            allocations,
            audit,
            notifier,
        }
    }

    /// Submit a disclosure request on behalf of a company.
    ///
    /// Fails with [`DisclosureError::Permission`] unless an approved
    /// allocation exists for the pair. The gate runs before any other
    /// work so an unauthorized caller learns nothing else.
    pub async fn submit(
        &self,
        actor: &ActorContext,
        company_id: CompanyId,
        subject_id: SubjectId,
        purpose: impl Into<String>,
        scope: RequestScope,
    ) -> Result<DisclosureRequest> {
        if !self.allocations.is_approved(&company_id, &subject_id).await? {
            return Err(DisclosureError::Permission(format!(
                "no approved allocation for company {} and subject {}",
                company_id, subject_id
            )));
        }

        let now = now_millis();
        let request = DisclosureRequest::submit(company_id, subject_id, purpose, scope, now);
        self.store.insert_request(&request).await?;

        self.audit
            .record(
                AuditEvent::new(
                    actor,
                    AuditAction::Create,
                    ResourceKind::Request,
                    request.request_id.to_hex(),
                    now,
                )
                .with_after(
                    serde_json::json!({
                        "company_id": request.company_id.as_str(),
                        "subject_id": request.subject_id.as_str(),
                        "purpose": request.purpose,
                        "status": request.status.as_str(),
                    })
                    .to_string(),
                ),
            )
            .await;

        notify_best_effort(
            &self.notifier,
            request.subject_id.as_str(),
            NotificationKind::RequestSubmitted,
            format!(
                "company {} requested disclosure of your records: {}",
                request.company_id, request.purpose
            ),
        )
        .await;

        Ok(request)
    }

    /// Review a pending request. Reviewer action.
    ///
    /// Rejection requires a non-empty reason. The underlying write is
    /// conditional on the stored status still being `Pending`: under
    /// concurrent reviews exactly one succeeds and the others fail with
    /// [`DisclosureError::InvalidState`], never a silent no-op.
    pub async fn review(
        &self,
        actor: &ActorContext,
        request_id: &RequestId,
        decision: ReviewDecision,
        notes: Option<String>,
        expiry_at: Option<UnixMillis>,
    ) -> Result<DisclosureRequest> {
        if decision == ReviewDecision::Reject
            && notes.as_deref().map_or(true, |n| n.trim().is_empty())
        {
            return Err(DisclosureError::InvalidState(
                "rejection requires a non-empty reason".to_string(),
            ));
        }

        let existing = self.store.get_request(request_id).await?.ok_or_else(|| {
            DisclosureError::NotFound(format!("request {} not found", request_id))
        })?;

        let status = match decision {
            ReviewDecision::Approve => RequestStatus::Approved,
            ReviewDecision::Reject => RequestStatus::Rejected,
        };

        let now = now_millis();
        let outcome = self
            .store
            .review_request(
                request_id,
                status,
                &actor.actor_id,
                notes.as_deref(),
                now,
                expiry_at,
            )
            .await?;

        if !outcome.applied() {
            return Err(DisclosureError::InvalidState(format!(
                "request {} is {}, only pending requests can be reviewed",
                request_id,
                existing.status.as_str()
            )));
        }

        let updated = self.store.get_request(request_id).await?.ok_or_else(|| {
            DisclosureError::NotFound(format!("request {} not found", request_id))
        })?;

        let action = match decision {
            ReviewDecision::Approve => AuditAction::Approve,
            ReviewDecision::Reject => AuditAction::Reject,
        };
        self.audit
            .record(
                AuditEvent::new(
                    actor,
                    action,
                    ResourceKind::Request,
                    request_id.to_hex(),
                    now,
                )
                .with_before(serde_json::json!({ "status": "pending" }).to_string())
                .with_after(
                    serde_json::json!({
                        "status": updated.status.as_str(),
                        "notes": updated.response_notes,
                    })
                    .to_string(),
                ),
            )
            .await;

        notify_best_effort(
            &self.notifier,
            updated.company_id.as_str(),
            NotificationKind::RequestReviewed,
            format!(
                "disclosure request {} was {}",
                request_id,
                updated.status.as_str()
            ),
        )
        .await;

        Ok(updated)
    }

    /// Get a request by id.
    pub async fn get(&self, request_id: &RequestId) -> Result<Option<DisclosureRequest>> {
        Ok(self.store.get_request(request_id).await?)
    }

    /// The allocation gate this ledger consults.
    pub fn allocations(&self) -> &AllocationRegistry<S> {
        &self.allocations
    }
}
