//! The allocation registry: the coarse company↔subject relationship
//! gate ahead of any disclosure request.

use std::sync::Arc;

use medlock_core::{
    now_millis, ActorContext, Allocation, AllocationId, AllocationStatus, AuditAction, AuditEvent,
    CompanyId, CoverageWindow, PolicyRef, ResourceKind, SubjectId,
};
use medlock_store::{InsertOutcome, Store};

use crate::audit::AuditTrail;
use crate::collaborators::{notify_best_effort, NotificationKind, NotificationSender};
use crate::error::{DisclosureError, Result};

/// Tracks company↔subject relationships and their approval state.
pub struct AllocationRegistry<S> {
    store: Arc<S>,
    audit: AuditTrail<S>,
    notifier: Arc<dyn NotificationSender>,
}

impl<S> Clone for AllocationRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            audit: self.audit.clone(),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S: Store> AllocationRegistry<S> {
    /// Build a registry over the shared store.
    pub fn new(store: Arc<S>, audit: AuditTrail<S>, notifier: Arc<dyn NotificationSender>) -> Self {
        Self {
            store,
            audit,
            notifier,
        }
    }

    /// Propose a new allocation. Administrator action.
    ///
    /// Fails with [`DisclosureError::Conflict`] when an allocation
    /// already exists for the `(company, subject, policy)` tuple. The
    /// subject is notified fire-and-forget.
    pub async fn propose(
        &self,
        actor: &ActorContext,
        company_id: CompanyId,
        subject_id: SubjectId,
        policy_ref: PolicyRef,
        coverage: Option<CoverageWindow>,
        notes: Option<String>,
    ) -> Result<Allocation> {
        let now = now_millis();
        let allocation = Allocation::propose(
            company_id,
            subject_id,
            policy_ref,
            coverage,
            notes,
            now,
        );

        match self.store.insert_allocation(&allocation).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::Conflict => {
                return Err(DisclosureError::Conflict(format!(
                    "allocation already exists for company {} and subject {} under policy {}",
                    allocation.company_id, allocation.subject_id, allocation.policy_ref
                )));
            }
        }

        self.audit
            .record(
                AuditEvent::new(
                    actor,
                    AuditAction::Propose,
                    ResourceKind::Allocation,
                    allocation.allocation_id.to_hex(),
                    now,
                )
                .with_after(
                    serde_json::json!({
                        "company_id": allocation.company_id.as_str(),
                        "subject_id": allocation.subject_id.as_str(),
                        "status": allocation.status.as_str(),
                    })
                    .to_string(),
                ),
            )
            .await;

        notify_best_effort(
            &self.notifier,
            allocation.subject_id.as_str(),
            NotificationKind::AllocationProposed,
            format!(
                "company {} requested a records relationship under policy {}",
                allocation.company_id, allocation.policy_ref
            ),
        )
        .await;

        Ok(allocation)
    }

    /// Decide a pending allocation. Administrator action.
    ///
    /// The underlying write is conditional on the stored status still
    /// being `Pending`; a concurrent second decision reports
    /// [`DisclosureError::InvalidState`] and leaves the first verdict
    /// untouched.
    pub async fn decide(
        &self,
        actor: &ActorContext,
        allocation_id: &AllocationId,
        approve: bool,
        notes: Option<String>,
    ) -> Result<Allocation> {
        let now = now_millis();

        let existing = self
            .store
            .get_allocation(allocation_id)
            .await?
            .ok_or_else(|| {
                DisclosureError::NotFound(format!("allocation {} not found", allocation_id))
            })?;

        let status = if approve {
            AllocationStatus::Approved
        } else {
            AllocationStatus::Rejected
        };

        let outcome = self
            .store
            .decide_allocation(allocation_id, status, notes.as_deref(), now)
            .await?;

        if !outcome.applied() {
            return Err(DisclosureError::InvalidState(format!(
                "allocation {} is not pending",
                allocation_id
            )));
        }

        let updated = self
            .store
            .get_allocation(allocation_id)
            .await?
            .ok_or_else(|| {
                DisclosureError::NotFound(format!("allocation {} not found", allocation_id))
            })?;

        let action = if approve {
            AuditAction::Approve
        } else {
            AuditAction::Reject
        };
        self.audit
            .record(
                AuditEvent::new(
                    actor,
                    action,
                    ResourceKind::Allocation,
                    allocation_id.to_hex(),
                    now,
                )
                .with_before(
                    serde_json::json!({ "status": existing.status.as_str() }).to_string(),
                )
                .with_after(serde_json::json!({ "status": updated.status.as_str() }).to_string()),
            )
            .await;

        Ok(updated)
    }

    /// Whether an approved allocation exists for the pair.
    ///
    /// The precondition gate the request ledger consults before
    /// accepting a submission.
    pub async fn is_approved(&self, company: &CompanyId, subject: &SubjectId) -> Result<bool> {
        Ok(self
            .store
            .approved_allocation_exists(company, subject)
            .await?)
    }

    /// Get an allocation by id.
    pub async fn get(&self, allocation_id: &AllocationId) -> Result<Option<Allocation>> {
        Ok(self.store.get_allocation(allocation_id).await?)
    }
}
