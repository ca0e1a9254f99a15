//! The DisclosureService: the unified API over allocations, requests,
//! grants, the cipher, and the audit trail.

use std::sync::Arc;

use medlock_cipher::FieldCipher;
use medlock_core::{
    now_millis, ActorContext, AuditAction, AuditEvent, AuditEventId, CompanyId, DenyReason,
    DisclosureRequest, Grant, GrantId, Page, RecordId, RequestId, RequestScope, ResourceKind,
    Severity, SubjectId, UnixMillis,
};
use medlock_store::Store;

use crate::allocation::AllocationRegistry;
use crate::audit::AuditTrail;
use crate::collaborators::{NotificationSender, RecordPayload, RecordsProvider};
use crate::error::{DisclosureError, Result};
use crate::grant::{ConsumeOutcome, GrantStore};
use crate::request::DisclosureRequestLedger;

/// Configuration for the disclosure service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Record attributes stored as ciphertext and decrypted on
    /// authorized read.
    pub sensitive_fields: Vec<String>,
    /// Quota applied by `approve_records` when the reviewer gives none.
    pub default_max_access: u32,
    /// TTL applied by `approve_records` when the reviewer gives none,
    /// relative to issuance. `None` means no expiry.
    pub default_ttl_ms: Option<i64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sensitive_fields: vec![
                "diagnosis".to_string(),
                "treatment".to_string(),
                "prescription".to_string(),
                "notes".to_string(),
            ],
            default_max_access: 1,
            default_ttl_ms: None,
        }
    }
}

/// Outcome of one record's issuance inside `approve_records`.
#[derive(Debug)]
pub struct RecordApproval {
    /// The record the reviewer selected.
    pub record_id: RecordId,
    /// The issued grant, or why issuance failed for this record alone.
    pub outcome: Result<Grant>,
}

/// The main service struct.
///
/// Composes the disclosure subsystem behind one explicitly constructed,
/// dependency-injected handle: the shared store, the field cipher, the
/// records collaborator, and the notification sender all arrive at
/// construction time. No global state.
pub struct DisclosureService<S: Store> {
    store: Arc<S>,
    allocations: AllocationRegistry<S>,
    requests: DisclosureRequestLedger<S>,
    grants: GrantStore<S>,
    audit: AuditTrail<S>,
    cipher: FieldCipher,
    records: Arc<dyn RecordsProvider>,
    config: ServiceConfig,
}

impl<S: Store> DisclosureService<S> {
    /// Build the service and its component parts.
    pub fn new(
        store: S,
        cipher: FieldCipher,
        records: Arc<dyn RecordsProvider>,
        notifier: Arc<dyn NotificationSender>,
        config: ServiceConfig,
    ) -> Self {
        let store = Arc::new(store);
        let audit = AuditTrail::new(Arc::clone(&store));
        let allocations = AllocationRegistry::new(
            Arc::clone(&store),
            audit.clone(),
            Arc::clone(&notifier),
        );
        let requests = DisclosureRequestLedger::new(
            Arc::clone(&store),
            allocations.clone(),
            audit.clone(),
            notifier,
        );
        let grants = GrantStore::new(Arc::clone(&store), audit.clone());

        Self {
            store,
            allocations,
            requests,
            grants,
            audit,
            cipher,
            records,
            config,
        }
    }

    /// The allocation registry.
    pub fn allocations(&self) -> &AllocationRegistry<S> {
        &self.allocations
    }

    /// The request ledger.
    pub fn requests(&self) -> &DisclosureRequestLedger<S> {
        &self.requests
    }

    /// The grant store.
    pub fn grants(&self) -> &GrantStore<S> {
        &self.grants
    }

    /// The audit trail.
    pub fn audit(&self) -> &AuditTrail<S> {
        &self.audit
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a disclosure request. Delegates to the ledger.
    pub async fn request_disclosure(
        &self,
        actor: &ActorContext,
        company_id: CompanyId,
        subject_id: SubjectId,
        purpose: impl Into<String>,
        scope: RequestScope,
    ) -> Result<DisclosureRequest> {
        self.requests
            .submit(actor, company_id, subject_id, purpose, scope)
            .await
    }

    /// Review a pending request. Delegates to the ledger.
    pub async fn review_disclosure(
        &self,
        actor: &ActorContext,
        request_id: &RequestId,
        decision: medlock_core::ReviewDecision,
        notes: Option<String>,
        expiry_at: Option<UnixMillis>,
    ) -> Result<DisclosureRequest> {
        self.requests
            .review(actor, request_id, decision, notes, expiry_at)
            .await
    }

    /// Issue grants for the selected records of an approved request.
    ///
    /// Each issuance is independent: one record's failure never rolls
    /// back grants already issued for the others, and every outcome is
    /// reported individually.
    pub async fn approve_records(
        &self,
        actor: &ActorContext,
        request_id: &RequestId,
        record_ids: Vec<RecordId>,
        granted_until: Option<UnixMillis>,
        max_access_count: Option<u32>,
    ) -> Vec<RecordApproval> {
        let quota = max_access_count.unwrap_or(self.config.default_max_access);
        let until = granted_until.or_else(|| {
            self.config
                .default_ttl_ms
                .map(|ttl| now_millis() + ttl)
        });

        let mut approvals = Vec::with_capacity(record_ids.len());
        for record_id in record_ids {
            let outcome = self
                .grants
                .issue(actor, request_id, record_id.clone(), until, quota)
                .await;
            approvals.push(RecordApproval { record_id, outcome });
        }
        approvals
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a disclosed record under a live grant.
    ///
    /// Order of checks: the request must belong to the calling company
    /// (a uniform [`DisclosureError::Permission`] before any
    /// record-specific signal) → the grant is atomically consumed → on
    /// Allow the record is fetched, sensitive fields are decrypted, and
    /// the read is audited; on Deny the attempt is audited at warning
    /// severity and the reason surfaces as a typed error.
    pub async fn read_disclosed_record(
        &self,
        actor: &ActorContext,
        company_id: &CompanyId,
        request_id: &RequestId,
        record_id: &RecordId,
    ) -> Result<RecordPayload> {
        let now = now_millis();

        let request = match self.store.get_request(request_id).await? {
            Some(request) if request.company_id == *company_id => request,
            // Unknown request and foreign request answer identically.
            _ => {
                return Err(DisclosureError::Permission(format!(
                    "no approved disclosure for company {}",
                    company_id
                )));
            }
        };

        let grant = match self
            .grants
            .check_and_consume_for_record(request_id, record_id, now)
            .await?
        {
            ConsumeOutcome::Allow(grant) => grant,
            ConsumeOutcome::Deny(reason) => {
                self.audit
                    .record(
                        AuditEvent::new(
                            actor,
                            AuditAction::Deny,
                            ResourceKind::Record,
                            record_id.as_str(),
                            now,
                        )
                        .with_severity(Severity::Warning)
                        .with_after(
                            serde_json::json!({
                                "request_id": request_id.to_hex(),
                                "reason": reason.to_string(),
                            })
                            .to_string(),
                        ),
                    )
                    .await;

                return Err(deny_error(reason, request_id, record_id));
            }
        };

        let payload = self
            .records
            .get_record(record_id)
            .await?
            .ok_or_else(|| {
                DisclosureError::NotFound(format!("record {} not found", record_id))
            })?;

        let payload = self.decrypt_payload(payload);

        self.audit
            .record(
                AuditEvent::new(
                    actor,
                    AuditAction::View,
                    ResourceKind::Record,
                    record_id.as_str(),
                    now,
                )
                .with_after(
                    serde_json::json!({
                        "request_id": request_id.to_hex(),
                        "grant_id": grant.grant_id.to_hex(),
                        "access_count": grant.access_count,
                        "max_access_count": grant.max_access_count,
                    })
                    .to_string(),
                ),
            )
            .await;

        self.settle_request(&request, now).await;

        Ok(payload)
    }

    /// Revoke a grant. Delegates to the grant store.
    pub async fn revoke_grant(&self, actor: &ActorContext, grant_id: &GrantId) -> Result<()> {
        self.grants.revoke(actor, grant_id).await
    }

    /// Get a request by id.
    pub async fn get_request(&self, request_id: &RequestId) -> Result<Option<DisclosureRequest>> {
        self.requests.get(request_id).await
    }

    /// List grants issued under a request.
    pub async fn grants_for_request(&self, request_id: &RequestId) -> Result<Vec<Grant>> {
        self.grants.list(request_id).await
    }

    /// List audit events for a resource, newest first.
    pub async fn audit_history(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        page: Page,
    ) -> Result<Vec<AuditEvent>> {
        self.audit.query(kind, resource_id, page).await
    }

    /// Record one out-of-band audit event. Best-effort.
    pub async fn record_audit_event(&self, event: AuditEvent) -> Option<AuditEventId> {
        self.audit.record(event).await
    }

    /// Decrypt the configured sensitive fields of a payload.
    fn decrypt_payload(&self, mut payload: RecordPayload) -> RecordPayload {
        for field in &self.config.sensitive_fields {
            if let Some(value) = payload.fields.get_mut(field) {
                *value = self.cipher.decrypt(value);
            }
        }
        payload
    }

    /// Apply the implicit Approved→Fulfilled transition.
    ///
    /// Runs after a successful consume: when no grant of the request
    /// remains live and at least one was consumed, the request is
    /// settled via a conditional update. Best-effort; a failure here
    /// never fails the read that triggered it.
    async fn settle_request(&self, request: &DisclosureRequest, now: UnixMillis) {
        let grants = match self.store.list_grants(&request.request_id).await {
            Ok(grants) => grants,
            Err(e) => {
                tracing::warn!(error = %e, request_id = %request.request_id,
                    "could not inspect grants for settlement; continuing");
                return;
            }
        };

        let all_dead = !grants.is_empty() && grants.iter().all(|g| !g.is_live(now));
        let any_consumed = grants.iter().any(|g| g.access_count > 0);
        if !(all_dead && any_consumed) {
            return;
        }

        if let Err(e) = self.store.mark_request_fulfilled(&request.request_id).await {
            tracing::warn!(error = %e, request_id = %request.request_id,
                "could not settle request; continuing");
        }
    }
}

fn deny_error(reason: DenyReason, request_id: &RequestId, record_id: &RecordId) -> DisclosureError {
    match reason {
        DenyReason::Expired => DisclosureError::Expired {
            record_id: record_id.clone(),
        },
        DenyReason::QuotaExhausted => DisclosureError::QuotaExhausted {
            record_id: record_id.clone(),
        },
        DenyReason::NotFound => DisclosureError::NotFound(format!(
            "no grant for record {} under request {}",
            record_id, request_id
        )),
    }
}
