//! The grant store: per-record permission slips and their atomic
//! consumption.

use std::sync::Arc;

use medlock_core::{
    now_millis, ActorContext, AuditAction, AuditEvent, DenyReason, Grant, GrantId, RecordId,
    RequestId, ResourceKind, UnixMillis,
};
use medlock_store::{InsertOutcome, Store};

use crate::audit::AuditTrail;
use crate::error::{DisclosureError, Result};

/// Verdict of a consumption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The access was counted; this is the only branch permitted to
    /// proceed to payload retrieval.
    Allow(Grant),
    /// The access was not counted.
    Deny(DenyReason),
}

/// Issues, consumes, and revokes per-record grants.
pub struct GrantStore<S> {
    store: Arc<S>,
    audit: AuditTrail<S>,
}

impl<S> Clone for GrantStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            audit: self.audit.clone(),
        }
    }
}

impl<S: Store> GrantStore<S> {
    /// Build a grant store over the shared store.
    pub fn new(store: Arc<S>, audit: AuditTrail<S>) -> Self {
        Self { store, audit }
    }

    /// Issue a grant for one record under an approved request.
    ///
    /// One grant per record per request: a second issuance for the same
    /// pair fails with [`DisclosureError::Conflict`].
    pub async fn issue(
        &self,
        actor: &ActorContext,
        request_id: &RequestId,
        record_id: RecordId,
        granted_until: Option<UnixMillis>,
        max_access_count: u32,
    ) -> Result<Grant> {
        if max_access_count < 1 {
            return Err(DisclosureError::InvalidState(
                "max_access_count must be at least 1".to_string(),
            ));
        }

        let request = self.store.get_request(request_id).await?.ok_or_else(|| {
            DisclosureError::NotFound(format!("request {} not found", request_id))
        })?;

        if !request.is_approved() {
            return Err(DisclosureError::InvalidState(format!(
                "request {} is {}, grants require an approved request",
                request_id,
                request.status.as_str()
            )));
        }

        let now = now_millis();
        let grant = Grant::issue(
            *request_id,
            record_id,
            actor.actor_id.clone(),
            granted_until,
            max_access_count,
            now,
        );

        match self.store.insert_grant(&grant).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::Conflict => {
                return Err(DisclosureError::Conflict(format!(
                    "a grant already exists for record {} under request {}",
                    grant.record_id, request_id
                )));
            }
        }

        self.audit
            .record(
                AuditEvent::new(
                    actor,
                    AuditAction::Issue,
                    ResourceKind::Grant,
                    grant.grant_id.to_hex(),
                    now,
                )
                .with_after(
                    serde_json::json!({
                        "request_id": request_id.to_hex(),
                        "record_id": grant.record_id.as_str(),
                        "max_access_count": grant.max_access_count,
                        "granted_until": grant.granted_until,
                    })
                    .to_string(),
                ),
            )
            .await;

        Ok(grant)
    }

    /// Atomically validate and consume one access on a grant.
    ///
    /// The store applies the liveness predicate and the increment in a
    /// single conditional write; zero rows changed is authoritative
    /// denial and is never retried here. The follow-up read only labels
    /// the reason, expiry winning over exhaustion.
    pub async fn check_and_consume(
        &self,
        grant_id: &GrantId,
        now: UnixMillis,
    ) -> Result<ConsumeOutcome> {
        if self.store.consume_grant(grant_id, now).await?.applied() {
            return match self.store.get_grant(grant_id).await? {
                Some(grant) => Ok(ConsumeOutcome::Allow(grant)),
                // Deleted between the write and the read-back.
                None => Ok(ConsumeOutcome::Deny(DenyReason::NotFound)),
            };
        }

        let reason = match self.store.get_grant(grant_id).await? {
            None => DenyReason::NotFound,
            Some(grant) if grant.is_expired(now) => DenyReason::Expired,
            Some(_) => DenyReason::QuotaExhausted,
        };

        Ok(ConsumeOutcome::Deny(reason))
    }

    /// Consume by `(request, record)` instead of grant id.
    pub async fn check_and_consume_for_record(
        &self,
        request_id: &RequestId,
        record_id: &RecordId,
        now: UnixMillis,
    ) -> Result<ConsumeOutcome> {
        match self.store.find_grant(request_id, record_id).await? {
            Some(grant) => self.check_and_consume(&grant.grant_id, now).await,
            None => Ok(ConsumeOutcome::Deny(DenyReason::NotFound)),
        }
    }

    /// Administrative override: immediately spend the whole quota.
    ///
    /// Idempotent; revoking a dead grant is not an error.
    pub async fn revoke(&self, actor: &ActorContext, grant_id: &GrantId) -> Result<()> {
        if !self.store.revoke_grant(grant_id).await?.applied() {
            return Err(DisclosureError::NotFound(format!(
                "grant {} not found",
                grant_id
            )));
        }

        self.audit
            .record(AuditEvent::new(
                actor,
                AuditAction::Revoke,
                ResourceKind::Grant,
                grant_id.to_hex(),
                now_millis(),
            ))
            .await;

        Ok(())
    }

    /// Get a grant by id.
    pub async fn get(&self, grant_id: &GrantId) -> Result<Option<Grant>> {
        Ok(self.store.get_grant(grant_id).await?)
    }

    /// Find the grant covering a record under a request.
    pub async fn find(
        &self,
        request_id: &RequestId,
        record_id: &RecordId,
    ) -> Result<Option<Grant>> {
        Ok(self.store.find_grant(request_id, record_id).await?)
    }

    /// List all grants issued under a request.
    pub async fn list(&self, request_id: &RequestId) -> Result<Vec<Grant>> {
        Ok(self.store.list_grants(request_id).await?)
    }
}
