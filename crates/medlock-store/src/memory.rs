//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. The conditional
//! updates apply their predicate under a single write lock, matching
//! the atomicity the SQLite statements provide.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use medlock_core::{
    ActorId, Allocation, AllocationId, AllocationStatus, AuditEvent, CompanyId, DisclosureRequest,
    Grant, GrantId, Page, RecordId, RequestId, RequestStatus, ResourceKind, SubjectId, UnixMillis,
};

use crate::error::Result;
use crate::traits::{InsertOutcome, Store, UpdateOutcome};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Allocations indexed by id.
    allocations: HashMap<AllocationId, Allocation>,

    /// Uniqueness index: (company, subject, policy) -> allocation id.
    allocation_tuples: HashMap<(CompanyId, SubjectId, String), AllocationId>,

    /// Requests indexed by id.
    requests: HashMap<RequestId, DisclosureRequest>,

    /// Grants indexed by id.
    grants: HashMap<GrantId, Grant>,

    /// Uniqueness index: (request, record) -> grant id.
    grant_targets: HashMap<(RequestId, RecordId), GrantId>,

    /// Append-only audit log in insertion order.
    audit: Vec<AuditEvent>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_allocation(&self, allocation: &Allocation) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().unwrap();

        let key = (
            allocation.company_id.clone(),
            allocation.subject_id.clone(),
            allocation.policy_ref.as_str().to_string(),
        );
        if inner.allocation_tuples.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }

        inner.allocation_tuples.insert(key, allocation.allocation_id);
        inner
            .allocations
            .insert(allocation.allocation_id, allocation.clone());

        Ok(InsertOutcome::Inserted)
    }

    async fn get_allocation(&self, id: &AllocationId) -> Result<Option<Allocation>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.allocations.get(id).cloned())
    }

    async fn decide_allocation(
        &self,
        id: &AllocationId,
        status: AllocationStatus,
        notes: Option<&str>,
        decided_at: UnixMillis,
    ) -> Result<UpdateOutcome> {
        let mut inner = self.inner.write().unwrap();

        match inner.allocations.get_mut(id) {
            Some(alloc) if alloc.status == AllocationStatus::Pending => {
                alloc.status = status;
                if let Some(notes) = notes {
                    alloc.notes = Some(notes.to_string());
                }
                alloc.decided_at = Some(decided_at);
                Ok(UpdateOutcome::Applied)
            }
            _ => Ok(UpdateOutcome::Unchanged),
        }
    }

    async fn approved_allocation_exists(
        &self,
        company: &CompanyId,
        subject: &SubjectId,
    ) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.allocations.values().any(|a| {
            a.company_id == *company
                && a.subject_id == *subject
                && a.status == AllocationStatus::Approved
        }))
    }

    async fn insert_request(&self, request: &DisclosureRequest) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.requests.insert(request.request_id, request.clone());
        Ok(())
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<DisclosureRequest>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.requests.get(id).cloned())
    }

    async fn review_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        reviewed_by: &ActorId,
        notes: Option<&str>,
        reviewed_at: UnixMillis,
        expiry_at: Option<UnixMillis>,
    ) -> Result<UpdateOutcome> {
        let mut inner = self.inner.write().unwrap();

        match inner.requests.get_mut(id) {
            Some(request) if request.status == RequestStatus::Pending => {
                request.status = status;
                request.reviewed_by = Some(reviewed_by.clone());
                request.response_notes = notes.map(str::to_string);
                request.reviewed_at = Some(reviewed_at);
                request.expiry_at = expiry_at;
                Ok(UpdateOutcome::Applied)
            }
            _ => Ok(UpdateOutcome::Unchanged),
        }
    }

    async fn mark_request_fulfilled(&self, id: &RequestId) -> Result<UpdateOutcome> {
        let mut inner = self.inner.write().unwrap();

        match inner.requests.get_mut(id) {
            Some(request) if request.status == RequestStatus::Approved => {
                request.status = RequestStatus::Fulfilled;
                Ok(UpdateOutcome::Applied)
            }
            _ => Ok(UpdateOutcome::Unchanged),
        }
    }

    async fn insert_grant(&self, grant: &Grant) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().unwrap();

        let key = (grant.request_id, grant.record_id.clone());
        if inner.grant_targets.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }

        inner.grant_targets.insert(key, grant.grant_id);
        inner.grants.insert(grant.grant_id, grant.clone());

        Ok(InsertOutcome::Inserted)
    }

    async fn get_grant(&self, id: &GrantId) -> Result<Option<Grant>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.grants.get(id).cloned())
    }

    async fn find_grant(&self, request: &RequestId, record: &RecordId) -> Result<Option<Grant>> {
        let inner = self.inner.read().unwrap();
        let id = inner.grant_targets.get(&(*request, record.clone()));
        Ok(id.and_then(|id| inner.grants.get(id)).cloned())
    }

    async fn list_grants(&self, request: &RequestId) -> Result<Vec<Grant>> {
        let inner = self.inner.read().unwrap();
        let mut grants: Vec<Grant> = inner
            .grants
            .values()
            .filter(|g| g.request_id == *request)
            .cloned()
            .collect();
        grants.sort_by_key(|g| g.created_at);
        Ok(grants)
    }

    async fn consume_grant(&self, id: &GrantId, now: UnixMillis) -> Result<UpdateOutcome> {
        let mut inner = self.inner.write().unwrap();

        // Predicate and increment under one write lock: the in-memory
        // twin of the SQLite conditional UPDATE.
        match inner.grants.get_mut(id) {
            Some(grant) if grant.is_live(now) => {
                grant.access_count += 1;
                grant.last_accessed_at = Some(now);
                Ok(UpdateOutcome::Applied)
            }
            _ => Ok(UpdateOutcome::Unchanged),
        }
    }

    async fn revoke_grant(&self, id: &GrantId) -> Result<UpdateOutcome> {
        let mut inner = self.inner.write().unwrap();

        match inner.grants.get_mut(id) {
            Some(grant) => {
                grant.access_count = grant.max_access_count;
                Ok(UpdateOutcome::Applied)
            }
            None => Ok(UpdateOutcome::Unchanged),
        }
    }

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.audit.push(event.clone());
        Ok(())
    }

    async fn query_audit_events(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        page: Page,
    ) -> Result<Vec<AuditEvent>> {
        let inner = self.inner.read().unwrap();

        let mut matching: Vec<(usize, &AuditEvent)> = inner
            .audit
            .iter()
            .enumerate()
            .filter(|(_, e)| e.resource_kind == kind && e.resource_id == resource_id)
            .collect();

        // Newest first; insertion order breaks timestamp ties.
        matching.sort_by(|(ia, a), (ib, b)| b.at.cmp(&a.at).then(ib.cmp(ia)));

        Ok(matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|(_, e)| e.clone())
            .collect())
    }
}
