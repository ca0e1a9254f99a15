//! Store trait: the abstract interface for disclosure state persistence.
//!
//! This trait allows the kernel to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).
//!
//! Every multi-statement sequence that must be atomic (allocation
//! decision, request review, grant consumption) is expressed as a
//! single conditional write whose affected-row count is returned as an
//! [`UpdateOutcome`]. Callers treat `Unchanged` as authoritative and
//! never fall back to a read-then-write pair.

use async_trait::async_trait;

use medlock_core::{
    ActorId, Allocation, AllocationId, AllocationStatus, AuditEvent, CompanyId, DisclosureRequest,
    Grant, GrantId, Page, RecordId, RequestId, RequestStatus, ResourceKind, SubjectId, UnixMillis,
};

use crate::error::Result;

/// Result of inserting a row guarded by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row was inserted.
    Inserted,
    /// A row already occupies the unique slot.
    Conflict,
}

/// Result of a conditional update. The affected-row count is the source
/// of truth for success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Exactly one row matched the predicate and was changed.
    Applied,
    /// Zero rows matched; the precondition no longer holds.
    Unchanged,
}

impl UpdateOutcome {
    /// Whether the write took effect.
    pub fn applied(self) -> bool {
        matches!(self, UpdateOutcome::Applied)
    }
}

/// The Store trait: async interface for disclosure state persistence.
///
/// All methods are async to support both sync (SQLite) and async
/// backends. For SQLite, we use `spawn_blocking` internally to avoid
/// blocking the runtime.
///
/// # Design Notes
///
/// - **Conditional writes**: state transitions succeed only while the
///   stored status still satisfies the precondition; `Unchanged` is a
///   report, never a silent no-op.
/// - **Atomic consumption**: `consume_grant` increments the access
///   count in one statement guarded by the liveness predicate, so two
///   concurrent readers cannot both spend the last use.
/// - **Append-only audit**: events are inserted and listed, never
///   updated or deleted.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Allocation Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a proposed allocation.
    ///
    /// Returns `Conflict` when an allocation already exists for the same
    /// `(company_id, subject_id, policy_ref)` tuple.
    async fn insert_allocation(&self, allocation: &Allocation) -> Result<InsertOutcome>;

    /// Get an allocation by id.
    async fn get_allocation(&self, id: &AllocationId) -> Result<Option<Allocation>>;

    /// Record an administrator decision.
    ///
    /// Single conditional update: applies only while the stored status
    /// is still `Pending`. `status` must be `Approved` or `Rejected`.
    async fn decide_allocation(
        &self,
        id: &AllocationId,
        status: AllocationStatus,
        notes: Option<&str>,
        decided_at: UnixMillis,
    ) -> Result<UpdateOutcome>;

    /// Whether an `Approved` allocation exists for the pair.
    async fn approved_allocation_exists(
        &self,
        company: &CompanyId,
        subject: &SubjectId,
    ) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Request Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a freshly submitted request.
    async fn insert_request(&self, request: &DisclosureRequest) -> Result<()>;

    /// Get a request by id.
    async fn get_request(&self, id: &RequestId) -> Result<Option<DisclosureRequest>>;

    /// Record a reviewer decision.
    ///
    /// Single conditional update: applies only while the stored status
    /// is still `Pending`, so a concurrent double-review reports
    /// `Unchanged` instead of silently overwriting. `status` must be
    /// `Approved` or `Rejected`.
    async fn review_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        reviewed_by: &ActorId,
        notes: Option<&str>,
        reviewed_at: UnixMillis,
        expiry_at: Option<UnixMillis>,
    ) -> Result<UpdateOutcome>;

    /// Move an `Approved` request to `Fulfilled`.
    ///
    /// Single conditional update guarded on the stored status.
    async fn mark_request_fulfilled(&self, id: &RequestId) -> Result<UpdateOutcome>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a grant.
    ///
    /// Returns `Conflict` when a grant already exists for the same
    /// `(request_id, record_id)` pair.
    async fn insert_grant(&self, grant: &Grant) -> Result<InsertOutcome>;

    /// Get a grant by id.
    async fn get_grant(&self, id: &GrantId) -> Result<Option<Grant>>;

    /// Find the grant covering a record under a request.
    async fn find_grant(&self, request: &RequestId, record: &RecordId) -> Result<Option<Grant>>;

    /// List all grants issued under a request.
    async fn list_grants(&self, request: &RequestId) -> Result<Vec<Grant>>;

    /// Atomically consume one access.
    ///
    /// One conditional update: increments `access_count` only while
    /// `access_count < max_access_count` and the grant has not expired
    /// at `now`. `Unchanged` means denial; the caller classifies the
    /// reason with a follow-up read but must not retry the write.
    async fn consume_grant(&self, id: &GrantId, now: UnixMillis) -> Result<UpdateOutcome>;

    /// Administrative revocation: set `access_count = max_access_count`.
    ///
    /// Idempotent. `Unchanged` means the grant does not exist.
    async fn revoke_grant(&self, id: &GrantId) -> Result<UpdateOutcome>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append one audit event. Insert-only.
    async fn append_audit_event(&self, event: &AuditEvent) -> Result<()>;

    /// List events for a resource, newest first.
    async fn query_audit_events(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        page: Page,
    ) -> Result<Vec<AuditEvent>>;
}
