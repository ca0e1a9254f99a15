//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Medlock. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use medlock_core::{
    role_from_str, ActorId, Allocation, AllocationId, AllocationStatus, AuditAction, AuditEvent,
    AuditEventId, CompanyId, CoverageWindow, DisclosureRequest, Grant, GrantId, Page, PolicyRef,
    RecordId, RequestId, RequestScope, RequestStatus, ResourceKind, Severity, SubjectId,
    UnixMillis,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertOutcome, Store, UpdateOutcome};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. The conditional-update
/// operations rely on the statement's affected-row count, not on the
/// serialization the mutex happens to provide.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking statement on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Runtime(e.to_string()))?
    }
}

// Helper to narrow a BLOB column to a 16-byte identifier.
fn id16(bytes: Vec<u8>, col: &'static str) -> rusqlite::Result<[u8; 16]> {
    bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, col.to_string(), rusqlite::types::Type::Blob)
    })
}

// Helper to surface a domain decode failure from inside a row mapper.
fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_allocation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Allocation> {
    let id_bytes: Vec<u8> = row.get("allocation_id")?;
    let company: String = row.get("company_id")?;
    let subject: String = row.get("subject_id")?;
    let policy: String = row.get("policy_ref")?;
    let starts_at: Option<i64> = row.get("coverage_starts_at")?;
    let ends_at: Option<i64> = row.get("coverage_ends_at")?;
    let status: i64 = row.get("status")?;

    let coverage = match (starts_at, ends_at) {
        (Some(starts_at), Some(ends_at)) => Some(CoverageWindow { starts_at, ends_at }),
        _ => None,
    };

    Ok(Allocation {
        allocation_id: AllocationId::from_bytes(id16(id_bytes, "allocation_id")?),
        company_id: CompanyId::new(company),
        subject_id: SubjectId::new(subject),
        policy_ref: PolicyRef::new(policy),
        coverage,
        status: AllocationStatus::from_i64(status).map_err(decode_err)?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        decided_at: row.get("decided_at")?,
    })
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<DisclosureRequest> {
    let id_bytes: Vec<u8> = row.get("request_id")?;
    let scope_bytes: Vec<u8> = row.get("scope")?;
    let status: i64 = row.get("status")?;
    let reviewed_by: Option<String> = row.get("reviewed_by")?;

    Ok(DisclosureRequest {
        request_id: RequestId::from_bytes(id16(id_bytes, "request_id")?),
        company_id: CompanyId::new(row.get::<_, String>("company_id")?),
        subject_id: SubjectId::new(row.get::<_, String>("subject_id")?),
        purpose: row.get("purpose")?,
        scope: RequestScope::from_bytes(&scope_bytes).map_err(decode_err)?,
        status: RequestStatus::from_i64(status).map_err(decode_err)?,
        submitted_at: row.get("submitted_at")?,
        reviewed_at: row.get("reviewed_at")?,
        reviewed_by: reviewed_by.map(ActorId::new),
        response_notes: row.get("response_notes")?,
        expiry_at: row.get("expiry_at")?,
    })
}

fn row_to_grant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Grant> {
    let grant_bytes: Vec<u8> = row.get("grant_id")?;
    let request_bytes: Vec<u8> = row.get("request_id")?;

    Ok(Grant {
        grant_id: GrantId::from_bytes(id16(grant_bytes, "grant_id")?),
        request_id: RequestId::from_bytes(id16(request_bytes, "request_id")?),
        record_id: RecordId::new(row.get::<_, String>("record_id")?),
        approved_by: ActorId::new(row.get::<_, String>("approved_by")?),
        granted_until: row.get("granted_until")?,
        access_count: row.get::<_, i64>("access_count")? as u32,
        max_access_count: row.get::<_, i64>("max_access_count")? as u32,
        created_at: row.get("created_at")?,
        last_accessed_at: row.get("last_accessed_at")?,
    })
}

fn row_to_audit_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let id_bytes: Vec<u8> = row.get("event_id")?;
    let role: String = row.get("actor_role")?;
    let action: String = row.get("action")?;
    let kind: String = row.get("resource_kind")?;
    let severity: String = row.get("severity")?;

    Ok(AuditEvent {
        event_id: AuditEventId::from_bytes(id16(id_bytes, "event_id")?),
        actor_id: ActorId::new(row.get::<_, String>("actor_id")?),
        actor_role: role_from_str(&role),
        action: AuditAction::parse(&action).map_err(decode_err)?,
        resource_kind: ResourceKind::parse(&kind).map_err(decode_err)?,
        resource_id: row.get("resource_id")?,
        before: row.get("before_state")?,
        after: row.get("after_state")?,
        severity: Severity::parse(&severity).map_err(decode_err)?,
        at: row.get("at")?,
    })
}

const ALLOCATION_COLUMNS: &str = "allocation_id, company_id, subject_id, policy_ref, \
     coverage_starts_at, coverage_ends_at, status, notes, created_at, decided_at";

const REQUEST_COLUMNS: &str = "request_id, company_id, subject_id, purpose, scope, status, \
     submitted_at, reviewed_at, reviewed_by, response_notes, expiry_at";

const GRANT_COLUMNS: &str = "grant_id, request_id, record_id, approved_by, granted_until, \
     access_count, max_access_count, created_at, last_accessed_at";

#[async_trait]
impl Store for SqliteStore {
    async fn insert_allocation(&self, allocation: &Allocation) -> Result<InsertOutcome> {
        let allocation = allocation.clone();

        self.run(move |conn| {
            let existing: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT allocation_id FROM allocations
                     WHERE company_id = ?1 AND subject_id = ?2 AND policy_ref = ?3",
                    params![
                        allocation.company_id.as_str(),
                        allocation.subject_id.as_str(),
                        allocation.policy_ref.as_str(),
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                return Ok(InsertOutcome::Conflict);
            }

            conn.execute(
                "INSERT INTO allocations (
                    allocation_id, company_id, subject_id, policy_ref,
                    coverage_starts_at, coverage_ends_at, status, notes,
                    created_at, decided_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    allocation.allocation_id.as_bytes().as_slice(),
                    allocation.company_id.as_str(),
                    allocation.subject_id.as_str(),
                    allocation.policy_ref.as_str(),
                    allocation.coverage.map(|w| w.starts_at),
                    allocation.coverage.map(|w| w.ends_at),
                    allocation.status.to_i64(),
                    allocation.notes,
                    allocation.created_at,
                    allocation.decided_at,
                ],
            )?;

            Ok(InsertOutcome::Inserted)
        })
        .await
    }

    async fn get_allocation(&self, id: &AllocationId) -> Result<Option<Allocation>> {
        let id = *id;

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM allocations WHERE allocation_id = ?1",
                    ALLOCATION_COLUMNS
                ),
                params![id.as_bytes().as_slice()],
                row_to_allocation,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn decide_allocation(
        &self,
        id: &AllocationId,
        status: AllocationStatus,
        notes: Option<&str>,
        decided_at: UnixMillis,
    ) -> Result<UpdateOutcome> {
        let id = *id;
        let notes = notes.map(str::to_string);

        self.run(move |conn| {
            // Conditional write: only a still-Pending allocation can be
            // decided. Zero rows changed is the double-decide signal.
            let changed = conn.execute(
                "UPDATE allocations
                 SET status = ?2, notes = COALESCE(?3, notes), decided_at = ?4
                 WHERE allocation_id = ?1 AND status = ?5",
                params![
                    id.as_bytes().as_slice(),
                    status.to_i64(),
                    notes,
                    decided_at,
                    AllocationStatus::Pending.to_i64(),
                ],
            )?;

            Ok(if changed == 1 {
                UpdateOutcome::Applied
            } else {
                UpdateOutcome::Unchanged
            })
        })
        .await
    }

    async fn approved_allocation_exists(
        &self,
        company: &CompanyId,
        subject: &SubjectId,
    ) -> Result<bool> {
        let company = company.clone();
        let subject = subject.clone();

        self.run(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM allocations
                     WHERE company_id = ?1 AND subject_id = ?2 AND status = ?3
                 )",
                params![
                    company.as_str(),
                    subject.as_str(),
                    AllocationStatus::Approved.to_i64(),
                ],
                |row| row.get(0),
            )?;

            Ok(exists)
        })
        .await
    }

    async fn insert_request(&self, request: &DisclosureRequest) -> Result<()> {
        let request = request.clone();
        let scope = request.scope.to_bytes()?;

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO disclosure_requests (
                    request_id, company_id, subject_id, purpose, scope, status,
                    submitted_at, reviewed_at, reviewed_by, response_notes, expiry_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    request.request_id.as_bytes().as_slice(),
                    request.company_id.as_str(),
                    request.subject_id.as_str(),
                    request.purpose,
                    scope,
                    request.status.to_i64(),
                    request.submitted_at,
                    request.reviewed_at,
                    request.reviewed_by.as_ref().map(|a| a.as_str().to_string()),
                    request.response_notes,
                    request.expiry_at,
                ],
            )?;

            Ok(())
        })
        .await
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<DisclosureRequest>> {
        let id = *id;

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM disclosure_requests WHERE request_id = ?1",
                    REQUEST_COLUMNS
                ),
                params![id.as_bytes().as_slice()],
                row_to_request,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
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
        let id = *id;
        let reviewed_by = reviewed_by.as_str().to_string();
        let notes = notes.map(str::to_string);

        self.run(move |conn| {
            // Conditional write: succeeds only while the stored status is
            // still Pending, so a concurrent double-review reports
            // Unchanged instead of silently overwriting the first verdict.
            let changed = conn.execute(
                "UPDATE disclosure_requests
                 SET status = ?2, reviewed_by = ?3, response_notes = ?4,
                     reviewed_at = ?5, expiry_at = ?6
                 WHERE request_id = ?1 AND status = ?7",
                params![
                    id.as_bytes().as_slice(),
                    status.to_i64(),
                    reviewed_by,
                    notes,
                    reviewed_at,
                    expiry_at,
                    RequestStatus::Pending.to_i64(),
                ],
            )?;

            Ok(if changed == 1 {
                UpdateOutcome::Applied
            } else {
                UpdateOutcome::Unchanged
            })
        })
        .await
    }

    async fn mark_request_fulfilled(&self, id: &RequestId) -> Result<UpdateOutcome> {
        let id = *id;

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE disclosure_requests SET status = ?2
                 WHERE request_id = ?1 AND status = ?3",
                params![
                    id.as_bytes().as_slice(),
                    RequestStatus::Fulfilled.to_i64(),
                    RequestStatus::Approved.to_i64(),
                ],
            )?;

            Ok(if changed == 1 {
                UpdateOutcome::Applied
            } else {
                UpdateOutcome::Unchanged
            })
        })
        .await
    }

    async fn insert_grant(&self, grant: &Grant) -> Result<InsertOutcome> {
        let grant = grant.clone();

        self.run(move |conn| {
            let existing: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT grant_id FROM grants WHERE request_id = ?1 AND record_id = ?2",
                    params![
                        grant.request_id.as_bytes().as_slice(),
                        grant.record_id.as_str(),
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                return Ok(InsertOutcome::Conflict);
            }

            conn.execute(
                "INSERT INTO grants (
                    grant_id, request_id, record_id, approved_by, granted_until,
                    access_count, max_access_count, created_at, last_accessed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    grant.grant_id.as_bytes().as_slice(),
                    grant.request_id.as_bytes().as_slice(),
                    grant.record_id.as_str(),
                    grant.approved_by.as_str(),
                    grant.granted_until,
                    grant.access_count as i64,
                    grant.max_access_count as i64,
                    grant.created_at,
                    grant.last_accessed_at,
                ],
            )?;

            Ok(InsertOutcome::Inserted)
        })
        .await
    }

    async fn get_grant(&self, id: &GrantId) -> Result<Option<Grant>> {
        let id = *id;

        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM grants WHERE grant_id = ?1", GRANT_COLUMNS),
                params![id.as_bytes().as_slice()],
                row_to_grant,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_grant(&self, request: &RequestId, record: &RecordId) -> Result<Option<Grant>> {
        let request = *request;
        let record = record.clone();

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM grants WHERE request_id = ?1 AND record_id = ?2",
                    GRANT_COLUMNS
                ),
                params![request.as_bytes().as_slice(), record.as_str()],
                row_to_grant,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_grants(&self, request: &RequestId) -> Result<Vec<Grant>> {
        let request = *request;

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM grants WHERE request_id = ?1 ORDER BY created_at",
                GRANT_COLUMNS
            ))?;

            let grants = stmt
                .query_map(params![request.as_bytes().as_slice()], row_to_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(grants)
        })
        .await
    }

    async fn consume_grant(&self, id: &GrantId, now: UnixMillis) -> Result<UpdateOutcome> {
        let id = *id;

        self.run(move |conn| {
            // THE correctness-critical write. The liveness predicate lives
            // inside the UPDATE, so two concurrent readers cannot both
            // observe the last remaining use and both succeed.
            let changed = conn.execute(
                "UPDATE grants
                 SET access_count = access_count + 1, last_accessed_at = ?2
                 WHERE grant_id = ?1
                   AND access_count < max_access_count
                   AND (granted_until IS NULL OR granted_until > ?2)",
                params![id.as_bytes().as_slice(), now],
            )?;

            Ok(if changed == 1 {
                UpdateOutcome::Applied
            } else {
                UpdateOutcome::Unchanged
            })
        })
        .await
    }

    async fn revoke_grant(&self, id: &GrantId) -> Result<UpdateOutcome> {
        let id = *id;

        self.run(move |conn| {
            // Idempotent: spending the whole quota kills the grant under
            // the same liveness predicate consumption uses.
            let changed = conn.execute(
                "UPDATE grants SET access_count = max_access_count WHERE grant_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;

            Ok(if changed == 1 {
                UpdateOutcome::Applied
            } else {
                UpdateOutcome::Unchanged
            })
        })
        .await
    }

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<()> {
        let event = event.clone();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO audit_events (
                    event_id, actor_id, actor_role, action, resource_kind,
                    resource_id, before_state, after_state, severity, at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    event.event_id.as_bytes().as_slice(),
                    event.actor_id.as_str(),
                    event.actor_role.as_str(),
                    event.action.as_str(),
                    event.resource_kind.as_str(),
                    event.resource_id,
                    event.before,
                    event.after,
                    event.severity.as_str(),
                    event.at,
                ],
            )?;

            Ok(())
        })
        .await
    }

    async fn query_audit_events(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        page: Page,
    ) -> Result<Vec<AuditEvent>> {
        let resource_id = resource_id.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id, actor_id, actor_role, action, resource_kind,
                        resource_id, before_state, after_state, severity, at
                 FROM audit_events
                 WHERE resource_kind = ?1 AND resource_id = ?2
                 ORDER BY at DESC, rowid DESC
                 LIMIT ?3 OFFSET ?4",
            )?;

            let events = stmt
                .query_map(
                    params![
                        kind.as_str(),
                        resource_id,
                        page.limit as i64,
                        page.offset as i64,
                    ],
                    row_to_audit_event,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(events)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medlock_core::{now_millis, ActorContext, ActorRole};

    fn make_allocation() -> Allocation {
        Allocation::propose(
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            PolicyRef::new("pol-2024-001"),
            None,
            Some("onboarding".to_string()),
            now_millis(),
        )
    }

    fn make_request() -> DisclosureRequest {
        DisclosureRequest::submit(
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            "claim verification",
            RequestScope::kinds(["lab-result"]),
            now_millis(),
        )
    }

    #[tokio::test]
    async fn test_allocation_insert_and_get() {
        let store = SqliteStore::open_memory().unwrap();
        let alloc = make_allocation();

        let outcome = store.insert_allocation(&alloc).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);

        let loaded = store
            .get_allocation(&alloc.allocation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, alloc);
    }

    #[tokio::test]
    async fn test_allocation_tuple_conflict() {
        let store = SqliteStore::open_memory().unwrap();
        let alloc = make_allocation();
        store.insert_allocation(&alloc).await.unwrap();

        // Same tuple, different id.
        let mut dup = make_allocation();
        dup.allocation_id = AllocationId::generate();
        let outcome = store.insert_allocation(&dup).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_decide_allocation_is_single_shot() {
        let store = SqliteStore::open_memory().unwrap();
        let alloc = make_allocation();
        store.insert_allocation(&alloc).await.unwrap();

        let first = store
            .decide_allocation(
                &alloc.allocation_id,
                AllocationStatus::Approved,
                Some("ok"),
                now_millis(),
            )
            .await
            .unwrap();
        assert_eq!(first, UpdateOutcome::Applied);

        // A second decision finds no Pending row to change.
        let second = store
            .decide_allocation(
                &alloc.allocation_id,
                AllocationStatus::Rejected,
                Some("no"),
                now_millis(),
            )
            .await
            .unwrap();
        assert_eq!(second, UpdateOutcome::Unchanged);

        let loaded = store
            .get_allocation(&alloc.allocation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, AllocationStatus::Approved);
    }

    #[tokio::test]
    async fn test_approved_allocation_predicate() {
        let store = SqliteStore::open_memory().unwrap();
        let alloc = make_allocation();
        store.insert_allocation(&alloc).await.unwrap();

        assert!(!store
            .approved_allocation_exists(&alloc.company_id, &alloc.subject_id)
            .await
            .unwrap());

        store
            .decide_allocation(
                &alloc.allocation_id,
                AllocationStatus::Approved,
                None,
                now_millis(),
            )
            .await
            .unwrap();

        assert!(store
            .approved_allocation_exists(&alloc.company_id, &alloc.subject_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_request_roundtrip_with_scope() {
        let store = SqliteStore::open_memory().unwrap();
        let mut request = make_request();
        request.scope = RequestScope::kinds(["lab-result", "prescription"])
            .with_period(1_600_000_000_000, 1_700_000_000_000);

        store.insert_request(&request).await.unwrap();
        let loaded = store
            .get_request(&request.request_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, request);
    }

    #[tokio::test]
    async fn test_review_request_double_review() {
        let store = SqliteStore::open_memory().unwrap();
        let request = make_request();
        store.insert_request(&request).await.unwrap();

        let reviewer = ActorId::new("rev-1");
        let first = store
            .review_request(
                &request.request_id,
                RequestStatus::Approved,
                &reviewer,
                None,
                now_millis(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(first, UpdateOutcome::Applied);

        let second = store
            .review_request(
                &request.request_id,
                RequestStatus::Rejected,
                &reviewer,
                Some("late"),
                now_millis(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(second, UpdateOutcome::Unchanged);

        let loaded = store
            .get_request(&request.request_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, RequestStatus::Approved);
        assert_eq!(loaded.reviewed_by, Some(reviewer));
    }

    #[tokio::test]
    async fn test_grant_conflict_per_record() {
        let store = SqliteStore::open_memory().unwrap();
        let request = make_request();
        store.insert_request(&request).await.unwrap();

        let grant = Grant::issue(
            request.request_id,
            RecordId::new("rec-1"),
            ActorId::new("rev-1"),
            None,
            1,
            now_millis(),
        );
        assert_eq!(
            store.insert_grant(&grant).await.unwrap(),
            InsertOutcome::Inserted
        );

        let dup = Grant::issue(
            request.request_id,
            RecordId::new("rec-1"),
            ActorId::new("rev-1"),
            None,
            3,
            now_millis(),
        );
        assert_eq!(
            store.insert_grant(&dup).await.unwrap(),
            InsertOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn test_consume_grant_respects_quota() {
        let store = SqliteStore::open_memory().unwrap();
        let request = make_request();
        store.insert_request(&request).await.unwrap();

        let grant = Grant::issue(
            request.request_id,
            RecordId::new("rec-1"),
            ActorId::new("rev-1"),
            None,
            2,
            now_millis(),
        );
        store.insert_grant(&grant).await.unwrap();

        let now = now_millis();
        assert!(store.consume_grant(&grant.grant_id, now).await.unwrap().applied());
        assert!(store.consume_grant(&grant.grant_id, now).await.unwrap().applied());
        assert!(!store.consume_grant(&grant.grant_id, now).await.unwrap().applied());

        let loaded = store.get_grant(&grant.grant_id).await.unwrap().unwrap();
        assert_eq!(loaded.access_count, 2);
        assert_eq!(loaded.last_accessed_at, Some(now));
    }

    #[tokio::test]
    async fn test_consume_grant_respects_expiry() {
        let store = SqliteStore::open_memory().unwrap();
        let request = make_request();
        store.insert_request(&request).await.unwrap();

        let now = now_millis();
        let grant = Grant::issue(
            request.request_id,
            RecordId::new("rec-1"),
            ActorId::new("rev-1"),
            Some(now - 1_000),
            5,
            now - 60_000,
        );
        store.insert_grant(&grant).await.unwrap();

        assert!(!store.consume_grant(&grant.grant_id, now).await.unwrap().applied());
        let loaded = store.get_grant(&grant.grant_id).await.unwrap().unwrap();
        assert_eq!(loaded.access_count, 0);
    }

    #[tokio::test]
    async fn test_revoke_grant_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let request = make_request();
        store.insert_request(&request).await.unwrap();

        let grant = Grant::issue(
            request.request_id,
            RecordId::new("rec-1"),
            ActorId::new("rev-1"),
            None,
            5,
            now_millis(),
        );
        store.insert_grant(&grant).await.unwrap();

        assert!(store.revoke_grant(&grant.grant_id).await.unwrap().applied());
        assert!(store.revoke_grant(&grant.grant_id).await.unwrap().applied());

        let loaded = store.get_grant(&grant.grant_id).await.unwrap().unwrap();
        assert!(loaded.is_exhausted());
        assert!(!store
            .consume_grant(&grant.grant_id, now_millis())
            .await
            .unwrap()
            .applied());
    }

    #[tokio::test]
    async fn test_audit_query_newest_first() {
        let store = SqliteStore::open_memory().unwrap();
        let actor = ActorContext::new("adm-1", ActorRole::Administrator);

        for (i, action) in [AuditAction::Create, AuditAction::Approve, AuditAction::View]
            .iter()
            .enumerate()
        {
            let event = AuditEvent::new(
                &actor,
                *action,
                ResourceKind::Request,
                "req-1",
                1_000 + i as i64,
            );
            store.append_audit_event(&event).await.unwrap();
        }

        let events = store
            .query_audit_events(ResourceKind::Request, "req-1", Page::first(2))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuditAction::View);
        assert_eq!(events[1].action, AuditAction::Approve);

        // Other resources are invisible.
        let none = store
            .query_audit_events(ResourceKind::Grant, "req-1", Page::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medlock.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let alloc = make_allocation();
            store.insert_allocation(&alloc).await.unwrap();
        }

        // Reopen and find the row again.
        let store = SqliteStore::open(&path).unwrap();
        let alloc = make_allocation();
        assert_eq!(
            store.insert_allocation(&alloc).await.unwrap(),
            InsertOutcome::Conflict
        );
    }
}
