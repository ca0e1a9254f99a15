//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an in-memory service
//! environment with scripted records, a capturing notifier, and a
//! store wrapper that can fail audit writes on demand.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use medlock::collaborators::{
    NotificationKind, NotificationSender, ProviderError, RecordPayload, RecordsProvider,
};
use medlock::{DisclosureService, ServiceConfig};
use medlock_cipher::{FieldCipher, FieldKey};
use medlock_core::{
    ActorContext, ActorId, ActorRole, Allocation, AllocationId, AllocationStatus, AuditEvent,
    CompanyId, DisclosureRequest, Grant, GrantId, Page, PolicyRef, RecordId, RequestId,
    RequestScope, RequestStatus, ResourceKind, ReviewDecision, SubjectId, UnixMillis,
};
use medlock_store::{InsertOutcome, MemoryStore, Result as StoreResult, Store, UpdateOutcome};

/// Key every fixture cipher uses, so tests can pre-encrypt values.
pub const TEST_KEY: [u8; 32] = [0x21; 32];

/// A notification captured by [`CollectingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub recipient: String,
    pub kind: NotificationKind,
    pub body: String,
}

/// Notification sender that records deliveries and can be told to fail.
#[derive(Default)]
pub struct CollectingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
}

impl CollectingNotifier {
    /// Create a new collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every subsequent delivery fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for CollectingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        kind: NotificationKind,
        body: &str,
    ) -> Result<(), ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::new("notifier offline"));
        }
        self.sent.lock().unwrap().push(SentNotification {
            recipient: recipient.to_string(),
            kind,
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Records provider backed by a scripted map.
#[derive(Default)]
pub struct StaticRecords {
    records: RwLock<HashMap<RecordId, RecordPayload>>,
}

impl StaticRecords {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a record payload.
    pub fn insert(&self, payload: RecordPayload) {
        self.records
            .write()
            .unwrap()
            .insert(payload.record_id.clone(), payload);
    }

    /// Script a record from a field list.
    pub fn insert_fields<'a>(
        &self,
        record_id: &str,
        kind: &str,
        fields: impl IntoIterator<Item = (&'a str, String)>,
    ) {
        let payload = RecordPayload {
            record_id: RecordId::new(record_id),
            kind: kind.to_string(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
        };
        self.insert(payload);
    }
}

#[async_trait]
impl RecordsProvider for StaticRecords {
    async fn get_record(&self, id: &RecordId) -> Result<Option<RecordPayload>, ProviderError> {
        Ok(self.records.read().unwrap().get(id).cloned())
    }
}

/// Store wrapper that delegates everything and can fail audit appends.
///
/// Exercises the best-effort audit policy: the primary operation must
/// succeed even while every audit write errors.
pub struct AuditFailStore<S> {
    inner: S,
    fail_audit: AtomicBool,
}

impl<S> AuditFailStore<S> {
    /// Wrap a store.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_audit: AtomicBool::new(false),
        }
    }

    /// Make every subsequent audit append fail (or succeed again).
    pub fn set_fail_audit(&self, failing: bool) {
        self.fail_audit.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: Store> Store for AuditFailStore<S> {
    async fn insert_allocation(&self, allocation: &Allocation) -> StoreResult<InsertOutcome> {
        self.inner.insert_allocation(allocation).await
    }

    async fn get_allocation(&self, id: &AllocationId) -> StoreResult<Option<Allocation>> {
        self.inner.get_allocation(id).await
    }

    async fn decide_allocation(
        &self,
        id: &AllocationId,
        status: AllocationStatus,
        notes: Option<&str>,
        decided_at: UnixMillis,
    ) -> StoreResult<UpdateOutcome> {
        self.inner.decide_allocation(id, status, notes, decided_at).await
    }

    async fn approved_allocation_exists(
        &self,
        company: &CompanyId,
        subject: &SubjectId,
    ) -> StoreResult<bool> {
        self.inner.approved_allocation_exists(company, subject).await
    }

    async fn insert_request(&self, request: &DisclosureRequest) -> StoreResult<()> {
        self.inner.insert_request(request).await
    }

    async fn get_request(&self, id: &RequestId) -> StoreResult<Option<DisclosureRequest>> {
        self.inner.get_request(id).await
    }

    async fn review_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        reviewed_by: &ActorId,
        notes: Option<&str>,
        reviewed_at: UnixMillis,
        expiry_at: Option<UnixMillis>,
    ) -> StoreResult<UpdateOutcome> {
        self.inner
            .review_request(id, status, reviewed_by, notes, reviewed_at, expiry_at)
            .await
    }

    async fn mark_request_fulfilled(&self, id: &RequestId) -> StoreResult<UpdateOutcome> {
        self.inner.mark_request_fulfilled(id).await
    }

    async fn insert_grant(&self, grant: &Grant) -> StoreResult<InsertOutcome> {
        self.inner.insert_grant(grant).await
    }

    async fn get_grant(&self, id: &GrantId) -> StoreResult<Option<Grant>> {
        self.inner.get_grant(id).await
    }

    async fn find_grant(
        &self,
        request: &RequestId,
        record: &RecordId,
    ) -> StoreResult<Option<Grant>> {
        self.inner.find_grant(request, record).await
    }

    async fn list_grants(&self, request: &RequestId) -> StoreResult<Vec<Grant>> {
        self.inner.list_grants(request).await
    }

    async fn consume_grant(&self, id: &GrantId, now: UnixMillis) -> StoreResult<UpdateOutcome> {
        self.inner.consume_grant(id, now).await
    }

    async fn revoke_grant(&self, id: &GrantId) -> StoreResult<UpdateOutcome> {
        self.inner.revoke_grant(id).await
    }

    async fn append_audit_event(&self, event: &AuditEvent) -> StoreResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(medlock_store::StoreError::Runtime(
                "audit table offline".to_string(),
            ));
        }
        self.inner.append_audit_event(event).await
    }

    async fn query_audit_events(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        page: Page,
    ) -> StoreResult<Vec<AuditEvent>> {
        self.inner.query_audit_events(kind, resource_id, page).await
    }
}

/// The fixture administrator actor.
pub fn admin() -> ActorContext {
    ActorContext::new("adm-1", ActorRole::Administrator)
}

/// The fixture reviewer actor.
pub fn reviewer() -> ActorContext {
    ActorContext::new("rev-1", ActorRole::Reviewer)
}

/// The fixture insurer-side actor.
pub fn insurer() -> ActorContext {
    ActorContext::new("agent-1", ActorRole::Insurer)
}

/// A ready-to-use service environment over any store backend.
pub struct TestEnv<S: Store = MemoryStore> {
    pub service: DisclosureService<S>,
    pub records: Arc<StaticRecords>,
    pub notifier: Arc<CollectingNotifier>,
    pub cipher: FieldCipher,
}

impl TestEnv<MemoryStore> {
    /// Environment over an in-memory store with default config.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for TestEnv<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> TestEnv<S> {
    /// Environment over the given store backend.
    pub fn with_store(store: S) -> Self {
        Self::with_store_and_config(store, ServiceConfig::default())
    }

    /// Environment with a custom service config.
    pub fn with_store_and_config(store: S, config: ServiceConfig) -> Self {
        let records = Arc::new(StaticRecords::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let cipher = FieldCipher::new(FieldKey::from_bytes(TEST_KEY));
        let service = DisclosureService::new(
            store,
            cipher.clone(),
            Arc::clone(&records) as Arc<dyn RecordsProvider>,
            Arc::clone(&notifier) as Arc<dyn NotificationSender>,
            config,
        );
        Self {
            service,
            records,
            notifier,
            cipher,
        }
    }

    /// Propose and approve an allocation for the pair.
    pub async fn approved_allocation(&self, company: &str, subject: &str) -> Allocation {
        let admin = admin();
        let allocation = self
            .service
            .allocations()
            .propose(
                &admin,
                CompanyId::new(company),
                SubjectId::new(subject),
                PolicyRef::new(format!("pol-{}-{}", company, subject)),
                None,
                None,
            )
            .await
            .expect("propose allocation");
        self.service
            .allocations()
            .decide(&admin, &allocation.allocation_id, true, None)
            .await
            .expect("approve allocation")
    }

    /// Allocation → submitted request → approved request, in one step.
    pub async fn approved_request(&self, company: &str, subject: &str) -> DisclosureRequest {
        self.approved_allocation(company, subject).await;
        let request = self
            .service
            .request_disclosure(
                &insurer(),
                CompanyId::new(company),
                SubjectId::new(subject),
                "claim verification",
                RequestScope::any(),
            )
            .await
            .expect("submit request");
        self.service
            .review_disclosure(
                &reviewer(),
                &request.request_id,
                ReviewDecision::Approve,
                None,
                None,
            )
            .await
            .expect("approve request")
    }

    /// Issue a grant for one record under an approved request.
    pub async fn granted_record(
        &self,
        request_id: &RequestId,
        record: &str,
        max_access_count: u32,
        granted_until: Option<UnixMillis>,
    ) -> Grant {
        self.service
            .grants()
            .issue(
                &reviewer(),
                request_id,
                RecordId::new(record),
                granted_until,
                max_access_count,
            )
            .await
            .expect("issue grant")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_builds_approved_request() {
        let env = TestEnv::new();
        let request = env.approved_request("ins-acme", "pat-7").await;
        assert!(request.is_approved());
        assert_eq!(request.company_id.as_str(), "ins-acme");
    }

    #[tokio::test]
    async fn test_collecting_notifier_captures_and_fails() {
        let notifier = CollectingNotifier::new();
        notifier
            .notify("pat-7", NotificationKind::RequestSubmitted, "hello")
            .await
            .unwrap();
        assert_eq!(notifier.sent().len(), 1);

        notifier.set_failing(true);
        assert!(notifier
            .notify("pat-7", NotificationKind::RequestSubmitted, "again")
            .await
            .is_err());
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_fail_store_only_fails_audit() {
        let store = AuditFailStore::new(MemoryStore::new());
        store.set_fail_audit(true);

        let request = DisclosureRequest::submit(
            CompanyId::new("c"),
            SubjectId::new("s"),
            "p",
            RequestScope::any(),
            0,
        );
        store.insert_request(&request).await.unwrap();
        assert!(store.get_request(&request.request_id).await.unwrap().is_some());

        let actor = ActorContext::new("a", ActorRole::System);
        let event = AuditEvent::new(
            &actor,
            medlock_core::AuditAction::Create,
            ResourceKind::Request,
            "r",
            0,
        );
        assert!(store.append_audit_event(&event).await.is_err());
    }
}
