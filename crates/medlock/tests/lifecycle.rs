//! End-to-end lifecycle tests: allocation gate, request review,
//! per-record grants, encrypted reads, and the audit trail.

use medlock::{
    ActorContext, ActorRole, AuditAction, CompanyId, DisclosureError, Page, PolicyRef, RecordId,
    RequestScope, RequestStatus, ResourceKind, ReviewDecision, SubjectId,
};
use medlock_cipher::UNAVAILABLE;
use medlock_store::MemoryStore;
use medlock_testkit::{admin, insurer, reviewer, AuditFailStore, TestEnv};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_submit_without_allocation_is_permission_error() {
    init_tracing();
    let env = TestEnv::new();

    let result = env
        .service
        .request_disclosure(
            &insurer(),
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            "claim verification",
            RequestScope::any(),
        )
        .await;

    assert!(matches!(result, Err(DisclosureError::Permission(_))));
}

#[tokio::test]
async fn test_submit_with_pending_allocation_still_denied() {
    init_tracing();
    let env = TestEnv::new();

    // Proposed but not approved.
    env.service
        .allocations()
        .propose(
            &admin(),
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            PolicyRef::new("pol-1"),
            None,
            None,
        )
        .await
        .unwrap();

    let result = env
        .service
        .request_disclosure(
            &insurer(),
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            "claim verification",
            RequestScope::any(),
        )
        .await;

    assert!(matches!(result, Err(DisclosureError::Permission(_))));
}

#[tokio::test]
async fn test_duplicate_allocation_conflicts() {
    init_tracing();
    let env = TestEnv::new();
    let admin = admin();

    env.service
        .allocations()
        .propose(
            &admin,
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            PolicyRef::new("pol-1"),
            None,
            None,
        )
        .await
        .unwrap();

    let dup = env
        .service
        .allocations()
        .propose(
            &admin,
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            PolicyRef::new("pol-1"),
            None,
            None,
        )
        .await;

    assert!(matches!(dup, Err(DisclosureError::Conflict(_))));
}

#[tokio::test]
async fn test_decide_twice_is_invalid_state() {
    init_tracing();
    let env = TestEnv::new();
    let admin = admin();

    let allocation = env
        .service
        .allocations()
        .propose(
            &admin,
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            PolicyRef::new("pol-1"),
            None,
            None,
        )
        .await
        .unwrap();

    env.service
        .allocations()
        .decide(&admin, &allocation.allocation_id, true, None)
        .await
        .unwrap();

    let second = env
        .service
        .allocations()
        .decide(&admin, &allocation.allocation_id, false, Some("changed my mind".into()))
        .await;
    assert!(matches!(second, Err(DisclosureError::InvalidState(_))));

    // The first verdict stands.
    let loaded = env
        .service
        .allocations()
        .get(&allocation.allocation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(loaded.is_approved());
}

#[tokio::test]
async fn test_reject_requires_reason_and_is_audited() {
    init_tracing();
    let env = TestEnv::new();
    env.approved_allocation("ins-acme", "pat-7").await;

    let request = env
        .service
        .request_disclosure(
            &insurer(),
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            "claim verification",
            RequestScope::kinds(["lab-result"]),
        )
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    // Reason is mandatory on rejection.
    let missing_reason = env
        .service
        .review_disclosure(
            &reviewer(),
            &request.request_id,
            ReviewDecision::Reject,
            None,
            None,
        )
        .await;
    assert!(matches!(missing_reason, Err(DisclosureError::InvalidState(_))));

    let rejected = env
        .service
        .review_disclosure(
            &reviewer(),
            &request.request_id,
            ReviewDecision::Reject,
            Some("insufficient justification".to_string()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(
        rejected.response_notes.as_deref(),
        Some("insufficient justification")
    );

    // Exactly one reject event for this request.
    let events = env
        .service
        .audit_history(
            ResourceKind::Request,
            &request.request_id.to_hex(),
            Page::default(),
        )
        .await
        .unwrap();
    let rejects: Vec<_> = events
        .iter()
        .filter(|e| e.action == AuditAction::Reject)
        .collect();
    assert_eq!(rejects.len(), 1);
    assert_eq!(rejects[0].actor_id.as_str(), "rev-1");
}

#[tokio::test]
async fn test_double_review_keeps_first_verdict() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;

    let late = env
        .service
        .review_disclosure(
            &ActorContext::new("rev-2", ActorRole::Reviewer),
            &request.request_id,
            ReviewDecision::Reject,
            Some("too broad".to_string()),
            None,
        )
        .await;
    assert!(matches!(late, Err(DisclosureError::InvalidState(_))));

    let loaded = env
        .service
        .get_request(&request.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, RequestStatus::Approved);
    assert_eq!(loaded.reviewed_by.unwrap().as_str(), "rev-1");
}

#[tokio::test]
async fn test_grants_only_on_approved_requests() {
    init_tracing();
    let env = TestEnv::new();
    env.approved_allocation("ins-acme", "pat-7").await;

    let request = env
        .service
        .request_disclosure(
            &insurer(),
            CompanyId::new("ins-acme"),
            SubjectId::new("pat-7"),
            "claim verification",
            RequestScope::any(),
        )
        .await
        .unwrap();

    // Still pending: issuance forbidden.
    let premature = env
        .service
        .grants()
        .issue(
            &reviewer(),
            &request.request_id,
            RecordId::new("rec-1"),
            None,
            1,
        )
        .await;
    assert!(matches!(premature, Err(DisclosureError::InvalidState(_))));
}

#[tokio::test]
async fn test_one_grant_per_record_per_request() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;

    env.granted_record(&request.request_id, "rec-1", 1, None).await;

    let dup = env
        .service
        .grants()
        .issue(
            &reviewer(),
            &request.request_id,
            RecordId::new("rec-1"),
            None,
            3,
        )
        .await;
    assert!(matches!(dup, Err(DisclosureError::Conflict(_))));
}

#[tokio::test]
async fn test_two_records_consume_independently() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;
    let company = CompanyId::new("ins-acme");
    let agent = insurer();

    env.records
        .insert_fields("rec-1", "lab-result", [("result", "negative".to_string())]);
    env.records
        .insert_fields("rec-2", "lab-result", [("result", "positive".to_string())]);

    let approvals = env
        .service
        .approve_records(
            &reviewer(),
            &request.request_id,
            vec![RecordId::new("rec-1"), RecordId::new("rec-2")],
            None,
            Some(1),
        )
        .await;
    assert_eq!(approvals.len(), 2);
    assert!(approvals.iter().all(|a| a.outcome.is_ok()));

    // rec-1 reads once, then exhausts.
    let first = env
        .service
        .read_disclosed_record(&agent, &company, &request.request_id, &RecordId::new("rec-1"))
        .await
        .unwrap();
    assert_eq!(first.fields["result"], "negative");

    let second = env
        .service
        .read_disclosed_record(&agent, &company, &request.request_id, &RecordId::new("rec-1"))
        .await;
    assert!(matches!(
        second,
        Err(DisclosureError::QuotaExhausted { .. })
    ));

    // rec-2 is independently consumable.
    let other = env
        .service
        .read_disclosed_record(&agent, &company, &request.request_id, &RecordId::new("rec-2"))
        .await
        .unwrap();
    assert_eq!(other.fields["result"], "positive");
}

#[tokio::test]
async fn test_partial_issue_failure_keeps_other_grants() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;

    // rec-2 already has a grant, so the fan-out fails for it alone.
    env.granted_record(&request.request_id, "rec-2", 1, None).await;

    let approvals = env
        .service
        .approve_records(
            &reviewer(),
            &request.request_id,
            vec![
                RecordId::new("rec-1"),
                RecordId::new("rec-2"),
                RecordId::new("rec-3"),
            ],
            None,
            None,
        )
        .await;

    assert!(approvals[0].outcome.is_ok());
    assert!(matches!(
        approvals[1].outcome,
        Err(DisclosureError::Conflict(_))
    ));
    assert!(approvals[2].outcome.is_ok());

    let grants = env
        .service
        .grants_for_request(&request.request_id)
        .await
        .unwrap();
    assert_eq!(grants.len(), 3);
}

#[tokio::test]
async fn test_expired_grant_denies_regardless_of_quota() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;
    env.records
        .insert_fields("rec-1", "lab-result", [("result", "n/a".to_string())]);

    // Expiry in the past, quota untouched.
    env.granted_record(
        &request.request_id,
        "rec-1",
        5,
        Some(medlock_core::now_millis() - 1_000),
    )
    .await;

    let read = env
        .service
        .read_disclosed_record(
            &insurer(),
            &CompanyId::new("ins-acme"),
            &request.request_id,
            &RecordId::new("rec-1"),
        )
        .await;
    assert!(matches!(read, Err(DisclosureError::Expired { .. })));

    // The denial was audited at warning severity.
    let events = env
        .service
        .audit_history(ResourceKind::Record, "rec-1", Page::default())
        .await
        .unwrap();
    assert_eq!(events[0].action, AuditAction::Deny);
    assert_eq!(events[0].severity, medlock_core::Severity::Warning);
}

#[tokio::test]
async fn test_foreign_company_gets_uniform_permission_error() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;
    env.records
        .insert_fields("rec-1", "lab-result", [("result", "n/a".to_string())]);
    env.granted_record(&request.request_id, "rec-1", 1, None).await;

    // Another company probing the request learns nothing record-specific.
    let foreign = env
        .service
        .read_disclosed_record(
            &insurer(),
            &CompanyId::new("ins-other"),
            &request.request_id,
            &RecordId::new("rec-1"),
        )
        .await;
    assert!(matches!(foreign, Err(DisclosureError::Permission(_))));

    // Unknown request answers identically.
    let unknown = env
        .service
        .read_disclosed_record(
            &insurer(),
            &CompanyId::new("ins-other"),
            &medlock_core::RequestId::generate(),
            &RecordId::new("rec-1"),
        )
        .await;
    assert!(matches!(unknown, Err(DisclosureError::Permission(_))));
}

#[tokio::test]
async fn test_sensitive_fields_decrypt_with_legacy_tolerance() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;

    // One encrypted field, one plaintext legacy field, one corrupt row.
    let encrypted = env.cipher.encrypt("type 2 diabetes").unwrap();
    env.records.insert_fields(
        "rec-1",
        "consultation",
        [
            ("diagnosis", encrypted),
            ("notes", "pre-encryption plaintext row".to_string()),
            ("treatment", "enc$1$00112233445566778899aabbccddeeff".to_string()),
            ("clinic", "unencrypted by policy".to_string()),
        ],
    );
    env.granted_record(&request.request_id, "rec-1", 1, None).await;

    let payload = env
        .service
        .read_disclosed_record(
            &insurer(),
            &CompanyId::new("ins-acme"),
            &request.request_id,
            &RecordId::new("rec-1"),
        )
        .await
        .unwrap();

    assert_eq!(payload.fields["diagnosis"], "type 2 diabetes");
    assert_eq!(payload.fields["notes"], "pre-encryption plaintext row");
    assert_eq!(payload.fields["treatment"], UNAVAILABLE);
    // Not in the sensitive set: untouched.
    assert_eq!(payload.fields["clinic"], "unencrypted by policy");

    // The read was audited.
    let events = env
        .service
        .audit_history(ResourceKind::Record, "rec-1", Page::default())
        .await
        .unwrap();
    assert_eq!(events[0].action, AuditAction::View);
}

#[tokio::test]
async fn test_request_settles_to_fulfilled() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;
    env.records
        .insert_fields("rec-1", "lab-result", [("result", "n/a".to_string())]);
    env.granted_record(&request.request_id, "rec-1", 1, None).await;

    env.service
        .read_disclosed_record(
            &insurer(),
            &CompanyId::new("ins-acme"),
            &request.request_id,
            &RecordId::new("rec-1"),
        )
        .await
        .unwrap();

    let settled = env
        .service
        .get_request(&request.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, RequestStatus::Fulfilled);

    // Terminal: a fulfilled request refuses review.
    let review = env
        .service
        .review_disclosure(
            &reviewer(),
            &request.request_id,
            ReviewDecision::Reject,
            Some("late".to_string()),
            None,
        )
        .await;
    assert!(matches!(review, Err(DisclosureError::InvalidState(_))));
}

#[tokio::test]
async fn test_revoked_grant_denies_as_exhausted() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;
    env.records
        .insert_fields("rec-1", "lab-result", [("result", "n/a".to_string())]);
    let grant = env.granted_record(&request.request_id, "rec-1", 5, None).await;

    env.service
        .revoke_grant(&admin(), &grant.grant_id)
        .await
        .unwrap();
    // Idempotent.
    env.service
        .revoke_grant(&admin(), &grant.grant_id)
        .await
        .unwrap();

    let read = env
        .service
        .read_disclosed_record(
            &insurer(),
            &CompanyId::new("ins-acme"),
            &request.request_id,
            &RecordId::new("rec-1"),
        )
        .await;
    assert!(matches!(read, Err(DisclosureError::QuotaExhausted { .. })));
}

#[tokio::test]
async fn test_notification_failure_never_blocks_transitions() {
    init_tracing();
    let env = TestEnv::new();
    env.notifier.set_failing(true);

    // Propose, approve, submit, review: all succeed while every
    // notification delivery errors.
    let request = env.approved_request("ins-acme", "pat-7").await;
    assert!(request.is_approved());
    assert!(env.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_audit_failure_never_blocks_transitions() {
    init_tracing();
    let store = AuditFailStore::new(MemoryStore::new());
    store.set_fail_audit(true);
    let env = TestEnv::with_store(store);

    let request = env.approved_request("ins-acme", "pat-7").await;
    env.records
        .insert_fields("rec-1", "lab-result", [("result", "n/a".to_string())]);
    env.granted_record(&request.request_id, "rec-1", 1, None).await;

    // The read succeeds even though its audit event is lost.
    let payload = env
        .service
        .read_disclosed_record(
            &insurer(),
            &CompanyId::new("ins-acme"),
            &request.request_id,
            &RecordId::new("rec-1"),
        )
        .await
        .unwrap();
    assert_eq!(payload.fields["result"], "n/a");
}

#[tokio::test]
async fn test_notifications_reach_the_right_parties() {
    init_tracing();
    let env = TestEnv::new();
    let request = env.approved_request("ins-acme", "pat-7").await;
    assert!(request.is_approved());

    let sent = env.notifier.sent();
    // Allocation proposal and request submission go to the subject; the
    // review verdict goes to the company.
    assert!(sent
        .iter()
        .any(|n| n.kind == medlock::NotificationKind::AllocationProposed
            && n.recipient == "pat-7"));
    assert!(sent
        .iter()
        .any(|n| n.kind == medlock::NotificationKind::RequestSubmitted
            && n.recipient == "pat-7"));
    assert!(sent
        .iter()
        .any(|n| n.kind == medlock::NotificationKind::RequestReviewed
            && n.recipient == "ins-acme"));
}
