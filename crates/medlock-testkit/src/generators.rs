//! Proptest generators for property-based testing.

use proptest::prelude::*;

use medlock_core::{
    AllocationId, CompanyId, DatePeriod, GrantId, RecordId, RequestId, RequestScope, SubjectId,
};

/// Generate a random AllocationId.
pub fn allocation_id() -> impl Strategy<Value = AllocationId> {
    any::<[u8; 16]>().prop_map(AllocationId::from_bytes)
}

/// Generate a random RequestId.
pub fn request_id() -> impl Strategy<Value = RequestId> {
    any::<[u8; 16]>().prop_map(RequestId::from_bytes)
}

/// Generate a random GrantId.
pub fn grant_id() -> impl Strategy<Value = GrantId> {
    any::<[u8; 16]>().prop_map(GrantId::from_bytes)
}

/// Generate an external company identifier.
pub fn company_id() -> impl Strategy<Value = CompanyId> {
    "[a-z]{3,8}-[0-9]{1,4}".prop_map(CompanyId::new)
}

/// Generate an external subject identifier.
pub fn subject_id() -> impl Strategy<Value = SubjectId> {
    "pat-[0-9]{1,6}".prop_map(SubjectId::new)
}

/// Generate an opaque record identifier.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    "rec-[0-9a-f]{6}".prop_map(RecordId::new)
}

/// Generate a record kind label.
pub fn record_kind() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("lab-result".to_string()),
        Just("prescription".to_string()),
        Just("imaging".to_string()),
        Just("consultation".to_string()),
    ]
}

/// Generate a request scope.
pub fn request_scope() -> impl Strategy<Value = RequestScope> {
    (
        prop::collection::vec(record_kind(), 0..3),
        prop::option::of((0i64..=1_800_000_000_000, 0i64..=1_800_000_000_000)),
    )
        .prop_map(|(record_kinds, period)| RequestScope {
            record_kinds,
            period: period.map(|(a, b)| DatePeriod {
                from: a.min(b),
                until: a.max(b),
            }),
        })
}

/// Generate a usage quota (≥ 1).
pub fn quota() -> impl Strategy<Value = u32> {
    1u32..=16
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}
