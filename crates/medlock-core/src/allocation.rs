//! The company↔subject allocation: the coarse relationship that must be
//! approved before any disclosure request may be submitted.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{AllocationId, CompanyId, PolicyRef, SubjectId, UnixMillis};

/// Approval state of an allocation.
///
/// Stored as a single small integer at the storage boundary; a tagged
/// enum everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationStatus {
    /// Proposed, awaiting an administrator decision.
    Pending,
    /// Approved; disclosure requests may reference it.
    Approved,
    /// Rejected. Terminal.
    Rejected,
}

impl AllocationStatus {
    /// Integer encoding used by the store.
    pub fn to_i64(self) -> i64 {
        match self {
            AllocationStatus::Pending => 0,
            AllocationStatus::Approved => 1,
            AllocationStatus::Rejected => 2,
        }
    }

    /// Decode from the store's integer encoding.
    pub fn from_i64(v: i64) -> Result<Self, CoreError> {
        match v {
            0 => Ok(AllocationStatus::Pending),
            1 => Ok(AllocationStatus::Approved),
            2 => Ok(AllocationStatus::Rejected),
            other => Err(CoreError::InvalidStatus(other)),
        }
    }

    /// Stable string form used in audit snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Pending => "pending",
            AllocationStatus::Approved => "approved",
            AllocationStatus::Rejected => "rejected",
        }
    }
}

/// Optional policy coverage window attached to an allocation.
///
/// Reviewer-facing context; record reads are gated by grants, not by
/// this window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageWindow {
    /// Coverage begins (Unix ms).
    pub starts_at: UnixMillis,
    /// Coverage ends (Unix ms).
    pub ends_at: UnixMillis,
}

/// A proposed or decided relationship between a requesting company and a
/// subject, scoped to one policy.
///
/// Unique per `(company_id, subject_id, policy_ref)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Identifier.
    pub allocation_id: AllocationId,
    /// The requesting organization.
    pub company_id: CompanyId,
    /// The subject whose records may later be requested.
    pub subject_id: SubjectId,
    /// The policy under which the relationship exists.
    pub policy_ref: PolicyRef,
    /// Optional coverage window.
    pub coverage: Option<CoverageWindow>,
    /// Approval state.
    pub status: AllocationStatus,
    /// Free-form notes; the administrator decision appends here.
    pub notes: Option<String>,
    /// When the allocation was proposed (Unix ms).
    pub created_at: UnixMillis,
    /// When the administrator decided, if decided (Unix ms).
    pub decided_at: Option<UnixMillis>,
}

impl Allocation {
    /// Build a fresh Pending allocation.
    pub fn propose(
        company_id: CompanyId,
        subject_id: SubjectId,
        policy_ref: PolicyRef,
        coverage: Option<CoverageWindow>,
        notes: Option<String>,
        now: UnixMillis,
    ) -> Self {
        Self {
            allocation_id: AllocationId::generate(),
            company_id,
            subject_id,
            policy_ref,
            coverage,
            status: AllocationStatus::Pending,
            notes,
            created_at: now,
            decided_at: None,
        }
    }

    /// Whether the allocation still awaits a decision.
    pub fn is_pending(&self) -> bool {
        self.status == AllocationStatus::Pending
    }

    /// Whether the allocation authorizes disclosure requests.
    pub fn is_approved(&self) -> bool {
        self.status == AllocationStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            AllocationStatus::Pending,
            AllocationStatus::Approved,
            AllocationStatus::Rejected,
        ] {
            assert_eq!(AllocationStatus::from_i64(status.to_i64()).unwrap(), status);
        }
    }

    #[test]
    fn test_status_rejects_unknown_encoding() {
        assert!(AllocationStatus::from_i64(7).is_err());
    }

    #[test]
    fn test_propose_starts_pending() {
        let alloc = Allocation::propose(
            CompanyId::new("ins-1"),
            SubjectId::new("pat-1"),
            PolicyRef::new("pol-1"),
            None,
            None,
            1_700_000_000_000,
        );
        assert!(alloc.is_pending());
        assert!(!alloc.is_approved());
        assert_eq!(alloc.decided_at, None);
    }
}
