//! The disclosure request lifecycle: a scoped ask for records, reviewed
//! by a human approver.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ActorId, CompanyId, RequestId, SubjectId, UnixMillis};

/// Lifecycle state of a disclosure request.
///
/// Transitions are monotonic: `Pending → {Approved, Rejected}`;
/// `Approved → Fulfilled` once every grant of the request is dead and at
/// least one was consumed. `Rejected` and `Fulfilled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Submitted, awaiting review.
    Pending,
    /// Approved; grants may be issued against it.
    Approved,
    /// Rejected with a mandatory reason. Terminal.
    Rejected,
    /// All issued grants exhausted or expired, at least one consumed. Terminal.
    Fulfilled,
}

impl RequestStatus {
    /// Integer encoding used by the store.
    pub fn to_i64(self) -> i64 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::Approved => 1,
            RequestStatus::Rejected => 2,
            RequestStatus::Fulfilled => 3,
        }
    }

    /// Decode from the store's integer encoding.
    pub fn from_i64(v: i64) -> Result<Self, CoreError> {
        match v {
            0 => Ok(RequestStatus::Pending),
            1 => Ok(RequestStatus::Approved),
            2 => Ok(RequestStatus::Rejected),
            3 => Ok(RequestStatus::Fulfilled),
            other => Err(CoreError::InvalidStatus(other)),
        }
    }

    /// Stable string form used in audit snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Fulfilled => "fulfilled",
        }
    }
}

/// Reviewer verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewDecision {
    /// Approve the request; per-record grants follow.
    Approve,
    /// Reject the request; a non-empty reason is mandatory.
    Reject,
}

/// Inclusive date range limiting a request's scope (Unix ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePeriod {
    /// Earliest record date covered.
    pub from: UnixMillis,
    /// Latest record date covered.
    pub until: UnixMillis,
}

/// What a request asks for: a record-kind filter and an optional date
/// range.
///
/// Encoded as deterministic CBOR at rest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestScope {
    /// Record kinds requested; empty means every kind.
    pub record_kinds: Vec<String>,
    /// Optional date range.
    pub period: Option<DatePeriod>,
}

impl RequestScope {
    /// Scope covering every record kind with no date bound.
    pub fn any() -> Self {
        Self::default()
    }

    /// Scope limited to the given record kinds.
    pub fn kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            record_kinds: kinds.into_iter().map(Into::into).collect(),
            period: None,
        }
    }

    /// Attach a date range.
    pub fn with_period(mut self, from: UnixMillis, until: UnixMillis) -> Self {
        self.period = Some(DatePeriod { from, until });
        self
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e: ciborium::de::Error<std::io::Error>| {
            CoreError::Decoding(e.to_string())
        })
    }
}

/// A scoped, reviewed ask for a subject's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureRequest {
    /// Externally visible identifier.
    pub request_id: RequestId,
    /// The requesting organization.
    pub company_id: CompanyId,
    /// The subject whose records are requested.
    pub subject_id: SubjectId,
    /// Stated purpose of the disclosure.
    pub purpose: String,
    /// Requested scope.
    pub scope: RequestScope,
    /// Lifecycle state.
    pub status: RequestStatus,
    /// When the request was submitted (Unix ms).
    pub submitted_at: UnixMillis,
    /// When the request was reviewed, if reviewed (Unix ms).
    pub reviewed_at: Option<UnixMillis>,
    /// Who reviewed it, if reviewed.
    pub reviewed_by: Option<ActorId>,
    /// Reviewer notes; mandatory on rejection.
    pub response_notes: Option<String>,
    /// Optional absolute expiry set at approval (Unix ms).
    pub expiry_at: Option<UnixMillis>,
}

impl DisclosureRequest {
    /// Build a fresh Pending request.
    pub fn submit(
        company_id: CompanyId,
        subject_id: SubjectId,
        purpose: impl Into<String>,
        scope: RequestScope,
        now: UnixMillis,
    ) -> Self {
        Self {
            request_id: RequestId::generate(),
            company_id,
            subject_id,
            purpose: purpose.into(),
            scope,
            status: RequestStatus::Pending,
            submitted_at: now,
            reviewed_at: None,
            reviewed_by: None,
            response_notes: None,
            expiry_at: None,
        }
    }

    /// Whether grants may currently be issued against this request.
    pub fn is_approved(&self) -> bool {
        self.status == RequestStatus::Approved
    }
}
