//! # Medlock Core
//!
//! Pure primitives for the Medlock disclosure kernel: identifiers,
//! lifecycle states, and the audit event model.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the disclosure domain model.
//!
//! ## Key Types
//!
//! - [`Allocation`] - The coarse company↔subject relationship
//! - [`DisclosureRequest`] - A scoped, reviewed ask for records
//! - [`Grant`] - A per-record, quota-and-TTL-bounded permission slip
//! - [`AuditEvent`] - One append-only audit trail entry
//!
//! ## Encoding
//!
//! Lifecycle states are tagged enums here and single small integers at
//! the storage boundary. Request scopes are encoded as deterministic
//! CBOR. See the [`request`] module.

pub mod allocation;
pub mod audit;
pub mod error;
pub mod grant;
pub mod request;
pub mod types;

pub use allocation::{Allocation, AllocationStatus, CoverageWindow};
pub use audit::{role_from_str, AuditAction, AuditEvent, ResourceKind, Severity};
pub use error::CoreError;
pub use grant::{DenyReason, Grant};
pub use request::{DatePeriod, DisclosureRequest, RequestScope, RequestStatus, ReviewDecision};
pub use types::{
    now_millis, ActorContext, ActorId, ActorRole, AllocationId, AuditEventId, CompanyId, GrantId,
    Page, PolicyRef, RecordId, RequestId, SubjectId, UnixMillis,
};
