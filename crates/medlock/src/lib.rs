//! # Medlock
//!
//! The unified API for the Medlock system - consented, audited
//! disclosure of sensitive medical records.
//!
//! ## Overview
//!
//! Medlock brokers access between a record-holding organization and
//! external requesting parties under explicit, per-record consent:
//!
//! - **Allocations**: the coarse company↔subject relationship, approved
//!   by an administrator before anything else may happen
//! - **Requests**: scoped asks (purpose + filters) reviewed by a human
//!   approver
//! - **Grants**: per-record, quota-and-TTL-bounded permission slips,
//!   consumed atomically on every read
//! - **Audit**: an append-only trail threaded through every state
//!   transition and sensitive read, best-effort by policy
//!
//! ## Key Invariants
//!
//! - A request may only be submitted against an approved allocation.
//! - Review and consumption are single conditional writes; the
//!   affected-row count decides, so concurrent double-review and
//!   quota races cannot slip through.
//! - The enforcement point for record reads is the per-record grant,
//!   never the request status alone.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use medlock::{DisclosureService, ServiceConfig};
//! use medlock::cipher::{FieldCipher, FieldKey};
//! use medlock::store::SqliteStore;
//! # use medlock::collaborators::{RecordsProvider, NotificationSender};
//!
//! # fn example(records: Arc<dyn RecordsProvider>, notifier: Arc<dyn NotificationSender>) {
//! // Key material is provisioned externally at process start.
//! let cipher = FieldCipher::new(FieldKey::generate());
//!
//! // Open storage.
//! let store = SqliteStore::open("medlock.db").unwrap();
//!
//! // Create the service with explicit dependencies; no globals.
//! let service = DisclosureService::new(
//!     store,
//!     cipher,
//!     records,
//!     notifier,
//!     ServiceConfig::default(),
//! );
//! # }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `medlock::core` - Domain primitives (ids, states, audit model)
//! - `medlock::cipher` - Field-level encryption
//! - `medlock::store` - Storage abstraction and SQLite

pub mod allocation;
pub mod audit;
pub mod collaborators;
pub mod error;
pub mod grant;
pub mod request;
pub mod service;

// Re-export component crates
pub use medlock_cipher as cipher;
pub use medlock_core as core;
pub use medlock_store as store;

// Re-export main types for convenience
pub use allocation::AllocationRegistry;
pub use audit::AuditTrail;
pub use collaborators::{
    NotificationKind, NotificationSender, ProviderError, RecordPayload, RecordsProvider,
};
pub use error::{DisclosureError, Result};
pub use grant::{ConsumeOutcome, GrantStore};
pub use request::DisclosureRequestLedger;
pub use service::{DisclosureService, RecordApproval, ServiceConfig};

// Re-export commonly used core types
pub use medlock_core::{
    ActorContext, ActorRole, Allocation, AllocationId, AllocationStatus, AuditAction, AuditEvent,
    CompanyId, CoverageWindow, DenyReason, DisclosureRequest, Grant, GrantId, Page, PolicyRef,
    RecordId, RequestId, RequestScope, RequestStatus, ResourceKind, ReviewDecision, Severity,
    SubjectId,
};
