//! The audit trail data model: append-only events recording every state
//! transition and sensitive read.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::types::{ActorContext, ActorId, ActorRole, AuditEventId, UnixMillis};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// An allocation was proposed.
    Propose,
    /// A request was created.
    Create,
    /// A request or allocation was approved.
    Approve,
    /// A request or allocation was rejected.
    Reject,
    /// A grant was issued.
    Issue,
    /// A grant was revoked.
    Revoke,
    /// A record was read under a grant.
    View,
    /// A read attempt was denied.
    Deny,
}

impl AuditAction {
    /// Stable string form persisted by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Propose => "propose",
            AuditAction::Create => "create",
            AuditAction::Approve => "approve",
            AuditAction::Reject => "reject",
            AuditAction::Issue => "issue",
            AuditAction::Revoke => "revoke",
            AuditAction::View => "view",
            AuditAction::Deny => "deny",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "propose" => Ok(AuditAction::Propose),
            "create" => Ok(AuditAction::Create),
            "approve" => Ok(AuditAction::Approve),
            "reject" => Ok(AuditAction::Reject),
            "issue" => Ok(AuditAction::Issue),
            "revoke" => Ok(AuditAction::Revoke),
            "view" => Ok(AuditAction::View),
            "deny" => Ok(AuditAction::Deny),
            other => Err(CoreError::InvalidLabel(other.to_string())),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of resource an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A company↔subject allocation.
    Allocation,
    /// A disclosure request.
    Request,
    /// A per-record grant.
    Grant,
    /// A medical record.
    Record,
}

impl ResourceKind {
    /// Stable string form persisted by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Allocation => "allocation",
            ResourceKind::Request => "request",
            ResourceKind::Grant => "grant",
            ResourceKind::Record => "record",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "allocation" => Ok(ResourceKind::Allocation),
            "request" => Ok(ResourceKind::Request),
            "grant" => Ok(ResourceKind::Grant),
            "record" => Ok(ResourceKind::Record),
            other => Err(CoreError::InvalidLabel(other.to_string())),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How alarming an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Routine transition or read.
    Info,
    /// Denied access, recovered failure.
    Warning,
    /// Operation failure.
    Error,
    /// Integrity-threatening condition.
    Critical,
}

impl Severity {
    /// Stable string form persisted by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            other => Err(CoreError::InvalidLabel(other.to_string())),
        }
    }
}

/// One append-only audit event. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Identifier.
    pub event_id: AuditEventId,
    /// Who acted.
    pub actor_id: ActorId,
    /// In what role.
    pub actor_role: ActorRole,
    /// What happened.
    pub action: AuditAction,
    /// What kind of resource.
    pub resource_kind: ResourceKind,
    /// Which resource, rendered as its external string form.
    pub resource_id: String,
    /// JSON snapshot before the transition, when meaningful.
    pub before: Option<String>,
    /// JSON snapshot after the transition, when meaningful.
    pub after: Option<String>,
    /// How alarming.
    pub severity: Severity,
    /// When (Unix ms).
    pub at: UnixMillis,
}

impl AuditEvent {
    /// Build an Info-severity event for the given actor and resource.
    pub fn new(
        actor: &ActorContext,
        action: AuditAction,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        at: UnixMillis,
    ) -> Self {
        Self {
            event_id: AuditEventId::generate(),
            actor_id: actor.actor_id.clone(),
            actor_role: actor.actor_role,
            action,
            resource_kind,
            resource_id: resource_id.into(),
            before: None,
            after: None,
            severity: Severity::Info,
            at,
        }
    }

    /// Attach a before-snapshot.
    pub fn with_before(mut self, before: impl Into<String>) -> Self {
        self.before = Some(before.into());
        self
    }

    /// Attach an after-snapshot.
    pub fn with_after(mut self, after: impl Into<String>) -> Self {
        self.after = Some(after.into());
        self
    }

    /// Override the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Role string used when re-hydrating events from the store.
///
/// Unknown role strings map to `System` rather than failing a list
/// query over historic rows.
pub fn role_from_str(s: &str) -> ActorRole {
    match s {
        "administrator" => ActorRole::Administrator,
        "reviewer" => ActorRole::Reviewer,
        "insurer" => ActorRole::Insurer,
        _ => ActorRole::System,
    }
}
