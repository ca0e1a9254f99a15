//! Per-record access grants: quota-and-TTL-bounded permission slips
//! produced by approving a disclosure request.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ActorId, GrantId, RecordId, RequestId, UnixMillis};

/// A per-record permission slip owned by an approved request.
///
/// Invariant: `access_count <= max_access_count` always. A grant is live
/// iff it is neither expired nor exhausted; only live grants admit a
/// record read, and consumption is a single conditional write in the
/// store, never a read-then-write pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Identifier.
    pub grant_id: GrantId,
    /// The owning request. The grant cascades with it.
    pub request_id: RequestId,
    /// The single record this grant covers.
    pub record_id: RecordId,
    /// The reviewer who issued the grant.
    pub approved_by: ActorId,
    /// Absolute expiry (Unix ms); `None` means no expiry.
    pub granted_until: Option<UnixMillis>,
    /// Successful reads so far.
    pub access_count: u32,
    /// Maximum successful reads permitted (≥ 1).
    pub max_access_count: u32,
    /// When the grant was issued (Unix ms).
    pub created_at: UnixMillis,
    /// When the grant was last consumed, if ever (Unix ms).
    pub last_accessed_at: Option<UnixMillis>,
}

impl Grant {
    /// Build a fresh grant with zero consumed accesses.
    pub fn issue(
        request_id: RequestId,
        record_id: RecordId,
        approved_by: ActorId,
        granted_until: Option<UnixMillis>,
        max_access_count: u32,
        now: UnixMillis,
    ) -> Self {
        Self {
            grant_id: GrantId::generate(),
            request_id,
            record_id,
            approved_by,
            granted_until,
            access_count: 0,
            max_access_count,
            created_at: now,
            last_accessed_at: None,
        }
    }

    /// Whether the expiry instant has passed.
    pub fn is_expired(&self, now: UnixMillis) -> bool {
        match self.granted_until {
            Some(until) => now >= until,
            None => false,
        }
    }

    /// Whether the usage quota is spent.
    pub fn is_exhausted(&self) -> bool {
        self.access_count >= self.max_access_count
    }

    /// Whether the grant currently admits a read.
    pub fn is_live(&self, now: UnixMillis) -> bool {
        !self.is_expired(now) && !self.is_exhausted()
    }

    /// Reads remaining before exhaustion.
    pub fn remaining(&self) -> u32 {
        self.max_access_count.saturating_sub(self.access_count)
    }
}

/// Why a consumption attempt was denied.
///
/// The conditional update in the store is authoritative; this reason
/// only labels the denial for the caller's retry logic. When a grant is
/// both expired and exhausted, expiry wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// `granted_until` has passed.
    Expired,
    /// `access_count` reached `max_access_count`.
    QuotaExhausted,
    /// No grant exists for the target.
    NotFound,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenyReason::Expired => "expired",
            DenyReason::QuotaExhausted => "quota exhausted",
            DenyReason::NotFound => "not found",
        };
        f.write_str(s)
    }
}
