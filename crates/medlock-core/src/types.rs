//! Strong type definitions for Medlock.
//!
//! All identifiers are newtypes to prevent misuse at compile time.
//! Internally generated identifiers (allocations, requests, grants, audit
//! events) are 16 random bytes rendered as hex. Identifiers owned by
//! external systems (companies, subjects, records, actors) are opaque
//! strings and pass through untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in milliseconds.
pub type UnixMillis = i64;

/// Get the current time in milliseconds.
pub fn now_millis() -> UnixMillis {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

macro_rules! generated_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                use rand::RngCore;
                let mut bytes = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                let arr: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; 16] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

generated_id! {
    /// Identifier of a company↔subject allocation.
    AllocationId
}

generated_id! {
    /// Externally visible identifier of a disclosure request.
    RequestId
}

generated_id! {
    /// Identifier of a per-record access grant.
    GrantId
}

generated_id! {
    /// Identifier of an audit trail event.
    AuditEventId
}

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap an externally supplied identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// View as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id! {
    /// Identifier of a requesting organization (insurer).
    CompanyId
}

opaque_id! {
    /// Identifier of the subject whose records are requested.
    SubjectId
}

opaque_id! {
    /// Opaque identifier of a medical record held by the records store.
    RecordId
}

opaque_id! {
    /// Identifier of the acting principal, supplied by the session context.
    ActorId
}

opaque_id! {
    /// Reference to the policy under which an allocation is proposed.
    PolicyRef
}

/// Role of the acting principal, supplied by the session context.
///
/// Medlock trusts this unconditionally; role gating of routes belongs to
/// the surrounding HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorRole {
    /// Record-holding organization administrator.
    Administrator,
    /// Human approver of disclosure requests.
    Reviewer,
    /// Requesting organization agent.
    Insurer,
    /// Internal automation.
    System,
}

impl ActorRole {
    /// Stable string form used in the audit trail.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Administrator => "administrator",
            ActorRole::Reviewer => "reviewer",
            ActorRole::Insurer => "insurer",
            ActorRole::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity every call into the subsystem carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    /// Who is acting.
    pub actor_id: ActorId,
    /// In what role.
    pub actor_role: ActorRole,
}

impl ActorContext {
    /// Build an actor context.
    pub fn new(actor_id: impl Into<ActorId>, actor_role: ActorRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_role,
        }
    }
}

/// Limit/offset paging for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Maximum rows returned.
    pub limit: u32,
    /// Rows skipped before the first returned row.
    pub offset: u32,
}

impl Page {
    /// First page with the given size.
    pub fn first(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}
