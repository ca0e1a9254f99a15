//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! string that transforms the schema from version N to N+1.

use rusqlite::Connection;

use medlock_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Grants cascade with their owning request.
    conn.pragma_update(None, "foreign_keys", true)?;

    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            tracing::debug!(version, "applying schema migration");
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Company↔subject relationships and their approval state
        CREATE TABLE allocations (
            allocation_id BLOB PRIMARY KEY,   -- 16 bytes
            company_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            policy_ref TEXT NOT NULL,
            coverage_starts_at INTEGER,       -- Unix ms, nullable
            coverage_ends_at INTEGER,         -- Unix ms, nullable
            status INTEGER NOT NULL DEFAULT 0, -- 0=pending, 1=approved, 2=rejected
            notes TEXT,
            created_at INTEGER NOT NULL,
            decided_at INTEGER,

            UNIQUE(company_id, subject_id, policy_ref)
        );

        -- Disclosure request lifecycle
        CREATE TABLE disclosure_requests (
            request_id BLOB PRIMARY KEY,      -- 16 bytes, externally visible
            company_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            purpose TEXT NOT NULL,
            scope BLOB NOT NULL,              -- CBOR RequestScope
            status INTEGER NOT NULL DEFAULT 0, -- 0=pending, 1=approved, 2=rejected, 3=fulfilled
            submitted_at INTEGER NOT NULL,
            reviewed_at INTEGER,
            reviewed_by TEXT,
            response_notes TEXT,
            expiry_at INTEGER
        );

        -- Per-record access grants, owned by their request
        CREATE TABLE grants (
            grant_id BLOB PRIMARY KEY,        -- 16 bytes
            request_id BLOB NOT NULL
                REFERENCES disclosure_requests(request_id) ON DELETE CASCADE,
            record_id TEXT NOT NULL,
            approved_by TEXT NOT NULL,
            granted_until INTEGER,            -- absolute expiry, NULL = none
            access_count INTEGER NOT NULL DEFAULT 0,
            max_access_count INTEGER NOT NULL CHECK (max_access_count >= 1),
            created_at INTEGER NOT NULL,
            last_accessed_at INTEGER,

            UNIQUE(request_id, record_id),
            CHECK (access_count <= max_access_count)
        );

        -- Append-only audit trail
        CREATE TABLE audit_events (
            event_id BLOB PRIMARY KEY,        -- 16 bytes
            actor_id TEXT NOT NULL,
            actor_role TEXT NOT NULL,
            action TEXT NOT NULL,
            resource_kind TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            before_state TEXT,                -- JSON snapshot
            after_state TEXT,                 -- JSON snapshot
            severity TEXT NOT NULL,
            at INTEGER NOT NULL
        );

        -- Indexes for common queries
        CREATE INDEX idx_allocations_pair ON allocations(company_id, subject_id, status);
        CREATE INDEX idx_requests_company ON disclosure_requests(company_id);
        CREATE INDEX idx_grants_request ON grants(request_id);
        CREATE INDEX idx_audit_resource ON audit_events(resource_kind, resource_id, at);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"allocations".to_string()));
        assert!(tables.contains(&"disclosure_requests".to_string()));
        assert!(tables.contains(&"grants".to_string()));
        assert!(tables.contains(&"audit_events".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap(); // Should not error

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_quota_invariant_enforced_by_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO disclosure_requests
             (request_id, company_id, subject_id, purpose, scope, status, submitted_at)
             VALUES (?1, 'c', 's', 'p', x'', 1, 0)",
            rusqlite::params![[0u8; 16].as_slice()],
        )
        .unwrap();

        // max_access_count below 1 violates the schema check.
        let result = conn.execute(
            "INSERT INTO grants
             (grant_id, request_id, record_id, approved_by, access_count, max_access_count, created_at)
             VALUES (?1, ?2, 'r', 'a', 0, 0, 0)",
            rusqlite::params![[1u8; 16].as_slice(), [0u8; 16].as_slice()],
        );
        assert!(result.is_err());
    }
}
