//! # Medlock Store
//!
//! Storage abstraction for the Medlock disclosure kernel. Provides a
//! trait-based interface for disclosure state persistence with SQLite
//! and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts persistence behind the [`Store`] trait,
//! allowing the kernel to be storage-agnostic. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertOutcome`] / [`UpdateOutcome`] - Conditional write results
//!
//! ## Design Notes
//!
//! - **Conditional writes**: every state transition with a precondition
//!   (allocation decision, request review, grant consumption) is one
//!   conditional statement; the affected-row count is the source of
//!   truth and `Unchanged` is authoritative, never retried.
//! - **Atomic consumption**: `consume_grant` carries the liveness
//!   predicate inside the UPDATE so concurrent readers cannot race a
//!   read-then-write pair past the quota.
//! - **Append-only audit**: `audit_events` rows are inserted and
//!   queried, never mutated.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertOutcome, Store, UpdateOutcome};
