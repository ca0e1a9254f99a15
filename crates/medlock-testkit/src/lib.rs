//! # Medlock Testkit
//!
//! Testing utilities for the Medlock disclosure kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: [`TestEnv`] wires a [`DisclosureService`] over an
//!   in-memory store with scripted records and a capturing notifier;
//!   [`AuditFailStore`] fails audit writes on demand to exercise the
//!   best-effort policy.
//! - **Generators**: proptest strategies for identifiers, scopes, and
//!   grant parameters.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medlock_testkit::TestEnv;
//!
//! # async fn example() {
//! let env = TestEnv::new();
//! let request = env.approved_request("ins-acme", "pat-7").await;
//! let grant = env
//!     .granted_record(&request.request_id, "rec-1", 1, None)
//!     .await;
//! # }
//! ```
//!
//! [`DisclosureService`]: medlock::DisclosureService

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    admin, insurer, reviewer, AuditFailStore, CollectingNotifier, SentNotification, StaticRecords,
    TestEnv, TEST_KEY,
};
