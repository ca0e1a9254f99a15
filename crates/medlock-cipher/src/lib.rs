//! # Medlock Cipher
//!
//! Field-level symmetric encryption for sensitive record attributes.
//!
//! ## Overview
//!
//! Sensitive attributes are persisted as ciphertext produced by
//! [`FieldCipher::encrypt`] and must round-trip through
//! [`FieldCipher::decrypt`]. The store tolerates three row forms at
//! once:
//!
//! - **v1 ciphertext**: `enc$1$` tag, random nonce, written today
//! - **legacy ciphertext**: bare hex under one fixed nonce, read-only
//! - **plaintext**: rows written before the field was declared
//!   sensitive, returned verbatim
//!
//! ## Failure Policy
//!
//! Decryption never raises into the caller. Corrupt or unauthentic
//! ciphertext degrades to the [`UNAVAILABLE`] sentinel and a
//! warning-level report, so a single bad row cannot fail a list query.

pub mod cipher;
pub mod error;

pub use cipher::{FieldCipher, FieldKey, UNAVAILABLE};
pub use error::{CipherError, Result};
