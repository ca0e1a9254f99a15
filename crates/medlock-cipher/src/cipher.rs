//! The field cipher: ChaCha20-Poly1305 over individual attribute values.
//!
//! Sensitive attributes are persisted as ciphertext and decrypted
//! transparently on authorized read. Two on-disk forms coexist:
//!
//! - **v1** (written today): `enc$1$<hex(nonce || ciphertext)>` with a
//!   fresh random 12-byte nonce per value. Self-describing via the tag.
//! - **legacy** (read-only): bare lowercase hex of ciphertext produced
//!   with one fixed nonce for every value. Recognized structurally,
//!   never written.
//!
//! Columns may also hold plaintext rows written before a field was
//! declared sensitive; anything that fails the structural heuristic is
//! returned verbatim.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use crate::error::{CipherError, Result};

/// Version tag prefixing every ciphertext written today.
const V1_PREFIX: &str = "enc$1$";

/// The fixed nonce the predecessor used for every value. Read path only.
const LEGACY_NONCE: [u8; 12] = [0u8; 12];

/// Poly1305 authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// ChaCha20-Poly1305 nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Sentinel returned for ciphertext that fails to decrypt.
pub const UNAVAILABLE: &str = "[unavailable]";

/// A 256-bit symmetric key for field encryption.
///
/// Provisioned externally at process start; rotation is out of scope.
#[derive(Clone)]
pub struct FieldKey([u8; 32]);

impl FieldKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CipherError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Generate a new random key. Test and provisioning use only.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Stateless field encryptor/decryptor over one process-wide key.
#[derive(Clone)]
pub struct FieldCipher {
    aead: ChaCha20Poly1305,
}

impl FieldCipher {
    /// Build a cipher over the provisioned key.
    pub fn new(key: FieldKey) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Encrypt a field value into the v1 self-describing form.
    ///
    /// Empty input is the identity.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        body.extend_from_slice(&nonce_bytes);
        body.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", V1_PREFIX, hex::encode(body)))
    }

    /// Decrypt a stored field value.
    ///
    /// Never raises. Values that fail the structural heuristic are
    /// legacy plaintext and come back verbatim; ciphertext that fails
    /// authentication degrades to [`UNAVAILABLE`] with a warning so a
    /// single corrupt row cannot fail a list query.
    pub fn decrypt(&self, stored: &str) -> String {
        if stored.is_empty() {
            return String::new();
        }

        if let Some(body) = stored.strip_prefix(V1_PREFIX) {
            return match self.decrypt_v1(body) {
                Some(plaintext) => plaintext,
                None => {
                    tracing::warn!(form = "v1", "undecryptable field value");
                    UNAVAILABLE.to_string()
                }
            };
        }

        if looks_like_legacy(stored) {
            return match self.decrypt_legacy(stored) {
                Some(plaintext) => plaintext,
                None => {
                    tracing::warn!(form = "legacy", "undecryptable field value");
                    UNAVAILABLE.to_string()
                }
            };
        }

        // Plaintext row written before the field was declared sensitive.
        stored.to_string()
    }

    /// Structural check: is this value one of the ciphertext forms?
    ///
    /// Purely syntactic; a legacy-shaped plaintext (long bare hex) is an
    /// accepted false positive that degrades to the sentinel on read.
    pub fn looks_encrypted(&self, value: &str) -> bool {
        if let Some(body) = value.strip_prefix(V1_PREFIX) {
            return body.len() >= 2 * (NONCE_LEN + TAG_LEN) && is_lower_hex(body);
        }
        looks_like_legacy(value)
    }

    fn decrypt_v1(&self, body: &str) -> Option<String> {
        let bytes = hex::decode(body).ok()?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.aead.decrypt(nonce, ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }

    fn decrypt_legacy(&self, stored: &str) -> Option<String> {
        let ciphertext = hex::decode(stored).ok()?;
        let nonce = Nonce::from_slice(&LEGACY_NONCE);
        let plaintext = self.aead.decrypt(nonce, &ciphertext[..]).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

/// Legacy form: bare lowercase hex, even length, at least one plaintext
/// byte plus the authentication tag.
fn looks_like_legacy(value: &str) -> bool {
    value.len() >= 2 * (TAG_LEN + 1) && value.len() % 2 == 0 && is_lower_hex(value)
}

fn is_lower_hex(value: &str) -> bool {
    value
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
