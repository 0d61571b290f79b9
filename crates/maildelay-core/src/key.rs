//! Correlation keys and stable identifiers.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Number of random bytes drawn per key.
const KEY_BYTES: usize = 7;

/// Length of a generated key.
pub const KEY_LEN: usize = 10;

/// Generator for short, URL-safe correlation keys.
///
/// Keys carry 50 bits of entropy from the operating system's CSPRNG. They are
/// not checked for uniqueness against any store.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator;

impl KeyGenerator {
    /// Creates a generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates a fresh 10-character lowercase key (`a-z`, `2-7`).
    #[must_use]
    pub fn new_key(&self) -> String {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let mut key = encode_base32(&bytes);
        key.truncate(KEY_LEN);
        key
    }
}

/// Stable local identifier for an email address.
///
/// SHA-256 of the address, URL-safe base64 without padding. The same address
/// always maps to the same identifier.
#[must_use]
pub fn derive_local_id(email: &str) -> String {
    let digest = Sha256::digest(email.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Unpadded RFC 4648 base-32, lower-cased.
fn encode_base32(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes).to_ascii_lowercase()
}
