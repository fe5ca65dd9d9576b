//! Salted password digest verification.
//!
//! Stored credentials are two URL-safe base64 fields produced by the users
//! API: a digest and a salt. The digest is `SHA-256(password) || salt`.

use base64::{engine::general_purpose, Engine as _};
use constant_time_eq::constant_time_eq;
use rand::Rng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Length of salts produced by [`hash_password`]. Matches the digest length.
pub const SALT_LEN: usize = 32;

/// Compute the stored digest for `password` with the given raw salt.
pub fn compute_digest(password: &str, salt: &[u8]) -> Vec<u8> {
    let mut digest = Sha256::digest(password.as_bytes()).to_vec();
    digest.extend_from_slice(salt);
    digest
}

/// Check a provided password against the stored digest and salt.
///
/// Returns `false` if either stored field fails to decode. The final
/// comparison is constant-time.
pub fn verify_password(provided: &str, stored_digest_b64: &str, salt_b64: &str) -> bool {
    let Ok(expected) = general_purpose::URL_SAFE.decode(stored_digest_b64) else {
        return false;
    };
    let Ok(salt) = general_purpose::URL_SAFE.decode(salt_b64) else {
        return false;
    };

    let expected = Zeroizing::new(expected);
    let computed = Zeroizing::new(compute_digest(provided, &salt));

    constant_time_eq(&computed, &expected)
}

/// Produce a fresh `(digest_b64, salt_b64)` pair for `password`.
pub fn hash_password(password: &str) -> (String, String) {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);

    let digest = Zeroizing::new(compute_digest(password, &salt));
    (
        general_purpose::URL_SAFE.encode(digest.as_slice()),
        general_purpose::URL_SAFE.encode(salt),
    )
}
