//! Cryptographic Utilities

use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Generate cryptographically secure random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Short, non-reversible identifier for a secret.
///
/// First 8 bytes of SHA-256 in lower hex; safe to log.
pub fn fingerprint(secret: &[u8]) -> String {
    sha256(secret)[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
