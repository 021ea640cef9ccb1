//! Content hashing utilities for plan identifiers.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept by [`short_hash`].
pub const SHORT_HASH_LEN: usize = 8;

/// Compute SHA256 hash of a serializable value.
///
/// The value is serialized to JSON before hashing, ensuring deterministic output.
/// Returns a 64-character lowercase hexadecimal string.
///
/// # Errors
/// Returns an error if the value cannot be serialized to JSON.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// First [`SHORT_HASH_LEN`] characters of [`compute_hash`].
pub fn short_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut hash = compute_hash(value)?;
    hash.truncate(SHORT_HASH_LEN);
    Ok(hash)
}

/// Infallible short fingerprint.
///
/// Falls back to hashing the `Debug` rendering when JSON serialization fails.
pub fn fingerprint<T: Serialize + fmt::Debug>(value: &T) -> String {
    match short_hash(value) {
        Ok(hash) => hash,
        Err(_) => {
            let mut hasher = Sha256::new();
            hasher.update(format!("{:?}", value).as_bytes());
            let mut hash = format!("{:x}", hasher.finalize());
            hash.truncate(SHORT_HASH_LEN);
            hash
        }
    }
}
