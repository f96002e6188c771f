//! Content fingerprints.
//!
//! A SHA-256 hex digest over raw bytes is the cheap proxy for "did the
//! resource change". Equality of digests, not of bytes, defines
//! "unchanged".

use sha2::{Digest, Sha256};

/// Digest of the empty byte string.
pub const EMPTY_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Compute the lowercase SHA-256 hex digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!("{digest:x}")
}
