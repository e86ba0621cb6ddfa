//! Content hashing helpers. SHA-256, hex-encoded, over the exact byte
//! content of the normalized text. Readers use the same function, so a
//! mismatch means the payload was mangled in transit.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the given text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hello "));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let h = content_hash("");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
