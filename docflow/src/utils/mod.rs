//! Small helpers for identifiers, timestamps and content digests.

pub mod timestamps;

pub use timestamps::{iso_timestamp, now_utc, Timestamp};

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generates a new UUID v7 (time-ordered), used for job identifiers.
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Returns the hex-encoded SHA-256 digest of a byte payload.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_v7_is_valid() {
        let id = generate_uuid_v7();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_uuid_v7_is_time_ordered() {
        let a = generate_uuid_v7();
        let b = generate_uuid_v7();
        assert!(a < b);
    }

    #[test]
    fn test_content_digest_is_stable() {
        let digest = content_digest(b"hello");
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_ne!(digest, content_digest(b"hello!"));
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }
}
