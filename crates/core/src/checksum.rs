//! Content checksum over normalized static files (§4.1 "Checksum").
//!
//! The checksum is the first 16 bytes of a BLAKE2b-512 digest taken over the
//! normalized byte form of a file, not the raw bytes served on the wire.

use blake2::{digest::consts::U64, Blake2b, Digest};
use verscan_schema::Checksum;

type Blake2b512 = Blake2b<U64>;

/// Compute the checksum of already-normalized file content.
///
/// Callers are expected to have run the bytes through
/// [`crate::normalize::FileKind::normalize`] first; this function does not
/// normalize on its own.
#[must_use]
pub fn compute_checksum(normalized: &[u8]) -> Checksum {
    let mut hasher = Blake2b512::new();
    hasher.update(normalized);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Checksum::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        let a = compute_checksum(b"hello");
        let b = compute_checksum(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_distinguishes_content() {
        let a = compute_checksum(b"hello");
        let b = compute_checksum(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn checksum_is_sixteen_bytes() {
        let c = compute_checksum(b"anything");
        assert_eq!(c.as_bytes().len(), 16);
    }
}
