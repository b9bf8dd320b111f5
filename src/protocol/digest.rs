//! Truncated digests for command routing and body integrity.
//!
//! Command names and frame bodies are hashed with SHA-1 and truncated to
//! 6 bytes. The truncation is a deliberate space trade-off: collisions
//! across distinct command names are tolerated (first registration wins,
//! duplicates are rejected at registration time) and the checksum is an
//! integrity check, not an authentication tag.

use sha1::{Digest, Sha1};

/// Length of the truncated command hash and checksum fields.
pub const DIGEST_LEN: usize = 6;

/// Hash a command name to its 6-byte wire identifier.
pub fn command_hash(name: &str) -> [u8; DIGEST_LEN] {
    truncate(&Sha1::digest(name.as_bytes()))
}

/// Compute the 6-byte integrity checksum of a frame body.
///
/// When encryption is enabled the checksum is computed over the
/// ciphertext, never the plaintext.
pub fn checksum(body: &[u8]) -> [u8; DIGEST_LEN] {
    truncate(&Sha1::digest(body))
}

fn truncate(digest: &[u8]) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&digest[..DIGEST_LEN]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_hash_is_deterministic() {
        assert_eq!(command_hash("JoinRequest"), command_hash("JoinRequest"));
        assert_ne!(command_hash("JoinRequest"), command_hash("LeaveRequest"));
    }

    #[test]
    fn checksum_tracks_content() {
        let a = checksum(b"hello");
        let b = checksum(b"hellp");
        assert_ne!(a, b);
        assert_eq!(a, checksum(b"hello"));
    }

    #[test]
    fn digests_are_six_bytes() {
        assert_eq!(command_hash("Ping").len(), DIGEST_LEN);
        assert_eq!(checksum(&[0u8; 1024]).len(), DIGEST_LEN);
    }

    #[test]
    fn empty_name_and_body_still_hash() {
        // Validation of empty inputs happens at the codec layer, not here.
        let _ = command_hash("");
        let _ = checksum(b"");
    }
}
