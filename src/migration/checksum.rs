//! Checksum calculation for migration steps
//!
//! Used to detect steps whose definition was edited after being applied.

use sha2::{Digest, Sha256};

/// SHA-256 over `parts`, separated by NUL so `["ab", "c"]` and `["a", "bc"]` differ
#[must_use]
pub fn checksum_parts<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_ref().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Compare a stored checksum against the current definition
#[must_use]
pub fn checksums_match(stored: &str, current: &str) -> bool {
    stored.eq_ignore_ascii_case(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_hex_sha256() {
        let sum = checksum_parts(&["m20240301000001_create_reference_types"]);
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_separates_parts() {
        assert_ne!(checksum_parts(&["ab", "c"]), checksum_parts(&["a", "bc"]));
        assert_eq!(checksum_parts(&["a", "b"]), checksum_parts(&["a", "b"]));
    }

    #[test]
    fn test_checksums_match_ignores_case() {
        assert!(checksums_match("ABCDEF", "abcdef"));
        assert!(!checksums_match("abc", "abd"));
    }
}
