//! 64-bit FNV-1a, used for embedding buckets and the corpus digest.
//!
//! Both outputs end up persisted (vectors and manifests), so the constants
//! and byte order must never change.

use std::hash::Hasher;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Streaming FNV-1a hasher.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fnv1a(u64);

impl Default for Fnv1a {
    fn default() -> Self {
        Self(FNV_OFFSET)
    }
}

impl Hasher for Fnv1a {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Hashes `parts` joined by single spaces.
pub(crate) fn fnv1a(parts: &[&str]) -> u64 {
    let mut hasher = Fnv1a::default();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.write_u8(b' ');
        }
        hasher.write(part.as_bytes());
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(fnv1a(&[]), FNV_OFFSET);
        assert_eq!(fnv1a(&["a"]), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a(&["foobar"]), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_parts_hash_like_joined_text() {
        assert_eq!(fnv1a(&["gift", "limits"]), fnv1a(&["gift limits"]));
        assert_ne!(fnv1a(&["gift", "limits"]), fnv1a(&["giftlimits"]));
    }
}
