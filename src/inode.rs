//! Stable 64-bit inode numbering.
//!
//! Per the design spec, an inode is an FNV-1a hash of a canonical string: the
//! mount-relative path for directories, the hex object-ID for content nodes
//! (trees, blobs, symlinks). This mirrors the Go prototype's
//! `fuse/inode.go`, which hashes the same way with `hash/fnv`.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over raw bytes.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Inode for a directory node, hashed from its canonical mount-relative path
/// (e.g. `"commits/ab/abcd"`, `"branch_histories/main"`).
#[must_use]
pub fn inode_for_path(canonical_path: &str) -> u64 {
    fnv1a(canonical_path.as_bytes())
}

/// Inode for a content node (tree, blob, symlink), hashed from the hex
/// object-ID that backs it.
#[must_use]
pub fn inode_for_object(oid: &gix::ObjectId) -> u64 {
    fnv1a(oid.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_known_vector() {
        // FNV-1a 64-bit test vector for the empty string is the offset basis.
        assert_eq!(fnv1a(b""), FNV_OFFSET_BASIS);
    }

    #[test]
    fn inode_for_path_is_stable_and_order_sensitive() {
        let a = inode_for_path("commits/ab/abcd");
        let b = inode_for_path("commits/ab/abcd");
        let c = inode_for_path("commits/ab/abce");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn inode_for_object_depends_on_full_hex_id() {
        let id = gix::ObjectId::from_hex(b"0123456789abcdef0123456789abcdef01234567").unwrap();
        let other = gix::ObjectId::from_hex(b"0000000000000000000000000000000000000000").unwrap();
        assert_ne!(inode_for_object(&id), inode_for_object(&other));
    }
}
