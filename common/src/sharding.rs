//! Two-level digest sharding for object-store keys, so no single
//! directory ever holds more than a couple hundred entries.
//!
//! Generalizes a two-character-prefix sharding convention (digest encoded
//! in lower hex, sharded after the second character) into the small utility
//! both `blockstore` (block bodies) and `object_backend` (arbitrary sharded
//! keys) build their key layout on.

/// `hash_to_key(prefix, d) = "<prefix><d[0:2]>/<d[2:4]>/<d>"` for `|d| >= 4`,
/// else `"<prefix><d>"`.
pub fn hash_to_key(prefix: &str, digest_hex: &str) -> String {
    if digest_hex.len() >= 4 {
        format!(
            "{prefix}{}/{}/{}",
            &digest_hex[0..2],
            &digest_hex[2..4],
            digest_hex
        )
    } else {
        format!("{prefix}{digest_hex}")
    }
}
