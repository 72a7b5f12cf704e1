//! Shared identifiers and error vocabulary used across every crate in the
//! workspace.
//!
//! A single place for the ID newtypes (`Digest`/`LegacyId`) that every
//! other crate imports rather than re-deriving.

mod error;
mod ids;
pub mod model;
pub mod sharding;

pub use error::ErrorKind;
pub use ids::{Digest, DigestError, ExternalId, LegacyId, LegacyIdError, LibraryId, TenantId};

/// SHA-256 of `bytes`, as used by the chunker (C2) and the block-ID
/// translator (C7) to derive the internal digest of a block body.
pub fn sha256(bytes: &[u8]) -> Digest {
    use sha2::{Digest as _, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    Digest::from_bytes(out.into())
}

/// All-zero 40-hex sentinel standing in for the "empty directory" root
/// fs-id, minted the first time a library is synced with no prior commits.
pub const EMPTY_ROOT_FS_ID: &str = "0000000000000000000000000000000000000000";

/// 40 literal `0` characters, used as the `creator` field of a commit that
/// carries no creator identity
pub const ZERO_CREATOR: &str = "0000000000000000000000000000000000000000";
