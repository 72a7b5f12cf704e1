//! Shared row/record shapes for the six metadata tables, used by `store`
//! (the adapter that persists them), `fs_graph`, `id_translator`,
//! `token_store` and `sync_protocol` (which interpret and assemble them).
//! Kept in `common` so none of those crates has to depend on another just
//! to share a struct definition — the same role `common` plays for
//! `FileID`/`ChunkID` elsewhere in this workspace.

use serde::{Deserialize, Serialize};

/// A library's mutable/immutable fields `head_commit_id`
/// is the only field ever overwritten after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub tenant: String,
    pub library_id: String,
    pub owner: String,
    pub name: String,
    pub description: String,
    /// `None` until the first commit is minted
    pub head_commit_id: Option<String>,
    pub root_commit_id: Option<String>,
    pub size_bytes: i64,
    pub file_count: i64,
    pub version_ttl_secs: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An immutable commit node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub library_id: String,
    pub commit_id: String,
    pub root_fs_id: String,
    pub parent_id: Option<String>,
    pub second_parent_id: Option<String>,
    pub creator: String,
    pub description: String,
    pub created_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsObjectKind {
    File,
    Dir,
}

impl FsObjectKind {
    /// The wire-format kind byte used by `recv-fs`: `1` for a
    /// file, `3` for a directory.
    pub fn wire_byte(self) -> u8 {
        match self {
            FsObjectKind::File => b'1',
            FsObjectKind::Dir => b'3',
        }
    }

    pub fn from_wire_byte(b: u8) -> Option<Self> {
        match b {
            b'1' => Some(FsObjectKind::File),
            b'3' => Some(FsObjectKind::Dir),
            _ => None,
        }
    }
}

/// One entry inside a directory's serialized entry list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub child_fs_id: String,
    pub mode: u32,
    pub mtime: i64,
    pub size: i64,
}

/// An immutable node in a library's Merkle tree
/// `file` variants carry an ordered block-digest list; `dir` variants carry
/// a serialized entry list under `dir_entries` (opaque to the adapter,
/// interpreted by `fs_graph`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsObject {
    pub library_id: String,
    pub fs_id: String,
    pub kind: FsObjectKind,
    pub name: Option<String>,
    pub size_bytes: Option<i64>,
    pub mtime: Option<i64>,
    /// Ordered list of block digests (file objects only).
    pub block_ids: Vec<String>,
    /// Canonical serialized directory entries (dir objects only).
    pub dir_entries: Option<String>,
}

/// A block row (the `blocks` table).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub tenant: String,
    pub block_id: String,
    pub size_bytes: i64,
    pub storage_class: String,
    pub storage_key: String,
    pub ref_count: i64,
    pub created_at: i64,
    pub last_accessed: i64,
}

/// A `(tenant, external_id) -> internal_id` row ("Legacy↔Modern ID
/// mapping", the `block_id_mappings` table).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIdMapping {
    pub tenant: String,
    pub external_id: String,
    pub internal_id: String,
    pub created_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Upload,
    Download,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Upload => "upload",
            TokenKind::Download => "download",
        }
    }
}

/// An access-token row (the `access_tokens` table).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub kind: TokenKind,
    pub tenant: String,
    pub library: String,
    pub path: String,
    pub user: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
    Failed,
}
