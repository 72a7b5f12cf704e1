//! FS Graph Engine (component C10): Merkle-tree arithmetic
//! over the adapter — path traversal, copy-on-write rebuild, directory/file
//! object creation, commit minting, and reference-count helpers.
//!
//! Built entirely on `store`'s `fs_objects`/`commits`/`blocks` tables, since
//! nothing in this corner of the wider codebase holds a commit graph server
//! side. Stateless over the adapter: every method takes whatever
//! identifiers it needs and holds no graph state of its own.
//!
//! fs-ids and commit-ids are SHA-1 (40-hex, legacy-compatible), but derived
//! purely from canonical content rather than wall-clock nanoseconds (see
//! DESIGN.md's Open Question #1): this makes `createFile`/`createDirectory`/
//! commit creation idempotent and deduplicating across identical inputs.

use common::model::{Commit, DirEntry, FsObject, FsObjectKind};
use sha1::{Digest as _, Sha1};
use std::sync::Arc;
use store::{MetadataStore, Persist};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum FsGraphError {
    #[error("path component exists but is a file, not a directory")]
    NotDirectory,
    #[error("path component not found")]
    NotFound,
    #[error("malformed directory entry list: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("metadata store error: {0}")]
    Store(#[from] store::MetadataStoreError),
}

impl FsGraphError {
    pub fn kind(&self) -> common::ErrorKind {
        match self {
            FsGraphError::NotDirectory => common::ErrorKind::InvalidArgument,
            FsGraphError::NotFound => common::ErrorKind::NotFound,
            FsGraphError::Serde(_) => common::ErrorKind::IntegrityViolation,
            FsGraphError::Store(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FsGraphError>;

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A directory visited on the way to a target path, in root-to-parent
/// order. `name` is the entry name this directory is known by inside *its
/// own* parent — the root's is unused (there is nothing above it).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AncestorDir {
    pub fs_id: String,
    pub name: String,
}

/// The outcome of [`FsGraphEngine::traverse_to_path`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Traversal {
    /// Root-to-parent directories visited, with the name each is reached by.
    pub ancestors: Vec<AncestorDir>,
    /// The final path component's entry, if it exists.
    pub target: Option<DirEntry>,
    /// fs-id of the directory that would contain `target`.
    pub parent_fs_id: String,
    /// Full entry list of that directory, as of the traversal.
    pub parent_entries: Vec<DirEntry>,
}

/// Stateless Merkle-tree arithmetic over a [`MetadataStore`].
pub struct FsGraphEngine {
    store: Arc<MetadataStore>,
}

impl FsGraphEngine {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }

    fn serialize_entries(entries: &[DirEntry]) -> Vec<u8> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        // Deterministic by construction: struct field order is fixed and
        // entries are sorted by name, so identical entry sets always
        // produce identical bytes
        serde_json::to_vec(&sorted).expect("DirEntry serialization cannot fail")
    }

    fn deserialize_entries(text: &str) -> Result<Vec<DirEntry>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Public access to the canonical entry-list parser, used by
    /// `sync_protocol` to render a directory's `dir_entries` blob back into
    /// structured entries for the wire (`fs-object fetch`).
    pub fn parse_entries(text: &str) -> Result<Vec<DirEntry>> {
        Self::deserialize_entries(text)
    }

    /// `traverseToPath`: walk path components under `root_fs_id`,
    /// failing `not-directory` if an intermediate is a file and `not-found`
    /// if a component is missing.
    #[instrument(skip(self), fields(library_id, root_fs_id, path))]
    pub async fn traverse_to_path(&self, library_id: &str, root_fs_id: &str, path: &str) -> Result<Traversal> {
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut ancestors = vec![AncestorDir {
            fs_id: root_fs_id.to_string(),
            name: String::new(),
        }];
        let mut current_fs_id = root_fs_id.to_string();
        let mut current_entries = Vec::new();

        for (i, component) in components.iter().enumerate() {
            let obj = self.store.get_fs_object(library_id, &current_fs_id).await?;
            if obj.kind != FsObjectKind::Dir {
                return Err(FsGraphError::NotDirectory);
            }
            current_entries = Self::deserialize_entries(obj.dir_entries.as_deref().unwrap_or(""))?;
            let found = current_entries.iter().find(|e| e.name == *component).cloned();

            if i + 1 == components.len() {
                return Ok(Traversal {
                    ancestors,
                    target: found,
                    parent_fs_id: current_fs_id,
                    parent_entries: current_entries,
                });
            }

            let entry = found.ok_or(FsGraphError::NotFound)?;
            ancestors.push(AncestorDir {
                fs_id: entry.child_fs_id.clone(),
                name: component.to_string(),
            });
            current_fs_id = entry.child_fs_id;
        }

        // Empty path: the root itself is the target directory.
        Ok(Traversal {
            ancestors,
            target: None,
            parent_fs_id: current_fs_id,
            parent_entries: current_entries,
        })
    }

    /// `createDirectory`: fs-id = SHA-1 over
    /// `len(entries-bytes) "\n" entries-bytes`.
    #[instrument(skip(self, entries), fields(library_id))]
    pub async fn create_directory(&self, library_id: &str, entries: Vec<DirEntry>) -> Result<String> {
        let body = Self::serialize_entries(&entries);
        let mut preimage = body.len().to_string().into_bytes();
        preimage.push(b'\n');
        preimage.extend_from_slice(&body);
        let fs_id = sha1_hex(&preimage);

        let obj = FsObject {
            library_id: library_id.to_string(),
            fs_id: fs_id.clone(),
            kind: FsObjectKind::Dir,
            name: None,
            size_bytes: None,
            mtime: None,
            block_ids: Vec::new(),
            dir_entries: Some(String::from_utf8(body).expect("serde_json output is valid utf-8")),
        };
        Persist::store(self.store.as_ref(), obj).await?;
        Ok(fs_id)
    }

    /// `createFile`. The reference form hashes
    /// `name ":" size ":" nanoseconds`, a construction that is itself
    /// non-deterministic and non-deduplicating; this workspace instead
    /// hashes the content fields (`name`, `size`, ordered block digests) so
    /// identical uploads converge on the same fs-id (DESIGN.md Open
    /// Question #1).
    #[instrument(skip(self, block_ids), fields(library_id, name, size))]
    pub async fn create_file(
        &self,
        library_id: &str,
        name: &str,
        size: i64,
        block_ids: Vec<String>,
        mtime: i64,
    ) -> Result<String> {
        let preimage = format!("{name}:{size}:{}", block_ids.join(","));
        let fs_id = sha1_hex(preimage.as_bytes());

        let obj = FsObject {
            library_id: library_id.to_string(),
            fs_id: fs_id.clone(),
            kind: FsObjectKind::File,
            name: Some(name.to_string()),
            size_bytes: Some(size),
            mtime: Some(mtime),
            block_ids,
            dir_entries: None,
        };
        Persist::store(self.store.as_ref(), obj).await?;
        Ok(fs_id)
    }

    /// Copy-on-write path rebuild: starting from the
    /// immediate parent of a modified entry, walk `ancestors` innermost to
    /// outermost, replacing the entry matching the next path segment with
    /// the new child fs-id and re-creating each directory object. Returns
    /// the new root fs-id.
    #[instrument(skip(self, ancestors), fields(library_id, leaf_name))]
    pub async fn rebuild_path(
        &self,
        library_id: &str,
        ancestors: &[AncestorDir],
        leaf_name: &str,
        new_child_fs_id: &str,
    ) -> Result<String> {
        let mut child_name = leaf_name.to_string();
        let mut child_fs_id = new_child_fs_id.to_string();

        for ancestor in ancestors.iter().rev() {
            let obj = self.store.get_fs_object(library_id, &ancestor.fs_id).await?;
            if obj.kind != FsObjectKind::Dir {
                return Err(FsGraphError::NotDirectory);
            }
            let mut entries = Self::deserialize_entries(obj.dir_entries.as_deref().unwrap_or(""))?;
            match entries.iter_mut().find(|e| e.name == child_name) {
                Some(e) => e.child_fs_id = child_fs_id.clone(),
                None => entries.push(DirEntry {
                    name: child_name.clone(),
                    child_fs_id: child_fs_id.clone(),
                    mode: 0o040000,
                    mtime: 0,
                    size: 0,
                }),
            }

            child_fs_id = self.create_directory(library_id, entries).await?;
            child_name = ancestor.name.clone();
        }

        Ok(child_fs_id)
    }

    /// Commit creation. Reference form hashes
    /// `library ":" rootFSID ":" description ":" nanoseconds`; this
    /// workspace hashes content fields only, folding in the parent links so
    /// distinct histories never collide (DESIGN.md Open Question #1).
    #[instrument(skip(self), fields(library_id, root_fs_id))]
    pub async fn create_commit(
        &self,
        library_id: &str,
        root_fs_id: &str,
        parent_id: Option<String>,
        second_parent_id: Option<String>,
        creator: &str,
        description: &str,
        created_at: i64,
    ) -> Result<String> {
        let preimage = format!(
            "{library_id}:{root_fs_id}:{}:{}:{creator}:{description}",
            parent_id.as_deref().unwrap_or(""),
            second_parent_id.as_deref().unwrap_or(""),
        );
        let commit_id = sha1_hex(preimage.as_bytes());

        let commit = Commit {
            library_id: library_id.to_string(),
            commit_id: commit_id.clone(),
            root_fs_id: root_fs_id.to_string(),
            parent_id,
            second_parent_id,
            creator: creator.to_string(),
            description: description.to_string(),
            created_at,
        };
        Persist::store(self.store.as_ref(), commit).await?;
        Ok(commit_id)
    }

    /// `collectBlockIDsRecursive`: every block digest
    /// referenced by any file reachable from `fs_id`.
    #[instrument(skip(self), fields(library_id, fs_id))]
    pub async fn collect_block_ids_recursive(&self, library_id: &str, fs_id: &str) -> Result<Vec<String>> {
        if fs_id == common::EMPTY_ROOT_FS_ID {
            return Ok(Vec::new());
        }
        let mut stack = vec![fs_id.to_string()];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            let obj = self.store.get_fs_object(library_id, &id).await?;
            match obj.kind {
                FsObjectKind::File => out.extend(obj.block_ids),
                FsObjectKind::Dir => {
                    let entries = Self::deserialize_entries(obj.dir_entries.as_deref().unwrap_or(""))?;
                    stack.extend(entries.into_iter().map(|e| e.child_fs_id));
                }
            }
        }
        Ok(out)
    }

    /// `fs-id-list`: every fs-id (both directories and files)
    /// reachable from `fs_id`, including itself. Returns an empty list for
    /// the all-zeros empty-library sentinel.
    #[instrument(skip(self), fields(library_id, fs_id))]
    pub async fn collect_fs_ids_recursive(&self, library_id: &str, fs_id: &str) -> Result<Vec<String>> {
        if fs_id == common::EMPTY_ROOT_FS_ID {
            return Ok(Vec::new());
        }
        let mut stack = vec![fs_id.to_string()];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            let obj = self.store.get_fs_object(library_id, &id).await?;
            out.push(obj.fs_id.clone());
            if obj.kind == FsObjectKind::Dir {
                let entries = Self::deserialize_entries(obj.dir_entries.as_deref().unwrap_or(""))?;
                stack.extend(entries.into_iter().map(|e| e.child_fs_id));
            }
        }
        Ok(out)
    }

    /// Non-atomic, idempotent-retry-safe counter bumps
    pub async fn increment(&self, tenant: &str, block_ids: &[String]) -> Result<()> {
        for block_id in block_ids {
            self.store.increment_ref_count(tenant, block_id).await?;
        }
        Ok(())
    }

    pub async fn decrement(&self, tenant: &str, block_ids: &[String]) -> Result<()> {
        for block_id in block_ids {
            self.store.decrement_ref_count(tenant, block_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::any::{install_default_drivers, AnyPoolOptions};

    async fn engine() -> FsGraphEngine {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Arc::new(MetadataStore::new(pool).await.unwrap());
        FsGraphEngine::new(store)
    }

    #[tokio::test]
    async fn create_directory_is_deterministic() {
        let e = engine().await;
        let entries = vec![DirEntry {
            name: "a.txt".into(),
            child_fs_id: "a".repeat(40),
            mode: 0o100644,
            mtime: 1000,
            size: 5,
        }];
        let id1 = e.create_directory("lib1", entries.clone()).await.unwrap();
        let id2 = e.create_directory("lib1", entries).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 40);
    }

    #[tokio::test]
    async fn create_file_dedups_identical_content() {
        let e = engine().await;
        let blocks = vec!["b".repeat(64)];
        let id1 = e.create_file("lib1", "foo.bin", 10, blocks.clone(), 1000).await.unwrap();
        let id2 = e.create_file("lib1", "foo.bin", 10, blocks, 2000).await.unwrap();
        assert_eq!(id1, id2, "identical name/size/blocks must converge on one fs-id");
    }

    #[tokio::test]
    async fn traverse_to_path_walks_nested_directories() {
        let e = engine().await;
        let file_id = e.create_file("lib1", "b.txt", 3, vec!["c".repeat(64)], 1000).await.unwrap();
        let sub_id = e
            .create_directory(
                "lib1",
                vec![DirEntry {
                    name: "b.txt".into(),
                    child_fs_id: file_id.clone(),
                    mode: 0o100644,
                    mtime: 1000,
                    size: 3,
                }],
            )
            .await
            .unwrap();
        let root_id = e
            .create_directory(
                "lib1",
                vec![DirEntry {
                    name: "sub".into(),
                    child_fs_id: sub_id.clone(),
                    mode: 0o040000,
                    mtime: 1000,
                    size: 0,
                }],
            )
            .await
            .unwrap();

        let traversal = e.traverse_to_path("lib1", &root_id, "sub/b.txt").await.unwrap();
        assert_eq!(traversal.target.as_ref().unwrap().child_fs_id, file_id);
        assert_eq!(traversal.ancestors.len(), 2);
        assert_eq!(traversal.ancestors[1].fs_id, sub_id);
        assert_eq!(traversal.ancestors[1].name, "sub");
    }

    #[tokio::test]
    async fn traverse_fails_not_directory_on_intermediate_file() {
        let e = engine().await;
        let file_id = e.create_file("lib1", "f", 1, vec![], 1000).await.unwrap();
        let root_id = e
            .create_directory(
                "lib1",
                vec![DirEntry {
                    name: "f".into(),
                    child_fs_id: file_id,
                    mode: 0o100644,
                    mtime: 1000,
                    size: 1,
                }],
            )
            .await
            .unwrap();

        let err = e.traverse_to_path("lib1", &root_id, "f/nested").await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn traverse_fails_not_found_on_missing_component() {
        let e = engine().await;
        let root_id = e.create_directory("lib1", vec![]).await.unwrap();
        let err = e.traverse_to_path("lib1", &root_id, "missing").await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn rebuild_path_propagates_new_child_to_root() {
        let e = engine().await;
        let file_id = e.create_file("lib1", "b.txt", 3, vec!["c".repeat(64)], 1000).await.unwrap();
        let sub_id = e
            .create_directory(
                "lib1",
                vec![DirEntry {
                    name: "b.txt".into(),
                    child_fs_id: file_id.clone(),
                    mode: 0o100644,
                    mtime: 1000,
                    size: 3,
                }],
            )
            .await
            .unwrap();
        let root_id = e
            .create_directory(
                "lib1",
                vec![DirEntry {
                    name: "sub".into(),
                    child_fs_id: sub_id.clone(),
                    mode: 0o040000,
                    mtime: 1000,
                    size: 0,
                }],
            )
            .await
            .unwrap();

        let traversal = e.traverse_to_path("lib1", &root_id, "sub/b.txt").await.unwrap();
        let new_file_id = e.create_file("lib1", "b.txt", 9, vec!["d".repeat(64)], 2000).await.unwrap();

        let new_root = e
            .rebuild_path("lib1", &traversal.ancestors, "b.txt", &new_file_id)
            .await
            .unwrap();
        assert_ne!(new_root, root_id);

        let check = e.traverse_to_path("lib1", &new_root, "sub/b.txt").await.unwrap();
        assert_eq!(check.target.unwrap().child_fs_id, new_file_id);
    }

    #[tokio::test]
    async fn collect_block_ids_recursive_walks_whole_tree() {
        let e = engine().await;
        let f1 = e.create_file("lib1", "a", 1, vec!["1".repeat(64)], 1000).await.unwrap();
        let f2 = e.create_file("lib1", "b", 1, vec!["2".repeat(64)], 1000).await.unwrap();
        let sub = e
            .create_directory(
                "lib1",
                vec![DirEntry { name: "b".into(), child_fs_id: f2, mode: 0o100644, mtime: 1000, size: 1 }],
            )
            .await
            .unwrap();
        let root = e
            .create_directory(
                "lib1",
                vec![
                    DirEntry { name: "a".into(), child_fs_id: f1, mode: 0o100644, mtime: 1000, size: 1 },
                    DirEntry { name: "sub".into(), child_fs_id: sub, mode: 0o040000, mtime: 1000, size: 0 },
                ],
            )
            .await
            .unwrap();

        let mut ids = e.collect_block_ids_recursive("lib1", &root).await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["1".repeat(64), "2".repeat(64)]);
    }

    #[tokio::test]
    async fn collect_fs_ids_recursive_includes_every_node() {
        let e = engine().await;
        let f1 = e.create_file("lib1", "a", 1, vec!["1".repeat(64)], 1000).await.unwrap();
        let root = e
            .create_directory(
                "lib1",
                vec![DirEntry { name: "a".into(), child_fs_id: f1.clone(), mode: 0o100644, mtime: 1000, size: 1 }],
            )
            .await
            .unwrap();
        let ids = e.collect_fs_ids_recursive("lib1", &root).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&root));
        assert!(ids.contains(&f1));
    }

    #[tokio::test]
    async fn empty_root_sentinel_has_no_blocks() {
        let e = engine().await;
        let ids = e.collect_block_ids_recursive("lib1", common::EMPTY_ROOT_FS_ID).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn commit_creation_is_content_addressed() {
        let e = engine().await;
        let root = e.create_directory("lib1", vec![]).await.unwrap();
        let c1 = e
            .create_commit("lib1", &root, None, None, &"0".repeat(40), "init", 1000)
            .await
            .unwrap();
        let c2 = e
            .create_commit("lib1", &root, None, None, &"0".repeat(40), "init", 2000)
            .await
            .unwrap();
        assert_eq!(c1, c2, "identical content fields converge on one commit-id");
    }
}
