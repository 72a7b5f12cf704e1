//! Sync Protocol Engine (component C11): transport-agnostic
//! business logic behind the `/seafhttp` wire surface. Every method here
//! takes `(tenant, library)` plus whatever else the operation needs and
//! returns a plain Rust value or error — `server` is the only crate that
//! knows about HTTP, JSON bodies, or newline-delimited text.
//!
//! Nothing elsewhere in this workspace serves a sync protocol directly; the
//! nearest analog only consumes one implicitly via its own file-watching
//! loop. This composes `store`, `fs_graph`, `id_translator`, and
//! `storage_manager` following the data flow `C11 → C7 (translate) → C5 →
//! C6 → C4` for block traffic, `C11 → C10 → C8` for metadata.

use bytes::Bytes;
use common::model::{BlockRow, Commit, FsObject, FsObjectKind};
use fs_graph::FsGraphEngine;
use id_translator::IdTranslator;
use object_backend::{ObjectBackend, ObjectReader, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use store::{MetadataStore, Persist};
use storage_manager::StorageManager;
use thiserror::Error;
use tracing::instrument;

pub type Result<T> = std::result::Result<T, SyncProtocolError>;

#[derive(Debug, Error)]
pub enum SyncProtocolError {
    #[error("commit {0} has no matching parent in update-branch: conflicting head")]
    Conflict(String),
    #[error("malformed recv-fs stream: {0}")]
    InvalidArgument(String),
    #[error("metadata store error: {0}")]
    Store(#[from] store::MetadataStoreError),
    #[error("fs graph error: {0}")]
    FsGraph(#[from] fs_graph::FsGraphError),
    #[error("id translation error: {0}")]
    Translate(#[from] id_translator::TranslateError),
    #[error("storage manager error: {0}")]
    StorageManager(#[from] storage_manager::StorageManagerError),
    #[error("block store error: {0}")]
    BlockStore(#[from] blockstore::BlockStoreError),
}

impl SyncProtocolError {
    pub fn kind(&self) -> common::ErrorKind {
        match self {
            SyncProtocolError::Conflict(_) => common::ErrorKind::Conflict,
            SyncProtocolError::InvalidArgument(_) => common::ErrorKind::InvalidArgument,
            SyncProtocolError::Store(e) => e.kind(),
            SyncProtocolError::FsGraph(e) => e.kind(),
            SyncProtocolError::Translate(e) => e.kind(),
            SyncProtocolError::StorageManager(e) => e.kind(),
            SyncProtocolError::BlockStore(e) => e.kind(),
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// The protocol's constant version marker (`/protocol-version`).
pub const PROTOCOL_VERSION: i32 = 2;

/// Default bounded concurrency for `check-blocks`
pub const CHECK_BLOCKS_CONCURRENCY: usize = blockstore::DEFAULT_CHECK_CONCURRENCY;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeadCommitResponse {
    pub is_corrupted: bool,
    pub head_commit_id: String,
}

/// Wire shape for a commit record: parent fields serialize
/// as JSON `null` when absent, `creator` is always rendered as 40 hex
/// zeros (legacy wire compatibility — this workspace never surfaces a real
/// per-commit author over the wire), `version`/`no_local_history` are fixed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitWire {
    pub commit_id: String,
    pub root_id: String,
    pub creator_name: String,
    pub creator: String,
    pub description: String,
    pub ctime: i64,
    pub parent_id: Option<String>,
    pub second_parent_id: Option<String>,
    pub version: i32,
    pub no_local_history: i32,
}

impl From<Commit> for CommitWire {
    fn from(c: Commit) -> Self {
        CommitWire {
            commit_id: c.commit_id,
            root_id: c.root_fs_id,
            creator_name: common::ZERO_CREATOR.to_string(),
            creator: common::ZERO_CREATOR.to_string(),
            description: c.description,
            ctime: c.created_at,
            parent_id: c.parent_id,
            second_parent_id: c.second_parent_id,
            version: 1,
            no_local_history: 1,
        }
    }
}

/// A client-submitted commit body for `commit put`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitPutRequest {
    pub commit_id: String,
    pub root_id: String,
    pub description: String,
    pub ctime: i64,
    pub parent_id: Option<String>,
    pub second_parent_id: Option<String>,
}

/// Wire shape for an FS-Object (`fs-object fetch / pack`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FsObjectWire {
    File {
        id: String,
        name: Option<String>,
        size: Option<i64>,
        mtime: Option<i64>,
        block_ids: Vec<String>,
    },
    Dir {
        id: String,
        entries: Vec<common::model::DirEntry>,
    },
}

impl FsObjectWire {
    fn from_fs_object(obj: FsObject) -> Result<Self> {
        Ok(match obj.kind {
            FsObjectKind::File => FsObjectWire::File {
                id: obj.fs_id,
                name: obj.name,
                size: obj.size_bytes,
                mtime: obj.mtime,
                block_ids: obj.block_ids,
            },
            FsObjectKind::Dir => FsObjectWire::Dir {
                id: obj.fs_id,
                entries: FsGraphEngine::parse_entries(obj.dir_entries.as_deref().unwrap_or(""))?,
            },
        })
    }
}

pub struct SyncProtocolEngine {
    store: Arc<MetadataStore>,
    fs_graph: Arc<FsGraphEngine>,
    translator: Arc<IdTranslator>,
    storage: Arc<StorageManager>,
}

impl SyncProtocolEngine {
    pub fn new(
        store: Arc<MetadataStore>,
        fs_graph: Arc<FsGraphEngine>,
        translator: Arc<IdTranslator>,
        storage: Arc<StorageManager>,
    ) -> Self {
        Self { store, fs_graph, translator, storage }
    }

    /// "Head commit fetch": mints an initial empty-root
    /// commit the first time a library is asked for its head, so every
    /// library always has a reachable one.
    #[instrument(skip(self), fields(tenant, library_id))]
    pub async fn head_commit(&self, tenant: &str, library_id: &str) -> Result<HeadCommitResponse> {
        let library = self.store.get_library(tenant, library_id).await?;
        if let Some(head) = library.head_commit_id {
            return Ok(HeadCommitResponse { is_corrupted: false, head_commit_id: head });
        }

        let commit_id = self
            .fs_graph
            .create_commit(
                library_id,
                common::EMPTY_ROOT_FS_ID,
                None,
                None,
                common::ZERO_CREATOR,
                "",
                unix_now(),
            )
            .await?;
        self.store.update_head(tenant, library_id, &commit_id, unix_now()).await?;
        Ok(HeadCommitResponse { is_corrupted: false, head_commit_id: commit_id })
    }

    /// "Commit fetch".
    #[instrument(skip(self), fields(library_id, commit_id))]
    pub async fn get_commit(&self, library_id: &str, commit_id: &str) -> Result<CommitWire> {
        let commit = self.store.get_commit(library_id, commit_id).await?;
        Ok(commit.into())
    }

    /// "Commit put", non-`HEAD` path: persists a new commit
    /// (write-once, idempotent) and advances the library head
    /// unconditionally (last-writer-wins; ).
    #[instrument(skip(self, body), fields(tenant, library_id))]
    pub async fn put_commit(&self, tenant: &str, library_id: &str, body: CommitPutRequest) -> Result<()> {
        let commit = Commit {
            library_id: library_id.to_string(),
            commit_id: body.commit_id.clone(),
            root_fs_id: body.root_id,
            parent_id: body.parent_id,
            second_parent_id: body.second_parent_id,
            creator: common::ZERO_CREATOR.to_string(),
            description: body.description,
            created_at: body.ctime,
        };
        Persist::store(self.store.as_ref(), commit).await?;
        self.store.update_head(tenant, library_id, &body.commit_id, unix_now()).await?;
        Ok(())
    }

    /// "Commit put", literal `HEAD` path segment: updates the
    /// library head to a query-provided, already-existing commit.
    #[instrument(skip(self), fields(tenant, library_id, new_head))]
    pub async fn put_head(&self, tenant: &str, library_id: &str, new_head: &str) -> Result<()> {
        self.store.get_commit(library_id, new_head).await?;
        self.store.update_head(tenant, library_id, new_head, unix_now()).await?;
        Ok(())
    }

    /// "FS-ID list": every fs-id reachable from `server_head`,
    /// or an empty list for the all-zeros sentinel root.
    #[instrument(skip(self), fields(library_id, server_head))]
    pub async fn fs_id_list(&self, library_id: &str, server_head: &str) -> Result<Vec<String>> {
        let commit = self.store.get_commit(library_id, server_head).await?;
        Ok(self.fs_graph.collect_fs_ids_recursive(library_id, &commit.root_fs_id).await?)
    }

    /// "FS-object fetch": single object, JSON.
    #[instrument(skip(self), fields(library_id, fs_id))]
    pub async fn fs_object_fetch(&self, library_id: &str, fs_id: &str) -> Result<FsObjectWire> {
        let obj = self.store.get_fs_object(library_id, fs_id).await?;
        FsObjectWire::from_fs_object(obj)
    }

    /// "FS-object pack": missing ids are skipped silently
    /// (already `store::get_fs_objects`'s contract).
    #[instrument(skip(self, fs_ids), fields(library_id, count = fs_ids.len()))]
    pub async fn fs_object_pack(&self, library_id: &str, fs_ids: &[String]) -> Result<Vec<FsObjectWire>> {
        let objs = self.store.get_fs_objects(library_id, fs_ids).await?;
        objs.into_iter().map(FsObjectWire::from_fs_object).collect()
    }

    /// "FS-object receive". This workspace's wire format
    /// extends the boundary-heuristic stream with an explicit
    /// big-endian `u32` length prefix per entry (DESIGN.md Open Question
    /// #2): `40-hex fs-id ++ u32-BE length ++ length bytes of payload`,
    /// repeated until the buffer is exhausted. `payload[0]` is the kind byte
    /// (`1`=file, `3`=directory, matching `FsObjectKind::wire_byte`); the
    /// remainder is a JSON body (`{name,size,mtime,block_ids}` for a file,
    /// the canonical sorted-entries array for a directory).
    #[instrument(skip(self, stream), fields(library_id, len = stream.len()))]
    pub async fn fs_object_receive(&self, library_id: &str, stream: &[u8]) -> Result<usize> {
        const FS_ID_LEN: usize = 40;
        const LEN_PREFIX: usize = 4;

        let mut offset = 0;
        let mut inserted = 0;
        while offset < stream.len() {
            if offset + FS_ID_LEN + LEN_PREFIX > stream.len() {
                return Err(SyncProtocolError::InvalidArgument("truncated entry header".into()));
            }
            let fs_id = std::str::from_utf8(&stream[offset..offset + FS_ID_LEN])
                .map_err(|_| SyncProtocolError::InvalidArgument("fs-id is not valid utf-8".into()))?
                .to_string();
            offset += FS_ID_LEN;

            let len_bytes: [u8; 4] = stream[offset..offset + LEN_PREFIX]
                .try_into()
                .expect("slice of exactly 4 bytes");
            let payload_len = u32::from_be_bytes(len_bytes) as usize;
            offset += LEN_PREFIX;

            if offset + payload_len > stream.len() {
                return Err(SyncProtocolError::InvalidArgument("payload runs past end of stream".into()));
            }
            let payload = &stream[offset..offset + payload_len];
            offset += payload_len;

            if payload.is_empty() {
                return Err(SyncProtocolError::InvalidArgument("empty object payload".into()));
            }
            let kind = FsObjectKind::from_wire_byte(payload[0])
                .ok_or_else(|| SyncProtocolError::InvalidArgument(format!("unknown object kind byte {}", payload[0])))?;
            let body = &payload[1..];

            let obj = match kind {
                FsObjectKind::File => {
                    let parsed: FileEntryWire = serde_json::from_slice(body)
                        .map_err(|e| SyncProtocolError::InvalidArgument(e.to_string()))?;
                    FsObject {
                        library_id: library_id.to_string(),
                        fs_id,
                        kind: FsObjectKind::File,
                        name: Some(parsed.name),
                        size_bytes: Some(parsed.size),
                        mtime: Some(parsed.mtime),
                        block_ids: parsed.block_ids,
                        dir_entries: None,
                    }
                }
                FsObjectKind::Dir => {
                    let text = std::str::from_utf8(body)
                        .map_err(|_| SyncProtocolError::InvalidArgument("dir entries are not valid utf-8".into()))?;
                    FsGraphEngine::parse_entries(text)?;
                    FsObject {
                        library_id: library_id.to_string(),
                        fs_id,
                        kind: FsObjectKind::Dir,
                        name: None,
                        size_bytes: None,
                        mtime: None,
                        block_ids: Vec::new(),
                        dir_entries: Some(text.to_string()),
                    }
                }
            };
            Persist::store(self.store.as_ref(), obj).await?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// "Block check": translate each external id, run a
    /// bounded-parallel existence check against the resolved hot class for
    /// `hostname`, and return the external ids that are missing.
    #[instrument(skip(self, external_ids), fields(tenant, hostname, count = external_ids.len()))]
    pub async fn check_blocks(&self, tenant: &str, hostname: &str, external_ids: &[String]) -> Result<Vec<String>> {
        let mut resolved = Vec::with_capacity(external_ids.len());
        for external_id in external_ids {
            resolved.push((external_id.clone(), self.translator.translate_on_get(tenant, external_id).await?));
        }

        let class = self
            .storage
            .resolve_storage_class(hostname, None, Tier::Hot)
            .await
            .ok_or_else(|| SyncProtocolError::InvalidArgument("no storage class registered".into()))?;
        let (_, class) = self.storage.get_healthy_backend(&class).await?;
        let block_store = self.storage.block_store_for_class(&class).await?;

        let hex_ids: Vec<String> = resolved.iter().map(|(_, r)| r.hex()).collect();
        let presence = block_store.check_blocks_parallel_hex(&hex_ids, CHECK_BLOCKS_CONCURRENCY).await;

        Ok(resolved
            .into_iter()
            .filter(|(_, r)| !presence.get(&r.hex()).copied().unwrap_or(false))
            .map(|(external_id, _)| external_id)
            .collect())
    }

    /// "Block fetch": translate, resolve the block's recorded
    /// storage class (defaulting to `hot` if the block row is unknown), and
    /// stream the body, updating `last_accessed`.
    #[instrument(skip(self), fields(tenant, external_id))]
    pub async fn fetch_block(&self, tenant: &str, external_id: &str) -> Result<ObjectReader> {
        let resolved = self.translator.translate_on_get(tenant, external_id).await?;
        let hex_id = resolved.hex();

        let recorded_class = match self.store.get_block(tenant, &hex_id).await {
            Ok(row) => row.storage_class,
            Err(store::MetadataStoreError::NotFound) => "hot".to_string(),
            Err(e) => return Err(e.into()),
        };

        let (_, class) = self.storage.get_healthy_backend(&recorded_class).await?;
        let block_store = self.storage.block_store_for_class(&class).await?;
        let reader = block_store.get_block_reader_hex(&hex_id).await?;
        let _ = self.store.touch_block(tenant, &hex_id, unix_now()).await;
        Ok(reader)
    }

    /// "Block put": verify the digest (when asserted or
    /// 64-hex), store under the internal digest via a healthy hot-class
    /// backend for `hostname`, and upsert the `blocks` row. Legacy mapping
    /// insertion is handled by `translate_on_put` itself.
    #[instrument(skip(self, body), fields(tenant, hostname, external_id, size = body.len()))]
    pub async fn put_block(
        &self,
        tenant: &str,
        hostname: &str,
        external_id: &str,
        asserts_sha256: bool,
        body: Bytes,
    ) -> Result<()> {
        let now = unix_now();
        let internal = self.translator.translate_on_put(tenant, external_id, &body, asserts_sha256, now).await?;

        let class = self
            .storage
            .resolve_storage_class(hostname, None, Tier::Hot)
            .await
            .ok_or_else(|| SyncProtocolError::InvalidArgument("no storage class registered".into()))?;
        let (_, class) = self.storage.get_healthy_backend(&class).await?;
        let block_store = self.storage.block_store_for_class(&class).await?;

        let size = body.len() as i64;
        let key = block_store.put_block(&internal, body).await?;

        self.store
            .upsert_block(&BlockRow {
                tenant: tenant.to_string(),
                block_id: internal.to_hex(),
                size_bytes: size,
                storage_class: class,
                storage_key: key,
                ref_count: 1,
                created_at: now,
                last_accessed: now,
            })
            .await?;
        Ok(())
    }

    /// "Check-FS": fs-ids from `fs_ids` that are *not* present.
    #[instrument(skip(self, fs_ids), fields(library_id, count = fs_ids.len()))]
    pub async fn check_fs(&self, library_id: &str, fs_ids: &[String]) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for fs_id in fs_ids {
            if self.store.get_fs_object(library_id, fs_id).await.is_err() {
                missing.push(fs_id.clone());
            }
        }
        Ok(missing)
    }

    /// "permission-check": the wire contract is an empty HTTP
    /// 200 on success; the only business-logic content is that the library
    /// must actually exist.
    #[instrument(skip(self), fields(tenant, library_id))]
    pub async fn permission_check(&self, tenant: &str, library_id: &str) -> Result<()> {
        self.store.get_library(tenant, library_id).await?;
        Ok(())
    }

    /// "quota-check": quota accounting itself is an explicit
    /// Non-goal, so this always reports quota available.
    pub async fn quota_check(&self, tenant: &str, library_id: &str) -> Result<bool> {
        self.store.get_library(tenant, library_id).await?;
        Ok(true)
    }

    /// "update-branch": last-writer-wins by default; with
    /// `expected_parent` present (DESIGN.md Open Question #3), fails
    /// `conflict` if the library's current head does not match.
    #[instrument(skip(self), fields(tenant, library_id, new_head))]
    pub async fn update_branch(
        &self,
        tenant: &str,
        library_id: &str,
        new_head: &str,
        expected_parent: Option<&str>,
    ) -> Result<()> {
        self.store.get_commit(library_id, new_head).await?;

        if let Some(expected) = expected_parent {
            let library = self.store.get_library(tenant, library_id).await?;
            if library.head_commit_id.as_deref() != Some(expected) {
                return Err(SyncProtocolError::Conflict(new_head.to_string()));
            }
        }

        self.store.update_head(tenant, library_id, new_head, unix_now()).await?;
        Ok(())
    }

    /// "multi-repo head commits": mints an initial commit for
    /// any library that has never been committed to, same as
    /// [`Self::head_commit`].
    #[instrument(skip(self, library_ids), fields(tenant, count = library_ids.len()))]
    pub async fn multi_repo_head_commits(&self, tenant: &str, library_ids: &[String]) -> Result<HashMap<String, String>> {
        let mut out = HashMap::with_capacity(library_ids.len());
        for library_id in library_ids {
            let head = self.head_commit(tenant, library_id).await?;
            out.insert(library_id.clone(), head.head_commit_id);
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FileEntryWire {
    name: String,
    size: i64,
    mtime: i64,
    block_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use common::model::{DirEntry, Library};
    use object_backend::S3Backend;
    use object_store::memory::InMemory;
    use sqlx::any::{install_default_drivers, AnyPoolOptions};

    async fn engine_with_library(tenant: &str, library_id: &str) -> SyncProtocolEngine {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Arc::new(MetadataStore::new(pool).await.unwrap());
        store
            .put_library(&Library {
                tenant: tenant.to_string(),
                library_id: library_id.to_string(),
                owner: "alice".into(),
                name: "lib".into(),
                description: "".into(),
                head_commit_id: None,
                root_commit_id: None,
                size_bytes: 0,
                file_count: 0,
                version_ttl_secs: 3600,
                created_at: 1000,
                updated_at: 1000,
            })
            .await
            .unwrap();

        let fs_graph = Arc::new(FsGraphEngine::new(store.clone()));
        let translator = Arc::new(IdTranslator::new(store.clone()));
        let storage = Arc::new(StorageManager::new());
        let backend: Arc<dyn ObjectBackend> = Arc::new(S3Backend::new(
            Arc::new(InMemory::new()),
            "",
            Tier::Hot,
            Utf8PathBuf::from(std::env::temp_dir().to_string_lossy().to_string()),
        ));
        storage.register_class("hot", backend, None).await;
        storage.set_default_class("hot").await;

        SyncProtocolEngine::new(store, fs_graph, translator, storage)
    }

    #[tokio::test]
    async fn head_commit_mints_empty_root_on_first_access() {
        let engine = engine_with_library("t1", "lib1").await;
        let head = engine.head_commit("t1", "lib1").await.unwrap();
        assert!(!head.is_corrupted);

        let commit = engine.get_commit("lib1", &head.head_commit_id).await.unwrap();
        assert_eq!(commit.root_id, common::EMPTY_ROOT_FS_ID);
        assert_eq!(commit.version, 1);
        assert_eq!(commit.no_local_history, 1);
        assert!(commit.parent_id.is_none());

        let again = engine.head_commit("t1", "lib1").await.unwrap();
        assert_eq!(again.head_commit_id, head.head_commit_id);
    }

    #[tokio::test]
    async fn fs_id_list_is_empty_for_empty_root() {
        let engine = engine_with_library("t1", "lib1").await;
        let head = engine.head_commit("t1", "lib1").await.unwrap();
        let ids = engine.fs_id_list("lib1", &head.head_commit_id).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn put_block_then_check_blocks_reports_present() {
        let engine = engine_with_library("t1", "lib1").await;
        let body = Bytes::from_static(b"hello world");
        let digest_hex = common::sha256(&body).to_hex();

        engine.put_block("t1", "anything.example.com", &digest_hex, false, body.clone()).await.unwrap();

        let missing = engine.check_blocks("t1", "anything.example.com", &[digest_hex.clone()]).await.unwrap();
        assert!(missing.is_empty());

        let mut reader = engine.fetch_block("t1", &digest_hex).await.unwrap();
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut out).unwrap();
        assert_eq!(out, body.to_vec());
    }

    #[tokio::test]
    async fn check_blocks_reports_missing_legacy_id() {
        let engine = engine_with_library("t1", "lib1").await;
        let legacy = "a".repeat(40);
        let missing = engine.check_blocks("t1", "anything.example.com", &[legacy.clone()]).await.unwrap();
        assert_eq!(missing, vec![legacy]);
    }

    #[tokio::test]
    async fn fs_object_receive_parses_length_prefixed_stream() {
        let engine = engine_with_library("t1", "lib1").await;

        let dir_id = "b".repeat(40);
        let entries = vec![DirEntry {
            name: "a.txt".into(),
            child_fs_id: "c".repeat(40),
            mode: 0o100644,
            mtime: 1000,
            size: 5,
        }];
        let dir_body = serde_json::to_vec(&entries).unwrap();
        let mut dir_payload = vec![b'3'];
        dir_payload.extend_from_slice(&dir_body);

        let mut stream = Vec::new();
        stream.extend_from_slice(dir_id.as_bytes());
        stream.extend_from_slice(&(dir_payload.len() as u32).to_be_bytes());
        stream.extend_from_slice(&dir_payload);

        let inserted = engine.fs_object_receive("lib1", &stream).await.unwrap();
        assert_eq!(inserted, 1);

        let fetched = engine.fs_object_fetch("lib1", &dir_id).await.unwrap();
        match fetched {
            FsObjectWire::Dir { entries, .. } => assert_eq!(entries.len(), 1),
            _ => panic!("expected a dir object"),
        }
    }

    #[tokio::test]
    async fn update_branch_rejects_stale_expected_parent() {
        let engine = engine_with_library("t1", "lib1").await;
        let head = engine.head_commit("t1", "lib1").await.unwrap();

        let next = engine
            .fs_graph
            .create_commit("lib1", common::EMPTY_ROOT_FS_ID, Some(head.head_commit_id.clone()), None, common::ZERO_CREATOR, "next", 2000)
            .await
            .unwrap();

        let err = engine
            .update_branch("t1", "lib1", &next, Some("not-the-real-parent"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::Conflict);

        engine.update_branch("t1", "lib1", &next, Some(&head.head_commit_id)).await.unwrap();
        let updated = engine.head_commit("t1", "lib1").await.unwrap();
        assert_eq!(updated.head_commit_id, next);
    }

    #[tokio::test]
    async fn multi_repo_head_commits_mints_each_library() {
        let engine = engine_with_library("t1", "lib1").await;
        engine
            .store
            .put_library(&Library {
                tenant: "t1".into(),
                library_id: "lib2".into(),
                owner: "alice".into(),
                name: "lib2".into(),
                description: "".into(),
                head_commit_id: None,
                root_commit_id: None,
                size_bytes: 0,
                file_count: 0,
                version_ttl_secs: 3600,
                created_at: 1000,
                updated_at: 1000,
            })
            .await
            .unwrap();

        let heads = engine
            .multi_repo_head_commits("t1", &["lib1".to_string(), "lib2".to_string()])
            .await
            .unwrap();
        assert_eq!(heads.len(), 2);
    }
}
