//! Metadata Store Adapter (component C8): a thin,
//! strongly-typed wrapper around a wide-column database session.
//!
//! Built in the shape of `store::DataStore`: a single `sqlx::AnyPool`
//! wrapped by generic `Persist<Data>`/`Fetch<ID, Data>` traits so callers
//! never hand-write SQL. Keeps that shape but drops `sqlx::migrate!` in
//! favor of `MetadataStore::new` issuing `CREATE TABLE IF NOT EXISTS`
//! statements directly for the six tables it owns — see DESIGN.md for the
//! rationale. The adapter never interprets semantic content (e.g. the
//! opaque `dir_entries` text blob); that's `fs_graph`'s job.

use async_trait::async_trait;
use common::model::{AccessToken, BlockIdMapping, BlockRow, Commit, FsObject, FsObjectKind, Library, TokenKind};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, MetadataStoreError>;

#[derive(Error, Debug)]
pub enum MetadataStoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("requested record was not found in the store")]
    NotFound,
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MetadataStoreError {
    pub fn kind(&self) -> common::ErrorKind {
        match self {
            MetadataStoreError::NotFound => common::ErrorKind::NotFound,
            MetadataStoreError::Db(_) => common::ErrorKind::Unavailable,
            MetadataStoreError::Serde(_) => common::ErrorKind::IntegrityViolation,
        }
    }
}

/// `Persist<Data>` — the write side: atomic single insert, or a batched
/// insert for high-throughput paths (`recv-fs`).
#[async_trait]
pub trait Persist<Data: Send + Sync> {
    async fn store_all(&self, items: Vec<Data>) -> Result<()>;
    async fn store(&self, item: Data) -> Result<()>;
}

/// `Fetch<ID, Data>` — the read side.
#[async_trait]
pub trait Fetch<ID: Send + Sync, Data: Send + Sync> {
    async fn fetch_by(&self, key: &ID) -> Result<Data>;
    async fn fetch_many(&self, keys: &[ID]) -> Result<Vec<Data>>;
}

/// Wraps a single `sqlx::AnyPool` — the "wide-column database session"
///  (C8) describes. Target consistency is local-majority quorum
/// for both reads and writes; that is a property of the
/// backing database/driver configuration, not of this adapter.
pub struct MetadataStore {
    pool: AnyPool,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS libraries (
        tenant TEXT NOT NULL,
        library_id TEXT NOT NULL,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        head_commit_id TEXT,
        root_commit_id TEXT,
        size_bytes BIGINT NOT NULL,
        file_count BIGINT NOT NULL,
        version_ttl_secs BIGINT NOT NULL,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL,
        PRIMARY KEY (tenant, library_id)
    )",
    "CREATE TABLE IF NOT EXISTS commits (
        library_id TEXT NOT NULL,
        commit_id TEXT NOT NULL,
        root_fs_id TEXT NOT NULL,
        parent_id TEXT,
        second_parent_id TEXT,
        creator TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at BIGINT NOT NULL,
        PRIMARY KEY (library_id, commit_id)
    )",
    "CREATE TABLE IF NOT EXISTS fs_objects (
        library_id TEXT NOT NULL,
        fs_id TEXT NOT NULL,
        obj_type TEXT NOT NULL,
        obj_name TEXT,
        dir_entries TEXT,
        block_ids TEXT,
        size_bytes BIGINT,
        mtime BIGINT,
        PRIMARY KEY (library_id, fs_id)
    )",
    "CREATE TABLE IF NOT EXISTS blocks (
        tenant TEXT NOT NULL,
        block_id TEXT NOT NULL,
        size_bytes BIGINT NOT NULL,
        storage_class TEXT NOT NULL,
        storage_key TEXT NOT NULL,
        ref_count BIGINT NOT NULL,
        created_at BIGINT NOT NULL,
        last_accessed BIGINT NOT NULL,
        PRIMARY KEY (tenant, block_id)
    )",
    "CREATE TABLE IF NOT EXISTS block_id_mappings (
        tenant TEXT NOT NULL,
        external_id TEXT NOT NULL,
        internal_id TEXT NOT NULL,
        created_at BIGINT NOT NULL,
        PRIMARY KEY (tenant, external_id)
    )",
    "CREATE TABLE IF NOT EXISTS access_tokens (
        token TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        tenant TEXT NOT NULL,
        library TEXT NOT NULL,
        path TEXT NOT NULL,
        user_name TEXT NOT NULL,
        created_at BIGINT NOT NULL,
        expires_at BIGINT NOT NULL
    )",
];

impl MetadataStore {
    /// Opens the adapter over an already-connected pool, creating the six
    /// schema tables below if they don't exist yet.
    pub async fn new(pool: AnyPool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    // ---- libraries ----------------------------------------------------

    pub async fn get_library(&self, tenant: &str, library_id: &str) -> Result<Library> {
        let row = sqlx::query(
            "SELECT tenant, library_id, owner, name, description, head_commit_id, root_commit_id,
                    size_bytes, file_count, version_ttl_secs, created_at, updated_at
             FROM libraries WHERE tenant = ? AND library_id = ?",
        )
        .bind(tenant)
        .bind(library_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_library).ok_or(MetadataStoreError::NotFound)
    }

    pub async fn put_library(&self, lib: &Library) -> Result<()> {
        sqlx::query(
            "INSERT INTO libraries
                (tenant, library_id, owner, name, description, head_commit_id, root_commit_id,
                 size_bytes, file_count, version_ttl_secs, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tenant, library_id) DO UPDATE SET
                owner = excluded.owner,
                name = excluded.name,
                description = excluded.description,
                head_commit_id = excluded.head_commit_id,
                root_commit_id = excluded.root_commit_id,
                size_bytes = excluded.size_bytes,
                file_count = excluded.file_count,
                version_ttl_secs = excluded.version_ttl_secs,
                updated_at = excluded.updated_at",
        )
        .bind(&lib.tenant)
        .bind(&lib.library_id)
        .bind(&lib.owner)
        .bind(&lib.name)
        .bind(&lib.description)
        .bind(&lib.head_commit_id)
        .bind(&lib.root_commit_id)
        .bind(lib.size_bytes)
        .bind(lib.file_count)
        .bind(lib.version_ttl_secs)
        .bind(lib.created_at)
        .bind(lib.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrites `head_commit_id` unconditionally — no compare-and-swap
    ///
    pub async fn update_head(&self, tenant: &str, library_id: &str, head_commit_id: &str, updated_at: i64) -> Result<()> {
        sqlx::query(
            "UPDATE libraries SET head_commit_id = ?, updated_at = ? WHERE tenant = ? AND library_id = ?",
        )
        .bind(head_commit_id)
        .bind(updated_at)
        .bind(tenant)
        .bind(library_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- commits --------------------------------------------------------

    pub async fn get_commit(&self, library_id: &str, commit_id: &str) -> Result<Commit> {
        let row = sqlx::query(
            "SELECT library_id, commit_id, root_fs_id, parent_id, second_parent_id, creator, description, created_at
             FROM commits WHERE library_id = ? AND commit_id = ?",
        )
        .bind(library_id)
        .bind(commit_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_commit).ok_or(MetadataStoreError::NotFound)
    }

    /// Write-once by construction (row key is the content digest); a
    /// duplicate insert is idempotent, not an error
    async fn insert_commit(&self, commit: &Commit) -> Result<()> {
        sqlx::query(
            "INSERT INTO commits
                (library_id, commit_id, root_fs_id, parent_id, second_parent_id, creator, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (library_id, commit_id) DO NOTHING",
        )
        .bind(&commit.library_id)
        .bind(&commit.commit_id)
        .bind(&commit.root_fs_id)
        .bind(&commit.parent_id)
        .bind(&commit.second_parent_id)
        .bind(&commit.creator)
        .bind(&commit.description)
        .bind(commit.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- fs_objects -----------------------------------------------------

    pub async fn get_fs_object(&self, library_id: &str, fs_id: &str) -> Result<FsObject> {
        let row = sqlx::query(
            "SELECT library_id, fs_id, obj_type, obj_name, dir_entries, block_ids, size_bytes, mtime
             FROM fs_objects WHERE library_id = ? AND fs_id = ?",
        )
        .bind(library_id)
        .bind(fs_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_fs_object).transpose()?.ok_or(MetadataStoreError::NotFound)
    }

    /// Best-effort batch fetch used by `pack-fs`: missing
    /// fs-ids are skipped silently, never reported as an error.
    pub async fn get_fs_objects(&self, library_id: &str, fs_ids: &[String]) -> Result<Vec<FsObject>> {
        let mut out = Vec::with_capacity(fs_ids.len());
        for fs_id in fs_ids {
            if let Ok(obj) = self.get_fs_object(library_id, fs_id).await {
                out.push(obj);
            }
        }
        Ok(out)
    }

    async fn insert_fs_object(&self, obj: &FsObject) -> Result<()> {
        let block_ids_json = serde_json::to_string(&obj.block_ids)?;
        let obj_type = match obj.kind {
            FsObjectKind::File => "file",
            FsObjectKind::Dir => "dir",
        };
        sqlx::query(
            "INSERT INTO fs_objects
                (library_id, fs_id, obj_type, obj_name, dir_entries, block_ids, size_bytes, mtime)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (library_id, fs_id) DO NOTHING",
        )
        .bind(&obj.library_id)
        .bind(&obj.fs_id)
        .bind(obj_type)
        .bind(&obj.name)
        .bind(&obj.dir_entries)
        .bind(block_ids_json)
        .bind(obj.size_bytes)
        .bind(obj.mtime)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- blocks -----------------------------------------------------------

    pub async fn get_block(&self, tenant: &str, block_id: &str) -> Result<BlockRow> {
        let row = sqlx::query(
            "SELECT tenant, block_id, size_bytes, storage_class, storage_key, ref_count, created_at, last_accessed
             FROM blocks WHERE tenant = ? AND block_id = ?",
        )
        .bind(tenant)
        .bind(block_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_block).ok_or(MetadataStoreError::NotFound)
    }

    /// Inserts a new block row with `ref_count = 1`, or — if one already
    /// exists for this `(tenant, block_id)` — increments its ref count
    /// instead ("Lifecycle": "Subsequent references increment
    /// the count").
    pub async fn upsert_block(&self, block: &BlockRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO blocks
                (tenant, block_id, size_bytes, storage_class, storage_key, ref_count, created_at, last_accessed)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tenant, block_id) DO UPDATE SET
                ref_count = blocks.ref_count + 1,
                last_accessed = excluded.last_accessed",
        )
        .bind(&block.tenant)
        .bind(&block.block_id)
        .bind(block.size_bytes)
        .bind(&block.storage_class)
        .bind(&block.storage_key)
        .bind(block.ref_count)
        .bind(block.created_at)
        .bind(block.last_accessed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch_block(&self, tenant: &str, block_id: &str, accessed_at: i64) -> Result<()> {
        sqlx::query("UPDATE blocks SET last_accessed = ? WHERE tenant = ? AND block_id = ?")
            .bind(accessed_at)
            .bind(tenant)
            .bind(block_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Non-atomic counter delta ("Reference-count
    /// updates are non-atomic"); idempotent retries are acceptable.
    pub async fn increment_ref_count(&self, tenant: &str, block_id: &str) -> Result<()> {
        sqlx::query("UPDATE blocks SET ref_count = ref_count + 1 WHERE tenant = ? AND block_id = ?")
            .bind(tenant)
            .bind(block_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn decrement_ref_count(&self, tenant: &str, block_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE blocks SET ref_count = ref_count - 1 WHERE tenant = ? AND block_id = ? AND ref_count > 0",
        )
        .bind(tenant)
        .bind(block_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- block_id_mappings ------------------------------------------------

    pub async fn get_mapping(&self, tenant: &str, external_id: &str) -> Result<BlockIdMapping> {
        let row = sqlx::query(
            "SELECT tenant, external_id, internal_id, created_at FROM block_id_mappings
             WHERE tenant = ? AND external_id = ?",
        )
        .bind(tenant)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_mapping).ok_or(MetadataStoreError::NotFound)
    }

    /// Idempotent — a duplicate `(tenant, external_id)` insert is not an
    /// error
    pub async fn put_mapping(&self, mapping: &BlockIdMapping) -> Result<()> {
        sqlx::query(
            "INSERT INTO block_id_mappings (tenant, external_id, internal_id, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (tenant, external_id) DO NOTHING",
        )
        .bind(&mapping.tenant)
        .bind(&mapping.external_id)
        .bind(&mapping.internal_id)
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- access_tokens ------------------------------------------------------

    pub async fn put_token(&self, token: &AccessToken) -> Result<()> {
        sqlx::query(
            "INSERT INTO access_tokens (token, kind, tenant, library, path, user_name, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (token) DO UPDATE SET expires_at = excluded.expires_at",
        )
        .bind(&token.token)
        .bind(token.kind.as_str())
        .bind(&token.tenant)
        .bind(&token.library)
        .bind(&token.path)
        .bind(&token.user)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the token iff it exists, has not expired as of `now`, and
    /// `expected_kind` matches — no distinction leaked between "wrong kind"
    /// and "doesn't exist"
    pub async fn get_token(&self, token: &str, expected_kind: TokenKind, now: i64) -> Result<AccessToken> {
        let row = sqlx::query(
            "SELECT token, kind, tenant, library, path, user_name, created_at, expires_at
             FROM access_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or(MetadataStoreError::NotFound)?;
        let record = row_to_token(row);
        if record.expires_at <= now || record.kind.as_str() != expected_kind.as_str() {
            return Err(MetadataStoreError::NotFound);
        }
        Ok(record)
    }

    pub async fn delete_token(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM access_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes every token expired as of `now`. Driven by an external
    /// sweeper (; the periodic driver lives in `server`).
    pub async fn sweep_expired_tokens(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_library(row: AnyRow) -> Library {
    Library {
        tenant: row.get("tenant"),
        library_id: row.get("library_id"),
        owner: row.get("owner"),
        name: row.get("name"),
        description: row.get("description"),
        head_commit_id: row.get("head_commit_id"),
        root_commit_id: row.get("root_commit_id"),
        size_bytes: row.get("size_bytes"),
        file_count: row.get("file_count"),
        version_ttl_secs: row.get("version_ttl_secs"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_commit(row: AnyRow) -> Commit {
    Commit {
        library_id: row.get("library_id"),
        commit_id: row.get("commit_id"),
        root_fs_id: row.get("root_fs_id"),
        parent_id: row.get("parent_id"),
        second_parent_id: row.get("second_parent_id"),
        creator: row.get("creator"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

fn row_to_fs_object(row: AnyRow) -> Result<FsObject> {
    let obj_type: String = row.get("obj_type");
    let kind = if obj_type == "dir" { FsObjectKind::Dir } else { FsObjectKind::File };
    let block_ids_json: Option<String> = row.get("block_ids");
    let block_ids = match block_ids_json {
        Some(s) if !s.is_empty() => serde_json::from_str(&s)?,
        _ => Vec::new(),
    };
    Ok(FsObject {
        library_id: row.get("library_id"),
        fs_id: row.get("fs_id"),
        kind,
        name: row.get("obj_name"),
        size_bytes: row.get("size_bytes"),
        mtime: row.get("mtime"),
        block_ids,
        dir_entries: row.get("dir_entries"),
    })
}

fn row_to_block(row: AnyRow) -> BlockRow {
    BlockRow {
        tenant: row.get("tenant"),
        block_id: row.get("block_id"),
        size_bytes: row.get("size_bytes"),
        storage_class: row.get("storage_class"),
        storage_key: row.get("storage_key"),
        ref_count: row.get("ref_count"),
        created_at: row.get("created_at"),
        last_accessed: row.get("last_accessed"),
    }
}

fn row_to_mapping(row: AnyRow) -> BlockIdMapping {
    BlockIdMapping {
        tenant: row.get("tenant"),
        external_id: row.get("external_id"),
        internal_id: row.get("internal_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_token(row: AnyRow) -> AccessToken {
    let kind_str: String = row.get("kind");
    let kind = if kind_str == "upload" { TokenKind::Upload } else { TokenKind::Download };
    AccessToken {
        token: row.get("token"),
        kind,
        tenant: row.get("tenant"),
        library: row.get("library"),
        path: row.get("path"),
        user: row.get("user_name"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

#[async_trait]
impl Persist<Commit> for MetadataStore {
    async fn store_all(&self, items: Vec<Commit>) -> Result<()> {
        for item in items {
            self.insert_commit(&item).await?;
        }
        Ok(())
    }

    async fn store(&self, item: Commit) -> Result<()> {
        self.insert_commit(&item).await
    }
}

#[async_trait]
impl Persist<FsObject> for MetadataStore {
    async fn store_all(&self, items: Vec<FsObject>) -> Result<()> {
        for item in items {
            self.insert_fs_object(&item).await?;
        }
        Ok(())
    }

    async fn store(&self, item: FsObject) -> Result<()> {
        self.insert_fs_object(&item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::any::{install_default_drivers, AnyPoolOptions};

    async fn pool() -> MetadataStore {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .connect("sqlite::memory:")
            .await
            .expect("could not create in-memory sqlite pool");
        MetadataStore::new(pool).await.expect("schema creation failed")
    }

    fn sample_library() -> Library {
        Library {
            tenant: "t1".into(),
            library_id: "lib1".into(),
            owner: "alice".into(),
            name: "My Library".into(),
            description: "".into(),
            head_commit_id: None,
            root_commit_id: None,
            size_bytes: 0,
            file_count: 0,
            version_ttl_secs: 3600,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    #[tokio::test]
    async fn library_roundtrips_and_head_updates() {
        let store = pool().await;
        store.put_library(&sample_library()).await.unwrap();

        let fetched = store.get_library("t1", "lib1").await.unwrap();
        assert_eq!(fetched.owner, "alice");
        assert!(fetched.head_commit_id.is_none());

        store.update_head("t1", "lib1", "deadbeef", 2000).await.unwrap();
        let fetched = store.get_library("t1", "lib1").await.unwrap();
        assert_eq!(fetched.head_commit_id.as_deref(), Some("deadbeef"));
        assert_eq!(fetched.updated_at, 2000);
    }

    #[tokio::test]
    async fn missing_library_is_not_found() {
        let store = pool().await;
        let err = store.get_library("t1", "nope").await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn commit_insert_is_idempotent() {
        let store = pool().await;
        let commit = Commit {
            library_id: "lib1".into(),
            commit_id: "c0".into(),
            root_fs_id: "0".repeat(40),
            parent_id: None,
            second_parent_id: None,
            creator: "0".repeat(40),
            description: "".into(),
            created_at: 1000,
        };
        Persist::store(&store, commit.clone()).await.unwrap();
        Persist::store(&store, commit.clone()).await.unwrap();
        let fetched = store.get_commit("lib1", "c0").await.unwrap();
        assert_eq!(fetched.commit_id, "c0");
    }

    #[tokio::test]
    async fn block_put_then_second_put_increments_ref_count() {
        let store = pool().await;
        let block = BlockRow {
            tenant: "t1".into(),
            block_id: "d".repeat(64),
            size_bytes: 5,
            storage_class: "hot".into(),
            storage_key: "blocks/aa/bb/".into(),
            ref_count: 1,
            created_at: 1000,
            last_accessed: 1000,
        };
        store.upsert_block(&block).await.unwrap();
        store.upsert_block(&block).await.unwrap();
        let fetched = store.get_block("t1", &block.block_id).await.unwrap();
        assert_eq!(fetched.ref_count, 2);
    }

    #[tokio::test]
    async fn mapping_roundtrips() {
        let store = pool().await;
        let mapping = BlockIdMapping {
            tenant: "t1".into(),
            external_id: "a".repeat(40),
            internal_id: "b".repeat(64),
            created_at: 1000,
        };
        store.put_mapping(&mapping).await.unwrap();
        store.put_mapping(&mapping).await.unwrap(); // duplicate, not an error
        let fetched = store.get_mapping("t1", &mapping.external_id).await.unwrap();
        assert_eq!(fetched.internal_id, mapping.internal_id);
    }

    #[tokio::test]
    async fn token_expiry_and_kind_are_enforced() {
        let store = pool().await;
        let token = AccessToken {
            token: "abc123".into(),
            kind: TokenKind::Upload,
            tenant: "t1".into(),
            library: "lib1".into(),
            path: "/".into(),
            user: "alice".into(),
            created_at: 1000,
            expires_at: 2000,
        };
        store.put_token(&token).await.unwrap();

        assert!(store.get_token("abc123", TokenKind::Upload, 1500).await.is_ok());
        assert!(store.get_token("abc123", TokenKind::Download, 1500).await.is_err());
        assert!(store.get_token("abc123", TokenKind::Upload, 2500).await.is_err());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_tokens() {
        let store = pool().await;
        let fresh = AccessToken {
            token: "fresh".into(),
            kind: TokenKind::Download,
            tenant: "t1".into(),
            library: "lib1".into(),
            path: "/".into(),
            user: "alice".into(),
            created_at: 1000,
            expires_at: 9999,
        };
        let stale = AccessToken { token: "stale".into(), expires_at: 1, ..fresh.clone() };
        store.put_token(&fresh).await.unwrap();
        store.put_token(&stale).await.unwrap();

        let removed = store.sweep_expired_tokens(500).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_token("fresh", TokenKind::Download, 500).await.is_ok());
        assert!(store.delete_token("fresh").await.is_ok());
        assert!(store.get_token("fresh", TokenKind::Download, 500).await.is_err());
    }

    #[tokio::test]
    async fn fs_object_pack_skips_missing_silently() {
        let store = pool().await;
        let obj = FsObject {
            library_id: "lib1".into(),
            fs_id: "f1".into(),
            kind: FsObjectKind::File,
            name: Some("a.txt".into()),
            size_bytes: Some(5),
            mtime: Some(1000),
            block_ids: vec!["b".repeat(64)],
            dir_entries: None,
        };
        Persist::store(&store, obj.clone()).await.unwrap();

        let packed = store
            .get_fs_objects("lib1", &["f1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].fs_id, "f1");
    }
}
