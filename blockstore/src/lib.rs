//! Block Store (component C5): a content-addressable layer
//! over a single [`ObjectBackend`], sharding keys the way `object_backend`'s
//! sibling `common::sharding` already does (see DESIGN.md).
//!
//! `blockstore` never manages reference counts itself — that stays the
//! caller's responsibility (the `blocks` table lives in `store`, updated by
//! `fs_graph`/`sync_protocol`).

use async_trait::async_trait;
use common::{sharding::hash_to_key, Digest, ErrorKind};
use futures::stream::{self, StreamExt};
use object_backend::{ObjectBackend, ObjectBackendError, ObjectReader, PutSource};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum BlockStoreError {
    #[error("object backend error: {0}")]
    Backend(#[from] ObjectBackendError),
}

impl BlockStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlockStoreError::Backend(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BlockStoreError>;

/// Default bounded concurrency for [`BlockStore::check_blocks_parallel`]
///
pub const DEFAULT_CHECK_CONCURRENCY: usize = 10;

/// A content-addressable store over exactly one [`ObjectBackend`] and a
/// fixed key prefix (default `blocks/`).
pub struct BlockStore {
    backend: Arc<dyn ObjectBackend>,
    prefix: String,
}

impl BlockStore {
    pub fn new(backend: Arc<dyn ObjectBackend>) -> Self {
        Self::with_prefix(backend, "blocks/")
    }

    pub fn with_prefix(backend: Arc<dyn ObjectBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// The two-level sharded storage key for `digest` (
    /// "Digest→key roundtrip").
    pub fn key_for(&self, digest: &Digest) -> String {
        self.key_for_hex(&digest.to_hex())
    }

    /// Same as [`Self::key_for`] but over a raw hex identifier rather than a
    /// typed [`Digest`] — used by `id_translator` when `translateOnGet`
    /// falls back to a pre-existing block stored under its legacy 40-hex
    /// key
    pub fn key_for_hex(&self, hex_id: &str) -> String {
        hash_to_key(&self.prefix, hex_id)
    }

    /// Stores `data` under `digest`'s sharded key, deduplicating against an
    /// existing write. Returns the storage key either way; the caller is
    /// responsible for the block's reference count
    #[instrument(skip(self, data), fields(digest = %digest))]
    pub async fn put_block(&self, digest: &Digest, data: bytes::Bytes) -> Result<String> {
        self.put_block_hex(&digest.to_hex(), data).await
    }

    pub async fn put_block_hex(&self, hex_id: &str, data: bytes::Bytes) -> Result<String> {
        let key = self.key_for_hex(hex_id);
        if self.backend.exists(&key).await? {
            debug!("block already present, skipping write");
            return Ok(key);
        }
        self.backend.put(&key, PutSource::from_bytes(data)).await?;
        Ok(key)
    }

    pub async fn get_block(&self, digest: &Digest) -> Result<Vec<u8>> {
        let mut reader = self.get_block_reader(digest).await?;
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut out).map_err(|e| BlockStoreError::Backend(e.into()))?;
        Ok(out)
    }

    pub async fn get_block_reader(&self, digest: &Digest) -> Result<ObjectReader> {
        self.get_block_reader_hex(&digest.to_hex()).await
    }

    pub async fn get_block_reader_hex(&self, hex_id: &str) -> Result<ObjectReader> {
        let key = self.key_for_hex(hex_id);
        Ok(self.backend.get(&key).await?)
    }

    pub async fn block_exists(&self, digest: &Digest) -> Result<bool> {
        self.block_exists_hex(&digest.to_hex()).await
    }

    pub async fn block_exists_hex(&self, hex_id: &str) -> Result<bool> {
        let key = self.key_for_hex(hex_id);
        Ok(self.backend.exists(&key).await?)
    }

    /// Bounded-parallel existence check over `digests`
    /// Digests missing due to an I/O error are reported as not present —
    /// errors are swallowed per-item, never propagated to the caller
    ///
    #[instrument(skip(self, digests), fields(count = digests.len(), concurrency))]
    pub async fn check_blocks_parallel(
        &self,
        digests: &[Digest],
        concurrency: usize,
    ) -> HashMap<Digest, bool> {
        let concurrency = concurrency.max(1);
        stream::iter(digests.iter().copied())
            .map(|digest| async move {
                let present = self.block_exists(&digest).await.unwrap_or(false);
                (digest, present)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Same as [`Self::check_blocks_parallel`] but over raw hex identifiers —
    /// used by `sync_protocol`'s `check-blocks` operation, which deals in
    /// external ids that may be 40-hex legacy ids without a modern `Digest`
    /// representation
    #[instrument(skip(self, hex_ids), fields(count = hex_ids.len(), concurrency))]
    pub async fn check_blocks_parallel_hex(
        &self,
        hex_ids: &[String],
        concurrency: usize,
    ) -> HashMap<String, bool> {
        let concurrency = concurrency.max(1);
        stream::iter(hex_ids.iter().cloned())
            .map(|hex_id| async move {
                let present = self.block_exists_hex(&hex_id).await.unwrap_or(false);
                (hex_id, present)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use object_backend::{S3Backend, Tier};
    use object_store::memory::InMemory;

    fn store() -> BlockStore {
        let backend = Arc::new(S3Backend::new(
            Arc::new(InMemory::new()),
            "",
            Tier::Hot,
            Utf8PathBuf::from(std::env::temp_dir().to_string_lossy().to_string()),
        ));
        BlockStore::new(backend)
    }

    fn digest_of(data: &[u8]) -> Digest {
        common::sha256(data)
    }

    #[tokio::test]
    async fn key_uses_two_level_nibble_sharding() {
        let s = store();
        let d = digest_of(b"hello");
        assert_eq!(
            s.key_for(&d),
            "blocks/2c/f2/2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let s = store();
        let d = digest_of(b"hello world");
        s.put_block(&d, bytes::Bytes::from_static(b"hello world")).await.unwrap();
        assert!(s.block_exists(&d).await.unwrap());
        assert_eq!(s.get_block(&d).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn dedup_put_is_a_single_underlying_write() {
        let s = store();
        let d = digest_of(b"payload");
        let k1 = s.put_block(&d, bytes::Bytes::from_static(b"payload")).await.unwrap();
        // Second put with the same digest must not error and must return the
        // same key ("Block dedup" — we can't directly observe the
        // backend's write count through the trait, so we assert idempotency
        // of the outward-visible effect instead).
        let k2 = s.put_block(&d, bytes::Bytes::from_static(b"payload")).await.unwrap();
        assert_eq!(k1, k2);
        assert_eq!(s.get_block(&d).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn check_blocks_parallel_reports_mixed_presence() {
        let s = store();
        let present = digest_of(b"present");
        let absent = digest_of(b"absent");
        s.put_block(&present, bytes::Bytes::from_static(b"present")).await.unwrap();

        let results = s.check_blocks_parallel(&[present, absent], DEFAULT_CHECK_CONCURRENCY).await;
        assert_eq!(results.get(&present), Some(&true));
        assert_eq!(results.get(&absent), Some(&false));
    }

    #[tokio::test]
    async fn check_blocks_parallel_hex_reports_mixed_presence() {
        let s = store();
        let present_hex = digest_of(b"present").to_hex();
        let absent_hex = "f".repeat(64);
        s.put_block_hex(&present_hex, bytes::Bytes::from_static(b"present")).await.unwrap();

        let results = s
            .check_blocks_parallel_hex(&[present_hex.clone(), absent_hex.clone()], DEFAULT_CHECK_CONCURRENCY)
            .await;
        assert_eq!(results.get(&present_hex), Some(&true));
        assert_eq!(results.get(&absent_hex), Some(&false));
    }

    #[tokio::test]
    async fn check_blocks_parallel_honors_zero_concurrency_floor() {
        let s = store();
        let d = digest_of(b"x");
        let results = s.check_blocks_parallel(&[d], 0).await;
        assert_eq!(results.get(&d), Some(&false));
    }
}
