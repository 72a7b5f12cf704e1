//! Block-ID Translator (component C7): persists the
//! `{(tenant, legacy-id) -> modern-digest}` mapping and translates on
//! ingest/check/fetch.
//!
//! There's no analog elsewhere in the wider codebase for juggling two ID
//! schemes at once; this is built directly on `store`'s
//! `block_id_mappings` table and `common::ExternalId`'s 40-vs-64-hex
//! classification.

use common::model::BlockIdMapping;
use common::{Digest, ExternalId, LegacyId};
use std::sync::Arc;
use store::MetadataStore;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("declared external id does not match the computed SHA-256 digest of the body")]
    HashMismatch,
    #[error("malformed external id: {0}")]
    InvalidArgument(String),
    #[error("metadata store error: {0}")]
    Store(#[from] store::MetadataStoreError),
}

impl TranslateError {
    pub fn kind(&self) -> common::ErrorKind {
        match self {
            TranslateError::HashMismatch => common::ErrorKind::HashMismatch,
            TranslateError::InvalidArgument(_) => common::ErrorKind::InvalidArgument,
            TranslateError::Store(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;

/// What `translateOnGet` resolves an external id to: either the modern
/// digest (the common case) or — when a 40-hex legacy id has no mapping row
/// — the legacy id itself, unchanged, so a pre-existing block stored under
/// its legacy key is still reachable
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedBlockId {
    Internal(Digest),
    LegacyFallback(LegacyId),
}

impl ResolvedBlockId {
    pub fn hex(&self) -> String {
        match self {
            ResolvedBlockId::Internal(d) => d.to_hex(),
            ResolvedBlockId::LegacyFallback(l) => l.as_str().to_string(),
        }
    }
}

pub struct IdTranslator {
    store: Arc<MetadataStore>,
}

impl IdTranslator {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }

    /// `translateOnPut`:
    /// - a 64-hex (or SHA-256-asserted) external id must equal the computed
    ///   digest of `body`; no mapping row is written.
    /// - a 40-hex legacy id gets a mapping row `(tenant, external) ->
    ///   internal`, written idempotently.
    ///
    /// Returns the internal digest the body should be stored under; actual
    /// storage I/O goes through `blockstore`, not this crate.
    #[instrument(skip(self, body), fields(tenant, external_id))]
    pub async fn translate_on_put(
        &self,
        tenant: &str,
        external_id: &str,
        body: &[u8],
        asserts_sha256: bool,
        now: i64,
    ) -> Result<Digest> {
        let internal = common::sha256(body);
        match ExternalId::classify(external_id, asserts_sha256)
            .map_err(|_| TranslateError::InvalidArgument(external_id.to_string()))?
        {
            ExternalId::Modern(declared) => {
                if declared != internal {
                    return Err(TranslateError::HashMismatch);
                }
                Ok(internal)
            }
            ExternalId::Legacy(legacy) => {
                self.store
                    .put_mapping(&BlockIdMapping {
                        tenant: tenant.to_string(),
                        external_id: legacy.as_str().to_string(),
                        internal_id: internal.to_hex(),
                        created_at: now,
                    })
                    .await?;
                Ok(internal)
            }
        }
    }

    /// `translateOnGet`: a 64-hex id is used directly; a
    /// 40-hex id is looked up in the mapping table, falling back to the
    /// legacy id itself when no mapping exists.
    #[instrument(skip(self), fields(tenant, external_id))]
    pub async fn translate_on_get(&self, tenant: &str, external_id: &str) -> Result<ResolvedBlockId> {
        match ExternalId::classify(external_id, false)
            .map_err(|_| TranslateError::InvalidArgument(external_id.to_string()))?
        {
            ExternalId::Modern(d) => Ok(ResolvedBlockId::Internal(d)),
            ExternalId::Legacy(legacy) => {
                match self.store.get_mapping(tenant, legacy.as_str()).await {
                    Ok(mapping) => {
                        let digest = Digest::parse(&mapping.internal_id)
                            .map_err(|_| TranslateError::InvalidArgument(mapping.internal_id.clone()))?;
                        Ok(ResolvedBlockId::Internal(digest))
                    }
                    Err(store::MetadataStoreError::NotFound) => Ok(ResolvedBlockId::LegacyFallback(legacy)),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::any::{install_default_drivers, AnyPoolOptions};

    async fn translator() -> IdTranslator {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Arc::new(MetadataStore::new(pool).await.unwrap());
        IdTranslator::new(store)
    }

    #[tokio::test]
    async fn legacy_roundtrip_resolves_to_internal_digest() {
        let t = translator().await;
        let legacy = "a".repeat(40);
        let body = b"hello";

        let internal = t.translate_on_put("tenant1", &legacy, body, false, 1000).await.unwrap();
        assert_eq!(internal, common::sha256(body));

        let resolved = t.translate_on_get("tenant1", &legacy).await.unwrap();
        assert_eq!(resolved, ResolvedBlockId::Internal(internal));
    }

    #[tokio::test]
    async fn modern_id_requires_exact_match() {
        let t = translator().await;
        let body = b"hello";
        let correct = common::sha256(body).to_hex();
        let wrong = "f".repeat(64);

        assert!(t.translate_on_put("t1", &correct, body, false, 1000).await.is_ok());
        let err = t.translate_on_put("t1", &wrong, body, false, 1000).await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::HashMismatch);
    }

    #[tokio::test]
    async fn modern_put_writes_no_mapping_row() {
        let t = translator().await;
        let body = b"data";
        let digest_hex = common::sha256(body).to_hex();
        t.translate_on_put("t1", &digest_hex, body, false, 1000).await.unwrap();

        // No mapping row exists for a 64-hex id; translate_on_get just
        // parses the digest directly.
        let err = t.store.get_mapping("t1", &digest_hex).await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unmapped_legacy_id_falls_back_unchanged() {
        let t = translator().await;
        let legacy = "b".repeat(40);
        let resolved = t.translate_on_get("t1", &legacy).await.unwrap();
        match resolved {
            ResolvedBlockId::LegacyFallback(id) => assert_eq!(id.as_str(), legacy),
            _ => panic!("expected legacy fallback"),
        }
    }

    #[tokio::test]
    async fn sha256_assertion_with_legacy_length_id_is_rejected() {
        // A 40-hex id that *asserts* sha256 hashing must match — it cannot
        // be treated as a legacy id once the caller declares the hash type.
        let t = translator().await;
        let body = b"x";
        let legacy_shaped = "c".repeat(40);
        let err = t.translate_on_put("t1", &legacy_shaped, body, true, 1000).await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::InvalidArgument);
    }
}
