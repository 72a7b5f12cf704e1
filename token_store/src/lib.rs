//! Token Store (component C9): issues random single-use
//! (upload) and reusable (download) tokens with TTL, backed either by an
//! in-memory map or by the metadata store.
//!
//! The two Token Store implementations fulfill an identical capability set
//! and are fully interchangeable, realized here as the `TokenStore` trait
//! both implementations satisfy — capability set over deep inheritance,
//! the same pattern the Object Backend trait follows.

use async_trait::async_trait;
use common::model::{AccessToken, TokenKind};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use store::MetadataStore;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token not found, expired, or of the wrong kind")]
    NotFound,
    #[error("metadata store error: {0}")]
    Store(#[from] store::MetadataStoreError),
}

impl TokenStoreError {
    pub fn kind(&self) -> common::ErrorKind {
        match self {
            TokenStoreError::NotFound => common::ErrorKind::Forbidden,
            TokenStoreError::Store(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TokenStoreError>;

/// Default sweep interval for [`InMemoryTokenStore::sweep_expired`],
/// intended to be driven by an external timer
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub(crate) fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// 16 random bytes, hex-encoded to a 32-character token value
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The capability set both implementations expose:
/// `createUploadToken`, `createDownloadToken`, `getToken`, `deleteToken`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create_upload_token(&self, tenant: &str, library: &str, path: &str, user: &str, ttl: Duration) -> Result<AccessToken>;
    async fn create_download_token(&self, tenant: &str, library: &str, path: &str, user: &str, ttl: Duration) -> Result<AccessToken>;

    /// Returns the record iff the token exists, has not expired, and its
    /// kind matches `expected_kind`; otherwise `NotFound` — no distinction
    /// is leaked between "wrong kind" and "doesn't exist"
    async fn get_token(&self, token: &str, expected_kind: TokenKind) -> Result<AccessToken>;

    async fn delete_token(&self, token: &str) -> Result<()>;
}

fn new_token(kind: TokenKind, tenant: &str, library: &str, path: &str, user: &str, ttl: Duration) -> AccessToken {
    let now = unix_now();
    AccessToken {
        token: generate_token(),
        kind,
        tenant: tenant.to_string(),
        library: library.to_string(),
        path: path.to_string(),
        user: user.to_string(),
        created_at: now,
        expires_at: now + ttl.as_secs() as i64,
    }
}

/// In-memory implementation: a map guarded by a single reader/writer lock
/// ("a single reader/writer mutex protects the map; readers
/// acquire shared access; the sweeper goroutine acquires exclusive access
/// to evict").
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self { tokens: RwLock::new(HashMap::new()) }
    }

    /// Evicts every token expired as of now. Intended to be called on a
    /// timer by an external collaborator (default: every 5 minutes; the
    /// driver lives in `server`).
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> usize {
        let now = unix_now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        before - tokens.len()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create_upload_token(&self, tenant: &str, library: &str, path: &str, user: &str, ttl: Duration) -> Result<AccessToken> {
        let token = new_token(TokenKind::Upload, tenant, library, path, user, ttl);
        self.tokens.write().await.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn create_download_token(&self, tenant: &str, library: &str, path: &str, user: &str, ttl: Duration) -> Result<AccessToken> {
        let token = new_token(TokenKind::Download, tenant, library, path, user, ttl);
        self.tokens.write().await.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn get_token(&self, token: &str, expected_kind: TokenKind) -> Result<AccessToken> {
        let now = unix_now();
        let tokens = self.tokens.read().await;
        match tokens.get(token) {
            Some(record) if record.expires_at > now && record.kind.as_str() == expected_kind.as_str() => {
                Ok(record.clone())
            }
            _ => Err(TokenStoreError::NotFound),
        }
    }

    async fn delete_token(&self, token: &str) -> Result<()> {
        self.tokens.write().await.remove(token);
        Ok(())
    }
}

/// Database-backed implementation: row-per-token in `access_tokens`, TTL
/// enforced by comparing `expires_at` against the current time on read
///
pub struct DbTokenStore {
    store: Arc<MetadataStore>,
}

impl DbTokenStore {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TokenStore for DbTokenStore {
    async fn create_upload_token(&self, tenant: &str, library: &str, path: &str, user: &str, ttl: Duration) -> Result<AccessToken> {
        let token = new_token(TokenKind::Upload, tenant, library, path, user, ttl);
        self.store.put_token(&token).await?;
        Ok(token)
    }

    async fn create_download_token(&self, tenant: &str, library: &str, path: &str, user: &str, ttl: Duration) -> Result<AccessToken> {
        let token = new_token(TokenKind::Download, tenant, library, path, user, ttl);
        self.store.put_token(&token).await?;
        Ok(token)
    }

    async fn get_token(&self, token: &str, expected_kind: TokenKind) -> Result<AccessToken> {
        self.store
            .get_token(token, expected_kind, unix_now())
            .await
            .map_err(|e| match e {
                store::MetadataStoreError::NotFound => TokenStoreError::NotFound,
                other => TokenStoreError::Store(other),
            })
    }

    async fn delete_token(&self, token: &str) -> Result<()> {
        self.store.delete_token(token).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_token_roundtrips() {
        let store = InMemoryTokenStore::new();
        let token = store
            .create_download_token("t1", "lib1", "/a", "alice", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(token.token.len(), 32);

        let fetched = store.get_token(&token.token, TokenKind::Download).await.unwrap();
        assert_eq!(fetched.user, "alice");

        let err = store.get_token(&token.token, TokenKind::Upload).await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn in_memory_sweep_evicts_expired() {
        let store = InMemoryTokenStore::new();
        store
            .create_upload_token("t1", "lib1", "/a", "bob", Duration::from_secs(0))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let evicted = store.sweep_expired().await;
        assert_eq!(evicted, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn delete_token_consumes_it() {
        let store = InMemoryTokenStore::new();
        let token = store
            .create_upload_token("t1", "lib1", "/a", "bob", Duration::from_secs(60))
            .await
            .unwrap();
        store.delete_token(&token.token).await.unwrap();
        assert!(store.get_token(&token.token, TokenKind::Upload).await.is_err());
    }

    #[tokio::test]
    async fn db_backed_store_matches_in_memory_contract() {
        use sqlx::any::{install_default_drivers, AnyPoolOptions};
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let metadata = Arc::new(MetadataStore::new(pool).await.unwrap());
        let store = DbTokenStore::new(metadata);

        let token = store
            .create_download_token("t1", "lib1", "/a", "alice", Duration::from_secs(60))
            .await
            .unwrap();
        let fetched = store.get_token(&token.token, TokenKind::Download).await.unwrap();
        assert_eq!(fetched.user, "alice");
        assert!(store.get_token(&token.token, TokenKind::Upload).await.is_err());
    }
}
