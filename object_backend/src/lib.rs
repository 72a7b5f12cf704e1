//! Object Backend (component C4): a tier-pinned abstraction
//! over an S3-shaped object store, in the shape of `ObjectStoreBlobService`
//! (digest-agnostic key strings, the `object_store` crate's `ObjectStore`
//! trait object, `NotFound` mapped to a plain `false` from `exists`).
//!
//! Unlike a local-disk-backed blob service, this crate's `put` has to cope
//! with bodies of unknown size arriving over HTTP — that's what
//! `spillbuffer` is for.

mod error;
mod s3;

pub use error::ObjectBackendError;
pub use s3::S3Backend;

use async_trait::async_trait;
use std::io::Read;
use std::time::{Duration, SystemTime};

pub type Result<T> = std::result::Result<T, ObjectBackendError>;

/// The one tier a backend is pinned to at construction
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Cold,
}

/// What to upload: an in-memory body, or a blocking reader paired with an
/// optional known size. `put` decides how to stream it based on which
/// variant and what size it turns out to have
pub enum PutSource {
    Bytes(bytes::Bytes),
    Reader {
        reader: Box<dyn Read + Send>,
        size: Option<u64>,
    },
}

impl PutSource {
    pub fn from_bytes(data: impl Into<bytes::Bytes>) -> Self {
        PutSource::Bytes(data.into())
    }

    pub fn from_reader(reader: impl Read + Send + 'static, size: Option<u64>) -> Self {
        PutSource::Reader {
            reader: Box::new(reader),
            size,
        }
    }
}

/// A streaming read handle; concrete backends hand back whatever their
/// underlying store's `GetResult` body adapts to.
pub type ObjectReader = Box<dyn std::io::Read + Send>;

#[derive(Clone, Debug, Default)]
pub struct Listing {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
}

/// Above this size, `put` switches from a single `ObjectStore::put` call to
/// a multipart upload with 16 MiB parts
pub const MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;
pub const MULTIPART_PART_SIZE: usize = 16 * 1024 * 1024;

/// How long a standard-tier restore takes to become readable, and how long
/// the restored copy then stays available, once `initiateRestore` is called
/// (the "7-day restore at the standard retrieval tier"). The
/// `object_store` crate has no vendor restore API, so `S3Backend` tracks
/// this with its own marker object — see DESIGN.md.
pub const RESTORE_LATENCY: Duration = Duration::from_secs(12 * 3600);
pub const RESTORE_AVAILABILITY: Duration = Duration::from_secs(7 * 24 * 3600);

#[async_trait]
pub trait ObjectBackend: Send + Sync {
    fn tier(&self) -> Tier;

    /// Whether this backend can host a [`blockstore::BlockStore`]. Non-S3
    /// backends cannot back a Block Store and must error out on request.
    /// Every backend in this workspace goes through `object_store`'s
    /// S3-shaped API, so the default is `true`; a future non-S3 backend
    /// would override this.
    fn is_s3_shaped(&self) -> bool {
        true
    }

    async fn put(&self, key: &str, source: PutSource) -> Result<String>;
    async fn get(&self, key: &str) -> Result<ObjectReader>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String>;
    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String>;

    async fn list(&self, prefix: &str, delimiter: bool) -> Result<Listing>;

    async fn initiate_restore(&self, key: &str) -> Result<()>;
    async fn check_restore_status(&self, key: &str) -> Result<bool>;
    async fn restore_expiry(&self, key: &str) -> Result<Option<SystemTime>>;
}
