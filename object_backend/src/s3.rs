use crate::{
    ObjectBackend, ObjectBackendError, ObjectReader, PutSource, Result, Tier, Listing,
    MULTIPART_PART_SIZE, MULTIPART_THRESHOLD, RESTORE_AVAILABILITY, RESTORE_LATENCY,
};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use futures::StreamExt;
use object_store::path::Path as StorePath;
use object_store::signer::Signer;
use object_store::{MultipartUpload, ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use spillbuffer::SpillBuffer;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

/// Bookkeeping written alongside `key` to simulate a vendor cold-storage
/// restore request; `object_store` has no cross-vendor restore API, so
/// "restored" is tracked as our own state transition rather than polled from
/// the backend (see DESIGN.md).
#[derive(Serialize, Deserialize)]
struct RestoreMarker {
    initiated_unix: u64,
    ready_unix: u64,
    expires_unix: u64,
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// An [`ObjectBackend`] over any store the `object_store` crate supports,
/// pinned to a single [`Tier`] at construction
pub struct S3Backend {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    prefix: StorePath,
    tier: Tier,
    spill_dir: Utf8PathBuf,
}

impl S3Backend {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl AsRef<str>, tier: Tier, spill_dir: Utf8PathBuf) -> Self {
        Self {
            store,
            signer: None,
            prefix: StorePath::from(prefix.as_ref()),
            tier,
            spill_dir,
        }
    }

    /// Like [`Self::new`], but also registers a [`Signer`] for
    /// `presignGet`/`presignPut`. `store` and `signer` are expected to be
    /// the same underlying client (e.g. `object_store::aws::AmazonS3`
    /// implements both traits); callers pass two `Arc`s over it.
    pub fn with_signer(
        store: Arc<dyn ObjectStore>,
        signer: Arc<dyn Signer>,
        prefix: impl AsRef<str>,
        tier: Tier,
        spill_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            store,
            signer: Some(signer),
            prefix: StorePath::from(prefix.as_ref()),
            tier,
            spill_dir,
        }
    }

    fn object_path(&self, key: &str) -> StorePath {
        let mut full = self.prefix.to_string();
        if !full.is_empty() && !full.ends_with('/') {
            full.push('/');
        }
        full.push_str(key);
        StorePath::from(full)
    }

    fn restore_marker_path(&self, key: &str) -> StorePath {
        self.object_path(&format!("{key}.restore"))
    }

    async fn read_marker(&self, key: &str) -> Result<Option<RestoreMarker>> {
        match self.store.get(&self.restore_marker_path(key)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads `reader` to completion through a [`SpillBuffer`], returning the
    /// total size and a fresh seekable view — used when the caller didn't
    /// know the body size up front
    fn buffer_unsized(&self, mut reader: Box<dyn Read + Send>) -> Result<(u64, spillbuffer::SpillReader)> {
        let spill = SpillBuffer::with_default_threshold(self.spill_dir.clone());
        let mut chunk = vec![0u8; 256 * 1024];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            spill.write(&chunk[..n])?;
        }
        let size = spill.size();
        Ok((size, spill.read_seeker()?))
    }

    #[instrument(skip(self, reader), fields(object.key = %key, object.size = size))]
    async fn multipart_from_reader(&self, key: &str, mut reader: impl Read, size: u64) -> Result<()> {
        let path = self.object_path(key);
        let mut upload = self.store.put_multipart(&path).await?;
        let mut sent: u64 = 0;
        let mut buf = vec![0u8; MULTIPART_PART_SIZE];

        let result: Result<()> = async {
            while sent < size {
                let want = (size - sent).min(MULTIPART_PART_SIZE as u64) as usize;
                reader.read_exact(&mut buf[..want])?;
                upload.put_part(PutPayload::from(buf[..want].to_vec())).await?;
                sent += want as u64;
            }
            upload.complete().await?;
            Ok(())
        }
        .await;

        if let Err(e) = &result {
            warn!(error = %e, "multipart upload failed, aborting");
            let _ = upload.abort().await;
        }
        result
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    fn tier(&self) -> Tier {
        self.tier
    }

    #[instrument(skip(self, source), fields(object.key = %key))]
    async fn put(&self, key: &str, source: PutSource) -> Result<String> {
        let path = self.object_path(key);
        match source {
            PutSource::Bytes(b) => {
                if b.len() as u64 > MULTIPART_THRESHOLD {
                    let len = b.len() as u64;
                    self.multipart_from_reader(key, Cursor::new(b), len).await?;
                } else {
                    self.store.put(&path, b.into()).await?;
                }
            }
            PutSource::Reader { reader, size: Some(n) } if n <= MULTIPART_THRESHOLD => {
                let mut buf = Vec::with_capacity(n as usize);
                reader.take(n).read_to_end(&mut buf)?;
                self.store.put(&path, buf.into()).await?;
            }
            PutSource::Reader { reader, size: Some(n) } => {
                self.multipart_from_reader(key, reader, n).await?;
            }
            PutSource::Reader { reader, size: None } => {
                let (size, mut seeker) = self.buffer_unsized(reader)?;
                if size > MULTIPART_THRESHOLD {
                    self.multipart_from_reader(key, seeker, size).await?;
                } else {
                    let mut buf = Vec::with_capacity(size as usize);
                    seeker.read_to_end(&mut buf)?;
                    self.store.put(&path, buf.into()).await?;
                }
            }
        }
        debug!("object stored");
        Ok(key.to_string())
    }

    #[instrument(skip(self), fields(object.key = %key))]
    async fn get(&self, key: &str) -> Result<ObjectReader> {
        let path = self.object_path(key);
        match self.store.get(&path).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Box::new(Cursor::new(bytes.to_vec())))
            }
            Err(object_store::Error::NotFound { .. }) => Err(ObjectBackendError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key);
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        let signer = self.signer.as_ref().ok_or(ObjectBackendError::Unsupported)?;
        let url = signer.signed_url(http::Method::GET, &self.object_path(key), ttl).await?;
        Ok(url.to_string())
    }

    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String> {
        let signer = self.signer.as_ref().ok_or(ObjectBackendError::Unsupported)?;
        let url = signer.signed_url(http::Method::PUT, &self.object_path(key), ttl).await?;
        Ok(url.to_string())
    }

    async fn list(&self, prefix: &str, delimiter: bool) -> Result<Listing> {
        let path = self.object_path(prefix);
        if delimiter {
            let result = self.store.list_with_delimiter(Some(&path)).await?;
            Ok(Listing {
                keys: result.objects.into_iter().map(|o| o.location.to_string()).collect(),
                common_prefixes: result.common_prefixes.into_iter().map(|p| p.to_string()).collect(),
            })
        } else {
            let mut stream = self.store.list(Some(&path));
            let mut keys = Vec::new();
            while let Some(meta) = stream.next().await {
                keys.push(meta?.location.to_string());
            }
            Ok(Listing { keys, common_prefixes: Vec::new() })
        }
    }

    async fn initiate_restore(&self, key: &str) -> Result<()> {
        if self.tier != Tier::Cold {
            return Err(ObjectBackendError::NotApplicable(self.tier));
        }
        let now = unix_now();
        let marker = RestoreMarker {
            initiated_unix: now,
            ready_unix: now + RESTORE_LATENCY.as_secs(),
            expires_unix: now + RESTORE_LATENCY.as_secs() + RESTORE_AVAILABILITY.as_secs(),
        };
        self.store
            .put(&self.restore_marker_path(key), serde_json::to_vec(&marker)?.into())
            .await?;
        Ok(())
    }

    async fn check_restore_status(&self, key: &str) -> Result<bool> {
        match self.read_marker(key).await? {
            Some(marker) => Ok(unix_now() >= marker.ready_unix),
            None => Ok(false),
        }
    }

    async fn restore_expiry(&self, key: &str) -> Result<Option<SystemTime>> {
        match self.read_marker(key).await? {
            Some(marker) => Ok(Some(UNIX_EPOCH + Duration::from_secs(marker.expires_unix))),
            None => Ok(None),
        }
    }
}
