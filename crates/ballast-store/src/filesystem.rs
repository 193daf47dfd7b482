//! Filesystem-shaped adapter over a flat object store
//!
//! Translates path-based operations onto client primitives: rename is a
//! server-side copy followed by a retried delete, directories are a no-op,
//! existence is a HEAD probe. The adapter is intentionally thin; every
//! guarantee it cannot provide (atomic rename above all) is documented on
//! the operation.

use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use ballast_core::{Error, Result, RetryConfig};

use crate::client::{ObjectClient, ObjectInfo};
use crate::location::{self, StorageLocation};
use crate::retry::with_retry;

/// Stream direction for [`ObjectStoreFileSystem::create_stream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Download an existing object
    Read,
    /// Upload a new object
    Write,
}

impl FromStr for StreamMode {
    type Err = Error;

    /// Accepts the conventional `"rb"` / `"wb"` spellings
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rb" => Ok(StreamMode::Read),
            "wb" => Ok(StreamMode::Write),
            other => Err(Error::InvalidStreamMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Scoped handle for one object transfer
///
/// A read stream holds the fetched body and serves ranged slices out of
/// it. A write stream buffers locally and uploads the object on
/// [`close`](Self::close); dropping an unclosed write stream discards the
/// buffer with a warning. Either way no handle outlives the stream, though
/// an interrupted caller may still leave an incomplete object in the store.
pub struct ObjectStream {
    location: StorageLocation,
    inner: StreamInner,
    finished: bool,
}

enum StreamInner {
    Read { body: Bytes, pos: usize },
    Write { client: Arc<dyn ObjectClient>, buf: Vec<u8> },
}

impl ObjectStream {
    fn for_read(location: StorageLocation, body: Bytes) -> Self {
        Self {
            location,
            inner: StreamInner::Read { body, pos: 0 },
            finished: false,
        }
    }

    fn for_write(location: StorageLocation, client: Arc<dyn ObjectClient>) -> Self {
        Self {
            location,
            inner: StreamInner::Write {
                client,
                buf: Vec::new(),
            },
            finished: false,
        }
    }

    /// Direction this stream was opened with
    pub fn mode(&self) -> StreamMode {
        match self.inner {
            StreamInner::Read { .. } => StreamMode::Read,
            StreamInner::Write { .. } => StreamMode::Write,
        }
    }

    /// Remaining bytes of a read stream
    pub fn read_to_end(&mut self) -> Result<Bytes> {
        match &mut self.inner {
            StreamInner::Read { body, pos } => {
                let rest = body.slice(*pos..);
                *pos = body.len();
                Ok(rest)
            }
            StreamInner::Write { .. } => Err(Error::Internal {
                message: format!("read from write stream for {}", self.location),
            }),
        }
    }

    /// Ranged slice of a read stream's body
    pub fn slice(&self, offset: u64, length: u64) -> Result<Bytes> {
        match &self.inner {
            StreamInner::Read { body, .. } => {
                let end = offset
                    .checked_add(length)
                    .filter(|end| *end <= body.len() as u64)
                    .ok_or_else(|| Error::Storage {
                        message: format!(
                            "range {}+{} exceeds object size {} for {}",
                            offset,
                            length,
                            body.len(),
                            self.location
                        ),
                    })?;
                Ok(body.slice(offset as usize..end as usize))
            }
            StreamInner::Write { .. } => Err(Error::Internal {
                message: format!("read from write stream for {}", self.location),
            }),
        }
    }

    /// Append bytes to a write stream's buffer
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.inner {
            StreamInner::Write { buf, .. } => {
                buf.extend_from_slice(data);
                Ok(())
            }
            StreamInner::Read { .. } => Err(Error::Internal {
                message: format!("write to read stream for {}", self.location),
            }),
        }
    }

    /// Finish the transfer
    ///
    /// For a write stream this performs the upload; until it returns, the
    /// object does not exist under the destination key. For a read stream
    /// it is a no-op that reports the body size.
    pub async fn close(mut self) -> Result<ObjectInfo> {
        self.finished = true;
        match &mut self.inner {
            StreamInner::Read { body, .. } => Ok(ObjectInfo {
                size: body.len() as u64,
                etag: None,
            }),
            StreamInner::Write { client, buf } => {
                let body = Bytes::from(std::mem::take(buf));
                let size = body.len();
                let info = client
                    .put_object(&self.location.bucket, &self.location.key, body)
                    .await?;
                debug!(location = %self.location, size, "Write stream closed");
                Ok(info)
            }
        }
    }
}

impl Drop for ObjectStream {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let StreamInner::Write { buf, .. } = &self.inner {
            if !buf.is_empty() {
                warn!(
                    location = %self.location,
                    buffered = buf.len(),
                    "Write stream dropped without close; discarding buffered bytes"
                );
            }
        }
    }
}

/// Filesystem-emulation adapter over an [`ObjectClient`]
pub struct ObjectStoreFileSystem {
    client: Arc<dyn ObjectClient>,
    retry: RetryConfig,
    path: RwLock<String>,
}

impl ObjectStoreFileSystem {
    /// Wrap a client with the given retry policy
    pub fn new(client: Arc<dyn ObjectClient>, retry: RetryConfig) -> Self {
        Self {
            client,
            retry,
            path: RwLock::new(String::new()),
        }
    }

    /// Open a stream for one object transfer
    #[instrument(skip(self))]
    pub async fn create_stream(&self, path: &str, mode: StreamMode) -> Result<ObjectStream> {
        let location = StorageLocation::parse(path)?;
        match mode {
            StreamMode::Read => {
                debug!(%path, "create_stream readable");
                let body = self
                    .client
                    .get_object(&location.bucket, &location.key)
                    .await?;
                Ok(ObjectStream::for_read(location, body))
            }
            StreamMode::Write => {
                debug!(%path, "create_stream writable");
                Ok(ObjectStream::for_write(location, Arc::clone(&self.client)))
            }
        }
    }

    /// Join a path and a relative suffix
    pub fn concat_path(&self, path: &str, suffix: &str) -> String {
        location::concat(path, suffix)
    }

    /// Record and return the filesystem's root path; idempotent
    pub fn init_path(&self, path: &str) -> String {
        *self.path.write() = path.to_string();
        path.to_string()
    }

    /// The recorded root path
    pub fn root_path(&self) -> String {
        self.path.read().clone()
    }

    /// Move an object to a new key
    ///
    /// Emulated as a server-side copy followed by a retried delete of the
    /// old key; the store has no atomic rename. A crash between the two
    /// steps leaves both objects present, which callers must tolerate (the
    /// only rename here is metadata promotion, where the duplicate is an
    /// orphaned temp key).
    ///
    /// # Errors
    /// `Error::CrossBucketRename` when the paths resolve to different
    /// buckets. Delete exhaustion re-raises the final storage error.
    #[instrument(skip(self))]
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old = StorageLocation::parse(old_path)?;
        let new = StorageLocation::parse(new_path)?;

        if old.bucket != new.bucket {
            return Err(Error::CrossBucketRename {
                src: old_path.to_string(),
                dst: new_path.to_string(),
            });
        }

        let escaped_src = location::escape(&old.key);
        self.client
            .copy_object(&old.bucket, &escaped_src, &new.bucket, &new.key)
            .await?;
        debug!(%old_path, %new_path, "rename: copied");

        with_retry(&self.retry, "delete_object", || {
            self.client.delete_object(&old.bucket, &old.key)
        })
        .await?;
        debug!(%old_path, "rename: source deleted");
        Ok(())
    }

    /// Create a directory; a flat keyspace has none, so this is a no-op
    pub async fn mkdir(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    /// Whether an object exists at `path`
    ///
    /// Returns `false` only when the store reports not-found. Every other
    /// error propagates; conflating a transient or permission failure with
    /// absence would let callers overwrite checkpoints they should refuse
    /// to touch.
    #[instrument(skip(self))]
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let location = StorageLocation::parse(path)?;
        match self
            .client
            .head_object(&location.bucket, &location.key)
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::ObjectNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Best-effort delete for speculative cleanup
    ///
    /// Failures are logged and swallowed; the target may already be absent.
    #[instrument(skip(self))]
    pub async fn remove(&self, path: &str) {
        let location = match StorageLocation::parse(path) {
            Ok(location) => location,
            Err(e) => {
                warn!(%path, error = %e, "remove: unparseable path");
                return;
            }
        };
        if let Err(e) = self
            .client
            .delete_object(&location.bucket, &location.key)
            .await
        {
            warn!(%path, error = %e, "Failed to remove object");
        }
    }

    /// Whether `id` names a usable checkpoint destination
    pub fn validate_checkpoint_id(id: &str) -> bool {
        location::validate_checkpoint_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryClient;
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn setup() -> (Arc<InMemoryClient>, ObjectStoreFileSystem) {
        let client = Arc::new(InMemoryClient::new());
        let fs = ObjectStoreFileSystem::new(
            Arc::clone(&client) as Arc<dyn ObjectClient>,
            fast_retry(),
        );
        (client, fs)
    }

    #[test]
    fn test_stream_mode_parsing() {
        assert_eq!(StreamMode::from_str("rb").unwrap(), StreamMode::Read);
        assert_eq!(StreamMode::from_str("wb").unwrap(), StreamMode::Write);
        let err = StreamMode::from_str("a+").unwrap_err();
        assert!(matches!(err, Error::InvalidStreamMode { .. }));
    }

    #[tokio::test]
    async fn test_stream_write_then_read_roundtrip() {
        let (client, fs) = setup();

        let mut stream = fs
            .create_stream("s3://b/ckpt/file", StreamMode::Write)
            .await
            .unwrap();
        stream.write_all(b"hello ").unwrap();
        stream.write_all(b"shards").unwrap();
        let info = stream.close().await.unwrap();
        assert_eq!(info.size, 12);
        assert!(client.object("b", "ckpt/file").is_some());

        let mut stream = fs
            .create_stream("s3://b/ckpt/file", StreamMode::Read)
            .await
            .unwrap();
        assert_eq!(stream.slice(6, 6).unwrap(), Bytes::from_static(b"shards"));
        assert_eq!(
            stream.read_to_end().unwrap(),
            Bytes::from_static(b"hello shards")
        );
    }

    #[tokio::test]
    async fn test_unclosed_write_stream_uploads_nothing() {
        let (client, fs) = setup();
        {
            let mut stream = fs
                .create_stream("s3://b/partial", StreamMode::Write)
                .await
                .unwrap();
            stream.write_all(b"doomed").unwrap();
        }
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_slice_out_of_range() {
        let (_client, fs) = setup();
        let mut stream = fs
            .create_stream("s3://b/small", StreamMode::Write)
            .await
            .unwrap();
        stream.write_all(b"abc").unwrap();
        stream.close().await.unwrap();

        let stream = fs
            .create_stream("s3://b/small", StreamMode::Read)
            .await
            .unwrap();
        assert!(stream.slice(2, 5).is_err());
    }

    #[tokio::test]
    async fn test_rename_moves_object() {
        let (client, fs) = setup();
        client.insert("b", "old", Bytes::from_static(b"data"));

        fs.rename("s3://b/old", "s3://b/new").await.unwrap();

        assert!(client.object("b", "old").is_none());
        assert_eq!(client.object("b", "new").unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn test_rename_rejects_cross_bucket() {
        let (client, fs) = setup();
        client.insert("b1", "old", Bytes::from_static(b"data"));

        let err = fs.rename("s3://b1/old", "s3://b2/new").await.unwrap_err();
        assert!(matches!(err, Error::CrossBucketRename { .. }));
        // nothing moved
        assert!(client.object("b1", "old").is_some());
        assert!(client.object("b2", "new").is_none());
    }

    #[tokio::test]
    async fn test_rename_retries_delete_then_succeeds() {
        let (client, fs) = setup();
        client.insert("b", "old", Bytes::from_static(b"data"));
        client.fail_deletes(2);

        fs.rename("s3://b/old", "s3://b/new").await.unwrap();

        assert_eq!(client.delete_calls(), 3);
        assert!(client.object("b", "old").is_none());
        assert!(client.object("b", "new").is_some());
    }

    #[tokio::test]
    async fn test_rename_delete_exhaustion_surfaces() {
        let (client, fs) = setup();
        client.insert("b", "old", Bytes::from_static(b"data"));
        client.fail_deletes(3);

        let err = fs.rename("s3://b/old", "s3://b/new").await.unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert_eq!(client.delete_calls(), 3);
        // copy landed before the delete gave up; both keys remain
        assert!(client.object("b", "old").is_some());
        assert!(client.object("b", "new").is_some());
    }

    #[tokio::test]
    async fn test_exists_distinguishes_absence_from_failure() {
        let (client, fs) = setup();

        assert!(!fs.exists("s3://b/missing").await.unwrap());

        client.insert("b", "present", Bytes::from_static(b"x"));
        assert!(fs.exists("s3://b/present").await.unwrap());

        client.inject_head_fault(Error::AccessDenied {
            path: "s3://b/present".to_string(),
        });
        let err = fs.exists("s3://b/present").await.unwrap_err();
        assert!(matches!(err, Error::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_best_effort() {
        let (client, fs) = setup();
        // absent object: no panic, no error
        fs.remove("s3://b/missing").await;

        client.insert("b", "present", Bytes::from_static(b"x"));
        fs.remove("s3://b/present").await;
        assert!(client.object("b", "present").is_none());
    }

    #[tokio::test]
    async fn test_mkdir_is_noop() {
        let (_client, fs) = setup();
        fs.mkdir("s3://b/some/dir").await.unwrap();
    }

    #[test]
    fn test_init_path_records_root() {
        let (_client, fs) = setup();
        let returned = fs.init_path("s3://b/root");
        assert_eq!(returned, "s3://b/root");
        assert_eq!(fs.root_path(), "s3://b/root");
        // idempotent
        assert_eq!(fs.init_path("s3://b/root"), fs.root_path());
    }
}
