//! Object-store client boundary
//!
//! Defines the minimal surface this layer needs from an object store.
//! Implementations own connection pooling, request signing, and transport
//! retries.

use async_trait::async_trait;
use bytes::Bytes;

use ballast_core::Result;

/// Metadata returned by uploads and existence probes
#[derive(Debug, Clone, Default)]
pub struct ObjectInfo {
    /// Object size in bytes
    pub size: u64,

    /// Store-assigned entity tag, if any
    pub etag: Option<String>,
}

/// Async interface to a flat-keyspace object store
///
/// A copy is always server side; this layer never re-uploads bytes to move
/// an object. The `src_key` handed to [`copy_object`](Self::copy_object)
/// arrives percent-encoded per segment, matching object-store copy-source
/// conventions; implementations decode or forward it as their transport
/// requires.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Upload a complete object
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<ObjectInfo>;

    /// Download a complete object
    ///
    /// # Errors
    /// `Error::ObjectNotFound` when no object exists under the key.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Metadata-only existence probe
    ///
    /// # Errors
    /// `Error::ObjectNotFound` when no object exists under the key; any
    /// other failure surfaces as its own error kind.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Server-side copy between keys, never crossing the transport with data
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()>;
}
