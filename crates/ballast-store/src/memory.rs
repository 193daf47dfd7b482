//! In-memory object store
//!
//! Backs tests and local development. Supports fault injection so callers
//! can exercise retry and error-propagation paths without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;

use ballast_core::{Error, Result};

use crate::client::{ObjectClient, ObjectInfo};

/// In-memory [`ObjectClient`] over a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryClient {
    objects: DashMap<(String, String), Bytes>,
    head_faults: Mutex<VecDeque<Error>>,
    put_faults: Mutex<VecDeque<Error>>,
    delete_faults: Mutex<VecDeque<Error>>,
    delete_calls: AtomicU64,
}

impl InMemoryClient {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing the client surface
    pub fn insert(&self, bucket: &str, key: &str, body: Bytes) {
        self.objects
            .insert((bucket.to_string(), key.to_string()), body);
    }

    /// Fetch an object directly, bypassing the client surface
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// All keys currently stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Total number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Queue an error to be returned by the next `head_object` call
    pub fn inject_head_fault(&self, error: Error) {
        self.head_faults.lock().push_back(error);
    }

    /// Queue an error to be returned by the next `put_object` call
    pub fn inject_put_fault(&self, error: Error) {
        self.put_faults.lock().push_back(error);
    }

    /// Fail the next `count` delete calls with a transient storage error
    pub fn fail_deletes(&self, count: u32) {
        let mut faults = self.delete_faults.lock();
        for _ in 0..count {
            faults.push_back(Error::Storage {
                message: "injected delete failure".to_string(),
            });
        }
    }

    /// Number of `delete_object` invocations observed, failed ones included
    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn uri(bucket: &str, key: &str) -> String {
        format!("s3://{}/{}", bucket, key)
    }
}

#[async_trait]
impl ObjectClient for InMemoryClient {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<ObjectInfo> {
        if let Some(fault) = self.put_faults.lock().pop_front() {
            return Err(fault);
        }
        let size = body.len() as u64;
        self.insert(bucket, key, body);
        Ok(ObjectInfo { size, etag: None })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.object(bucket, key).ok_or_else(|| Error::ObjectNotFound {
            path: Self::uri(bucket, key),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        if let Some(fault) = self.head_faults.lock().pop_front() {
            return Err(fault);
        }
        match self.object(bucket, key) {
            Some(body) => Ok(ObjectInfo {
                size: body.len() as u64,
                etag: None,
            }),
            None => Err(Error::ObjectNotFound {
                path: Self::uri(bucket, key),
            }),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.delete_faults.lock().pop_front() {
            return Err(fault);
        }
        self.objects
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::ObjectNotFound {
                path: Self::uri(bucket, key),
            })
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        // the source key arrives percent-encoded per copy-source convention
        let decoded = percent_decode_str(src_key)
            .decode_utf8()
            .map_err(|e| Error::Storage {
                message: format!("undecodable copy source {:?}: {}", src_key, e),
            })?;

        let body = self
            .object(src_bucket, &decoded)
            .ok_or_else(|| Error::ObjectNotFound {
                path: Self::uri(src_bucket, &decoded),
            })?;

        self.insert(dst_bucket, dst_key, body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let client = InMemoryClient::new();
        let body = Bytes::from_static(b"payload");

        let info = client.put_object("b", "k", body.clone()).await.unwrap();
        assert_eq!(info.size, 7);
        assert_eq!(client.get_object("b", "k").await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let client = InMemoryClient::new();
        let err = client.get_object("b", "missing").await.unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_copy_decodes_escaped_source_key() {
        let client = InMemoryClient::new();
        client.insert("b", "dir with space/file", Bytes::from_static(b"x"));

        client
            .copy_object("b", "dir%20with%20space/file", "b", "dest")
            .await
            .unwrap();

        assert_eq!(client.object("b", "dest").unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_delete_fault_queue_drains() {
        let client = InMemoryClient::new();
        client.insert("b", "k", Bytes::from_static(b"x"));
        client.fail_deletes(1);

        assert!(client.delete_object("b", "k").await.is_err());
        client.delete_object("b", "k").await.unwrap();
        assert_eq!(client.delete_calls(), 2);
        assert!(client.is_empty());
    }
}
