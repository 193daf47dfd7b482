//! AWS S3 client implementation
//!
//! Provides an [`ObjectClient`] backed by the AWS SDK with:
//! - Multipart uploads for large objects
//! - Custom endpoint support (for MinIO, LocalStack, etc.)
//! - Typed classification of not-found and permission errors

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::Builder as S3ConfigBuilder,
    error::ProvideErrorMetadata,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use bytes::Bytes;
use tracing::{debug, instrument};

use ballast_core::{Error, Result, StoreConfig};

use crate::client::{ObjectClient, ObjectInfo};

/// Threshold for switching to multipart upload (5 MB)
const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Part size for multipart uploads (5 MB minimum required by S3)
const MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// S3-compatible [`ObjectClient`]
///
/// Supports Amazon S3 and S3-compatible services like MinIO. Unlike a
/// bucket-pinned backend, every call carries its own bucket; checkpoint
/// locations resolve their bucket from the path.
#[derive(Debug, Clone)]
pub struct S3ObjectClient {
    client: Client,
}

impl S3ObjectClient {
    /// Create a client from the given store configuration
    ///
    /// Credentials come from the environment or instance profile.
    pub async fn new(config: StoreConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(
                config.region.unwrap_or_else(|| "us-east-1".to_string()),
            ))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Create a client for MinIO (convenience constructor)
    pub async fn minio(endpoint: &str) -> Self {
        Self::new(StoreConfig {
            endpoint_url: Some(endpoint.to_string()),
            force_path_style: true,
            ..Default::default()
        })
        .await
    }

    fn uri(bucket: &str, key: &str) -> String {
        format!("s3://{}/{}", bucket, key)
    }

    /// Map a service error onto the core taxonomy
    fn classify<E>(operation: &str, bucket: &str, key: &str, err: E) -> Error
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        match err.meta().code() {
            Some("NoSuchKey") | Some("NotFound") => Error::ObjectNotFound {
                path: Self::uri(bucket, key),
            },
            Some("AccessDenied") => Error::AccessDenied {
                path: Self::uri(bucket, key),
            },
            _ => Error::Storage {
                message: format!("S3 {} failed for {}: {}", operation, Self::uri(bucket, key), err),
            },
        }
    }

    /// Perform multipart upload for large objects
    async fn multipart_upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectInfo> {
        let size = data.len() as u64;

        let create_result = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                Self::classify("create_multipart_upload", bucket, key, e.into_service_error())
            })?;

        let upload_id = create_result.upload_id().ok_or_else(|| Error::Storage {
            message: format!("No upload_id returned for {}", Self::uri(bucket, key)),
        })?;

        debug!(key, upload_id, size, "Started multipart upload");

        let mut completed_parts = Vec::new();
        let mut offset = 0;
        let mut part_number = 1;

        while offset < data.len() {
            let end = std::cmp::min(offset + MULTIPART_PART_SIZE, data.len());
            let part_data = data.slice(offset..end);

            let upload_part_result = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part_data))
                .send()
                .await
                .map_err(|e| {
                    self.abort_multipart_upload(bucket, key, upload_id);
                    Self::classify("upload_part", bucket, key, e.into_service_error())
                })?;

            let etag = upload_part_result.e_tag().map(String::from);
            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(etag)
                    .build(),
            );

            debug!(part_number, offset, end, "Uploaded part");
            offset = end;
            part_number += 1;
        }

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let complete_result = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| {
                Self::classify("complete_multipart_upload", bucket, key, e.into_service_error())
            })?;

        debug!(key, size, "Completed multipart upload");
        Ok(ObjectInfo {
            size,
            etag: complete_result.e_tag().map(String::from),
        })
    }

    /// Abort a multipart upload (best effort, for cleanup)
    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) {
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let upload_id = upload_id.to_string();

        tokio::spawn(async move {
            let _ = client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await;
        });
    }
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<ObjectInfo> {
        let size = body.len() as u64;

        if body.len() > MULTIPART_THRESHOLD {
            return self.multipart_upload(bucket, key, body).await;
        }

        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Self::classify("put_object", bucket, key, e.into_service_error()))?;

        Ok(ObjectInfo {
            size,
            etag: result.e_tag().map(String::from),
        })
    }

    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let result = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    Error::ObjectNotFound {
                        path: Self::uri(bucket, key),
                    }
                } else {
                    Self::classify("get_object", bucket, key, service)
                }
            })?;

        let bytes = result.body.collect().await.map_err(|e| Error::Storage {
            message: format!(
                "Failed to read response body for {}: {}",
                Self::uri(bucket, key),
                e
            ),
        })?;

        Ok(bytes.into_bytes())
    }

    #[instrument(skip(self))]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        let result = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Error::ObjectNotFound {
                        path: Self::uri(bucket, key),
                    }
                } else {
                    Self::classify("head_object", bucket, key, service)
                }
            })?;

        Ok(ObjectInfo {
            size: result.content_length().unwrap_or_default() as u64,
            etag: result.e_tag().map(String::from),
        })
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::classify("delete_object", bucket, key, e.into_service_error()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        // src_key is already percent-encoded, as CopySource requires
        self.client
            .copy_object()
            .copy_source(format!("{}/{}", src_bucket, src_key))
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| {
                Self::classify("copy_object", dst_bucket, dst_key, e.into_service_error())
            })?;

        Ok(())
    }
}
