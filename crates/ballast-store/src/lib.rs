//! Ballast Store - Filesystem emulation over a flat object store
//!
//! Object stores have no directories, no atomic rename, and a flat key
//! namespace. This crate makes one usable as a checkpoint filesystem:
//! - path/key arithmetic and URI validation ([`location`])
//! - the minimal client surface an object store must provide ([`ObjectClient`]),
//!   with an in-memory implementation and an AWS S3 implementation behind
//!   the `s3` feature
//! - the filesystem-shaped adapter ([`ObjectStoreFileSystem`]): streams,
//!   existence probes, rename via copy-then-delete, directory no-ops
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ballast_core::RetryConfig;
//! use ballast_store::{InMemoryClient, ObjectClient, ObjectStoreFileSystem, StreamMode};
//!
//! # async fn example() -> ballast_core::Result<()> {
//! let client: Arc<dyn ObjectClient> = Arc::new(InMemoryClient::new());
//! let fs = ObjectStoreFileSystem::new(client, RetryConfig::default());
//!
//! let mut stream = fs.create_stream("s3://bucket/ckpt/file", StreamMode::Write).await?;
//! stream.write_all(b"shard bytes")?;
//! stream.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod filesystem;
pub mod location;
mod memory;
mod retry;

#[cfg(feature = "s3")]
mod s3;

pub use client::{ObjectClient, ObjectInfo};
pub use filesystem::{ObjectStoreFileSystem, ObjectStream, StreamMode};
pub use location::{StorageLocation, SCHEME};
pub use memory::InMemoryClient;
pub use retry::{backoff_delay, with_retry};

#[cfg(feature = "s3")]
pub use s3::S3ObjectClient;
