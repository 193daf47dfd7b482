//! Configuration types for the storage layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Object-store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store region (default: "us-east-1")
    pub region: Option<String>,

    /// Optional custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,

    /// Force path-style addressing (required for MinIO)
    pub force_path_style: bool,

    /// Retry policy for calls classified as retryable
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            region: Some("us-east-1".to_string()),
            endpoint_url: None,
            force_path_style: false,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded retry policy with random exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Backoff base; attempt `n` waits a random duration up to
    /// `base_delay * 2^n`, capped at `max_delay`
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound on any single wait
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Checkpoint writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Number of full replicas to write; must be at least 1
    pub num_copies: u32,

    /// Concurrent upload workers per process; also the file-coalescing bin
    /// count when `single_file_per_rank` is set
    pub thread_count: usize,

    /// Coalesce this writer's shards into a bounded number of files instead
    /// of one file per shard
    pub single_file_per_rank: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            num_copies: 1,
            thread_count: 4,
            single_file_per_rank: true,
        }
    }
}

impl WriterConfig {
    /// Validate invariants that the writer relies on
    pub fn validate(&self) -> crate::Result<()> {
        if self.num_copies < 1 {
            return Err(crate::Error::InvalidConfig {
                message: "num_copies must be at least 1".to_string(),
            });
        }
        if self.thread_count < 1 {
            return Err(crate::Error::InvalidConfig {
                message: "thread_count must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
