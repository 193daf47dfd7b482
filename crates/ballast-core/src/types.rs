//! Core type definitions for the replicated checkpoint store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{Error, Result};

/// Index identifying one shard inside the logical state dict
pub type ShardIndex = u64;

/// Zero-based index of one replica under the checkpoint root
pub type ReplicaIndex = u32;

/// Zero-based index of one process in the cooperating group
pub type Rank = u32;

/// Feature-flag key carrying the write-time replication factor
pub const NUM_COPIES_FLAG: &str = "num_copies";

/// Location of one shard inside a committed checkpoint
///
/// The relative path never contains a `copy-<i>/` component; readers prepend
/// their assigned replica's subpath, so the same entry resolves under every
/// replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStorageInfo {
    /// File name relative to the (possibly replica-scoped) checkpoint root
    pub relative_path: String,

    /// Byte offset of the shard within the file
    pub offset: u64,

    /// Shard length in bytes
    pub length: u64,

    /// Store-assigned entity tag, if the store reported one
    pub etag: Option<String>,
}

/// Outcome of one shard upload
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Shard index the upload covered
    pub index: ShardIndex,

    /// Bytes written
    pub size_bytes: u64,

    /// Where the shard landed
    pub storage: ShardStorageInfo,
}

/// Committed description of a checkpoint's shard locations and replication
///
/// Built in memory during `finish()`, serialized once, and immutable after
/// the commit rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Identifier minted for this save
    pub save_id: Uuid,

    /// Timestamp when the metadata was built
    pub created_at: DateTime<Utc>,

    /// Shard index to storage location map, merged across all writers
    pub storage_index: HashMap<ShardIndex, ShardStorageInfo>,

    /// Free-form flag list; carries the `num_copies=<N>` entry
    pub feature_flags: Vec<String>,
}

impl CheckpointMetadata {
    /// Create empty metadata for a new save
    pub fn new() -> Self {
        Self {
            save_id: Uuid::new_v4(),
            created_at: Utc::now(),
            storage_index: HashMap::new(),
            feature_flags: Vec::new(),
        }
    }

    /// Record the replication factor as a feature flag
    pub fn set_num_copies(&mut self, num_copies: u32) {
        self.feature_flags
            .push(format!("{}={}", NUM_COPIES_FLAG, num_copies));
    }

    /// Recover the write-time replication factor from the flag list
    ///
    /// The flag list is the wire channel for the replica count; scan it by
    /// key rather than trusting a position, and fail closed when the entry
    /// is absent or unparseable.
    ///
    /// # Errors
    /// `Error::CorruptMetadata` if no well-formed `num_copies=<N>` entry
    /// exists.
    pub fn num_copies(&self) -> Result<u32> {
        let prefix = format!("{}=", NUM_COPIES_FLAG);
        let flag = self
            .feature_flags
            .iter()
            .find(|f| f.starts_with(&prefix))
            .ok_or_else(|| Error::CorruptMetadata {
                reason: format!("missing {} feature flag", NUM_COPIES_FLAG),
            })?;

        flag[prefix.len()..]
            .parse::<u32>()
            .map_err(|_| Error::CorruptMetadata {
                reason: format!("unparseable replication flag: {:?}", flag),
            })
    }
}

impl Default for CheckpointMetadata {
    fn default() -> Self {
        Self::new()
    }
}
