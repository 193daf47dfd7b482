//! Replica-assigned checkpoint reader
//!
//! Discovers the write-time replication factor from committed metadata,
//! assigns this process a replica from its rank, and redirects shard reads
//! to that replica's subpath. With a single copy the replica layer is
//! bypassed and reads go straight to the checkpoint root.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, instrument};

use ballast_core::{
    CheckpointMetadata, DistributedContext, Error, Rank, ReplicaIndex, Result, ShardStorageInfo,
    SingleProcess,
};
use ballast_store::{ObjectStoreFileSystem, StreamMode};

use crate::plan::{LoadPlan, ShardReadResult};
use crate::writer::METADATA_FILE;

/// Orchestrates reading one checkpoint
pub struct ReplicaAssignedReader {
    fs: Arc<ObjectStoreFileSystem>,
    path: String,
    context: Arc<dyn DistributedContext>,
    num_copies: u32,
    assigned_replica: Option<ReplicaIndex>,
    rank: Rank,
    storage_index: BTreeMap<u64, ShardStorageInfo>,
}

impl ReplicaAssignedReader {
    /// Create a reader rooted at `path`
    ///
    /// Without an explicit context the reader behaves as an uncoordinated
    /// rank-0 process.
    pub fn new(fs: Arc<ObjectStoreFileSystem>, path: &str) -> Self {
        let path = fs.init_path(path);
        Self {
            fs,
            path,
            context: Arc::new(SingleProcess),
            num_copies: 1,
            assigned_replica: None,
            rank: 0,
            storage_index: BTreeMap::new(),
        }
    }

    /// Attach the ambient distributed context
    pub fn with_context(mut self, context: Arc<dyn DistributedContext>) -> Self {
        self.context = context;
        self
    }

    /// Checkpoint root this reader targets
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replication factor discovered from metadata
    pub fn num_copies(&self) -> u32 {
        self.num_copies
    }

    /// Replica this process resolved to, if any
    pub fn assigned_replica(&self) -> Option<ReplicaIndex> {
        self.assigned_replica
    }

    /// Rank this process discovered at setup
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Whether `id` names a usable checkpoint source
    pub fn validate_checkpoint_id(id: &str) -> bool {
        ObjectStoreFileSystem::validate_checkpoint_id(id)
    }

    /// Read and decode the canonical metadata object
    ///
    /// Recovers `num_copies` from the feature-flag channel. A commit that
    /// was interrupted before promotion leaves only the temp key, which is
    /// never consulted; the canonical read surfaces not-found.
    ///
    /// # Errors
    /// `Error::CorruptMetadata` when the object does not decode or the
    /// replication flag is absent or malformed.
    #[instrument(skip(self))]
    pub async fn read_metadata(&mut self) -> Result<CheckpointMetadata> {
        let metadata_path = self.fs.concat_path(&self.path, METADATA_FILE);
        let mut stream = self
            .fs
            .create_stream(&metadata_path, StreamMode::Read)
            .await?;
        let body = stream.read_to_end()?;

        let metadata: CheckpointMetadata =
            serde_json::from_slice(&body).map_err(|e| Error::CorruptMetadata {
                reason: format!("undecodable metadata at {}: {}", metadata_path, e),
            })?;

        self.num_copies = metadata.num_copies()?;
        self.storage_index = metadata
            .storage_index
            .iter()
            .map(|(index, info)| (*index, info.clone()))
            .collect();

        debug!(num_copies = self.num_copies, shards = self.storage_index.len(), "Read checkpoint metadata");
        Ok(metadata)
    }

    /// Resolve this process's replica assignment
    ///
    /// The rank comes from the ambient context; a missing context was
    /// already resolved to rank 0 at construction, so this never fails.
    /// Round-robin assignment keeps ranks beyond the replica count inside
    /// the replica set instead of walking off it; aliased ranks share a
    /// replica read-only.
    pub fn set_up(&mut self, _metadata: &CheckpointMetadata, _is_coordinator: bool) {
        self.rank = self.context.rank();
        if self.num_copies > 1 {
            let replica = self.rank % self.num_copies;
            self.assigned_replica = Some(replica);
            debug!(rank = self.rank, replica, "Assigned replica");
        }
    }

    /// Read every shard named by `plan`
    ///
    /// The effective base path is computed per call: the assigned
    /// replica's subpath when one exists, the checkpoint root otherwise.
    /// Reader state is never mutated, so an instance can be reused across
    /// reads.
    #[instrument(skip(self, plan), fields(rank = self.rank, shards = plan.items.len()))]
    pub async fn read_data(&self, plan: &LoadPlan) -> Result<Vec<ShardReadResult>> {
        let effective_path = match self.assigned_replica {
            Some(replica) if self.num_copies > 1 => self
                .fs
                .concat_path(&self.path, &format!("copy-{}", replica)),
            _ => self.path.clone(),
        };

        self.read_from(&effective_path, plan).await.map_err(|e| {
            error!(
                rank = self.rank,
                replica = ?self.assigned_replica,
                path = %effective_path,
                error = %e,
                "Shard read failed"
            );
            e
        })
    }

    /// Fetch each referenced file once and slice the requested ranges
    async fn read_from(&self, base: &str, plan: &LoadPlan) -> Result<Vec<ShardReadResult>> {
        let mut by_file: BTreeMap<&str, Vec<(u64, &ShardStorageInfo)>> = BTreeMap::new();
        for item in &plan.items {
            let info = self
                .storage_index
                .get(&item.index)
                .ok_or_else(|| Error::CorruptMetadata {
                    reason: format!("shard {} missing from storage index", item.index),
                })?;
            by_file
                .entry(info.relative_path.as_str())
                .or_default()
                .push((item.index, info));
        }

        let mut results = Vec::with_capacity(plan.items.len());
        for (file, entries) in by_file {
            let file_path = self.fs.concat_path(base, file);
            let stream = self.fs.create_stream(&file_path, StreamMode::Read).await?;
            for (index, info) in entries {
                let bytes = stream.slice(info.offset, info.length)?;
                results.push(ShardReadResult { index, bytes });
            }
        }
        Ok(results)
    }
}
