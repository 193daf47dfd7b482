//! Replicated checkpoint writer
//!
//! Writes N independent copies of every shard this process owns, then
//! commits checkpoint metadata with a write-temp, delete-stale, rename
//! sequence so visibility is effectively atomic on a store without
//! transactions.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use ballast_core::{
    CheckpointMetadata, Error, Result, ShardStorageInfo, WriteResult, WriterConfig,
};
use ballast_store::{ObjectStoreFileSystem, StreamMode};

use crate::plan::{split_by_size_and_type, SavePlan, WriteItem};
use crate::prefix::{DefaultPrefixStrategy, PrefixStrategy};

/// Suffix carried by every generated shard file
pub const SHARD_SUFFIX: &str = ".distcp";

/// Canonical metadata file name under the checkpoint root
pub const METADATA_FILE: &str = ".metadata";

/// One file upload: a destination and the shards packed into it
struct FileJob {
    full_path: String,
    file_name: String,
    items: Vec<WriteItem>,
}

/// Orchestrates writing one checkpoint
pub struct ReplicatedCheckpointWriter {
    fs: Arc<ObjectStoreFileSystem>,
    path: String,
    config: WriterConfig,
    prefix_strategy: Arc<dyn PrefixStrategy>,
}

impl std::fmt::Debug for ReplicatedCheckpointWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedCheckpointWriter")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReplicatedCheckpointWriter {
    /// Create a writer rooted at `path`
    ///
    /// # Errors
    /// `Error::InvalidConfig` when the configuration violates writer
    /// invariants (`num_copies >= 1`, `thread_count >= 1`).
    pub fn new(
        fs: Arc<ObjectStoreFileSystem>,
        path: &str,
        config: WriterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let path = fs.init_path(path);
        Ok(Self {
            fs,
            path,
            config,
            prefix_strategy: Arc::new(DefaultPrefixStrategy),
        })
    }

    /// Replace the layout strategy
    pub fn with_prefix_strategy(mut self, strategy: Arc<dyn PrefixStrategy>) -> Self {
        self.prefix_strategy = strategy;
        self
    }

    /// Checkpoint root this writer targets
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Canonical metadata path for this checkpoint
    pub fn metadata_path(&self) -> String {
        self.fs.concat_path(&self.path, METADATA_FILE)
    }

    /// Whether `id` names a usable checkpoint destination
    pub fn validate_checkpoint_id(id: &str) -> bool {
        ObjectStoreFileSystem::validate_checkpoint_id(id)
    }

    /// Attach a replica-storage tag to every cooperating process's plan
    ///
    /// Runs once, on the coordinating process, over the gathered plans;
    /// plan `idx` receives `prefix_strategy.prefix(idx)`.
    pub fn prepare_global_plan(&self, plans: Vec<SavePlan>) -> Vec<SavePlan> {
        plans
            .into_iter()
            .enumerate()
            .map(|(idx, mut plan)| {
                plan.storage_prefix = Some(self.prefix_strategy.prefix(idx));
                plan
            })
            .collect()
    }

    /// Upload every shard in `plan` once per replica
    ///
    /// Replica `i` receives its files under `copy-<i>/`; the replica layer
    /// is bypassed entirely when writing a single copy. File names restart
    /// from the same counter for every replica, so replica 0's file `k`
    /// and replica 1's file `k` are independent objects at disjoint keys.
    /// All uploads are drained before returning; any failure yields `Err`,
    /// and `finish` must not be called in that case.
    #[instrument(skip(self, plan), fields(shards = plan.items.len(), copies = self.config.num_copies))]
    pub async fn write_data(&self, plan: &SavePlan) -> Result<Vec<WriteResult>> {
        let prefix = plan
            .storage_prefix
            .as_deref()
            .ok_or_else(|| Error::Internal {
                message: "save plan has no storage prefix; prepare_global_plan must run first"
                    .to_string(),
            })?;

        let mut jobs = Vec::new();
        for replica in 0..self.config.num_copies {
            let batches: Vec<Vec<WriteItem>> = if self.config.single_file_per_rank {
                split_by_size_and_type(self.config.thread_count, &plan.items)
            } else {
                plan.items.iter().cloned().map(|item| vec![item]).collect()
            };

            // per-replica file generation restarts the counter
            for (file_count, batch) in batches.into_iter().enumerate() {
                let file_name = format!("{}{}{}", prefix, file_count, SHARD_SUFFIX);
                let relative = if self.config.num_copies > 1 {
                    format!("copy-{}/{}", replica, file_name)
                } else {
                    file_name.clone()
                };
                jobs.push(FileJob {
                    full_path: self.fs.concat_path(&self.path, &relative),
                    file_name,
                    items: batch,
                });
            }
        }

        debug!(files = jobs.len(), "Dispatching shard uploads");

        let semaphore = Arc::new(Semaphore::new(self.config.thread_count));
        let mut tasks = JoinSet::new();
        for job in jobs {
            let fs = Arc::clone(&self.fs);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| Error::Internal {
                    message: format!("upload semaphore closed: {}", e),
                })?;
                write_file(fs, job).await
            });
        }

        let mut results = Vec::new();
        let mut first_error: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(file_results)) => results.extend(file_results),
                Ok(Err(e)) => {
                    warn!(error = %e, "Shard upload failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(Error::Internal {
                        message: format!("upload task panicked: {}", e),
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Commit the checkpoint
    ///
    /// Merges every rank's write results into the storage index, records
    /// the replication factor, and promotes the serialized metadata from a
    /// temporary key to the canonical key. Until the final rename returns,
    /// no reader observes the checkpoint.
    #[instrument(skip(self, metadata, results))]
    pub async fn finish(
        &self,
        mut metadata: CheckpointMetadata,
        results: Vec<Vec<WriteResult>>,
    ) -> Result<()> {
        for rank_results in results {
            for write_result in rank_results {
                metadata
                    .storage_index
                    .insert(write_result.index, write_result.storage);
            }
        }
        metadata.set_num_copies(self.config.num_copies);

        let encoded = serde_json::to_vec(&metadata)?;
        let tmp_path = self
            .fs
            .concat_path(&self.path, &format!("{}.tmp", METADATA_FILE));
        let metadata_path = self.metadata_path();

        let mut stream = self.fs.create_stream(&tmp_path, StreamMode::Write).await?;
        stream.write_all(&encoded)?;
        stream.close().await?;

        // a stale committed metadata object from an earlier write must go
        // before promotion; existence-probe failures propagate rather than
        // being read as absence
        if self.fs.exists(&metadata_path).await? {
            self.fs.remove(&metadata_path).await;
        }

        self.fs.rename(&tmp_path, &metadata_path).await?;

        info!(
            path = %metadata_path,
            shards = metadata.storage_index.len(),
            copies = self.config.num_copies,
            "Committed checkpoint metadata"
        );
        Ok(())
    }
}

/// Upload one file, recording each packed shard's range within it
async fn write_file(fs: Arc<ObjectStoreFileSystem>, job: FileJob) -> Result<Vec<WriteResult>> {
    let mut stream = fs.create_stream(&job.full_path, StreamMode::Write).await?;

    let mut results = Vec::with_capacity(job.items.len());
    let mut offset = 0u64;
    for item in &job.items {
        stream.write_all(&item.bytes)?;
        let length = item.bytes.len() as u64;
        results.push(WriteResult {
            index: item.index,
            size_bytes: length,
            storage: ShardStorageInfo {
                relative_path: job.file_name.clone(),
                offset,
                length,
                etag: None,
            },
        });
        offset += length;
    }

    let info = stream.close().await?;
    for result in &mut results {
        result.storage.etag = info.etag.clone();
    }

    debug!(
        path = %job.full_path,
        shards = results.len(),
        bytes = offset,
        "Uploaded shard file"
    );
    Ok(results)
}
