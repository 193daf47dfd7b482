//! Write and read plans supplied by the external shard planner
//!
//! The planner decides which bytes belong to which shard; this layer
//! treats payloads as opaque and only consumes the size and kind hints
//! when packing shards into files.

use bytes::Bytes;

use ballast_core::ShardIndex;

/// Payload category, used only as a packing hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKind {
    /// Fixed-size tensor data; balanced across files by byte size
    Tensor,
    /// Variable or unknown-size blob data; spread round-robin
    Blob,
}

/// One shard to be written, with its opaque payload
#[derive(Debug, Clone)]
pub struct WriteItem {
    /// Shard index within the logical state dict
    pub index: ShardIndex,

    /// Packing hint
    pub kind: ShardKind,

    /// Payload bytes, honored verbatim
    pub bytes: Bytes,
}

impl WriteItem {
    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Per-process plan for one checkpoint write
#[derive(Debug, Clone, Default)]
pub struct SavePlan {
    /// Shards this process owns
    pub items: Vec<WriteItem>,

    /// Replica-storage tag attached during global planning
    pub storage_prefix: Option<String>,
}

/// One shard to be read back
#[derive(Debug, Clone)]
pub struct ReadItem {
    /// Shard index within the logical state dict
    pub index: ShardIndex,
}

/// Per-process plan for one checkpoint read
#[derive(Debug, Clone, Default)]
pub struct LoadPlan {
    /// Shards this process needs
    pub items: Vec<ReadItem>,
}

/// One shard's recovered payload
#[derive(Debug, Clone)]
pub struct ShardReadResult {
    /// Shard index within the logical state dict
    pub index: ShardIndex,

    /// Payload bytes as written
    pub bytes: Bytes,
}

/// Pack items into at most `bins` file buckets
///
/// Blob items spread round-robin; tensor items go largest-first into the
/// currently smallest bucket. One bucket holds everything when `bins <= 1`.
/// Empty buckets are not emitted.
pub fn split_by_size_and_type(bins: usize, items: &[WriteItem]) -> Vec<Vec<WriteItem>> {
    if bins <= 1 {
        return vec![items.to_vec()];
    }

    let mut buckets: Vec<Vec<WriteItem>> = vec![Vec::new(); bins];
    let mut bucket_sizes = vec![0u64; bins];

    let (blobs, mut tensors): (Vec<WriteItem>, Vec<WriteItem>) = items
        .iter()
        .cloned()
        .partition(|item| item.kind == ShardKind::Blob);

    for (i, item) in blobs.into_iter().enumerate() {
        buckets[i % bins].push(item);
    }

    tensors.sort_by(|a, b| b.size().cmp(&a.size()));
    for item in tensors {
        let smallest = bucket_sizes
            .iter()
            .enumerate()
            .min_by_key(|(_, size)| **size)
            .map(|(i, _)| i)
            .unwrap_or(0);
        bucket_sizes[smallest] += item.size() as u64;
        buckets[smallest].push(item);
    }

    buckets.retain(|bucket| !bucket.is_empty());
    buckets
}
