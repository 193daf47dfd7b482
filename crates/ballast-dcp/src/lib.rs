//! Ballast DCP - Replicated checkpoint writing and replica-assigned reading
//!
//! Orchestrates one checkpoint per root path: the writer fans every shard
//! out to N independent replicas and commits metadata atomically; the
//! reader discovers the replica count from metadata and redirects its
//! reads to the replica its rank owns.

pub mod plan;
pub mod prefix;
pub mod reader;
pub mod writer;

pub use plan::{
    split_by_size_and_type, LoadPlan, ReadItem, SavePlan, ShardKind, ShardReadResult, WriteItem,
};
pub use prefix::{DefaultPrefixStrategy, PrefixStrategy, RoundRobinPrefixStrategy};
pub use reader::ReplicaAssignedReader;
pub use writer::{ReplicatedCheckpointWriter, METADATA_FILE, SHARD_SUFFIX};
