//! End-to-end replication scenarios across simulated worker processes
//!
//! Three writer tasks stand in for three cooperating processes: each owns
//! a disjoint slice of the state dict, writes every replica of its slice,
//! and passes a rendezvous barrier before the coordinator commits
//! metadata. Readers then resolve their replicas from rank alone.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;

use ballast_core::{
    CheckpointMetadata, DistributedContext, ProcessGroup, RetryConfig, StaticContext, WriteResult,
    WriterConfig,
};
use ballast_dcp::{
    LoadPlan, ReadItem, ReplicaAssignedReader, ReplicatedCheckpointWriter, SavePlan, ShardKind,
    WriteItem,
};
use ballast_store::{InMemoryClient, ObjectClient, ObjectStoreFileSystem};

const ROOT: &str = "s3://training/step-500";
const BUCKET: &str = "training";
const WORLD: u32 = 3;
const SHARDS_PER_RANK: u64 = 2;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn make_fs(client: &Arc<InMemoryClient>) -> Arc<ObjectStoreFileSystem> {
    Arc::new(ObjectStoreFileSystem::new(
        Arc::clone(client) as Arc<dyn ObjectClient>,
        RetryConfig {
            base_delay: std::time::Duration::from_millis(1),
            ..Default::default()
        },
    ))
}

fn make_writer(client: &Arc<InMemoryClient>, num_copies: u32) -> ReplicatedCheckpointWriter {
    ReplicatedCheckpointWriter::new(
        make_fs(client),
        ROOT,
        WriterConfig {
            num_copies,
            thread_count: 2,
            single_file_per_rank: true,
        },
    )
    .expect("valid writer config")
}

fn shard_payload(index: u64) -> Bytes {
    Bytes::from(vec![(index as u8).wrapping_add(7); 64 + index as usize])
}

fn rank_plan(rank: u32) -> SavePlan {
    let first = rank as u64 * SHARDS_PER_RANK;
    SavePlan {
        items: (first..first + SHARDS_PER_RANK)
            .map(|index| WriteItem {
                index,
                kind: ShardKind::Tensor,
                bytes: shard_payload(index),
            })
            .collect(),
        storage_prefix: None,
    }
}

fn full_plan() -> LoadPlan {
    LoadPlan {
        items: (0..WORLD as u64 * SHARDS_PER_RANK)
            .map(|index| ReadItem { index })
            .collect(),
    }
}

/// Run the full multi-process write protocol against one shared store
async fn write_checkpoint(client: &Arc<InMemoryClient>, num_copies: u32) -> Result<()> {
    let coordinator = make_writer(client, num_copies);
    let plans = coordinator.prepare_global_plan((0..WORLD).map(rank_plan).collect());

    let group = ProcessGroup::new(WORLD);
    let mut tasks = tokio::task::JoinSet::new();
    for (rank, plan) in plans.into_iter().enumerate() {
        let client = Arc::clone(client);
        let member = group.member(rank as u32);
        tasks.spawn(async move {
            let writer = make_writer(&client, num_copies);
            let results = writer.write_data(&plan).await?;
            // every writer must land its uploads before anyone commits
            member.barrier().await;
            Ok::<Vec<WriteResult>, ballast_core::Error>(results)
        });
    }

    let mut all_results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        all_results.push(joined??);
    }

    coordinator
        .finish(CheckpointMetadata::new(), all_results)
        .await?;
    Ok(())
}

async fn read_as_rank(client: &Arc<InMemoryClient>, rank: u32, world_size: u32) -> Result<ReplicaAssignedReader> {
    let mut reader = ReplicaAssignedReader::new(make_fs(client), ROOT)
        .with_context(Arc::new(StaticContext { rank, world_size }));
    let metadata = reader.read_metadata().await?;
    reader.set_up(&metadata, rank == 0);
    Ok(reader)
}

#[tokio::test]
async fn replicated_write_then_rank_assigned_reads() -> Result<()> {
    init_tracing();

    // baseline: what unreplicated single-copy mode produces
    let baseline_client = Arc::new(InMemoryClient::new());
    write_checkpoint(&baseline_client, 1).await?;
    let baseline_reader = read_as_rank(&baseline_client, 0, 1).await?;
    let mut baseline = baseline_reader.read_data(&full_plan()).await?;
    baseline.sort_by_key(|r| r.index);

    // replicated run: three copies, three reading ranks
    let client = Arc::new(InMemoryClient::new());
    write_checkpoint(&client, 3).await?;

    for rank in 0..WORLD {
        let reader = read_as_rank(&client, rank, WORLD).await?;
        assert_eq!(reader.num_copies(), 3);
        assert_eq!(reader.assigned_replica(), Some(rank));

        let mut results = reader.read_data(&full_plan()).await?;
        results.sort_by_key(|r| r.index);

        assert_eq!(results.len(), baseline.len());
        for (replicated, expected) in results.iter().zip(&baseline) {
            assert_eq!(replicated.index, expected.index);
            assert_eq!(replicated.bytes, expected.bytes);
            assert_eq!(replicated.bytes, shard_payload(replicated.index));
        }
    }
    Ok(())
}

#[tokio::test]
async fn replicas_occupy_disjoint_key_prefixes() -> Result<()> {
    init_tracing();
    let client = Arc::new(InMemoryClient::new());
    write_checkpoint(&client, 3).await?;

    let keys = client.keys(BUCKET);
    let shard_keys: Vec<&String> = keys.iter().filter(|k| k.ends_with(".distcp")).collect();
    assert!(!shard_keys.is_empty());

    let mut per_replica = [0usize; 3];
    for key in &shard_keys {
        let replica = (0..3usize)
            .filter(|i| key.starts_with(&format!("step-500/copy-{}/", i)))
            .collect::<Vec<_>>();
        assert_eq!(replica.len(), 1, "key {} must live under exactly one replica", key);
        per_replica[replica[0]] += 1;
    }
    assert_eq!(per_replica[0], per_replica[1]);
    assert_eq!(per_replica[1], per_replica[2]);

    // commit left exactly one metadata object and no temp key
    assert!(keys.contains(&"step-500/.metadata".to_string()));
    assert!(!keys.iter().any(|k| k.ends_with(".metadata.tmp")));
    Ok(())
}

#[tokio::test]
async fn extra_rank_aliases_a_replica_instead_of_failing() -> Result<()> {
    init_tracing();
    let client = Arc::new(InMemoryClient::new());
    write_checkpoint(&client, 3).await?;

    // a fourth reader wraps onto copy-0; replicas are read-only, so the
    // aliasing is contention rather than corruption
    let reader = read_as_rank(&client, 3, 4).await?;
    assert_eq!(reader.assigned_replica(), Some(0));

    let results = reader.read_data(&full_plan()).await?;
    assert_eq!(results.len(), (WORLD * SHARDS_PER_RANK as u32) as usize);
    for result in results {
        assert_eq!(result.bytes, shard_payload(result.index));
    }
    Ok(())
}

#[tokio::test]
async fn single_copy_mode_bypasses_replica_layer() -> Result<()> {
    init_tracing();
    let client = Arc::new(InMemoryClient::new());
    write_checkpoint(&client, 1).await?;

    assert!(client.keys(BUCKET).iter().all(|k| !k.contains("copy-")));

    let reader = read_as_rank(&client, 0, 1).await?;
    assert_eq!(reader.num_copies(), 1);
    assert_eq!(reader.assigned_replica(), None);

    let results = reader.read_data(&full_plan()).await?;
    assert_eq!(results.len(), (WORLD * SHARDS_PER_RANK as u32) as usize);
    Ok(())
}

#[tokio::test]
async fn interrupted_commit_leaves_checkpoint_invisible() -> Result<()> {
    init_tracing();
    let client = Arc::new(InMemoryClient::new());

    // shards land, the temp metadata is written, but the crash happens
    // before promotion
    let writer = make_writer(&client, 2);
    let plans = writer.prepare_global_plan(vec![rank_plan(0)]);
    let results = writer.write_data(&plans[0]).await?;
    let mut metadata = CheckpointMetadata::new();
    for result in results {
        metadata.storage_index.insert(result.index, result.storage);
    }
    metadata.set_num_copies(2);
    client.insert(
        BUCKET,
        "step-500/.metadata.tmp",
        Bytes::from(serde_json::to_vec(&metadata)?),
    );

    let mut reader = ReplicaAssignedReader::new(make_fs(&client), ROOT);
    let err = reader.read_metadata().await.unwrap_err();
    assert!(matches!(err, ballast_core::Error::ObjectNotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn failed_upload_blocks_commit() -> Result<()> {
    init_tracing();
    let client = Arc::new(InMemoryClient::new());

    let writer = make_writer(&client, 2);
    let plans = writer.prepare_global_plan(vec![rank_plan(0)]);
    client.inject_put_fault(ballast_core::Error::Storage {
        message: "injected upload failure".to_string(),
    });

    assert!(writer.write_data(&plans[0]).await.is_err());
    // with no successful write_data there is nothing to commit; the
    // canonical metadata key must not exist
    assert!(client.object(BUCKET, "step-500/.metadata").is_none());
    Ok(())
}
