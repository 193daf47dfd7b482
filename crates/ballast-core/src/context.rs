//! Ambient distributed-process context
//!
//! The storage layer never owns process coordination; it only asks the
//! ambient context which rank it runs as. Absence of a context is never
//! fatal: constructors default to [`SingleProcess`], which reports rank 0.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Barrier;

use crate::types::Rank;

/// Interface to the ambient distributed execution context
#[async_trait]
pub trait DistributedContext: Send + Sync {
    /// Rank of this process within the cooperating group
    fn rank(&self) -> Rank;

    /// Total number of cooperating processes
    fn world_size(&self) -> u32;

    /// Block until every process in the group has arrived
    ///
    /// Writers must all pass this rendezvous before any reader consumes
    /// committed metadata; the caller owns invoking it at the right point.
    async fn barrier(&self);
}

/// Context for a single, uncoordinated process
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

#[async_trait]
impl DistributedContext for SingleProcess {
    fn rank(&self) -> Rank {
        0
    }

    fn world_size(&self) -> u32 {
        1
    }

    async fn barrier(&self) {}
}

/// Context with an externally assigned placement and no rendezvous
#[derive(Debug, Clone, Copy)]
pub struct StaticContext {
    /// Rank of this process
    pub rank: Rank,

    /// Total number of cooperating processes
    pub world_size: u32,
}

#[async_trait]
impl DistributedContext for StaticContext {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> u32 {
        self.world_size
    }

    async fn barrier(&self) {}
}

/// In-process group of simulated worker processes
///
/// Gives tests a real rendezvous without spawning processes: every member
/// shares one reusable barrier sized to the world.
pub struct ProcessGroup {
    world_size: u32,
    barrier: Barrier,
}

impl ProcessGroup {
    /// Create a group expecting `world_size` members at each rendezvous
    pub fn new(world_size: u32) -> Arc<Self> {
        Arc::new(Self {
            world_size,
            barrier: Barrier::new(world_size as usize),
        })
    }

    /// Obtain the member context for one rank
    pub fn member(self: &Arc<Self>, rank: Rank) -> GroupMember {
        GroupMember {
            group: Arc::clone(self),
            rank,
        }
    }
}

/// One member of a [`ProcessGroup`]
#[derive(Clone)]
pub struct GroupMember {
    group: Arc<ProcessGroup>,
    rank: Rank,
}

#[async_trait]
impl DistributedContext for GroupMember {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> u32 {
        self.group.world_size
    }

    async fn barrier(&self) {
        self.group.barrier.wait().await;
    }
}
