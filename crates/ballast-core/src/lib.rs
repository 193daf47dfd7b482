//! Ballast Core - Foundation for the replicated checkpoint storage layer
//!
//! Provides the error taxonomy, checkpoint metadata types, configuration,
//! and the ambient distributed-context abstraction shared by the storage
//! and checkpoint crates.

pub mod config;
pub mod context;
pub mod error;
pub mod types;

pub use config::{RetryConfig, StoreConfig, WriterConfig};
pub use context::{DistributedContext, GroupMember, ProcessGroup, SingleProcess, StaticContext};
pub use error::{Error, Result};
pub use types::*;
