//! Pluggable replica prefix layout
//!
//! The writer is polymorphic over key layout through an injected strategy,
//! so deployments can spread replicas across storage partitions without
//! touching write logic.

/// Maps a plan index to the file-name prefix its generated files carry
pub trait PrefixStrategy: Send + Sync {
    /// Prefix for the plan at `plan_index`
    fn prefix(&self, plan_index: usize) -> String;
}

impl<F> PrefixStrategy for F
where
    F: Fn(usize) -> String + Send + Sync,
{
    fn prefix(&self, plan_index: usize) -> String {
        self(plan_index)
    }
}

/// Index-based prefix producing the flat `__<idx>_` file-name stem
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPrefixStrategy;

impl PrefixStrategy for DefaultPrefixStrategy {
    fn prefix(&self, plan_index: usize) -> String {
        format!("__{}_", plan_index)
    }
}

/// Cycles plans through user-supplied partition prefixes
///
/// Partition `p` receives every plan whose index is congruent to `p`
/// modulo the partition count; file names keep the flat stem under it.
#[derive(Debug, Clone)]
pub struct RoundRobinPrefixStrategy {
    partitions: Vec<String>,
}

impl RoundRobinPrefixStrategy {
    /// Create a strategy over the given partition prefixes
    ///
    /// An empty partition list degenerates to [`DefaultPrefixStrategy`]
    /// behavior.
    pub fn new(partitions: Vec<String>) -> Self {
        Self { partitions }
    }
}

impl PrefixStrategy for RoundRobinPrefixStrategy {
    fn prefix(&self, plan_index: usize) -> String {
        if self.partitions.is_empty() {
            return DefaultPrefixStrategy.prefix(plan_index);
        }
        let partition = &self.partitions[plan_index % self.partitions.len()];
        format!("{}/__{}_", partition.trim_end_matches('/'), plan_index)
    }
}
