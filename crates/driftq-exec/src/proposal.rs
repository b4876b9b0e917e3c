//! Rebalance proposals — the declarative input of the executor.

use driftq_cluster::types::{BrokerId, ReassignmentSpec, TopicPartition};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Desired placement and leadership for one partition.
///
/// Replica lists are ordered; the first entry of `current_replicas` is the
/// current leader, the first entry of `target_replicas` the target preferred
/// leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceProposal {
    pub partition: TopicPartition,
    pub current_replicas: Vec<BrokerId>,
    pub target_replicas: Vec<BrokerId>,
    /// Target log directory per broker, for on-broker moves.
    pub target_dirs: HashMap<BrokerId, String>,
    /// Estimated amount of data to move, in megabytes.
    pub data_size_mb: u64,
}

impl RebalanceProposal {
    pub fn new(
        partition: TopicPartition,
        current_replicas: Vec<BrokerId>,
        target_replicas: Vec<BrokerId>,
    ) -> Self {
        Self {
            partition,
            current_replicas,
            target_replicas,
            target_dirs: HashMap::new(),
            data_size_mb: 0,
        }
    }

    pub fn with_target_dirs(mut self, target_dirs: HashMap<BrokerId, String>) -> Self {
        self.target_dirs = target_dirs;
        self
    }

    pub fn with_data_size_mb(mut self, data_size_mb: u64) -> Self {
        self.data_size_mb = data_size_mb;
        self
    }

    pub fn current_leader(&self) -> Option<BrokerId> {
        self.current_replicas.first().copied()
    }

    pub fn target_leader(&self) -> Option<BrokerId> {
        self.target_replicas.first().copied()
    }

    /// Brokers gaining a replica of this partition.
    pub fn added_replicas(&self) -> HashSet<BrokerId> {
        let current: HashSet<BrokerId> = self.current_replicas.iter().copied().collect();
        self.target_replicas
            .iter()
            .copied()
            .filter(|b| !current.contains(b))
            .collect()
    }

    /// Brokers losing their replica of this partition.
    pub fn removed_replicas(&self) -> HashSet<BrokerId> {
        let target: HashSet<BrokerId> = self.target_replicas.iter().copied().collect();
        self.current_replicas
            .iter()
            .copied()
            .filter(|b| !target.contains(b))
            .collect()
    }

    /// True when a replica moves between brokers.
    pub fn has_replica_move(&self) -> bool {
        !self.added_replicas().is_empty() || !self.removed_replicas().is_empty()
    }

    /// True when only leadership changes: identical replica sets, different
    /// preferred leader.
    pub fn has_leader_move(&self) -> bool {
        !self.has_replica_move() && self.current_leader() != self.target_leader()
    }

    /// The admin submission that drives this partition to its target state.
    pub fn reassignment_spec(&self) -> ReassignmentSpec {
        ReassignmentSpec {
            partition: self.partition.clone(),
            target_replicas: self.target_replicas.clone(),
            target_dirs: self.target_dirs.clone(),
        }
    }

    /// The cancelling submission: revert the target back to the current
    /// placement.
    pub fn rollback_spec(&self) -> ReassignmentSpec {
        ReassignmentSpec {
            partition: self.partition.clone(),
            target_replicas: self.current_replicas.clone(),
            target_dirs: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(current: Vec<u32>, target: Vec<u32>) -> RebalanceProposal {
        RebalanceProposal::new(
            TopicPartition::new("orders", 0),
            current.into_iter().map(BrokerId).collect(),
            target.into_iter().map(BrokerId).collect(),
        )
    }

    #[test]
    fn test_added_and_removed_replicas() {
        let p = proposal(vec![1, 2, 3], vec![1, 2, 4]);
        assert_eq!(p.added_replicas(), [BrokerId(4)].into_iter().collect());
        assert_eq!(p.removed_replicas(), [BrokerId(3)].into_iter().collect());
        assert!(p.has_replica_move());
        assert!(!p.has_leader_move());
    }

    #[test]
    fn test_leader_only_move() {
        let p = proposal(vec![2, 1, 3], vec![1, 2, 3]);
        assert!(!p.has_replica_move());
        assert!(p.has_leader_move());
        assert_eq!(p.current_leader(), Some(BrokerId(2)));
        assert_eq!(p.target_leader(), Some(BrokerId(1)));
    }

    #[test]
    fn test_no_change_at_all() {
        let p = proposal(vec![1, 2, 3], vec![1, 2, 3]);
        assert!(!p.has_replica_move());
        assert!(!p.has_leader_move());
    }

    #[test]
    fn test_reorder_without_leader_change_is_no_move() {
        // Same set, same head: shuffling followers is not a movement
        let p = proposal(vec![1, 3, 2], vec![1, 2, 3]);
        assert!(!p.has_replica_move());
        assert!(!p.has_leader_move());
    }

    #[test]
    fn test_rollback_spec_reverts_to_current() {
        let p = proposal(vec![1, 2, 3], vec![1, 2, 4]);
        let rollback = p.rollback_spec();
        assert_eq!(
            rollback.target_replicas,
            vec![BrokerId(1), BrokerId(2), BrokerId(3)]
        );
        assert!(rollback.target_dirs.is_empty());
    }

    #[test]
    fn test_reassignment_spec_carries_dirs() {
        let p = proposal(vec![1, 2], vec![1, 2])
            .with_target_dirs([(BrokerId(1), "/data/d2".to_string())].into_iter().collect());
        let spec = p.reassignment_spec();
        assert_eq!(spec.target_dirs.get(&BrokerId(1)).unwrap(), "/data/d2");
    }
}
