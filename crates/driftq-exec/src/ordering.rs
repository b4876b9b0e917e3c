//! Deterministic emission ordering for proposals.

use crate::proposal::RebalanceProposal;
use driftq_cluster::types::ClusterSnapshot;

/// Controls the order in which tasks are handed out for submission.
///
/// The default prioritizes partitions that currently have a dead or offline
/// replica (they are under-replicated and should heal first), then larger
/// movements, with the partition identity as the final tie-break so the
/// order is deterministic for identical input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderingStrategy {
    pub prioritize_offline_replicas: bool,
    pub larger_moves_first: bool,
}

impl Default for OrderingStrategy {
    fn default() -> Self {
        Self {
            prioritize_offline_replicas: true,
            larger_moves_first: true,
        }
    }
}

impl OrderingStrategy {
    /// Sort proposals in emission order.
    pub fn sort(&self, proposals: &mut [RebalanceProposal], cluster: &ClusterSnapshot) {
        proposals.sort_by(|a, b| self.key(a, cluster).cmp(&self.key(b, cluster)));
    }

    fn key<'a>(
        &self,
        proposal: &'a RebalanceProposal,
        cluster: &ClusterSnapshot,
    ) -> (u8, i64, &'a str, u32) {
        let offline_rank = if self.prioritize_offline_replicas && has_offline_replica(proposal, cluster)
        {
            0
        } else {
            1
        };

        let size_rank = if self.larger_moves_first {
            -(proposal.data_size_mb as i64)
        } else {
            proposal.data_size_mb as i64
        };

        (
            offline_rank,
            size_rank,
            proposal.partition.topic.as_str(),
            proposal.partition.partition,
        )
    }
}

/// A partition needs healing when a current replica's broker is gone or the
/// partition has no leader.
fn has_offline_replica(proposal: &RebalanceProposal, cluster: &ClusterSnapshot) -> bool {
    let replica_down = proposal
        .current_replicas
        .iter()
        .any(|b| !cluster.is_broker_alive(*b));

    let leaderless = cluster
        .partition(&proposal.partition)
        .is_some_and(|info| info.leader.is_none());

    replica_down || leaderless
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftq_cluster::types::{BrokerId, PartitionInfo, TopicPartition};

    fn proposal(topic: &str, partition: u32, size: u64) -> RebalanceProposal {
        RebalanceProposal::new(
            TopicPartition::new(topic, partition),
            vec![BrokerId(1), BrokerId(2)],
            vec![BrokerId(1), BrokerId(3)],
        )
        .with_data_size_mb(size)
    }

    fn cluster_with_brokers(brokers: &[u32]) -> ClusterSnapshot {
        let mut cluster = ClusterSnapshot::new();
        for b in brokers {
            cluster.brokers.insert(BrokerId(*b));
        }
        cluster
    }

    #[test]
    fn test_offline_replicas_sort_first() {
        let mut cluster = cluster_with_brokers(&[1, 3]);
        // Broker 2 is down, so "alpha" has an offline replica
        cluster.partitions.insert(
            TopicPartition::new("alpha", 0),
            PartitionInfo {
                leader: Some(BrokerId(1)),
                replicas: vec![BrokerId(1), BrokerId(2)],
                in_sync_replicas: vec![BrokerId(1)],
            },
        );

        let mut proposals = vec![proposal("zulu", 0, 9_000), proposal("alpha", 0, 10)];
        // Give "zulu" only live replicas
        proposals[0].current_replicas = vec![BrokerId(1), BrokerId(3)];

        OrderingStrategy::default().sort(&mut proposals, &cluster);
        assert_eq!(proposals[0].partition.topic, "alpha");
    }

    #[test]
    fn test_larger_moves_first_then_partition_id() {
        let cluster = cluster_with_brokers(&[1, 2, 3]);
        let mut proposals = vec![
            proposal("t", 2, 100),
            proposal("t", 1, 100),
            proposal("t", 0, 500),
        ];

        OrderingStrategy::default().sort(&mut proposals, &cluster);
        assert_eq!(proposals[0].partition.partition, 0);
        assert_eq!(proposals[1].partition.partition, 1);
        assert_eq!(proposals[2].partition.partition, 2);
    }

    #[test]
    fn test_order_is_deterministic() {
        let cluster = cluster_with_brokers(&[1, 2, 3]);
        let make = || {
            vec![
                proposal("b", 0, 10),
                proposal("a", 1, 10),
                proposal("a", 0, 10),
            ]
        };

        let mut first = make();
        let mut second = make();
        let strategy = OrderingStrategy::default();
        strategy.sort(&mut first, &cluster);
        strategy.sort(&mut second, &cluster);
        assert_eq!(first, second);
        assert_eq!(first[0].partition, TopicPartition::new("a", 0));
    }
}
