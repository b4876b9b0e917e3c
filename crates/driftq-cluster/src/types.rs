//! Core types describing the cluster as seen by the executor.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Unique identifier for a broker in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BrokerId(pub u32);

impl From<u32> for BrokerId {
    fn from(id: u32) -> Self {
        BrokerId(id)
    }
}

impl From<BrokerId> for u32 {
    fn from(broker_id: BrokerId) -> Self {
        broker_id.0
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker-{}", self.0)
    }
}

/// Identity of a single partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: u32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Replica placement and leadership of one partition, as reported by the
/// metadata client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub leader: Option<BrokerId>,
    pub replicas: Vec<BrokerId>,
    pub in_sync_replicas: Vec<BrokerId>,
}

impl PartitionInfo {
    /// Replicas that are assigned but not in sync.
    pub fn out_of_sync_replicas(&self) -> Vec<BrokerId> {
        self.replicas
            .iter()
            .filter(|r| !self.in_sync_replicas.contains(r))
            .copied()
            .collect()
    }
}

/// Point-in-time view of the cluster returned by `MetadataClient::refresh`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Brokers currently registered and live.
    pub brokers: HashSet<BrokerId>,
    /// Known partitions and their current placement.
    pub partitions: HashMap<TopicPartition, PartitionInfo>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_broker_alive(&self, broker: BrokerId) -> bool {
        self.brokers.contains(&broker)
    }

    pub fn partition(&self, tp: &TopicPartition) -> Option<&PartitionInfo> {
        self.partitions.get(tp)
    }

    /// True when the partition no longer exists, e.g. its topic was deleted.
    pub fn partition_vanished(&self, tp: &TopicPartition) -> bool {
        !self.partitions.contains_key(tp)
    }
}

/// Current and pending future log directory of one replica on one broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaDirInfo {
    pub current_dir: String,
    /// Set while an intra-broker move to another directory is pending.
    pub future_dir: Option<String>,
}

/// Log-directory state of a single broker from `describe_log_dirs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerDirReport {
    /// Online log directories on the broker.
    pub dirs: Vec<String>,
    /// Per-replica directory placement.
    pub replicas: HashMap<TopicPartition, ReplicaDirInfo>,
}

impl BrokerDirReport {
    pub fn has_dir(&self, dir: &str) -> bool {
        self.dirs.iter().any(|d| d == dir)
    }
}

/// Per-broker log-directory report.
pub type LogDirReport = HashMap<BrokerId, BrokerDirReport>;

/// Broker metric values sampled by the load monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrokerLoad {
    pub cpu_percent: f64,
    pub request_queue_time_ms: f64,
}

/// Sampling scope of the load monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Sample everything (brokers, topics, partitions).
    All,
    /// Sample broker-level metrics only, to keep the monitor cheap while an
    /// execution is in flight.
    BrokerMetricsOnly,
}

/// One unit of work submitted to the cluster admin API: move a partition to
/// the target replica set, optionally pinning replicas to log directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReassignmentSpec {
    pub partition: TopicPartition,
    pub target_replicas: Vec<BrokerId>,
    /// Target log directory per broker, for on-broker moves.
    pub target_dirs: HashMap<BrokerId, String>,
}

impl ReassignmentSpec {
    pub fn new(partition: TopicPartition, target_replicas: Vec<BrokerId>) -> Self {
        Self {
            partition,
            target_replicas,
            target_dirs: HashMap::new(),
        }
    }
}
