//! Contracts for the external collaborators of the executor.
//!
//! The executor never talks to a concrete cluster directly; everything it
//! consumes — the admin API, the metadata view, the coordination store, the
//! load monitor, throttling, and the observer callbacks — goes through the
//! traits in this module.

use crate::{
    ClusterError,
    submission::SubmissionHandle,
    types::*,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Cluster admin API used to move replicas between and within brokers.
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// Submit a batch of replica reassignments.
    ///
    /// Returns one settle-able handle per partition; a handle that resolves
    /// to an error means the cluster controller rejected the reassignment.
    async fn submit_replica_reassignments(
        &self,
        reassignments: Vec<ReassignmentSpec>,
    ) -> Result<HashMap<TopicPartition, SubmissionHandle>, ClusterError>;

    /// Partitions with a reassignment currently in flight on the cluster.
    async fn list_ongoing_reassignments(&self) -> Result<HashSet<TopicPartition>, ClusterError>;

    /// Per-broker log-directory placement of replicas, including pending
    /// future directories.
    async fn describe_log_dirs(
        &self,
        brokers: Vec<BrokerId>,
    ) -> Result<LogDirReport, ClusterError>;
}

/// Read-only view of cluster metadata.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Fetch a fresh snapshot of brokers, partitions, replicas, and leaders.
    async fn refresh(&self) -> Result<ClusterSnapshot, ClusterError>;
}

/// Coordination-store operations the executor needs for leadership transfers
/// and for the forced-stop intervention.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Partitions with a preferred-leader election currently in flight.
    async fn list_ongoing_preferred_elections(
        &self,
    ) -> Result<HashSet<TopicPartition>, ClusterError>;

    /// Request preferred-leader election for the given partitions.
    async fn trigger_preferred_elections(
        &self,
        partitions: Vec<TopicPartition>,
    ) -> Result<(), ClusterError>;

    /// Delete the in-flight reassignment markers so the cluster controller
    /// abandons anything still pending. Forced-stop path only.
    async fn delete_reassignment_markers(&self) -> Result<(), ClusterError>;
}

/// Live broker metric source, also controllable so the executor can narrow
/// sampling while an execution is in flight.
#[async_trait]
pub trait LoadMonitor: Send + Sync {
    /// Current metric values per broker.
    async fn broker_load(&self) -> Result<HashMap<BrokerId, BrokerLoad>, ClusterError>;

    /// Switch the sampling scope.
    async fn set_sampling_mode(&self, mode: SamplingMode);

    async fn pause_sampling(&self, reason: &str, force: bool);

    async fn resume_sampling(&self, reason: &str);
}

/// Sets and clears per-topic replication bandwidth caps around inter-broker
/// movements.
#[async_trait]
pub trait ThrottleHelper: Send + Sync {
    async fn set_throttles(&self, partitions: &[TopicPartition]) -> Result<(), ClusterError>;

    async fn clear_throttles(
        &self,
        completed: &[TopicPartition],
        still_in_progress: &[TopicPartition],
    ) -> Result<(), ClusterError>;
}

/// Sink for operator-facing messages.
pub trait Notifier: Send + Sync {
    fn send_notification(&self, message: &str);

    fn send_alert(&self, message: &str);
}

/// Default notifier that writes through the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_notification(&self, message: &str) {
        tracing::info!(target: "driftq::notifier", "{message}");
    }

    fn send_alert(&self, message: &str) {
        tracing::warn!(target: "driftq::notifier", "{message}");
    }
}

/// Anomaly-detector callbacks invoked around self-healing executions.
pub trait AnomalyObserver: Send + Sync {
    fn clear_ongoing_detection_time(&self);

    fn reset_unfixable_goals(&self);

    fn mark_self_healing_finished(&self, uuid: Uuid);
}

/// User-task-manager callbacks invoked around user-triggered executions.
pub trait UserTaskObserver: Send + Sync {
    fn mark_began(&self, uuid: Uuid);

    fn mark_finished(&self, uuid: Uuid, stopped_or_errored: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notifier_is_usable_as_trait_object() {
        let notifier: Box<dyn Notifier> = Box::new(LogNotifier);
        notifier.send_notification("execution finished");
        notifier.send_alert("execution stopped");
    }
}
