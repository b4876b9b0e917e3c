//! Error types for cluster-facing operations.

use std::fmt;

/// Main error type for cluster admin, metadata, and coordination operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterError {
    BrokerNotFound {
        broker_id: u32,
    },
    TopicNotFound {
        topic: String,
    },
    PartitionNotFound {
        topic: String,
        partition_id: u32,
    },
    /// The cluster controller rejected a reassignment as structurally invalid.
    InvalidReplicaAssignment {
        partition: String,
        reason: String,
    },
    /// A synchronous RPC did not complete in time.
    Timeout {
        context: String,
    },
    /// A blocking call was interrupted before completion.
    Interrupted {
        context: String,
    },
    /// Transport-level failure talking to the cluster.
    Transport {
        context: String,
        reason: String,
    },
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::BrokerNotFound { broker_id } => {
                write!(f, "Broker with ID {broker_id} not found")
            }
            ClusterError::TopicNotFound { topic } => {
                write!(f, "Topic '{topic}' not found")
            }
            ClusterError::PartitionNotFound {
                topic,
                partition_id,
            } => {
                write!(f, "Partition {partition_id} not found for topic '{topic}'")
            }
            ClusterError::InvalidReplicaAssignment { partition, reason } => {
                write!(f, "Invalid replica assignment for {partition}: {reason}")
            }
            ClusterError::Timeout { context } => {
                write!(f, "Timed out in {context}")
            }
            ClusterError::Interrupted { context } => {
                write!(f, "Interrupted in {context}")
            }
            ClusterError::Transport { context, reason } => {
                write!(f, "Transport error in {context}: {reason}")
            }
        }
    }
}

impl std::error::Error for ClusterError {}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClusterError::BrokerNotFound { .. }
                | ClusterError::TopicNotFound { .. }
                | ClusterError::PartitionNotFound { .. }
        )
    }

    /// True for the error class that marks a submitted reassignment dead.
    pub fn is_invalid_assignment(&self) -> bool {
        matches!(self, ClusterError::InvalidReplicaAssignment { .. })
    }

    /// True for failures that are retried on the next poll cycle rather than
    /// surfaced to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClusterError::Timeout { .. }
                | ClusterError::Interrupted { .. }
                | ClusterError::Transport { .. }
        )
    }

    pub fn from_transport_error(e: impl fmt::Display, context: &str) -> Self {
        ClusterError::Transport {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ClusterError::BrokerNotFound { broker_id: 42 };
        assert_eq!(error.to_string(), "Broker with ID 42 not found");

        let error = ClusterError::InvalidReplicaAssignment {
            partition: "orders-0".to_string(),
            reason: "replica set is empty".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid replica assignment for orders-0: replica set is empty"
        );
    }

    #[test]
    fn test_error_classification() {
        let not_found = ClusterError::TopicNotFound {
            topic: "orders".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_transient());

        let rejected = ClusterError::InvalidReplicaAssignment {
            partition: "orders-0".to_string(),
            reason: "unknown broker".to_string(),
        };
        assert!(rejected.is_invalid_assignment());
        assert!(!rejected.is_transient());

        let timeout = ClusterError::Timeout {
            context: "metadata refresh".to_string(),
        };
        assert!(timeout.is_transient());
        assert!(!timeout.is_invalid_assignment());
    }

    #[test]
    fn test_from_transport_error() {
        let error = ClusterError::from_transport_error("connection refused", "admin submit");
        match error {
            ClusterError::Transport { context, reason } => {
                assert_eq!(context, "admin submit");
                assert!(reason.contains("connection refused"));
            }
            _ => panic!("Unexpected error type"),
        }
    }
}
