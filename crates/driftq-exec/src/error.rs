//! Error types for the execution controller.

use driftq_cluster::ClusterError;
use std::fmt;

/// Main error type for executor operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    /// An execution is already in flight, here or elsewhere on the cluster.
    OngoingExecution {
        reason: String,
    },
    /// A caller-supplied argument was rejected by a validator.
    InvalidArgument {
        context: String,
        reason: String,
    },
    /// The controller was asked to do something its current state forbids.
    IllegalState {
        context: String,
        reason: String,
    },
    /// A task was driven along a disallowed state-machine edge.
    InvalidTaskTransition {
        execution_id: u64,
        from: String,
        to: String,
    },
    /// Concurrency auto-adjustment is only supported for inter-broker moves.
    UnsupportedTaskType {
        task_type: String,
    },
    /// A cluster-facing call failed.
    Cluster(ClusterError),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::OngoingExecution { reason } => {
                write!(f, "Cannot start execution: {reason}")
            }
            ExecError::InvalidArgument { context, reason } => {
                write!(f, "Invalid argument in {context}: {reason}")
            }
            ExecError::IllegalState { context, reason } => {
                write!(f, "Illegal state in {context}: {reason}")
            }
            ExecError::InvalidTaskTransition {
                execution_id,
                from,
                to,
            } => {
                write!(
                    f,
                    "Task {execution_id} cannot transition from {from} to {to}"
                )
            }
            ExecError::UnsupportedTaskType { task_type } => {
                write!(f, "Concurrency adjustment is not supported for {task_type}")
            }
            ExecError::Cluster(err) => write!(f, "Cluster error: {err}"),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::Cluster(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ClusterError> for ExecError {
    fn from(err: ClusterError) -> Self {
        ExecError::Cluster(err)
    }
}

impl ExecError {
    pub fn is_ongoing_execution(&self) -> bool {
        matches!(self, ExecError::OngoingExecution { .. })
    }

    /// Wrap a preflight cluster failure; transient I/O during preflight is
    /// surfaced to the caller as an illegal state rather than retried.
    pub fn preflight(err: ClusterError, context: &str) -> Self {
        ExecError::IllegalState {
            context: context.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ExecError::OngoingExecution {
            reason: "another batch is past STARTING".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Cannot start execution: another batch is past STARTING"
        );

        let error = ExecError::InvalidTaskTransition {
            execution_id: 7,
            from: "COMPLETED".to_string(),
            to: "IN_PROGRESS".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Task 7 cannot transition from COMPLETED to IN_PROGRESS"
        );
    }

    #[test]
    fn test_cluster_error_conversion() {
        let cluster_error = ClusterError::Timeout {
            context: "metadata refresh".to_string(),
        };
        let error: ExecError = cluster_error.clone().into();
        assert_eq!(error, ExecError::Cluster(cluster_error));
        assert!(!error.is_ongoing_execution());
    }

    #[test]
    fn test_preflight_wrapping() {
        let cluster_error = ClusterError::Timeout {
            context: "list ongoing reassignments".to_string(),
        };
        let error = ExecError::preflight(cluster_error, "execution preflight");
        assert!(matches!(error, ExecError::IllegalState { .. }));
    }
}
