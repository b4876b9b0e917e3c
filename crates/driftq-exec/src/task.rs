//! Execution tasks and their lifecycle state machine.

use crate::ExecError;
use crate::proposal::RebalanceProposal;
use chrono::{DateTime, Utc};
use driftq_cluster::types::{BrokerId, TopicPartition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three kinds of work derived from a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    InterBrokerReplica,
    IntraBrokerReplica,
    Leader,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [
        TaskType::InterBrokerReplica,
        TaskType::IntraBrokerReplica,
        TaskType::Leader,
    ];
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::InterBrokerReplica => write!(f, "INTER_BROKER_REPLICA"),
            TaskType::IntraBrokerReplica => write!(f, "INTRA_BROKER_REPLICA"),
            TaskType::Leader => write!(f, "LEADER"),
        }
    }
}

/// Lifecycle state of a task.
///
/// PENDING → IN_PROGRESS → {COMPLETED | ABORTING → ABORTED | DEAD}.
/// Terminal states are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    InProgress,
    Aborting,
    Aborted,
    Dead,
    Completed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Aborted | TaskState::Dead
        )
    }

    /// Whether the edge `self → to` exists in the state machine.
    fn allows(self, to: TaskState) -> bool {
        match self {
            TaskState::Pending => to == TaskState::InProgress,
            TaskState::InProgress => matches!(
                to,
                TaskState::Completed | TaskState::Aborting | TaskState::Dead
            ),
            TaskState::Aborting => matches!(to, TaskState::Aborted | TaskState::Dead),
            TaskState::Completed | TaskState::Aborted | TaskState::Dead => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::InProgress => write!(f, "IN_PROGRESS"),
            TaskState::Aborting => write!(f, "ABORTING"),
            TaskState::Aborted => write!(f, "ABORTED"),
            TaskState::Dead => write!(f, "DEAD"),
            TaskState::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// One executable unit of work derived from a proposal.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub execution_id: u64,
    pub task_type: TaskType,
    pub proposal: Arc<RebalanceProposal>,
    /// Destination broker for intra-broker moves; irrelevant otherwise.
    pub broker_id: Option<BrokerId>,
    state: TaskState,
    start_time: Option<DateTime<Utc>>,
}

impl ExecutionTask {
    pub fn new(
        execution_id: u64,
        task_type: TaskType,
        proposal: Arc<RebalanceProposal>,
        broker_id: Option<BrokerId>,
    ) -> Self {
        Self {
            execution_id,
            task_type,
            proposal,
            broker_id,
            state: TaskState::Pending,
            start_time: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Stamped on the PENDING → IN_PROGRESS transition.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn partition(&self) -> &TopicPartition {
        &self.proposal.partition
    }

    /// Drive the task along one state-machine edge.
    pub fn transition(&mut self, to: TaskState, now: DateTime<Utc>) -> Result<(), ExecError> {
        if !self.state.allows(to) {
            return Err(ExecError::InvalidTaskTransition {
                execution_id: self.execution_id,
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }

        if self.state == TaskState::Pending && to == TaskState::InProgress {
            self.start_time = Some(now);
        }
        self.state = to;

        Ok(())
    }
}

impl fmt::Display for ExecutionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} [{} {} {}]",
            self.execution_id,
            self.task_type,
            self.proposal.partition,
            self.state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> ExecutionTask {
        let proposal = Arc::new(RebalanceProposal::new(
            TopicPartition::new("orders", 0),
            vec![BrokerId(1), BrokerId(2)],
            vec![BrokerId(1), BrokerId(3)],
        ));
        ExecutionTask::new(0, TaskType::InterBrokerReplica, proposal, None)
    }

    #[test]
    fn test_happy_path_transitions() {
        let now = Utc::now();
        let mut t = task();
        assert_eq!(t.state(), TaskState::Pending);
        assert!(t.start_time().is_none());

        t.transition(TaskState::InProgress, now).unwrap();
        assert_eq!(t.start_time(), Some(now));

        t.transition(TaskState::Completed, now).unwrap();
        assert!(t.state().is_terminal());
    }

    #[test]
    fn test_abort_path() {
        let now = Utc::now();
        let mut t = task();
        t.transition(TaskState::InProgress, now).unwrap();
        t.transition(TaskState::Aborting, now).unwrap();
        t.transition(TaskState::Aborted, now).unwrap();
        assert!(t.state().is_terminal());
    }

    #[test]
    fn test_aborting_can_die() {
        let now = Utc::now();
        let mut t = task();
        t.transition(TaskState::InProgress, now).unwrap();
        t.transition(TaskState::Aborting, now).unwrap();
        t.transition(TaskState::Dead, now).unwrap();
    }

    #[test]
    fn test_no_skipping_steps() {
        let now = Utc::now();
        let mut t = task();
        let result = t.transition(TaskState::Completed, now);
        assert!(matches!(
            result,
            Err(ExecError::InvalidTaskTransition { .. })
        ));
        assert_eq!(t.state(), TaskState::Pending);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let now = Utc::now();
        let mut t = task();
        t.transition(TaskState::InProgress, now).unwrap();
        t.transition(TaskState::Dead, now).unwrap();

        for to in [
            TaskState::Pending,
            TaskState::InProgress,
            TaskState::Completed,
            TaskState::Aborting,
        ] {
            assert!(t.transition(to, now).is_err());
        }
        assert_eq!(t.state(), TaskState::Dead);
    }

    #[test]
    fn test_start_time_stamped_once() {
        let now = Utc::now();
        let mut t = task();
        t.transition(TaskState::InProgress, now).unwrap();
        let later = now + chrono::Duration::seconds(30);
        t.transition(TaskState::Aborting, later).unwrap();
        assert_eq!(t.start_time(), Some(now));
    }
}
