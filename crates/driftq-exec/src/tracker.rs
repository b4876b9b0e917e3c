//! Task tracker: owns all tasks of one batch, groups them by partition and
//! broker, enforces concurrency caps, and hands out runnable batches.

use crate::ExecError;
use crate::ordering::OrderingStrategy;
use crate::proposal::RebalanceProposal;
use crate::task::{ExecutionTask, TaskState, TaskType};
use chrono::{DateTime, Utc};
use driftq_cluster::types::{BrokerId, ClusterSnapshot, TopicPartition};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The three concurrency caps, shared between the tracker, the controller
/// facade, and the concurrency adjuster.
///
/// Setters are single atomic integer assignments callable from any thread;
/// changes take effect on the next batch the tracker emits.
#[derive(Debug)]
pub struct CapSet {
    inter_broker: AtomicUsize,
    intra_broker: AtomicUsize,
    leader: AtomicUsize,
}

impl CapSet {
    pub fn new(inter_broker: usize, intra_broker: usize, leader: usize) -> Self {
        Self {
            inter_broker: AtomicUsize::new(inter_broker),
            intra_broker: AtomicUsize::new(intra_broker),
            leader: AtomicUsize::new(leader),
        }
    }

    pub fn cap(&self, task_type: TaskType) -> usize {
        match task_type {
            TaskType::InterBrokerReplica => self.inter_broker.load(Ordering::Relaxed),
            TaskType::IntraBrokerReplica => self.intra_broker.load(Ordering::Relaxed),
            TaskType::Leader => self.leader.load(Ordering::Relaxed),
        }
    }

    pub fn set_cap(&self, task_type: TaskType, cap: usize) {
        match task_type {
            TaskType::InterBrokerReplica => self.inter_broker.store(cap, Ordering::Relaxed),
            TaskType::IntraBrokerReplica => self.intra_broker.store(cap, Ordering::Relaxed),
            TaskType::Leader => self.leader.store(cap, Ordering::Relaxed),
        }
    }
}

/// Per-type task tallies for the status snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskTypeCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub aborting: usize,
    pub completed: usize,
    pub dead: usize,
    pub aborted: usize,
}

#[derive(Debug, Default)]
struct TypeBucket {
    /// Execution ids in emission order.
    pending: VecDeque<u64>,
    /// IN_PROGRESS and ABORTING tasks.
    in_progress: BTreeSet<u64>,
    completed: usize,
    dead: usize,
    aborted: usize,
}

/// Owns the tasks of a single execution batch.
///
/// The tracker is driven from the supervisor worker only; the shared pieces
/// (the caps) live in [`CapSet`] behind atomics.
pub struct TaskTracker {
    caps: Arc<CapSet>,
    exempt_brokers: HashSet<BrokerId>,
    tasks: BTreeMap<u64, ExecutionTask>,
    inter: TypeBucket,
    intra: TypeBucket,
    leader: TypeBucket,
    /// Partitions with an in-flight task of any type.
    partitions_in_progress: HashSet<TopicPartition>,
    /// In-progress inter-broker tasks touching each broker (source or dest).
    inter_broker_loads: HashMap<BrokerId, usize>,
    /// In-progress intra-broker tasks per destination broker.
    intra_broker_loads: HashMap<BrokerId, usize>,
    next_execution_id: u64,
}

impl TaskTracker {
    pub fn new(caps: Arc<CapSet>) -> Self {
        Self {
            caps,
            exempt_brokers: HashSet::new(),
            tasks: BTreeMap::new(),
            inter: TypeBucket::default(),
            intra: TypeBucket::default(),
            leader: TypeBucket::default(),
            partitions_in_progress: HashSet::new(),
            inter_broker_loads: HashMap::new(),
            intra_broker_loads: HashMap::new(),
            next_execution_id: 0,
        }
    }

    /// Materialize tasks from proposals, in deterministic emission order.
    ///
    /// Per proposal: one inter-broker task iff a replica moves between
    /// brokers, one intra-broker task per broker with a target directory,
    /// and one leader task iff only the preferred leader changes.
    pub fn add_proposals(
        &mut self,
        mut proposals: Vec<RebalanceProposal>,
        exempt_brokers: HashSet<BrokerId>,
        cluster: &ClusterSnapshot,
        strategy: &OrderingStrategy,
    ) {
        strategy.sort(&mut proposals, cluster);
        self.exempt_brokers = exempt_brokers;

        for proposal in proposals {
            let proposal = Arc::new(proposal);

            if proposal.has_replica_move() {
                self.add_task(TaskType::InterBrokerReplica, proposal.clone(), None);
            }

            let mut dir_brokers: Vec<BrokerId> = proposal.target_dirs.keys().copied().collect();
            dir_brokers.sort();
            for broker in dir_brokers {
                self.add_task(TaskType::IntraBrokerReplica, proposal.clone(), Some(broker));
            }

            if proposal.has_leader_move() {
                self.add_task(TaskType::Leader, proposal.clone(), None);
            }
        }

        tracing::info!(
            inter_broker = self.inter.pending.len(),
            intra_broker = self.intra.pending.len(),
            leader = self.leader.pending.len(),
            "Materialized execution tasks from proposals"
        );
    }

    fn add_task(
        &mut self,
        task_type: TaskType,
        proposal: Arc<RebalanceProposal>,
        broker_id: Option<BrokerId>,
    ) {
        let id = self.next_execution_id;
        self.next_execution_id += 1;

        let task = ExecutionTask::new(id, task_type, proposal, broker_id);
        self.tasks.insert(id, task);
        self.bucket_mut(task_type).pending.push_back(id);
    }

    fn bucket(&self, task_type: TaskType) -> &TypeBucket {
        match task_type {
            TaskType::InterBrokerReplica => &self.inter,
            TaskType::IntraBrokerReplica => &self.intra,
            TaskType::Leader => &self.leader,
        }
    }

    fn bucket_mut(&mut self, task_type: TaskType) -> &mut TypeBucket {
        match task_type {
            TaskType::InterBrokerReplica => &mut self.inter,
            TaskType::IntraBrokerReplica => &mut self.intra,
            TaskType::Leader => &mut self.leader,
        }
    }

    /// Largest admissible prefix of pending inter-broker tasks. Emission
    /// marks each task IN_PROGRESS and stamps its start time.
    pub fn next_inter_broker_batch(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionTask>, ExecError> {
        let cap = self.caps.cap(TaskType::InterBrokerReplica);
        let mut batch = Vec::new();

        while let Some(&id) = self.inter.pending.front() {
            let task = &self.tasks[&id];
            let partition = task.partition().clone();
            let participants = Self::inter_broker_participants(&task.proposal);

            let admissible = !self.partitions_in_progress.contains(&partition)
                && participants.iter().all(|b| {
                    self.exempt_brokers.contains(b)
                        || self.inter_broker_loads.get(b).copied().unwrap_or(0) < cap
                });
            if !admissible {
                break;
            }

            self.inter.pending.pop_front();
            let task = self
                .tasks
                .get_mut(&id)
                .ok_or_else(|| ExecError::IllegalState {
                    context: "inter-broker batch emission".to_string(),
                    reason: format!("task {id} disappeared from the tracker"),
                })?;
            task.transition(TaskState::InProgress, now)?;

            self.inter.in_progress.insert(id);
            self.partitions_in_progress.insert(partition);
            for broker in participants {
                *self.inter_broker_loads.entry(broker).or_insert(0) += 1;
            }
            batch.push(self.tasks[&id].clone());
        }

        Ok(batch)
    }

    /// Largest admissible prefix of pending intra-broker tasks.
    pub fn next_intra_broker_batch(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionTask>, ExecError> {
        let cap = self.caps.cap(TaskType::IntraBrokerReplica);
        let mut batch = Vec::new();

        while let Some(&id) = self.intra.pending.front() {
            let task = &self.tasks[&id];
            let partition = task.partition().clone();
            let broker = match task.broker_id {
                Some(b) => b,
                None => {
                    return Err(ExecError::IllegalState {
                        context: "intra-broker batch emission".to_string(),
                        reason: format!("task {id} has no destination broker"),
                    });
                }
            };

            let admissible = !self.partitions_in_progress.contains(&partition)
                && (self.exempt_brokers.contains(&broker)
                    || self.intra_broker_loads.get(&broker).copied().unwrap_or(0) < cap);
            if !admissible {
                break;
            }

            self.intra.pending.pop_front();
            let task = self
                .tasks
                .get_mut(&id)
                .ok_or_else(|| ExecError::IllegalState {
                    context: "intra-broker batch emission".to_string(),
                    reason: format!("task {id} disappeared from the tracker"),
                })?;
            task.transition(TaskState::InProgress, now)?;

            self.intra.in_progress.insert(id);
            self.partitions_in_progress.insert(partition);
            *self.intra_broker_loads.entry(broker).or_insert(0) += 1;
            batch.push(self.tasks[&id].clone());
        }

        Ok(batch)
    }

    /// Largest admissible prefix of pending leader tasks under the global
    /// leadership-movement cap.
    pub fn next_leader_batch(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionTask>, ExecError> {
        let cap = self.caps.cap(TaskType::Leader);
        let mut batch = Vec::new();

        while let Some(&id) = self.leader.pending.front() {
            let partition = self.tasks[&id].partition().clone();

            let admissible = self.leader.in_progress.len() < cap
                && !self.partitions_in_progress.contains(&partition);
            if !admissible {
                break;
            }

            self.leader.pending.pop_front();
            let task = self
                .tasks
                .get_mut(&id)
                .ok_or_else(|| ExecError::IllegalState {
                    context: "leader batch emission".to_string(),
                    reason: format!("task {id} disappeared from the tracker"),
                })?;
            task.transition(TaskState::InProgress, now)?;

            self.leader.in_progress.insert(id);
            self.partitions_in_progress.insert(partition);
            batch.push(self.tasks[&id].clone());
        }

        Ok(batch)
    }

    fn inter_broker_participants(proposal: &RebalanceProposal) -> Vec<BrokerId> {
        let mut participants: Vec<BrokerId> = proposal
            .removed_replicas()
            .union(&proposal.added_replicas())
            .copied()
            .collect();
        participants.sort();
        participants
    }

    /// IN_PROGRESS → COMPLETED, or ABORTING → ABORTED for a task observed
    /// settled after an abort request.
    pub fn mark_done(&mut self, execution_id: u64, now: DateTime<Utc>) -> Result<(), ExecError> {
        let target = match self.task_state(execution_id)? {
            TaskState::Aborting => TaskState::Aborted,
            _ => TaskState::Completed,
        };
        self.finish(execution_id, target, now)
    }

    pub fn mark_aborting(
        &mut self,
        execution_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), ExecError> {
        let task = self
            .tasks
            .get_mut(&execution_id)
            .ok_or_else(|| Self::unknown_task(execution_id))?;
        task.transition(TaskState::Aborting, now)
    }

    pub fn mark_dead(&mut self, execution_id: u64, now: DateTime<Utc>) -> Result<(), ExecError> {
        self.finish(execution_id, TaskState::Dead, now)
    }

    fn finish(
        &mut self,
        execution_id: u64,
        target: TaskState,
        now: DateTime<Utc>,
    ) -> Result<(), ExecError> {
        let task = self
            .tasks
            .get_mut(&execution_id)
            .ok_or_else(|| Self::unknown_task(execution_id))?;
        task.transition(target, now)?;

        let task_type = task.task_type;
        let partition = task.partition().clone();
        let proposal = task.proposal.clone();
        let broker_id = task.broker_id;

        let bucket = self.bucket_mut(task_type);
        bucket.in_progress.remove(&execution_id);
        match target {
            TaskState::Completed => bucket.completed += 1,
            TaskState::Aborted => bucket.aborted += 1,
            TaskState::Dead => bucket.dead += 1,
            _ => {}
        }

        self.partitions_in_progress.remove(&partition);
        match task_type {
            TaskType::InterBrokerReplica => {
                for broker in Self::inter_broker_participants(&proposal) {
                    if let Some(load) = self.inter_broker_loads.get_mut(&broker) {
                        *load = load.saturating_sub(1);
                    }
                }
            }
            TaskType::IntraBrokerReplica => {
                if let Some(broker) = broker_id
                    && let Some(load) = self.intra_broker_loads.get_mut(&broker)
                {
                    *load = load.saturating_sub(1);
                }
            }
            TaskType::Leader => {}
        }

        Ok(())
    }

    fn task_state(&self, execution_id: u64) -> Result<TaskState, ExecError> {
        self.tasks
            .get(&execution_id)
            .map(|t| t.state())
            .ok_or_else(|| Self::unknown_task(execution_id))
    }

    fn unknown_task(execution_id: u64) -> ExecError {
        ExecError::IllegalState {
            context: "task tracker".to_string(),
            reason: format!("unknown execution id {execution_id}"),
        }
    }

    pub fn task(&self, execution_id: u64) -> Option<&ExecutionTask> {
        self.tasks.get(&execution_id)
    }

    /// In-flight tasks of a type: IN_PROGRESS and ABORTING.
    pub fn in_progress_tasks(&self, task_type: TaskType) -> Vec<ExecutionTask> {
        self.bucket(task_type)
            .in_progress
            .iter()
            .map(|id| self.tasks[id].clone())
            .collect()
    }

    pub fn in_progress_count(&self, task_type: TaskType) -> usize {
        self.bucket(task_type).in_progress.len()
    }

    /// In-flight partitions of a type.
    pub fn in_progress_partitions(&self, task_type: TaskType) -> HashSet<TopicPartition> {
        self.bucket(task_type)
            .in_progress
            .iter()
            .map(|id| self.tasks[id].partition().clone())
            .collect()
    }

    /// Pending tasks of a type not yet handed out.
    pub fn remaining(&self, task_type: TaskType) -> usize {
        self.bucket(task_type).pending.len()
    }

    pub fn finished(&self, task_type: TaskType) -> usize {
        let bucket = self.bucket(task_type);
        bucket.completed + bucket.dead + bucket.aborted
    }

    /// In-progress inter-broker tasks touching the broker as source or dest.
    pub fn inter_broker_load(&self, broker: BrokerId) -> usize {
        self.inter_broker_loads.get(&broker).copied().unwrap_or(0)
    }

    pub fn counts(&self, task_type: TaskType) -> TaskTypeCounts {
        let bucket = self.bucket(task_type);
        let aborting = bucket
            .in_progress
            .iter()
            .filter(|id| self.tasks[id].state() == TaskState::Aborting)
            .count();

        TaskTypeCounts {
            pending: bucket.pending.len(),
            in_progress: bucket.in_progress.len() - aborting,
            aborting,
            completed: bucket.completed,
            dead: bucket.dead,
            aborted: bucket.aborted,
        }
    }

    /// True once every task reached a terminal state or was never emitted.
    pub fn is_done(&self) -> bool {
        TaskType::ALL
            .iter()
            .all(|ty| self.bucket(*ty).in_progress.is_empty())
    }

    /// Human-readable per-type summary for the terminal notification.
    /// Never-submitted PENDING tasks are reported as cancelled.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for task_type in TaskType::ALL {
            let bucket = self.bucket(task_type);
            if !out.is_empty() {
                out.push_str("; ");
            }
            let _ = write!(
                out,
                "{task_type}: {} completed, {} dead, {} aborted, {} cancelled",
                bucket.completed,
                bucket.dead,
                bucket.aborted,
                bucket.pending.len()
            );
        }
        out
    }
}
