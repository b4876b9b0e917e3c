//! The supervision loop: drives one execution batch through the three
//! ordered phases, polling cluster state to declare tasks done or dead.

use crate::ExecError;
use crate::config::{
    ExecutorConfig, FUTURE_ERROR_PROBE_TIMEOUT_MS, SLOW_TASK_ALERT_BACKOFF_MS,
};
use crate::metrics;
use crate::state::{ExecutorPhase, ExecutorStatus, SessionState, StatusBoard, StopSignal};
use crate::task::{ExecutionTask, TaskState, TaskType};
use crate::tracker::{CapSet, TaskTracker};
use chrono::{DateTime, Utc};
use driftq_cluster::submission::SubmissionHandle;
use driftq_cluster::traits::{
    AnomalyObserver, ClusterAdmin, CoordinationStore, LoadMonitor, MetadataClient, Notifier,
    ThrottleHelper, UserTaskObserver,
};
use driftq_cluster::types::{
    BrokerId, ClusterSnapshot, LogDirReport, ReassignmentSpec, SamplingMode, TopicPartition,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Everything the supervisor needs from the controller, passed as a handle.
pub(crate) struct SupervisorContext {
    pub admin: Arc<dyn ClusterAdmin>,
    pub metadata: Arc<dyn MetadataClient>,
    pub coordination: Arc<dyn CoordinationStore>,
    pub load_monitor: Option<Arc<dyn LoadMonitor>>,
    pub throttle: Arc<dyn ThrottleHelper>,
    pub notifier: Arc<dyn Notifier>,
    pub anomaly: Arc<dyn AnomalyObserver>,
    pub user_tasks: Option<Arc<dyn UserTaskObserver>>,
    pub session: Arc<SessionState>,
    pub status: Arc<StatusBoard>,
    pub caps: Arc<CapSet>,
    pub config: ExecutorConfig,
}

/// Runs one batch to completion on the single worker task.
pub(crate) struct Supervisor {
    ctx: SupervisorContext,
    tracker: TaskTracker,
    cluster: ClusterSnapshot,
    /// Per-partition futures recorded at submission time.
    submissions: HashMap<TopicPartition, SubmissionHandle>,
    /// Backoff anchor for slow-task alerts, per executor not per task.
    last_slow_alert: Option<DateTime<Utc>>,
}

impl Supervisor {
    pub fn new(ctx: SupervisorContext, tracker: TaskTracker, cluster: ClusterSnapshot) -> Self {
        Self {
            ctx,
            tracker,
            cluster,
            submissions: HashMap::new(),
            last_slow_alert: None,
        }
    }

    /// Entry point of the worker. Cleanup and the terminal notification run
    /// unconditionally, whatever happened inside the phase loop.
    pub async fn run(mut self) {
        let result = self.execute_phases().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Execution loop exited with an error");
        }
        self.cleanup_and_notify(result).await;
    }

    async fn execute_phases(&mut self) -> Result<(), ExecError> {
        self.narrow_sampling().await;

        self.enter_phase(ExecutorPhase::InterBrokerInProgress);
        self.run_move_phase(TaskType::InterBrokerReplica).await?;

        self.enter_phase(ExecutorPhase::IntraBrokerInProgress);
        self.run_move_phase(TaskType::IntraBrokerReplica).await?;

        self.enter_phase(ExecutorPhase::LeaderInProgress);
        self.run_leader_phase().await?;

        if self.ctx.session.stop_signal() == StopSignal::Forced {
            // Evict whatever the cluster controller still has in flight.
            // This is the only action that reverts uncommitted reassignments.
            tracing::warn!("Forced stop: deleting reassignment markers");
            if let Err(e) = self.ctx.coordination.delete_reassignment_markers().await {
                if e.is_transient() {
                    tracing::warn!(error = %e, "Failed to delete reassignment markers");
                } else {
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// Advance the published phase, unless a stop already replaced the
    /// remaining phase sequence with STOPPING.
    fn enter_phase(&self, phase: ExecutorPhase) {
        if self.ctx.session.stop_signal() == StopSignal::None {
            self.ctx.session.set_phase(phase);
            tracing::info!(%phase, "Entering execution phase");
        }
        self.publish_status();
    }

    /// Submission/polling loop shared by the inter- and intra-broker phases.
    async fn run_move_phase(&mut self, task_type: TaskType) -> Result<(), ExecError> {
        loop {
            let stop = self.ctx.session.stop_signal();
            if stop == StopSignal::Forced {
                break;
            }
            if task_type == TaskType::InterBrokerReplica && stop == StopSignal::Graceful {
                break;
            }
            if self.tracker.remaining(task_type) == 0
                && self.tracker.in_progress_count(task_type) == 0
            {
                break;
            }

            let batch = match task_type {
                TaskType::InterBrokerReplica => self.tracker.next_inter_broker_batch(Utc::now())?,
                _ => self.tracker.next_intra_broker_batch(Utc::now())?,
            };
            if !batch.is_empty() {
                self.submit_moves(task_type, &batch).await?;
            }

            let finished = self.wait_for_progress(task_type).await?;
            if task_type == TaskType::InterBrokerReplica {
                self.clear_finished_throttles(&finished).await;
            }
        }

        self.drain_in_progress(task_type).await
    }

    /// Leadership transfers. An election already in flight blocks the next
    /// submission but not completion detection of our own tasks.
    async fn run_leader_phase(&mut self) -> Result<(), ExecError> {
        loop {
            if self.ctx.session.stop_signal() == StopSignal::Forced {
                break;
            }
            if self.tracker.remaining(TaskType::Leader) == 0
                && self.tracker.in_progress_count(TaskType::Leader) == 0
            {
                break;
            }

            let election_pending = match self
                .ctx
                .coordination
                .list_ongoing_preferred_elections()
                .await
            {
                Ok(ongoing) => !ongoing.is_empty(),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not check ongoing elections");
                    true
                }
            };

            if !election_pending {
                let batch = self.tracker.next_leader_batch(Utc::now())?;
                if !batch.is_empty() {
                    let partitions: Vec<TopicPartition> =
                        batch.iter().map(|t| t.partition().clone()).collect();
                    tracing::info!(count = partitions.len(), "Triggering preferred-leader elections");
                    if let Err(e) = self
                        .ctx
                        .coordination
                        .trigger_preferred_elections(partitions)
                        .await
                    {
                        if e.is_transient() {
                            tracing::warn!(error = %e, "Failed to trigger elections");
                        } else {
                            return Err(e.into());
                        }
                    }
                }
            }

            self.wait_for_progress(TaskType::Leader).await?;
        }

        self.drain_in_progress(TaskType::Leader).await
    }

    async fn drain_in_progress(&mut self, task_type: TaskType) -> Result<(), ExecError> {
        while self.tracker.in_progress_count(task_type) > 0 {
            self.wait_for_progress(task_type).await?;
        }
        Ok(())
    }

    async fn submit_moves(
        &mut self,
        task_type: TaskType,
        batch: &[ExecutionTask],
    ) -> Result<(), ExecError> {
        if task_type == TaskType::InterBrokerReplica {
            let partitions: Vec<TopicPartition> =
                batch.iter().map(|t| t.partition().clone()).collect();
            if let Err(e) = self.ctx.throttle.set_throttles(&partitions).await {
                tracing::warn!(error = %e, "Failed to set replication throttles");
            }
        }

        let specs: Vec<ReassignmentSpec> = batch.iter().map(Self::spec_for_task).collect();
        tracing::info!(
            %task_type,
            count = specs.len(),
            "Submitting replica movements"
        );
        match self.ctx.admin.submit_replica_reassignments(specs).await {
            Ok(handles) => {
                self.submissions.extend(handles);
                Ok(())
            }
            Err(e) if e.is_transient() => {
                // Re-submission of dropped tasks recovers these next cycle
                tracing::warn!(error = %e, "Submission failed; will retry");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// An intra-broker task pins one broker's replica to one directory; the
    /// other two types submit the proposal verbatim.
    fn spec_for_task(task: &ExecutionTask) -> ReassignmentSpec {
        match task.task_type {
            TaskType::IntraBrokerReplica => {
                let mut target_dirs = HashMap::new();
                if let Some(broker) = task.broker_id
                    && let Some(dir) = task.proposal.target_dirs.get(&broker)
                {
                    target_dirs.insert(broker, dir.clone());
                }
                ReassignmentSpec {
                    partition: task.partition().clone(),
                    target_replicas: task.proposal.target_replicas.clone(),
                    target_dirs,
                }
            }
            _ => task.proposal.reassignment_spec(),
        }
    }

    /// One poll cycle: sleep, recover dropped tasks, refresh cluster state,
    /// then classify every in-flight task. Returns the tasks that reached a
    /// terminal state this cycle.
    async fn wait_for_progress(&mut self, task_type: TaskType) -> Result<Vec<u64>, ExecError> {
        tokio::time::sleep(self.ctx.session.progress_interval()).await;

        if self.ctx.config.resubmit_dropped_tasks {
            self.maybe_resubmit_dropped(task_type).await;
        }

        match self.ctx.metadata.refresh().await {
            Ok(snapshot) => self.cluster = snapshot,
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "Metadata refresh failed; retrying next cycle");
                self.publish_status();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        }

        let dir_reports = self.fetch_dir_reports().await;

        let now = Utc::now();
        let stop = self.ctx.session.stop_signal();
        let mut finished = Vec::new();
        let mut dead_inter = Vec::new();
        let mut stopped_inter = Vec::new();
        let mut slow = Vec::new();

        for task in self.tracker.in_progress_tasks(task_type) {
            let id = task.execution_id;

            // Stop dispatch: forced kills everything, graceful kills
            // inter-broker movements only and queues them for rollback.
            let killed_by_stop = stop == StopSignal::Forced
                || (stop == StopSignal::Graceful
                    && task.task_type == TaskType::InterBrokerReplica);
            if killed_by_stop {
                self.tracker.mark_dead(id, now)?;
                finished.push(id);
                if stop == StopSignal::Graceful {
                    stopped_inter.push(task);
                }
                continue;
            }

            // Partition vanished, e.g. the topic was deleted underneath us
            if self.cluster.partition_vanished(task.partition()) {
                tracing::info!(partition = %task.partition(), "Partition disappeared; aborting task");
                if task.state() == TaskState::InProgress {
                    self.tracker.mark_aborting(id, now)?;
                }
                self.tracker.mark_done(id, now)?;
                finished.push(id);
                continue;
            }

            if self.task_done(&task, dir_reports.as_ref()) {
                tracing::debug!(%task, "Task reached its goal");
                self.tracker.mark_done(id, now)?;
                finished.push(id);
                continue;
            }

            if self.task_dead(&task, dir_reports.as_ref(), now).await {
                tracing::warn!(%task, "Task declared dead");
                self.tracker.mark_dead(id, now)?;
                finished.push(id);
                if task.task_type == TaskType::InterBrokerReplica {
                    dead_inter.push(task);
                }
                continue;
            }

            if let Some(start) = task.start_time() {
                let elapsed_ms = now.signed_duration_since(start).num_milliseconds();
                if elapsed_ms > self.ctx.config.slow_task_alert_threshold_ms as i64 {
                    slow.push(task);
                }
            }
        }

        self.maybe_alert_slow_tasks(&slow, now);
        self.handle_dead_or_stopped_inter(dead_inter, stopped_inter)
            .await?;
        self.publish_status();

        Ok(finished)
    }

    /// Per-type goal predicate.
    fn task_done(&self, task: &ExecutionTask, dir_reports: Option<&LogDirReport>) -> bool {
        let proposal = &task.proposal;
        match task.task_type {
            TaskType::InterBrokerReplica => {
                let Some(info) = self.cluster.partition(task.partition()) else {
                    return false;
                };
                let current: HashSet<BrokerId> = info.replicas.iter().copied().collect();
                let target: HashSet<BrokerId> = proposal.target_replicas.iter().copied().collect();
                if current != target {
                    return false;
                }
                // No straggling out-of-sync replica from the removed set
                let removed = proposal.removed_replicas();
                info.out_of_sync_replicas()
                    .iter()
                    .all(|r| !removed.contains(r))
            }
            TaskType::IntraBrokerReplica => {
                let (Some(broker), Some(reports)) = (task.broker_id, dir_reports) else {
                    return false;
                };
                let Some(report) = reports.get(&broker) else {
                    return false;
                };
                let Some(replica) = report.replicas.get(task.partition()) else {
                    return false;
                };
                let Some(target_dir) = proposal.target_dirs.get(&broker) else {
                    return false;
                };
                replica.future_dir.is_none() && replica.current_dir == *target_dir
            }
            TaskType::Leader => {
                let Some(info) = self.cluster.partition(task.partition()) else {
                    return false;
                };
                info.leader.is_some() && info.leader == proposal.target_leader()
            }
        }
    }

    /// Per-type fatal conditions.
    async fn task_dead(
        &self,
        task: &ExecutionTask,
        dir_reports: Option<&LogDirReport>,
        now: DateTime<Utc>,
    ) -> bool {
        let proposal = &task.proposal;
        match task.task_type {
            TaskType::Leader => {
                if let Some(leader) = proposal.target_leader()
                    && !self.cluster.is_broker_alive(leader)
                {
                    return true;
                }
                match task.start_time() {
                    Some(start) => {
                        now.signed_duration_since(start).num_milliseconds()
                            > self.ctx.config.leader_movement_timeout_ms as i64
                    }
                    None => false,
                }
            }
            TaskType::InterBrokerReplica => {
                if proposal
                    .added_replicas()
                    .iter()
                    .any(|b| !self.cluster.is_broker_alive(*b))
                {
                    return true;
                }
                // Probe the recorded submission future for a rejection
                if let Some(handle) = self.submissions.get(task.partition()) {
                    let probed = handle
                        .probe(Duration::from_millis(FUTURE_ERROR_PROBE_TIMEOUT_MS))
                        .await;
                    if let Some(Err(e)) = probed
                        && e.is_invalid_assignment()
                    {
                        return true;
                    }
                }
                false
            }
            TaskType::IntraBrokerReplica => {
                if let (Some(broker), Some(reports)) = (task.broker_id, dir_reports)
                    && let (Some(report), Some(target_dir)) = (
                        reports.get(&broker),
                        task.broker_id.and_then(|b| proposal.target_dirs.get(&b)),
                    )
                {
                    // The destination directory fell off the broker
                    return !report.has_dir(target_dir);
                }
                false
            }
        }
    }

    /// Log-dir reports for the brokers with an in-flight intra-broker move.
    async fn fetch_dir_reports(&self) -> Option<LogDirReport> {
        let brokers: BTreeSet<BrokerId> = self
            .tracker
            .in_progress_tasks(TaskType::IntraBrokerReplica)
            .iter()
            .filter_map(|t| t.broker_id)
            .collect();
        if brokers.is_empty() {
            return None;
        }

        match self
            .ctx
            .admin
            .describe_log_dirs(brokers.into_iter().collect())
            .await
        {
            Ok(reports) => Some(reports),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to describe log dirs; retrying next cycle");
                None
            }
        }
    }

    /// Detect tasks the cluster controller dropped in a race and submit them
    /// again.
    async fn maybe_resubmit_dropped(&mut self, task_type: TaskType) {
        match task_type {
            TaskType::InterBrokerReplica => {
                let active = match self.ctx.admin.list_ongoing_reassignments().await {
                    Ok(active) => active,
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not list ongoing reassignments");
                        return;
                    }
                };

                let dropped: Vec<ExecutionTask> = self
                    .tracker
                    .in_progress_tasks(TaskType::InterBrokerReplica)
                    .into_iter()
                    .filter(|t| {
                        t.state() == TaskState::InProgress && !active.contains(t.partition())
                    })
                    .collect();
                if dropped.is_empty() {
                    return;
                }

                tracing::warn!(
                    count = dropped.len(),
                    "Re-submitting reassignments dropped by the cluster controller"
                );
                let specs: Vec<ReassignmentSpec> =
                    dropped.iter().map(Self::spec_for_task).collect();
                match self.ctx.admin.submit_replica_reassignments(specs).await {
                    Ok(handles) => self.submissions.extend(handles),
                    Err(e) => tracing::warn!(error = %e, "Re-submission failed"),
                }
            }
            TaskType::IntraBrokerReplica => {
                let Some(reports) = self.fetch_dir_reports().await else {
                    return;
                };

                let dropped: Vec<ExecutionTask> = self
                    .tracker
                    .in_progress_tasks(TaskType::IntraBrokerReplica)
                    .into_iter()
                    .filter(|t| {
                        t.state() == TaskState::InProgress && Self::dir_move_dropped(t, &reports)
                    })
                    .collect();
                if dropped.is_empty() {
                    return;
                }

                tracing::warn!(count = dropped.len(), "Re-submitting dropped directory moves");
                let specs: Vec<ReassignmentSpec> =
                    dropped.iter().map(Self::spec_for_task).collect();
                match self.ctx.admin.submit_replica_reassignments(specs).await {
                    Ok(handles) => self.submissions.extend(handles),
                    Err(e) => tracing::warn!(error = %e, "Re-submission failed"),
                }
            }
            TaskType::Leader => {
                // Only re-trigger once no replica moves or elections are in
                // flight anywhere on the cluster.
                match self.ctx.admin.list_ongoing_reassignments().await {
                    Ok(active) if active.is_empty() => {}
                    _ => return,
                }
                match self
                    .ctx
                    .coordination
                    .list_ongoing_preferred_elections()
                    .await
                {
                    Ok(elections) if elections.is_empty() => {}
                    _ => return,
                }

                let stalled: Vec<TopicPartition> = self
                    .tracker
                    .in_progress_tasks(TaskType::Leader)
                    .into_iter()
                    .filter(|t| {
                        t.state() == TaskState::InProgress
                            && self
                                .cluster
                                .partition(t.partition())
                                .is_some_and(|info| info.leader != t.proposal.target_leader())
                    })
                    .map(|t| t.partition().clone())
                    .collect();
                if stalled.is_empty() {
                    return;
                }

                tracing::warn!(count = stalled.len(), "Re-triggering dropped leader elections");
                if let Err(e) = self
                    .ctx
                    .coordination
                    .trigger_preferred_elections(stalled)
                    .await
                {
                    tracing::warn!(error = %e, "Re-triggering elections failed");
                }
            }
        }
    }

    /// A directory move was dropped when the broker shows neither a pending
    /// future directory nor the target directory for the replica.
    fn dir_move_dropped(task: &ExecutionTask, reports: &LogDirReport) -> bool {
        let Some(broker) = task.broker_id else {
            return false;
        };
        let Some(target_dir) = task.proposal.target_dirs.get(&broker) else {
            return false;
        };
        let Some(replica) = reports
            .get(&broker)
            .and_then(|r| r.replicas.get(task.partition()))
        else {
            return false;
        };
        replica.future_dir.is_none() && replica.current_dir != *target_dir
    }

    fn maybe_alert_slow_tasks(&mut self, slow: &[ExecutionTask], now: DateTime<Utc>) {
        if slow.is_empty() {
            return;
        }

        let backoff_over = match self.last_slow_alert {
            None => true,
            Some(last) => {
                now.signed_duration_since(last).num_milliseconds()
                    >= SLOW_TASK_ALERT_BACKOFF_MS as i64
            }
        };
        if !backoff_over {
            return;
        }
        self.last_slow_alert = Some(now);

        let mut message = format!("{} execution tasks are making slow progress:", slow.len());
        for task in slow {
            let _ = write!(message, " {task}");
        }
        self.ctx.notifier.send_alert(&message);
    }

    /// Rollback of inter-broker tasks that died or were killed by a graceful
    /// stop: submit the cancelling reassignment, self-stop on real deaths,
    /// and for a pure user stop wait until the cluster let go of them.
    async fn handle_dead_or_stopped_inter(
        &mut self,
        dead: Vec<ExecutionTask>,
        stopped: Vec<ExecutionTask>,
    ) -> Result<(), ExecError> {
        if dead.is_empty() && stopped.is_empty() {
            return Ok(());
        }

        let cancelled: HashSet<TopicPartition> = dead
            .iter()
            .chain(stopped.iter())
            .map(|t| t.partition().clone())
            .collect();
        let cancels: Vec<ReassignmentSpec> = dead
            .iter()
            .chain(stopped.iter())
            .map(|t| t.proposal.rollback_spec())
            .collect();

        tracing::info!(
            count = cancels.len(),
            "Rolling back dead or stopped inter-broker movements"
        );
        if let Err(e) = self.ctx.admin.submit_replica_reassignments(cancels).await {
            tracing::warn!(error = %e, "Failed to submit rollback reassignments");
        }

        if !dead.is_empty() && self.ctx.session.stop_signal() == StopSignal::None {
            tracing::warn!(
                dead = dead.len(),
                "Execution hit dead tasks; initiating graceful self-stop"
            );
            self.ctx.session.request_stop(false);
            self.ctx.session.set_phase(ExecutorPhase::Stopping);
        }

        // A pure user stop blocks until the cancelled movements left the
        // cluster's active set. With real dead tasks we do not wait; a later
        // execution attempt refuses to start until the residue clears.
        if dead.is_empty() && self.ctx.session.stopped_by_user() {
            loop {
                match self.ctx.admin.list_ongoing_reassignments().await {
                    Ok(active) if active.is_disjoint(&cancelled) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not check rollback progress");
                    }
                }
                tokio::time::sleep(self.ctx.session.progress_interval()).await;
            }
        }

        Ok(())
    }

    async fn clear_finished_throttles(&self, finished: &[u64]) {
        if finished.is_empty() {
            return;
        }

        let completed: Vec<TopicPartition> = finished
            .iter()
            .filter_map(|id| self.tracker.task(*id))
            .map(|t| t.partition().clone())
            .collect();
        let still_in_progress: Vec<TopicPartition> = self
            .tracker
            .in_progress_partitions(TaskType::InterBrokerReplica)
            .into_iter()
            .collect();

        if let Err(e) = self
            .ctx
            .throttle
            .clear_throttles(&completed, &still_in_progress)
            .await
        {
            tracing::warn!(error = %e, "Failed to clear replication throttles");
        }
    }

    async fn narrow_sampling(&self) {
        if let Some(monitor) = &self.ctx.load_monitor {
            monitor.pause_sampling("execution started", true).await;
            monitor
                .set_sampling_mode(SamplingMode::BrokerMetricsOnly)
                .await;
            monitor.resume_sampling("execution started").await;
        }
    }

    async fn restore_sampling(&self) {
        if let Some(monitor) = &self.ctx.load_monitor {
            monitor.pause_sampling("execution finished", true).await;
            monitor.set_sampling_mode(SamplingMode::All).await;
            monitor.resume_sampling("execution finished").await;
        }
    }

    fn publish_status(&self) {
        let session = &self.ctx.session;
        self.ctx.status.publish(ExecutorStatus {
            phase: session.phase(),
            uuid: session.uuid(),
            reason: session.reason(),
            triggered_by_user: session.triggered_by_user(),
            inter_broker_cap: self.ctx.caps.cap(TaskType::InterBrokerReplica),
            intra_broker_cap: self.ctx.caps.cap(TaskType::IntraBrokerReplica),
            leader_cap: self.ctx.caps.cap(TaskType::Leader),
            inter_broker: self.tracker.counts(TaskType::InterBrokerReplica),
            intra_broker: self.tracker.counts(TaskType::IntraBrokerReplica),
            leader: self.tracker.counts(TaskType::Leader),
        });
    }

    /// Unconditional reset back to idle, then the terminal notification and
    /// observer callbacks.
    async fn cleanup_and_notify(self, result: Result<(), ExecError>) {
        let session = &self.ctx.session;
        let uuid = session.uuid();
        let stopped = session.stop_signal() != StopSignal::None;
        let stopped_by_user = session.stopped_by_user();
        let user_triggered = session.triggered_by_user();
        let summary = self.tracker.summary();

        self.restore_sampling().await;

        session.clear();
        self.ctx
            .status
            .publish(ExecutorStatus::no_task(&self.ctx.caps));

        let uuid_text = uuid
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        match &result {
            Err(e) => {
                self.ctx.notifier.send_alert(&format!(
                    "Execution {uuid_text} interrupted with exception {e}. {summary}"
                ));
            }
            Ok(()) if stopped => {
                metrics::record_execution_stopped(stopped_by_user);
                let who = if stopped_by_user { "user" } else { "self" };
                self.ctx.notifier.send_alert(&format!(
                    "Execution {uuid_text} stopped by {who}. {summary}"
                ));
            }
            Ok(()) => {
                self.ctx
                    .notifier
                    .send_notification(&format!("Execution {uuid_text} finished. {summary}"));
            }
        }

        let errored = stopped || result.is_err();
        if let Some(uuid) = uuid {
            if user_triggered {
                if let Some(user_tasks) = &self.ctx.user_tasks {
                    user_tasks.mark_finished(uuid, errored);
                }
            } else {
                self.ctx.anomaly.mark_self_healing_finished(uuid);
            }
        }
        self.ctx.anomaly.clear_ongoing_detection_time();
    }
}
