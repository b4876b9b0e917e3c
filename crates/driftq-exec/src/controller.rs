//! The thread-safe public surface of the executor.

use crate::ExecError;
use crate::adjuster::ConcurrencyAdjuster;
use crate::config::ExecutorConfig;
use crate::history::BrokerHistory;
use crate::metrics;
use crate::ordering::OrderingStrategy;
use crate::proposal::RebalanceProposal;
use crate::state::{
    ExecutionMode, ExecutorPhase, ExecutorStatus, ReasonProvider, SessionState, StatusBoard,
};
use crate::supervisor::{Supervisor, SupervisorContext};
use crate::task::TaskType;
use crate::tracker::{CapSet, TaskTracker};
use chrono::Utc;
use driftq_cluster::traits::{
    AnomalyObserver, ClusterAdmin, CoordinationStore, LoadMonitor, MetadataClient, Notifier,
    ThrottleHelper, UserTaskObserver,
};
use driftq_cluster::types::{BrokerId, ClusterSnapshot};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// External collaborators injected at construction.
pub struct ExecutorDeps {
    pub admin: Arc<dyn ClusterAdmin>,
    pub metadata: Arc<dyn MetadataClient>,
    pub coordination: Arc<dyn CoordinationStore>,
    pub throttle: Arc<dyn ThrottleHelper>,
    pub notifier: Arc<dyn Notifier>,
    pub anomaly: Arc<dyn AnomalyObserver>,
    pub user_tasks: Option<Arc<dyn UserTaskObserver>>,
}

/// One batch of proposals and its execution parameters.
pub struct ExecutionRequest {
    pub proposals: Vec<RebalanceProposal>,
    /// Required: the adjuster and the sampling handoff need it.
    pub load_monitor: Option<Arc<dyn LoadMonitor>>,
    /// Brokers being evacuated; exempt from concurrency caps and recorded in
    /// the removal history.
    pub removed_brokers: HashSet<BrokerId>,
    /// Brokers being demoted; exempt from concurrency caps and recorded in
    /// the demotion history.
    pub demoted_brokers: HashSet<BrokerId>,
    pub mode: ExecutionMode,
    pub ordering: OrderingStrategy,
    /// Per-batch cap overrides; `None` keeps the current value.
    pub inter_broker_cap: Option<usize>,
    pub intra_broker_cap: Option<usize>,
    pub leader_cap: Option<usize>,
    /// Per-batch poll-interval override, still subject to the floor.
    pub progress_check_interval_ms: Option<u64>,
}

impl ExecutionRequest {
    pub fn new(proposals: Vec<RebalanceProposal>, load_monitor: Arc<dyn LoadMonitor>) -> Self {
        Self {
            proposals,
            load_monitor: Some(load_monitor),
            removed_brokers: HashSet::new(),
            demoted_brokers: HashSet::new(),
            mode: ExecutionMode::Balancing,
            ordering: OrderingStrategy::default(),
            inter_broker_cap: None,
            intra_broker_cap: None,
            leader_cap: None,
            progress_check_interval_ms: None,
        }
    }
}

/// The execution controller.
///
/// Owns the session, the concurrency caps, the broker history, and the
/// single worker that runs the supervision loop. Lifecycle transitions are
/// serialized by a facade mutex; cap and interval setters may be called from
/// any thread at any time.
pub struct Executor {
    config: ExecutorConfig,
    admin: Arc<dyn ClusterAdmin>,
    metadata: Arc<dyn MetadataClient>,
    coordination: Arc<dyn CoordinationStore>,
    throttle: Arc<dyn ThrottleHelper>,
    notifier: Arc<dyn Notifier>,
    anomaly: Arc<dyn AnomalyObserver>,
    user_tasks: Option<Arc<dyn UserTaskObserver>>,
    session: Arc<SessionState>,
    status: Arc<StatusBoard>,
    caps: Arc<CapSet>,
    history: Arc<BrokerHistory>,
    monitor_slot: Arc<Mutex<Option<Arc<dyn LoadMonitor>>>>,
    adjuster_enabled: Arc<AtomicBool>,
    /// Serializes lifecycle transitions: one at a time.
    facade: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    periodic: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Executor {
    /// Build the controller and start its periodic tasks (concurrency
    /// adjuster and history sweeper). Metric gauges are registered once,
    /// here.
    pub fn new(config: ExecutorConfig, deps: ExecutorDeps) -> Result<Self, ExecError> {
        config.validate()?;

        let caps = Arc::new(CapSet::new(
            config.inter_broker_partition_movement_cap,
            config.intra_broker_partition_movement_cap,
            config.leader_movement_cap,
        ));
        for task_type in TaskType::ALL {
            metrics::set_cap_gauge(task_type, caps.cap(task_type));
        }

        let session = Arc::new(SessionState::new(
            config.execution_progress_check_interval_ms,
        ));
        let status = Arc::new(StatusBoard::new(ExecutorStatus::no_task(&caps)));
        let history = Arc::new(BrokerHistory::new(
            config.demotion_history_retention_ms,
            config.removal_history_retention_ms,
        ));
        let monitor_slot: Arc<Mutex<Option<Arc<dyn LoadMonitor>>>> = Arc::new(Mutex::new(None));
        let adjuster_enabled = Arc::new(AtomicBool::new(config.concurrency_adjuster_enabled));

        let sweeper =
            history.spawn_sweeper(Duration::from_millis(config.history_sweep_interval_ms));
        let adjuster = ConcurrencyAdjuster::new(
            session.clone(),
            caps.clone(),
            monitor_slot.clone(),
            adjuster_enabled.clone(),
            config.watermarks,
            config.concurrency_adjuster_max_partition_movements_per_broker,
        )
        .spawn(Duration::from_millis(config.concurrency_adjuster_interval_ms));

        Ok(Self {
            config,
            admin: deps.admin,
            metadata: deps.metadata,
            coordination: deps.coordination,
            throttle: deps.throttle,
            notifier: deps.notifier,
            anomaly: deps.anomaly,
            user_tasks: deps.user_tasks,
            session,
            status,
            caps,
            history,
            monitor_slot,
            adjuster_enabled,
            facade: Mutex::new(()),
            worker: Mutex::new(None),
            periodic: Mutex::new(vec![sweeper, adjuster]),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Open a proposal session for a new batch.
    pub fn begin_proposing(
        &self,
        uuid: Uuid,
        reason_provider: ReasonProvider,
        user_triggered: bool,
    ) -> Result<(), ExecError> {
        let _guard = self.facade.lock();

        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ExecError::IllegalState {
                context: "begin_proposing".to_string(),
                reason: "executor is shut down".to_string(),
            });
        }
        if self.session.phase() != ExecutorPhase::NoTask || self.session.has_ongoing() {
            return Err(ExecError::OngoingExecution {
                reason: format!("executor is in {}", self.session.phase()),
            });
        }

        self.session.set_uuid(Some(uuid));
        self.session.set_reason_provider(Some(reason_provider));
        self.session.set_triggered_by_user(user_triggered);
        self.session.set_phase(ExecutorPhase::Proposing);
        self.publish_session_status();

        tracing::info!(%uuid, user_triggered, "Opened proposal session");
        Ok(())
    }

    /// Close a proposal session that produced nothing. A uuid mismatch is a
    /// silent no-op apart from a warning.
    pub fn fail_proposing(&self, uuid: Uuid) {
        let _guard = self.facade.lock();

        if self.session.phase() != ExecutorPhase::Proposing {
            tracing::warn!(%uuid, "fail_proposing called outside a proposal session");
            return;
        }
        if self.session.uuid() != Some(uuid) {
            tracing::warn!(
                %uuid,
                current = ?self.session.uuid(),
                "fail_proposing uuid mismatch"
            );
            return;
        }

        self.session.set_uuid(None);
        self.session.set_reason_provider(None);
        self.session.set_triggered_by_user(false);
        self.session.set_phase(ExecutorPhase::NoTask);
        self.publish_session_status();

        tracing::info!(%uuid, "Proposal session abandoned");
    }

    /// Execute a batch of proposals.
    pub async fn execute(&self, request: ExecutionRequest, uuid: Uuid) -> Result<(), ExecError> {
        self.launch(request, uuid, false).await
    }

    /// Execute a broker-demotion batch: demotion history is recorded and
    /// concurrency auto-adjustment is disabled for the whole batch.
    pub async fn execute_demote(
        &self,
        request: ExecutionRequest,
        uuid: Uuid,
    ) -> Result<(), ExecError> {
        self.launch(request, uuid, true).await
    }

    async fn launch(
        &self,
        request: ExecutionRequest,
        uuid: Uuid,
        demote: bool,
    ) -> Result<(), ExecError> {
        // Claim the session: validations that must not interleave
        {
            let _guard = self.facade.lock();

            if self.shut_down.load(Ordering::SeqCst) {
                return Err(ExecError::IllegalState {
                    context: "execute".to_string(),
                    reason: "executor is shut down".to_string(),
                });
            }
            if self.session.has_ongoing() {
                return Err(ExecError::OngoingExecution {
                    reason: "another batch is already executing".to_string(),
                });
            }
            if self.session.phase() != ExecutorPhase::Proposing {
                return Err(ExecError::IllegalState {
                    context: "execute".to_string(),
                    reason: format!("no proposal session open (phase {})", self.session.phase()),
                });
            }
            if self.session.uuid() != Some(uuid) {
                return Err(ExecError::IllegalState {
                    context: "execute".to_string(),
                    reason: format!("uuid {uuid} does not match the proposal session"),
                });
            }
            if request.load_monitor.is_none() {
                return Err(ExecError::InvalidArgument {
                    context: "execute".to_string(),
                    reason: "a load monitor must be provided".to_string(),
                });
            }
            if let Some(ms) = request.progress_check_interval_ms {
                self.session.set_requested_progress_interval(Some(ms))?;
            }

            // Claims exclusivity against concurrent execute calls
            self.session.set_phase(ExecutorPhase::Starting);
        }

        // Entry preconditions against the live cluster, before has_ongoing
        let cluster = match self.preflight().await {
            Ok(cluster) => cluster,
            Err(e) => {
                // Leave the proposal session as it was
                self.session.set_phase(ExecutorPhase::Proposing);
                self.publish_session_status();
                return Err(e);
            }
        };

        self.admit_batch(&request, uuid, demote);

        let exempt: HashSet<BrokerId> = request
            .removed_brokers
            .union(&request.demoted_brokers)
            .copied()
            .collect();
        let mut tracker = TaskTracker::new(self.caps.clone());
        tracker.add_proposals(request.proposals, exempt, &cluster, &request.ordering);

        let supervisor = Supervisor::new(
            SupervisorContext {
                admin: self.admin.clone(),
                metadata: self.metadata.clone(),
                coordination: self.coordination.clone(),
                load_monitor: request.load_monitor,
                throttle: self.throttle.clone(),
                notifier: self.notifier.clone(),
                anomaly: self.anomaly.clone(),
                user_tasks: self.user_tasks.clone(),
                session: self.session.clone(),
                status: self.status.clone(),
                caps: self.caps.clone(),
                config: self.config.clone(),
            },
            tracker,
            cluster,
        );
        *self.worker.lock() = Some(tokio::spawn(supervisor.run()));

        tracing::info!(%uuid, demote, "Execution started");
        Ok(())
    }

    /// Verify nothing else is moving replicas, directories, or leadership on
    /// the cluster. Raises OngoingExecution without side effects otherwise.
    async fn preflight(&self) -> Result<ClusterSnapshot, ExecError> {
        let ongoing = self
            .admin
            .list_ongoing_reassignments()
            .await
            .map_err(|e| ExecError::preflight(e, "listing ongoing reassignments"))?;
        if !ongoing.is_empty() {
            return Err(ExecError::OngoingExecution {
                reason: format!(
                    "{} partitions are already being reassigned by someone else",
                    ongoing.len()
                ),
            });
        }

        let cluster = self
            .metadata
            .refresh()
            .await
            .map_err(|e| ExecError::preflight(e, "refreshing cluster metadata"))?;

        let brokers: Vec<BrokerId> = cluster.brokers.iter().copied().collect();
        let dir_reports = self
            .admin
            .describe_log_dirs(brokers)
            .await
            .map_err(|e| ExecError::preflight(e, "describing log dirs"))?;
        let dir_move_in_flight = dir_reports
            .values()
            .any(|report| report.replicas.values().any(|r| r.future_dir.is_some()));
        if dir_move_in_flight {
            return Err(ExecError::OngoingExecution {
                reason: "an intra-broker replica move is already in flight".to_string(),
            });
        }

        let elections = self
            .coordination
            .list_ongoing_preferred_elections()
            .await
            .map_err(|e| ExecError::preflight(e, "listing ongoing elections"))?;
        if !elections.is_empty() {
            return Err(ExecError::OngoingExecution {
                reason: "a preferred-leader election is already in flight".to_string(),
            });
        }

        Ok(cluster)
    }

    /// Point of no return: mark the batch ongoing and wire up everything the
    /// periodic tasks and observers need.
    fn admit_batch(&self, request: &ExecutionRequest, uuid: Uuid, demote: bool) {
        {
            let _guard = self.facade.lock();
            self.session.set_has_ongoing(true);
            self.session.set_mode(request.mode);
            self.session.set_skip_auto_concurrency(demote);
        }
        self.publish_session_status();

        let now_ms = Utc::now().timestamp_millis();
        for broker in &request.removed_brokers {
            self.history.note_removal_start(*broker, now_ms);
        }
        for broker in &request.demoted_brokers {
            self.history.note_demotion_start(*broker, now_ms);
        }

        if let Some(cap) = request.inter_broker_cap {
            self.apply_cap(TaskType::InterBrokerReplica, cap);
        }
        if let Some(cap) = request.intra_broker_cap {
            self.apply_cap(TaskType::IntraBrokerReplica, cap);
        }
        if let Some(cap) = request.leader_cap {
            self.apply_cap(TaskType::Leader, cap);
        }

        *self.monitor_slot.lock() = request.load_monitor.clone();

        metrics::record_execution_started(request.mode == ExecutionMode::Assigner);
        if self.session.triggered_by_user() {
            if let Some(user_tasks) = &self.user_tasks {
                user_tasks.mark_began(uuid);
            }
        } else {
            self.anomaly.reset_unfixable_goals();
        }
    }

    /// Request a stop of the in-flight batch. Returns false when nothing is
    /// running or the signal is already equal or harder; a forced request
    /// overrides a graceful one.
    pub fn stop_execution(&self, force: bool) -> bool {
        let _guard = self.facade.lock();

        if !self.session.has_ongoing() {
            return false;
        }

        let escalated = self.session.request_stop(force);
        if escalated {
            self.session.set_stopped_by_user(true);
            self.session.set_phase(ExecutorPhase::Stopping);
            tracing::info!(force, "Stop requested for the current execution");
        }
        escalated
    }

    /// Toggle concurrency auto-adjustment. Only inter-broker movements
    /// support it.
    pub fn set_concurrency_adjuster(
        &self,
        task_type: TaskType,
        enabled: bool,
    ) -> Result<(), ExecError> {
        if task_type != TaskType::InterBrokerReplica {
            return Err(ExecError::UnsupportedTaskType {
                task_type: task_type.to_string(),
            });
        }
        self.adjuster_enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "Concurrency adjuster toggled");
        Ok(())
    }

    pub fn set_inter_broker_move_cap(&self, cap: usize) -> Result<(), ExecError> {
        self.set_cap(TaskType::InterBrokerReplica, cap)
    }

    pub fn set_intra_broker_move_cap(&self, cap: usize) -> Result<(), ExecError> {
        self.set_cap(TaskType::IntraBrokerReplica, cap)
    }

    pub fn set_leader_movement_cap(&self, cap: usize) -> Result<(), ExecError> {
        self.set_cap(TaskType::Leader, cap)
    }

    fn set_cap(&self, task_type: TaskType, cap: usize) -> Result<(), ExecError> {
        if cap == 0 {
            return Err(ExecError::InvalidArgument {
                context: format!("{task_type} movement cap"),
                reason: "must be at least 1".to_string(),
            });
        }
        self.apply_cap(task_type, cap);
        Ok(())
    }

    fn apply_cap(&self, task_type: TaskType, cap: usize) {
        self.caps.set_cap(task_type, cap);
        metrics::set_cap_gauge(task_type, cap);
        tracing::info!(%task_type, cap, "Movement cap updated");
    }

    /// Set the requested poll interval; `None` restores the configured
    /// default. Values below the 5 000 ms floor are rejected.
    pub fn set_requested_progress_check_interval(
        &self,
        interval_ms: Option<u64>,
    ) -> Result<(), ExecError> {
        self.session.set_requested_progress_interval(interval_ms)
    }

    /// The current immutable status snapshot.
    pub fn status(&self) -> Arc<ExecutorStatus> {
        self.status.current()
    }

    /// The demotion/removal history, shared with callers that need to mark
    /// entries permanent or drop them.
    pub fn broker_history(&self) -> Arc<BrokerHistory> {
        self.history.clone()
    }

    /// Stop accepting batches, wait for the in-flight worker to finish
    /// normally, then cancel the periodic tasks. Cluster clients are
    /// released on drop.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);

        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Supervisor worker ended abnormally");
            }
        }

        for handle in self.periodic.lock().drain(..) {
            handle.abort();
        }

        tracing::info!("Executor shut down");
    }

    /// Publish a snapshot reflecting session state only, used outside the
    /// supervision loop where no tracker exists.
    fn publish_session_status(&self) {
        let mut status = ExecutorStatus::no_task(&self.caps);
        status.phase = self.session.phase();
        status.uuid = self.session.uuid();
        status.reason = self.session.reason();
        status.triggered_by_user = self.session.triggered_by_user();
        self.status.publish(status);
    }
}
