//! Executor phase, stop signal, session flags, and the published status
//! snapshot.

use crate::ExecError;
use crate::config::MIN_PROGRESS_CHECK_INTERVAL_MS;
use crate::tracker::{CapSet, TaskTypeCounts};
use crate::task::TaskType;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Top-level state of the supervisor, distinct from task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutorPhase {
    NoTask,
    Proposing,
    Starting,
    InterBrokerInProgress,
    IntraBrokerInProgress,
    LeaderInProgress,
    Stopping,
}

impl fmt::Display for ExecutorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorPhase::NoTask => write!(f, "NO_TASK"),
            ExecutorPhase::Proposing => write!(f, "PROPOSING"),
            ExecutorPhase::Starting => write!(f, "STARTING"),
            ExecutorPhase::InterBrokerInProgress => write!(f, "INTER_BROKER_IN_PROGRESS"),
            ExecutorPhase::IntraBrokerInProgress => write!(f, "INTRA_BROKER_IN_PROGRESS"),
            ExecutorPhase::LeaderInProgress => write!(f, "LEADER_IN_PROGRESS"),
            ExecutorPhase::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// Cooperative cancellation signal. Values only escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum StopSignal {
    None = 0,
    Graceful = 1,
    Forced = 2,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSignal::None => write!(f, "NONE"),
            StopSignal::Graceful => write!(f, "GRACEFUL"),
            StopSignal::Forced => write!(f, "FORCED"),
        }
    }
}

/// Monotone stop flag: compare-and-set escalation, no downgrades.
#[derive(Debug, Default)]
pub struct StopFlag(AtomicU8);

impl StopFlag {
    pub fn new() -> Self {
        Self(AtomicU8::new(StopSignal::None as u8))
    }

    pub fn get(&self) -> StopSignal {
        match self.0.load(Ordering::SeqCst) {
            0 => StopSignal::None,
            1 => StopSignal::Graceful,
            _ => StopSignal::Forced,
        }
    }

    /// Raise the signal to `target`. Returns false when the current value is
    /// already equal or harder.
    pub fn escalate(&self, target: StopSignal) -> bool {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            if current >= target as u8 {
                return false;
            }
            match self.0.compare_exchange(
                current,
                target as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Reset to NONE. Only used by the cleanup path between batches.
    pub fn clear(&self) {
        self.0.store(StopSignal::None as u8, Ordering::SeqCst);
    }
}

/// Informational mode of the batch being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    /// Rebalance proposals from the optimizer.
    Balancing,
    /// Full-assignment placement of every partition.
    Assigner,
}

/// Immutable point-in-time description of the executor, published after
/// every poll cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStatus {
    pub phase: ExecutorPhase,
    pub uuid: Option<Uuid>,
    pub reason: Option<String>,
    pub triggered_by_user: bool,
    pub inter_broker_cap: usize,
    pub intra_broker_cap: usize,
    pub leader_cap: usize,
    pub inter_broker: TaskTypeCounts,
    pub intra_broker: TaskTypeCounts,
    pub leader: TaskTypeCounts,
}

impl ExecutorStatus {
    /// The idle snapshot between batches.
    pub fn no_task(caps: &CapSet) -> Self {
        Self {
            phase: ExecutorPhase::NoTask,
            uuid: None,
            reason: None,
            triggered_by_user: false,
            inter_broker_cap: caps.cap(TaskType::InterBrokerReplica),
            intra_broker_cap: caps.cap(TaskType::IntraBrokerReplica),
            leader_cap: caps.cap(TaskType::Leader),
            inter_broker: TaskTypeCounts::default(),
            intra_broker: TaskTypeCounts::default(),
            leader: TaskTypeCounts::default(),
        }
    }
}

/// Single published reference to the current status snapshot. Readers get a
/// coherent point-in-time view; writers replace the whole value.
#[derive(Debug)]
pub struct StatusBoard {
    inner: RwLock<Arc<ExecutorStatus>>,
}

impl StatusBoard {
    pub fn new(initial: ExecutorStatus) -> Self {
        Self {
            inner: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn publish(&self, status: ExecutorStatus) {
        *self.inner.write() = Arc::new(status);
    }

    pub fn current(&self) -> Arc<ExecutorStatus> {
        self.inner.read().clone()
    }
}

/// Callable producing a fresh reason string for the current batch.
pub type ReasonProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Mutable session flags shared between the facade, the supervisor worker,
/// and the periodic tasks.
pub struct SessionState {
    default_progress_interval_ms: u64,
    phase: RwLock<ExecutorPhase>,
    uuid: Mutex<Option<Uuid>>,
    reason_provider: Mutex<Option<ReasonProvider>>,
    mode: Mutex<ExecutionMode>,
    has_ongoing: AtomicBool,
    stop: StopFlag,
    stopped_by_user: AtomicBool,
    triggered_by_user: AtomicBool,
    skip_auto_concurrency: AtomicBool,
    progress_check_interval_ms: AtomicU64,
}

impl SessionState {
    pub fn new(default_progress_interval_ms: u64) -> Self {
        Self {
            default_progress_interval_ms,
            phase: RwLock::new(ExecutorPhase::NoTask),
            uuid: Mutex::new(None),
            reason_provider: Mutex::new(None),
            mode: Mutex::new(ExecutionMode::Balancing),
            has_ongoing: AtomicBool::new(false),
            stop: StopFlag::new(),
            stopped_by_user: AtomicBool::new(false),
            triggered_by_user: AtomicBool::new(false),
            skip_auto_concurrency: AtomicBool::new(false),
            progress_check_interval_ms: AtomicU64::new(default_progress_interval_ms),
        }
    }

    pub fn phase(&self) -> ExecutorPhase {
        *self.phase.read()
    }

    pub fn set_phase(&self, phase: ExecutorPhase) {
        *self.phase.write() = phase;
    }

    pub fn uuid(&self) -> Option<Uuid> {
        *self.uuid.lock()
    }

    pub fn set_uuid(&self, uuid: Option<Uuid>) {
        *self.uuid.lock() = uuid;
    }

    pub fn set_reason_provider(&self, provider: Option<ReasonProvider>) {
        *self.reason_provider.lock() = provider;
    }

    /// A fresh reason string from the provider, if one is installed.
    pub fn reason(&self) -> Option<String> {
        self.reason_provider.lock().as_ref().map(|p| p())
    }

    pub fn mode(&self) -> ExecutionMode {
        *self.mode.lock()
    }

    pub fn set_mode(&self, mode: ExecutionMode) {
        *self.mode.lock() = mode;
    }

    pub fn has_ongoing(&self) -> bool {
        self.has_ongoing.load(Ordering::SeqCst)
    }

    pub fn set_has_ongoing(&self, ongoing: bool) {
        self.has_ongoing.store(ongoing, Ordering::SeqCst);
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.get()
    }

    /// Escalate the stop signal. Returns false when already stopping
    /// equally or harder.
    pub fn request_stop(&self, force: bool) -> bool {
        let target = if force {
            StopSignal::Forced
        } else {
            StopSignal::Graceful
        };
        self.stop.escalate(target)
    }

    pub fn stopped_by_user(&self) -> bool {
        self.stopped_by_user.load(Ordering::SeqCst)
    }

    pub fn set_stopped_by_user(&self, by_user: bool) {
        self.stopped_by_user.store(by_user, Ordering::SeqCst);
    }

    pub fn triggered_by_user(&self) -> bool {
        self.triggered_by_user.load(Ordering::SeqCst)
    }

    pub fn set_triggered_by_user(&self, by_user: bool) {
        self.triggered_by_user.store(by_user, Ordering::SeqCst);
    }

    pub fn skip_auto_concurrency(&self) -> bool {
        self.skip_auto_concurrency.load(Ordering::SeqCst)
    }

    pub fn set_skip_auto_concurrency(&self, skip: bool) {
        self.skip_auto_concurrency.store(skip, Ordering::SeqCst);
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_check_interval_ms.load(Ordering::SeqCst))
    }

    /// Set the requested poll interval; `None` restores the configured
    /// default. Values below the floor are rejected and leave the current
    /// value unchanged.
    pub fn set_requested_progress_interval(
        &self,
        interval_ms: Option<u64>,
    ) -> Result<(), ExecError> {
        let value = match interval_ms {
            None => self.default_progress_interval_ms,
            Some(ms) if ms < MIN_PROGRESS_CHECK_INTERVAL_MS => {
                return Err(ExecError::InvalidArgument {
                    context: "progress check interval".to_string(),
                    reason: format!(
                        "{ms} ms is below the floor of {MIN_PROGRESS_CHECK_INTERVAL_MS} ms"
                    ),
                });
            }
            Some(ms) => ms,
        };
        self.progress_check_interval_ms.store(value, Ordering::SeqCst);
        Ok(())
    }

    /// Reset everything batch-scoped back to idle. The requested progress
    /// interval survives across batches.
    pub fn clear(&self) {
        self.set_phase(ExecutorPhase::NoTask);
        self.set_uuid(None);
        self.set_reason_provider(None);
        self.set_mode(ExecutionMode::Balancing);
        self.set_has_ongoing(false);
        self.stop.clear();
        self.set_stopped_by_user(false);
        self.set_triggered_by_user(false);
        self.set_skip_auto_concurrency(false);
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("phase", &self.phase())
            .field("uuid", &self.uuid())
            .field("has_ongoing", &self.has_ongoing())
            .field("stop_signal", &self.stop_signal())
            .finish_non_exhaustive()
    }
}
