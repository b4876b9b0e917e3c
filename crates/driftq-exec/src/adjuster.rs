//! Adaptive concurrency control for inter-broker movements.

use crate::config::LoadWatermarks;
use crate::metrics;
use crate::state::{ExecutorPhase, SessionState};
use crate::task::TaskType;
use crate::tracker::CapSet;
use driftq_cluster::traits::LoadMonitor;
use driftq_cluster::types::{BrokerId, BrokerLoad};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// AIMD recommendation from live broker metrics.
///
/// Multiplicative decrease when any broker crosses a high watermark,
/// additive increase when every broker sits below the low watermarks, no
/// recommendation otherwise. The result is `None` when it would not change
/// the current cap.
pub fn recommended_concurrency(
    loads: &HashMap<BrokerId, BrokerLoad>,
    watermarks: &LoadWatermarks,
    current_cap: usize,
    max_cap: usize,
) -> Option<usize> {
    if loads.is_empty() {
        return None;
    }

    let any_high = loads.values().any(|load| {
        load.cpu_percent >= watermarks.cpu_high_percent
            || load.request_queue_time_ms >= watermarks.request_queue_time_high_ms
    });
    let all_low = loads.values().all(|load| {
        load.cpu_percent < watermarks.cpu_low_percent
            && load.request_queue_time_ms < watermarks.request_queue_time_low_ms
    });

    let candidate = if any_high {
        std::cmp::max(1, current_cap / 2)
    } else if all_low {
        std::cmp::min(max_cap, current_cap + 1)
    } else {
        current_cap
    };

    (candidate != current_cap).then_some(candidate)
}

/// Periodic controller that applies [`recommended_concurrency`] to the
/// inter-broker cap while an inter-broker phase is in flight.
///
/// The adjuster never runs during demote operations
/// (`skip_auto_concurrency`) and does nothing in any other phase.
pub struct ConcurrencyAdjuster {
    session: Arc<SessionState>,
    caps: Arc<CapSet>,
    monitor_slot: Arc<Mutex<Option<Arc<dyn LoadMonitor>>>>,
    enabled: Arc<AtomicBool>,
    watermarks: LoadWatermarks,
    max_cap: usize,
}

impl ConcurrencyAdjuster {
    pub fn new(
        session: Arc<SessionState>,
        caps: Arc<CapSet>,
        monitor_slot: Arc<Mutex<Option<Arc<dyn LoadMonitor>>>>,
        enabled: Arc<AtomicBool>,
        watermarks: LoadWatermarks,
        max_cap: usize,
    ) -> Self {
        Self {
            session,
            caps,
            monitor_slot,
            enabled,
            watermarks,
            max_cap,
        }
    }

    /// Start the adjuster on its own timer.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                self.tick().await;
            }
        })
    }

    async fn tick(&self) {
        if !self.enabled.load(Ordering::SeqCst)
            || self.session.phase() != ExecutorPhase::InterBrokerInProgress
            || self.session.skip_auto_concurrency()
        {
            return;
        }

        let monitor = self.monitor_slot.lock().clone();
        let Some(monitor) = monitor else {
            return;
        };

        let loads = match monitor.broker_load().await {
            Ok(loads) => loads,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read broker load; keeping current cap");
                return;
            }
        };

        let current_cap = self.caps.cap(TaskType::InterBrokerReplica);
        if let Some(new_cap) =
            recommended_concurrency(&loads, &self.watermarks, current_cap, self.max_cap)
        {
            self.caps.set_cap(TaskType::InterBrokerReplica, new_cap);
            metrics::set_cap_gauge(TaskType::InterBrokerReplica, new_cap);
            tracing::info!(
                old_cap = current_cap,
                new_cap,
                "Adjusted inter-broker movement cap from broker load"
            );
        }
    }
}
