//! Observability counters and gauges.
//!
//! Registered against the default prometheus registry exactly once, on first
//! touch; the owning process scrapes or gathers them however it likes.

use crate::task::TaskType;
use once_cell::sync::Lazy;
use prometheus::{
    IntCounter, IntGauge, register_int_counter, register_int_gauge,
};

static EXECUTION_STOPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "driftq_execution_stopped",
        "Executions stopped before completing"
    )
    .unwrap()
});

static EXECUTION_STOPPED_BY_USER: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "driftq_execution_stopped_by_user",
        "Executions stopped by an explicit user request"
    )
    .unwrap()
});

static STARTED_ASSIGNER_MODE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "driftq_executions_started_assigner_mode",
        "Executions started in full-assigner mode"
    )
    .unwrap()
});

static STARTED_BALANCING_MODE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "driftq_executions_started_balancing_mode",
        "Executions started in balancing mode"
    )
    .unwrap()
});

static INTER_BROKER_CAP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "driftq_inter_broker_movement_cap",
        "Per-broker cap on concurrent inter-broker replica movements"
    )
    .unwrap()
});

static INTRA_BROKER_CAP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "driftq_intra_broker_movement_cap",
        "Per-broker cap on concurrent intra-broker replica movements"
    )
    .unwrap()
});

static LEADER_CAP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "driftq_leader_movement_cap",
        "Global cap on concurrent leadership movements"
    )
    .unwrap()
});

pub(crate) fn record_execution_stopped(by_user: bool) {
    EXECUTION_STOPPED.inc();
    if by_user {
        EXECUTION_STOPPED_BY_USER.inc();
    }
}

pub(crate) fn record_execution_started(assigner_mode: bool) {
    if assigner_mode {
        STARTED_ASSIGNER_MODE.inc();
    } else {
        STARTED_BALANCING_MODE.inc();
    }
}

pub(crate) fn set_cap_gauge(task_type: TaskType, cap: usize) {
    let gauge = match task_type {
        TaskType::InterBrokerReplica => &INTER_BROKER_CAP,
        TaskType::IntraBrokerReplica => &INTRA_BROKER_CAP,
        TaskType::Leader => &LEADER_CAP,
    };
    gauge.set(cap as i64);
}
