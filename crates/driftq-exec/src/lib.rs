//! DriftQ execution controller.
//!
//! Given a batch of rebalance proposals, the controller drives a
//! partitioned, replicated log cluster from its current state to the target
//! state in three strictly ordered phases: inter-broker replica movements,
//! intra-broker directory movements, then leadership transfers. It enforces
//! per-broker concurrency caps, tunes the inter-broker cap from live broker
//! metrics, detects stalled and dead tasks, and supports cooperative or
//! forced cancellation.

pub mod adjuster;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod ordering;
pub mod proposal;
pub mod state;
pub mod task;
pub mod telemetry;
pub mod tracker;

mod metrics;
mod supervisor;

pub use config::{ExecutorConfig, LoadWatermarks};
pub use controller::{ExecutionRequest, Executor, ExecutorDeps};
pub use error::ExecError;
pub use proposal::RebalanceProposal;
pub use state::{ExecutionMode, ExecutorPhase, ExecutorStatus, StopSignal};
pub use task::{TaskState, TaskType};

// Re-export the cluster model so callers need only this crate
pub use driftq_cluster as cluster;

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
