//! DriftQ cluster model and external-collaborator contracts.
//!
//! This crate defines how the executor sees the cluster: the value types
//! returned by metadata refreshes and log-dir queries, the submission handle
//! recorded per reassignment, and the trait contracts for the admin API,
//! coordination store, load monitor, throttling, and observer callbacks.

pub mod error;
pub mod submission;
pub mod traits;
pub mod types;

pub use error::ClusterError;
pub use submission::SubmissionHandle;

// Re-export the contracts for ergonomic downstream use
pub use traits::{
    AnomalyObserver, ClusterAdmin, CoordinationStore, LoadMonitor, LogNotifier, MetadataClient,
    Notifier, ThrottleHelper, UserTaskObserver,
};

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
