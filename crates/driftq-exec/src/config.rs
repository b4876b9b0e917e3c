//! Executor configuration.

use crate::ExecError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hard floor for the progress-check interval.
pub const MIN_PROGRESS_CHECK_INTERVAL_MS: u64 = 5_000;

/// Minimum spacing between slow-task alerts, per executor.
pub const SLOW_TASK_ALERT_BACKOFF_MS: u64 = 60_000;

/// How long a submission future is probed for a rejection error before the
/// task is considered still in flight.
pub const FUTURE_ERROR_PROBE_TIMEOUT_MS: u64 = 10_000;

/// AIMD watermark thresholds for the concurrency adjuster.
///
/// A single broker above a high watermark halves the inter-broker cap; all
/// brokers below the low watermarks raise it by one, up to the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadWatermarks {
    pub cpu_high_percent: f64,
    pub cpu_low_percent: f64,
    pub request_queue_time_high_ms: f64,
    pub request_queue_time_low_ms: f64,
}

impl Default for LoadWatermarks {
    fn default() -> Self {
        Self {
            cpu_high_percent: 90.0,
            cpu_low_percent: 45.0,
            request_queue_time_high_ms: 1_000.0,
            request_queue_time_low_ms: 400.0,
        }
    }
}

/// Configuration for the execution controller.
///
/// Every field has a default so a partial YAML file (or none at all) is
/// enough to construct a working configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Poll period of the supervision loop. Floor 5 000 ms.
    pub execution_progress_check_interval_ms: u64,
    /// A leadership transfer older than this is declared dead.
    pub leader_movement_timeout_ms: u64,
    /// Retention of the demotion history map.
    pub demotion_history_retention_ms: i64,
    /// Retention of the removal history map.
    pub removal_history_retention_ms: i64,
    /// Cadence of the history sweeper.
    pub history_sweep_interval_ms: u64,
    /// Default on/off state of the inter-broker concurrency adjuster.
    pub concurrency_adjuster_enabled: bool,
    /// Tick period of the concurrency adjuster.
    pub concurrency_adjuster_interval_ms: u64,
    /// Hard ceiling for the adjusted inter-broker cap.
    pub concurrency_adjuster_max_partition_movements_per_broker: usize,
    /// Initial per-broker cap on concurrent inter-broker movements.
    pub inter_broker_partition_movement_cap: usize,
    /// Initial per-broker cap on concurrent intra-broker movements.
    pub intra_broker_partition_movement_cap: usize,
    /// Global cap on concurrent leadership movements.
    pub leader_movement_cap: usize,
    /// An in-progress task older than this triggers a slow-task alert.
    pub slow_task_alert_threshold_ms: u64,
    /// Re-submit tasks the cluster controller dropped in a race. May be
    /// unnecessary on newer broker versions.
    pub resubmit_dropped_tasks: bool,
    /// Whether the coordination store requires authenticated access.
    pub zookeeper_security_enabled: bool,
    pub watermarks: LoadWatermarks,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            execution_progress_check_interval_ms: 10_000,
            leader_movement_timeout_ms: 180_000,
            demotion_history_retention_ms: 3_600_000,
            removal_history_retention_ms: 3_600_000,
            history_sweep_interval_ms: 60_000,
            concurrency_adjuster_enabled: true,
            concurrency_adjuster_interval_ms: 30_000,
            concurrency_adjuster_max_partition_movements_per_broker: 12,
            inter_broker_partition_movement_cap: 5,
            intra_broker_partition_movement_cap: 2,
            leader_movement_cap: 1_000,
            slow_task_alert_threshold_ms: 300_000,
            resubmit_dropped_tasks: true,
            zookeeper_security_enabled: false,
            watermarks: LoadWatermarks::default(),
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from a YAML file, falling back to defaults for
    /// absent keys.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ExecError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ExecError::InvalidArgument {
            context: format!("reading executor config {}", path.display()),
            reason: e.to_string(),
        })?;

        let config: ExecutorConfig =
            serde_yaml::from_str(&contents).map_err(|e| ExecError::InvalidArgument {
                context: format!("parsing executor config {}", path.display()),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency. Called by the controller at construction.
    pub fn validate(&self) -> Result<(), ExecError> {
        if self.execution_progress_check_interval_ms < MIN_PROGRESS_CHECK_INTERVAL_MS {
            return Err(ExecError::InvalidArgument {
                context: "execution_progress_check_interval_ms".to_string(),
                reason: format!(
                    "{} is below the floor of {MIN_PROGRESS_CHECK_INTERVAL_MS} ms",
                    self.execution_progress_check_interval_ms
                ),
            });
        }

        for (name, cap) in [
            (
                "inter_broker_partition_movement_cap",
                self.inter_broker_partition_movement_cap,
            ),
            (
                "intra_broker_partition_movement_cap",
                self.intra_broker_partition_movement_cap,
            ),
            ("leader_movement_cap", self.leader_movement_cap),
            (
                "concurrency_adjuster_max_partition_movements_per_broker",
                self.concurrency_adjuster_max_partition_movements_per_broker,
            ),
        ] {
            if cap == 0 {
                return Err(ExecError::InvalidArgument {
                    context: name.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        let w = &self.watermarks;
        if w.cpu_high_percent <= w.cpu_low_percent
            || w.request_queue_time_high_ms <= w.request_queue_time_low_ms
        {
            return Err(ExecError::InvalidArgument {
                context: "watermarks".to_string(),
                reason: "high watermarks must exceed low watermarks".to_string(),
            });
        }

        if self.demotion_history_retention_ms <= 0 || self.removal_history_retention_ms <= 0 {
            return Err(ExecError::InvalidArgument {
                context: "history retention".to_string(),
                reason: "retention must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExecutorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.execution_progress_check_interval_ms, 10_000);
        assert_eq!(config.leader_movement_cap, 1_000);
        assert!(config.resubmit_dropped_tasks);
    }

    #[test]
    fn test_interval_below_floor_rejected() {
        let config = ExecutorConfig {
            execution_progress_check_interval_ms: 1_000,
            ..ExecutorConfig::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ExecError::InvalidArgument { .. })));
    }

    #[test]
    fn test_zero_cap_rejected() {
        let config = ExecutorConfig {
            intra_broker_partition_movement_cap: 0,
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_watermarks_rejected() {
        let config = ExecutorConfig {
            watermarks: LoadWatermarks {
                cpu_high_percent: 40.0,
                cpu_low_percent: 90.0,
                ..LoadWatermarks::default()
            },
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file_partial_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "execution_progress_check_interval_ms: 7500\nleader_movement_cap: 50"
        )
        .unwrap();

        let config = ExecutorConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.execution_progress_check_interval_ms, 7_500);
        assert_eq!(config.leader_movement_cap, 50);
        // Unspecified keys fall back to defaults
        assert_eq!(config.leader_movement_timeout_ms, 180_000);
    }

    #[test]
    fn test_from_yaml_file_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "execution_progress_check_interval_ms: 100").unwrap();

        let result = ExecutorConfig::from_yaml_file(file.path());
        assert!(matches!(result, Err(ExecError::InvalidArgument { .. })));
    }

    #[test]
    fn test_from_yaml_file_missing_file() {
        let result = ExecutorConfig::from_yaml_file("/nonexistent/executor.yaml");
        assert!(matches!(result, Err(ExecError::InvalidArgument { .. })));
    }
}
