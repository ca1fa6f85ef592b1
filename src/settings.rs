use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Construction-time configuration for a [`DragMonitor`](crate::monitor::DragMonitor).
///
/// Every field has a default, so a partial JSON file only overrides what it
/// names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Coalescer wake interval. Defaults to one display frame (16 ms).
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    /// Pending moves that force an early wake. Also caps the move queue.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Idle objects kept per event pool.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    /// Accumulated path length, in pixels, before a drag can be confirmed.
    #[serde(default = "default_min_drag_distance")]
    pub min_drag_distance: f64,
    #[serde(default = "default_min_drag_duration_ms")]
    pub min_drag_duration_ms: u64,
    #[serde(default = "default_min_move_count")]
    pub min_move_count: u32,
    /// Straight-line distance from the press point required as well.
    /// `0.0` disables the check.
    #[serde(default)]
    pub min_displacement: f64,
    #[serde(default = "default_trajectory_capacity")]
    pub trajectory_capacity: usize,
    /// How long the files of an ended drag stay readable.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    #[serde(default)]
    pub health: HealthThresholds,
    /// Level hint for hosts calling [`crate::logging::init`]. The monitor
    /// itself never installs a subscriber.
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_batch_interval_ms() -> u64 {
    16
}

fn default_max_batch_size() -> usize {
    10
}

fn default_pool_capacity() -> usize {
    100
}

fn default_min_drag_distance() -> f64 {
    25.0
}

fn default_min_drag_duration_ms() -> u64 {
    50
}

fn default_min_move_count() -> u32 {
    5
}

fn default_trajectory_capacity() -> usize {
    100
}

fn default_grace_period_ms() -> u64 {
    500
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_interval_ms: default_batch_interval_ms(),
            max_batch_size: default_max_batch_size(),
            pool_capacity: default_pool_capacity(),
            min_drag_distance: default_min_drag_distance(),
            min_drag_duration_ms: default_min_drag_duration_ms(),
            min_move_count: default_min_move_count(),
            min_displacement: 0.0,
            trajectory_capacity: default_trajectory_capacity(),
            grace_period_ms: default_grace_period_ms(),
            health: HealthThresholds::default(),
            debug_logging: false,
        }
    }
}

impl MonitorConfig {
    /// Load from a JSON file. A missing or empty file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.batch_interval_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "batch_interval_ms must be at least 1".into(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(MonitorError::InvalidConfig(
                "max_batch_size must be at least 1".into(),
            ));
        }
        if self.trajectory_capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "trajectory_capacity must be at least 1".into(),
            ));
        }
        if !self.min_drag_distance.is_finite() || self.min_drag_distance < 0.0 {
            return Err(MonitorError::InvalidConfig(
                "min_drag_distance must be a non-negative number".into(),
            ));
        }
        if !self.min_displacement.is_finite() || self.min_displacement < 0.0 {
            return Err(MonitorError::InvalidConfig(
                "min_displacement must be a non-negative number".into(),
            ));
        }
        self.health.validate()
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms.max(1))
    }
}

/// Watchdog thresholds. Timeouts and latencies are in milliseconds, error
/// rates are fractions of processed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    #[serde(default = "default_event_timeout_ms")]
    pub event_timeout_ms: u64,
    #[serde(default = "default_critical_timeout_ms")]
    pub critical_timeout_ms: u64,
    #[serde(default = "default_high_latency_ms")]
    pub high_latency_ms: f64,
    #[serde(default = "default_critical_latency_ms")]
    pub critical_latency_ms: f64,
    #[serde(default = "default_degraded_error_rate")]
    pub degraded_error_rate: f64,
    #[serde(default = "default_unhealthy_error_rate")]
    pub unhealthy_error_rate: f64,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

fn default_event_timeout_ms() -> u64 {
    5_000
}

fn default_critical_timeout_ms() -> u64 {
    30_000
}

fn default_high_latency_ms() -> f64 {
    100.0
}

fn default_critical_latency_ms() -> f64 {
    500.0
}

fn default_degraded_error_rate() -> f64 {
    0.05
}

fn default_unhealthy_error_rate() -> f64 {
    0.10
}

fn default_check_interval_ms() -> u64 {
    1_000
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            event_timeout_ms: default_event_timeout_ms(),
            critical_timeout_ms: default_critical_timeout_ms(),
            high_latency_ms: default_high_latency_ms(),
            critical_latency_ms: default_critical_latency_ms(),
            degraded_error_rate: default_degraded_error_rate(),
            unhealthy_error_rate: default_unhealthy_error_rate(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

impl HealthThresholds {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.event_timeout_ms > self.critical_timeout_ms {
            return Err(MonitorError::InvalidConfig(
                "event_timeout_ms must not exceed critical_timeout_ms".into(),
            ));
        }
        if self.high_latency_ms > self.critical_latency_ms {
            return Err(MonitorError::InvalidConfig(
                "high_latency_ms must not exceed critical_latency_ms".into(),
            ));
        }
        if self.degraded_error_rate > self.unhealthy_error_rate {
            return Err(MonitorError::InvalidConfig(
                "degraded_error_rate must not exceed unhealthy_error_rate".into(),
            ));
        }
        if self.check_interval_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "check_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}
