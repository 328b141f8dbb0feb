//! Supervisor configuration.

use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::constants::{bounds, defaults};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Inclusive range of accepted values for a task resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBounds {
    pub min: u64,
    pub max: u64,
}

impl ResourceBounds {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Configuration for a [`Supervisor`](crate::Supervisor).
///
/// Set once at startup from the orchestrator's plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorOptions {
    /// Roots (besides the task's allocation directory) that images may live under.
    pub image_paths: Vec<PathBuf>,
    pub memory_mb: ResourceBounds,
    pub cpu_shares: ResourceBounds,
    /// Virtualization binary used when a task does not name one.
    pub qemu_system_bin: String,
    pub fingerprint_period_secs: u64,
    /// Directory for the supervisor's own log file. No file logging when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            image_paths: Vec::new(),
            memory_mb: ResourceBounds::new(bounds::MEMORY_MB_MIN, bounds::MEMORY_MB_MAX),
            cpu_shares: ResourceBounds::new(bounds::CPU_SHARES_MIN, bounds::CPU_SHARES_MAX),
            qemu_system_bin: defaults::QEMU_SYSTEM_BIN.to_string(),
            fingerprint_period_secs: defaults::FINGERPRINT_PERIOD_SECS,
            log_dir: None,
        }
    }
}

impl SupervisorOptions {
    /// Decode the plugin configuration blob. An empty blob yields the defaults.
    pub fn from_json_slice(blob: &[u8]) -> SupervisorResult<Self> {
        if blob.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let options: Self = serde_json::from_slice(blob)
            .map_err(|e| SupervisorError::InvalidConfig(format!("plugin config: {}", e)))?;
        options.sanitize()?;
        Ok(options)
    }

    pub fn fingerprint_period(&self) -> Duration {
        Duration::from_secs(self.fingerprint_period_secs)
    }

    /// Reject settings that would make every request fail or loop forever.
    pub fn sanitize(&self) -> SupervisorResult<()> {
        for (name, range) in [("memory_mb", self.memory_mb), ("cpu_shares", self.cpu_shares)] {
            if range.min == 0 || range.min > range.max {
                return Err(SupervisorError::InvalidConfig(format!(
                    "{} bounds must satisfy 0 < min <= max, got [{}, {}]",
                    name, range.min, range.max
                )));
            }
        }

        if let Some(root) = self.image_paths.iter().find(|p| !p.is_absolute()) {
            return Err(SupervisorError::InvalidConfig(format!(
                "image_paths entries must be absolute, got: {}",
                root.display()
            )));
        }

        if self.qemu_system_bin.trim().is_empty() {
            return Err(SupervisorError::InvalidConfig(
                "qemu_system_bin must not be empty".into(),
            ));
        }

        if self.fingerprint_period_secs == 0 {
            return Err(SupervisorError::InvalidConfig(
                "fingerprint_period_secs must be positive".into(),
            ));
        }

        Ok(())
    }
}
