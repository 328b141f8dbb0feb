//! Resource bounds and vCPU derivation.

use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::constants::bounds::SHARES_PER_CPU;
use crate::runtime::options::{ResourceBounds, SupervisorOptions};
use crate::task::TaskResources;

pub fn check_bounds(resource: &'static str, value: u64, range: ResourceBounds) -> SupervisorResult<()> {
    if range.contains(value) {
        return Ok(());
    }
    Err(SupervisorError::ResourceOutOfBounds {
        resource,
        value,
        min: range.min,
        max: range.max,
    })
}

/// Number of vCPUs for a CPU share assignment, never less than one.
pub fn cpu_count(cpu_shares: u64) -> u64 {
    (cpu_shares / SHARES_PER_CPU).max(1)
}

/// Validated sizing of a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmSize {
    pub memory_mb: u64,
    pub cpus: u64,
}

/// Check memory then CPU shares against the configured bounds.
pub fn size_vm(resources: &TaskResources, options: &SupervisorOptions) -> SupervisorResult<VmSize> {
    check_bounds("memory", resources.memory_mb, options.memory_mb)?;
    check_bounds("cpu share", resources.cpu_shares, options.cpu_shares)?;
    Ok(VmSize {
        memory_mb: resources.memory_mb,
        cpus: cpu_count(resources.cpu_shares),
    })
}
