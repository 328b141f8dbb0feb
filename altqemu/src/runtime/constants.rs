//! Default values and fixed names.
//!
//! Centralized location for launch defaults and resource bounds.

/// Launch-command defaults applied when the driver config leaves a field unset.
pub mod defaults {
    /// Software emulation; no hardware acceleration required on the host.
    pub const ACCELERATOR: &str = "tcg";

    pub const MACHINE_TYPE: &str = "pc";

    pub const CPU_TYPE: &str = "host";

    pub const QEMU_SYSTEM_BIN: &str = "qemu-system-x86_64";

    /// Seconds between fingerprints after the initial one.
    pub const FINGERPRINT_PERIOD_SECS: u64 = 30;
}

/// Accepted resource ranges (inclusive).
pub mod bounds {
    pub const MEMORY_MB_MIN: u64 = 128;
    pub const MEMORY_MB_MAX: u64 = 4_000_000;

    pub const CPU_SHARES_MIN: u64 = 100;
    pub const CPU_SHARES_MAX: u64 = 1_024_000;

    /// CPU shares that make up one virtual CPU.
    pub const SHARES_PER_CPU: u64 = 1000;
}

/// Boot disk wiring on the generated command line.
pub mod boot_disk {
    pub const NODE_NAME: &str = "bootbd";
    pub const FORMAT: &str = "qcow2";
    pub const FILE_DRIVER: &str = "file";
    pub const DEVICE: &str = "virtio-blk";
}

/// Versions of serialized formats this crate writes and understands.
pub mod versions {
    pub const TASK_STATE: u32 = 1;
    pub const REATTACH_DESCRIPTOR: u32 = 1;
}

/// Node attributes reported by fingerprinting.
pub mod attributes {
    pub const DRIVER: &str = "driver.qemu";
    pub const DRIVER_VERSION: &str = "driver.qemu.version";
}

pub const LOG_FILE_NAME: &str = "altqemu.log";
