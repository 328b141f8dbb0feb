//! Request validation and VM command-line construction.
//!
//! Everything here runs before an executor connection is created, so any
//! error leaves no state behind.

mod binary;
mod path;
mod resources;

pub use binary::resolve_binary;
pub use path::resolve_allowed_image;
pub use resources::{VmSize, check_bounds, cpu_count, size_vm};

use crate::errors::SupervisorResult;
use crate::executor::ExecCommand;
use crate::runtime::constants::{boot_disk, defaults};
use crate::runtime::options::SupervisorOptions;
use crate::task::{DriverConfig, TaskConfig};
use std::path::{Path, PathBuf};

/// Validate `config` and build the command that boots its VM.
///
/// Checks run in a fixed order: driver config decoding, image path,
/// memory, CPU shares, binary.
pub fn build_command(config: &TaskConfig, options: &SupervisorOptions) -> SupervisorResult<ExecCommand> {
    let driver = config.decode_driver_config()?;
    let image = resolve_allowed_image(&driver.image_path, &config.alloc_dir, &options.image_paths)?;
    let size = size_vm(&config.resources, options)?;

    let bin = driver
        .qemu_system_bin
        .as_deref()
        .filter(|b| !b.is_empty())
        .unwrap_or(&options.qemu_system_bin);
    let cmd = resolve_binary(bin)?;

    let args = vm_args(&driver, &image, size);

    tracing::debug!(
        task_id = %config.id,
        cmd = %cmd.display(),
        args = ?args,
        "Built VM command"
    );

    Ok(ExecCommand {
        cmd,
        args,
        env: config.env.clone(),
        stdout_path: config.stdout_path.clone(),
        stderr_path: config.stderr_path.clone(),
    })
}

fn vm_args(driver: &DriverConfig, image: &Path, size: VmSize) -> Vec<String> {
    let or_default = |value: &Option<String>, default: &str| {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    let vm_name = driver
        .vm_name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            PathBuf::from(&driver.image_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| driver.image_path.clone())
        });

    let mut args = vec![
        "-machine".to_string(),
        format!(
            "type={},accel={}",
            or_default(&driver.machine_type, defaults::MACHINE_TYPE),
            or_default(&driver.accelerator, defaults::ACCELERATOR)
        ),
        "-name".to_string(),
        vm_name,
        "-m".to_string(),
        format!("{}M", size.memory_mb),
        "-cpu".to_string(),
        or_default(&driver.cpu_type, defaults::CPU_TYPE),
        "-smp".to_string(),
        size.cpus.to_string(),
        "-nographic".to_string(),
        "-blockdev".to_string(),
        format!(
            "node-name={},driver={},file.filename={},file.locking=off,file.driver={}",
            boot_disk::NODE_NAME,
            boot_disk::FORMAT,
            image.display(),
            boot_disk::FILE_DRIVER
        ),
        "-device".to_string(),
        format!("{},drive={}", boot_disk::DEVICE, boot_disk::NODE_NAME),
    ];
    args.extend(driver.args.iter().cloned());
    args
}
