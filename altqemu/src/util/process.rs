//! Process validation utilities for PID checking and verification.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Kill a process with SIGKILL.
///
/// # Returns
/// * `true` - Process was killed or doesn't exist
/// * `false` - Failed to kill (permission denied)
pub fn kill_process(pid: u32) -> bool {
    matches!(send_signal(pid, Signal::SIGKILL), Ok(()) | Err(Errno::ESRCH))
        || !is_process_alive(pid)
}

/// Deliver `signal` to `pid`.
pub fn send_signal(pid: u32, signal: Signal) -> Result<(), Errno> {
    let pid = to_pid(pid).ok_or(Errno::ESRCH)?;
    signal::kill(pid, signal)
}

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
///
/// # Returns
/// * `true` - Process exists
/// * `false` - Process does not exist or permission denied
pub fn is_process_alive(pid: u32) -> bool {
    match to_pid(pid) {
        Some(pid) => unsafe { libc::kill(pid.as_raw(), 0) == 0 },
        None => false,
    }
}

/// Verify that a PID still runs the command line we launched.
///
/// This prevents PID reuse from attaching a task to an unrelated process.
///
/// # Implementation
/// * **Linux**: Compare `/proc/{pid}/cmdline` with `argv`
/// * **Other**: Use `sysinfo` to compare the process name with `argv[0]`'s file name
pub fn is_same_process(pid: u32, argv: &[String]) -> bool {
    if argv.is_empty() {
        return false;
    }

    #[cfg(target_os = "linux")]
    {
        is_same_process_linux(pid, argv)
    }

    #[cfg(not(target_os = "linux"))]
    {
        is_same_process_sysinfo(pid, argv)
    }
}

/// Pids 0 and anything that wraps to a negative `pid_t` address process
/// groups, never a single process.
fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

#[cfg(target_os = "linux")]
fn is_same_process_linux(pid: u32, argv: &[String]) -> bool {
    let cmdline_path = format!("/proc/{}/cmdline", pid);

    match std::fs::read(&cmdline_path) {
        Ok(raw) => {
            // cmdline is null-separated with a trailing null
            let actual: Vec<&[u8]> = raw
                .strip_suffix(b"\0")
                .unwrap_or(&raw[..])
                .split(|b| *b == 0)
                .collect();
            actual.len() == argv.len()
                && actual
                    .iter()
                    .zip(argv)
                    .all(|(have, want)| *have == want.as_bytes())
        }
        Err(_) => false, // Process doesn't exist or no permission
    }
}

#[cfg(not(target_os = "linux"))]
fn is_same_process_sysinfo(pid: u32, argv: &[String]) -> bool {
    use sysinfo::{Pid, System};

    let expected = std::path::Path::new(&argv[0])
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut sys = System::new();
    let pid_obj = Pid::from_u32(pid);
    sys.refresh_process(pid_obj);

    match sys.process(pid_obj) {
        Some(process) => !expected.is_empty() && expected.starts_with(process.name()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_current() {
        // Current process should always be alive
        let current_pid = std::process::id();
        assert!(is_process_alive(current_pid));
    }

    #[test]
    fn test_is_process_alive_invalid() {
        // Use very high PIDs unlikely to exist
        assert!(!is_process_alive(999999999));
        assert!(!is_process_alive(888888888));
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
    }

    #[test]
    fn test_is_same_process_rejects_other_command() {
        let current_pid = std::process::id();
        let argv = vec![
            "/usr/bin/qemu-system-x86_64".to_string(),
            "-name".to_string(),
            "test123".to_string(),
        ];
        assert!(!is_same_process(current_pid, &argv));
    }

    #[test]
    fn test_is_same_process_invalid() {
        let argv = vec!["/bin/sleep".to_string()];
        assert!(!is_same_process(0, &argv));
        assert!(!is_same_process(999999999, &argv));
        assert!(!is_same_process(std::process::id(), &[]));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_is_same_process_matches_spawned_child() {
        let mut child = std::process::Command::new("/bin/sleep")
            .arg("5")
            .spawn()
            .unwrap();
        let argv = vec!["/bin/sleep".to_string(), "5".to_string()];

        // Give exec a moment to replace the forked image
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(is_same_process(child.id(), &argv));
        assert!(!is_same_process(child.id(), &argv[..1]));

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_send_signal_to_missing_process() {
        assert_eq!(send_signal(999999999, Signal::SIGTERM), Err(Errno::ESRCH));
        assert!(kill_process(999999999));
    }
}
