//! Local process executor.
//!
//! Forks the VM binary directly from the supervisor. The child is placed in
//! its own process group and is not killed when its handle is dropped, so it
//! outlives a supervisor crash. A restarted supervisor reattaches by pid and
//! falls back to liveness polling, since it is no longer the parent.

use super::signal::DEFAULT_SIGNAL;
use super::stats::sample_process;
use super::{ExecCommand, Executor, ExecutorConnection, ProcessState, ReattachDescriptor};
use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::types::ResourceUsage;
use crate::util::{is_process_alive, is_same_process, kill_process, send_signal};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const EXECUTOR_KIND: &str = "process";

/// How often a reattached process is checked for liveness.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome published once the process is gone. `Err` when the exit status
/// could not be observed.
type ExitObservation = Result<ProcessState, String>;

/// Reattach payload stored inside the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProcessReattach {
    pid: u32,
    /// Full command line, used to reject a recycled pid.
    argv: Vec<String>,
}

/// Executor that runs VM processes as direct children of the supervisor.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    poll_interval: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the liveness poll interval used for reattached processes.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn create(&self) -> SupervisorResult<Arc<dyn ExecutorConnection>> {
        Ok(Arc::new(ProcessConnection::new(self.poll_interval)))
    }

    async fn reattach(
        &self,
        descriptor: &ReattachDescriptor,
    ) -> SupervisorResult<Arc<dyn ExecutorConnection>> {
        let payload: ProcessReattach = descriptor.open(EXECUTOR_KIND)?;
        let pid = payload.pid;

        if !is_process_alive(pid) {
            return Err(SupervisorError::Executor(format!(
                "process {} is no longer running",
                pid
            )));
        }
        if !is_same_process(pid, &payload.argv) {
            return Err(SupervisorError::Executor(format!(
                "pid {} no longer runs the recorded command line",
                pid
            )));
        }

        tracing::debug!(pid = pid, "Reattached to running process");
        Ok(Arc::new(ProcessConnection::attached(
            pid,
            payload.argv,
            self.poll_interval,
        )))
    }
}

struct Launched {
    pid: u32,
    argv: Vec<String>,
}

/// Connection to one locally forked (or reattached) process.
pub struct ProcessConnection {
    launched: Mutex<Option<Launched>>,
    exit_tx: Arc<watch::Sender<Option<ExitObservation>>>,
    /// Stops the liveness poller of a reattached process.
    detach: CancellationToken,
    poll_interval: Duration,
}

impl ProcessConnection {
    fn new(poll_interval: Duration) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            launched: Mutex::new(None),
            exit_tx: Arc::new(exit_tx),
            detach: CancellationToken::new(),
            poll_interval,
        }
    }

    /// Connection to a process this supervisor did not fork.
    ///
    /// Must be called within a tokio runtime.
    fn attached(pid: u32, argv: Vec<String>, poll_interval: Duration) -> Self {
        let conn = Self::new(poll_interval);
        *conn.launched.lock() = Some(Launched { pid, argv });

        let exit_tx = Arc::clone(&conn.exit_tx);
        let detach = conn.detach.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = detach.cancelled() => return,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
                if !is_process_alive(pid) {
                    tracing::debug!(pid = pid, "Reattached process is gone");
                    exit_tx.send_replace(Some(Err(format!(
                        "process {} exited while the supervisor was detached; exit status unavailable",
                        pid
                    ))));
                    return;
                }
            }
        });

        conn
    }

    /// Pid of a launched process that has not been observed to exit.
    fn live_pid(&self) -> Option<u32> {
        if self.exit_tx.borrow().is_some() {
            return None;
        }
        self.launched.lock().as_ref().map(|l| l.pid)
    }
}

impl Drop for ProcessConnection {
    fn drop(&mut self) {
        self.detach.cancel();
    }
}

#[async_trait]
impl ExecutorConnection for ProcessConnection {
    async fn launch(&self, command: &ExecCommand) -> SupervisorResult<u32> {
        if self.launched.lock().is_some() {
            return Err(SupervisorError::Executor(
                "connection already launched a process".into(),
            ));
        }

        let stdout = open_log(&command.stdout_path)?;
        let stderr = open_log(&command.stderr_path)?;

        let mut cmd = tokio::process::Command::new(&command.cmd);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .kill_on_drop(false);

        let mut child = cmd.spawn().map_err(|e| {
            let err_msg = format!(
                "Failed to spawn VM process at {}: {}",
                command.cmd.display(),
                e
            );
            tracing::error!("{}", err_msg);
            SupervisorError::Executor(err_msg)
        })?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::Executor("spawned process has no pid".into()))?;

        let argv = std::iter::once(command.cmd.to_string_lossy().into_owned())
            .chain(command.args.iter().cloned())
            .collect();
        *self.launched.lock() = Some(Launched { pid, argv });

        let exit_tx = Arc::clone(&self.exit_tx);
        tokio::spawn(async move {
            let observation = match child.wait().await {
                Ok(status) => Ok(process_state(pid, status)),
                Err(e) => Err(format!("failed to wait on process {}: {}", pid, e)),
            };
            tracing::debug!(pid = pid, outcome = ?observation, "Process reaped");
            exit_tx.send_replace(Some(observation));
        });

        Ok(pid)
    }

    fn pid(&self) -> u32 {
        self.launched.lock().as_ref().map(|l| l.pid).unwrap_or(0)
    }

    async fn wait(&self) -> SupervisorResult<ProcessState> {
        if self.launched.lock().is_none() {
            return Err(SupervisorError::Executor("no process launched".into()));
        }

        let mut rx = self.exit_tx.subscribe();
        let observation = {
            let guard = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| SupervisorError::Executor("executor connection closed".into()))?;
            guard.clone()
        };

        match observation {
            Some(Ok(state)) => Ok(state),
            Some(Err(e)) => Err(SupervisorError::Executor(e)),
            None => Err(SupervisorError::Internal("exit published without a value".into())),
        }
    }

    async fn shutdown(&self, signal: Option<Signal>, timeout: Duration) -> SupervisorResult<()> {
        let Some(pid) = self.live_pid() else {
            return Ok(());
        };

        if timeout.is_zero() {
            if !kill_process(pid) {
                return Err(SupervisorError::Executor(format!(
                    "failed to kill process {}",
                    pid
                )));
            }
            return Ok(());
        }

        let signal = signal.unwrap_or(DEFAULT_SIGNAL);
        match send_signal(pid, signal) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => {
                return Err(SupervisorError::Executor(format!(
                    "failed to send {:?} to process {}: {}",
                    signal, pid, e
                )));
            }
        }

        let mut rx = self.exit_tx.subscribe();
        if tokio::time::timeout(timeout, rx.wait_for(Option::is_some))
            .await
            .is_ok()
        {
            return Ok(());
        }

        tracing::warn!(
            pid = pid,
            timeout_ms = timeout.as_millis() as u64,
            "Process did not exit within timeout, killing"
        );
        if !kill_process(pid) {
            return Err(SupervisorError::Executor(format!(
                "failed to kill process {} after timeout",
                pid
            )));
        }
        Ok(())
    }

    async fn signal(&self, signal: Signal) -> SupervisorResult<()> {
        let pid = self
            .live_pid()
            .ok_or_else(|| SupervisorError::Executor("process is not running".into()))?;
        send_signal(pid, signal).map_err(|e| {
            SupervisorError::Executor(format!("failed to send {:?} to process {}: {}", signal, pid, e))
        })
    }

    fn stats(&self, interval: Duration) -> BoxStream<'static, SupervisorResult<ResourceUsage>> {
        match self.live_pid() {
            Some(pid) => sample_process(pid, interval, self.exit_tx.subscribe()),
            None => stream::empty().boxed(),
        }
    }

    fn is_alive(&self) -> bool {
        self.live_pid().is_some()
    }

    fn terminate(&self) {
        if let Some(pid) = self.live_pid()
            && !kill_process(pid)
        {
            tracing::warn!(pid = pid, "Failed to kill process on terminate");
        }
    }

    fn descriptor(&self) -> SupervisorResult<ReattachDescriptor> {
        let guard = self.launched.lock();
        let launched = guard
            .as_ref()
            .ok_or_else(|| SupervisorError::Executor("no process launched".into()))?;
        ReattachDescriptor::seal(
            EXECUTOR_KIND,
            &ProcessReattach {
                pid: launched.pid,
                argv: launched.argv.clone(),
            },
        )
    }
}

fn open_log(path: &Path) -> SupervisorResult<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            SupervisorError::Executor(format!("failed to open {}: {}", path.display(), e))
        })
}

fn process_state(pid: u32, status: std::process::ExitStatus) -> ProcessState {
    use std::os::unix::process::ExitStatusExt;

    ProcessState {
        pid,
        exit_code: status.code().unwrap_or(-1),
        signal: status.signal().unwrap_or(0),
    }
}
