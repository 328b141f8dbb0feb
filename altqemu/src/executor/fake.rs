//! Scripted in-memory executor for lifecycle tests.
//!
//! Processes never run; tests decide when and how they exit and can count
//! every shutdown, kill and signal the supervisor issued.

use super::{ExecCommand, Executor, ExecutorConnection, ProcessState, ReattachDescriptor};
use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::types::ResourceUsage;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

const KIND: &str = "fake";
const FIRST_PID: u32 = 4000;

#[derive(Serialize, Deserialize)]
struct FakeReattach {
    pid: u32,
}

/// Failure knobs. All off by default.
#[derive(Debug, Default)]
pub(crate) struct Script {
    pub fail_create: bool,
    pub fail_launch: bool,
    pub fail_reattach: bool,
    pub fail_descriptor: bool,
    pub fail_shutdown: bool,
    /// Processes ignore graceful signals and must be killed.
    pub ignore_signals: bool,
    /// Hold every shutdown this long before acting on it.
    pub shutdown_delay: Option<Duration>,
}

struct Shared {
    next_pid: AtomicU32,
    processes: Mutex<HashMap<u32, Arc<FakeProcess>>>,
    script: Mutex<Script>,
    created: AtomicUsize,
    terminated: AtomicUsize,
    last_command: Mutex<Option<ExecCommand>>,
}

#[derive(Clone)]
pub(crate) struct FakeExecutor {
    shared: Arc<Shared>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                next_pid: AtomicU32::new(FIRST_PID),
                processes: Mutex::new(HashMap::new()),
                script: Mutex::new(Script::default()),
                created: AtomicUsize::new(0),
                terminated: AtomicUsize::new(0),
                last_command: Mutex::new(None),
            }),
        }
    }

    pub fn script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.shared.script.lock());
    }

    pub fn process(&self, pid: u32) -> Option<Arc<FakeProcess>> {
        self.shared.processes.lock().get(&pid).cloned()
    }

    /// Connections handed out by `create`.
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    /// Calls to `terminate` across all connections.
    pub fn terminated(&self) -> usize {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    pub fn last_command(&self) -> Option<ExecCommand> {
        self.shared.last_command.lock().clone()
    }

    fn connection(&self, process: Option<Arc<FakeProcess>>) -> Arc<FakeConnection> {
        Arc::new(FakeConnection {
            shared: Arc::clone(&self.shared),
            process: Mutex::new(process),
        })
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn create(&self) -> SupervisorResult<Arc<dyn ExecutorConnection>> {
        if self.shared.script.lock().fail_create {
            return Err(SupervisorError::Executor("scripted create failure".into()));
        }
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.connection(None))
    }

    async fn reattach(
        &self,
        descriptor: &ReattachDescriptor,
    ) -> SupervisorResult<Arc<dyn ExecutorConnection>> {
        if self.shared.script.lock().fail_reattach {
            return Err(SupervisorError::Executor("scripted reattach failure".into()));
        }
        let payload: FakeReattach = descriptor.open(KIND)?;
        match self.process(payload.pid) {
            Some(process) if process.is_alive() => Ok(self.connection(Some(process))),
            _ => Err(SupervisorError::Executor(format!(
                "process {} is gone",
                payload.pid
            ))),
        }
    }
}

/// A pretend VM process.
pub(crate) struct FakeProcess {
    pub pid: u32,
    exit_tx: watch::Sender<Option<Result<ProcessState, String>>>,
    signals: Mutex<Vec<Signal>>,
    shutdowns: AtomicUsize,
    kills: AtomicUsize,
}

impl FakeProcess {
    fn new(pid: u32) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            pid,
            exit_tx,
            signals: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
        }
    }

    pub fn exit(&self, exit_code: i32) {
        self.publish(Ok(ProcessState {
            pid: self.pid,
            exit_code,
            signal: 0,
        }));
    }

    /// Make the executor's wait fail instead of reporting a status.
    pub fn lose(&self, reason: &str) {
        self.publish(Err(reason.to_string()));
    }

    pub fn is_alive(&self) -> bool {
        self.exit_tx.borrow().is_none()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    fn kill(&self) {
        if self.is_alive() {
            self.kills.fetch_add(1, Ordering::SeqCst);
            self.killed_by(Signal::SIGKILL);
        }
    }

    fn killed_by(&self, signal: Signal) {
        self.publish(Ok(ProcessState {
            pid: self.pid,
            exit_code: -1,
            signal: signal as i32,
        }));
    }

    fn publish(&self, observation: Result<ProcessState, String>) {
        self.exit_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(observation);
            true
        });
    }
}

struct FakeConnection {
    shared: Arc<Shared>,
    process: Mutex<Option<Arc<FakeProcess>>>,
}

impl FakeConnection {
    fn launched(&self) -> SupervisorResult<Arc<FakeProcess>> {
        self.process
            .lock()
            .clone()
            .ok_or_else(|| SupervisorError::Executor("no process launched".into()))
    }
}

#[async_trait]
impl ExecutorConnection for FakeConnection {
    async fn launch(&self, command: &ExecCommand) -> SupervisorResult<u32> {
        if self.shared.script.lock().fail_launch {
            return Err(SupervisorError::Executor("scripted launch failure".into()));
        }
        let pid = self.shared.next_pid.fetch_add(1, Ordering::SeqCst);
        let process = Arc::new(FakeProcess::new(pid));
        self.shared
            .processes
            .lock()
            .insert(pid, Arc::clone(&process));
        *self.shared.last_command.lock() = Some(command.clone());
        *self.process.lock() = Some(process);
        Ok(pid)
    }

    fn pid(&self) -> u32 {
        self.process.lock().as_ref().map(|p| p.pid).unwrap_or(0)
    }

    async fn wait(&self) -> SupervisorResult<ProcessState> {
        let process = self.launched()?;
        let mut rx = process.exit_tx.subscribe();
        let observation = {
            let guard = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| SupervisorError::Executor("process dropped".into()))?;
            guard.clone()
        };
        match observation {
            Some(Ok(state)) => Ok(state),
            Some(Err(e)) => Err(SupervisorError::Executor(e)),
            None => Err(SupervisorError::Internal("empty exit".into())),
        }
    }

    async fn shutdown(&self, signal: Option<Signal>, timeout: Duration) -> SupervisorResult<()> {
        let process = self.launched()?;
        process.shutdowns.fetch_add(1, Ordering::SeqCst);
        let delay = self.shared.script.lock().shutdown_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.shared.script.lock().fail_shutdown {
            return Err(SupervisorError::Executor("scripted shutdown failure".into()));
        }
        if !process.is_alive() {
            return Ok(());
        }
        if timeout.is_zero() {
            process.kill();
            return Ok(());
        }

        let signal = signal.unwrap_or(Signal::SIGINT);
        process.signals.lock().push(signal);
        if self.shared.script.lock().ignore_signals {
            process.kill();
        } else {
            process.killed_by(signal);
        }
        Ok(())
    }

    async fn signal(&self, signal: Signal) -> SupervisorResult<()> {
        let process = self.launched()?;
        if !process.is_alive() {
            return Err(SupervisorError::Executor("process is not running".into()));
        }
        process.signals.lock().push(signal);
        Ok(())
    }

    fn stats(&self, interval: Duration) -> BoxStream<'static, SupervisorResult<ResourceUsage>> {
        let process = self.process.lock().clone();
        async_stream::stream! {
            let Some(process) = process else {
                return;
            };
            let mut exited = process.exit_tx.subscribe();
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = exited.wait_for(Option::is_some) => break,
                    _ = ticker.tick() => {}
                }
                yield Ok(ResourceUsage {
                    timestamp: Utc::now(),
                    pid: process.pid,
                    cpu_percent: Some(1.0),
                    memory_bytes: Some(64 * 1024 * 1024),
                });
            }
        }
        .boxed()
    }

    fn is_alive(&self) -> bool {
        self.process
            .lock()
            .as_ref()
            .map(|p| p.is_alive())
            .unwrap_or(false)
    }

    fn terminate(&self) {
        self.shared.terminated.fetch_add(1, Ordering::SeqCst);
        if let Some(process) = self.process.lock().as_ref() {
            process.kill();
        }
    }

    fn descriptor(&self) -> SupervisorResult<ReattachDescriptor> {
        if self.shared.script.lock().fail_descriptor {
            return Err(SupervisorError::Executor("scripted descriptor failure".into()));
        }
        let pid = self.launched()?.pid;
        ReattachDescriptor::seal(KIND, &FakeReattach { pid })
    }
}
