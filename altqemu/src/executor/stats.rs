//! Resource sampling for host processes.

use crate::errors::SupervisorResult;
use crate::runtime::types::ResourceUsage;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use sysinfo::{Pid, System};
use std::time::Duration;
use tokio::sync::watch;

/// Sample `pid` every `interval` until `exited` reports an exit.
///
/// The first sample is taken after one interval so that CPU usage has a
/// baseline to be computed against.
pub(super) fn sample_process<T>(
    pid: u32,
    interval: Duration,
    mut exited: watch::Receiver<Option<T>>,
) -> BoxStream<'static, SupervisorResult<ResourceUsage>>
where
    T: Send + Sync + 'static,
{
    async_stream::stream! {
        let mut sys = System::new();
        let pid_obj = Pid::from_u32(pid);
        sys.refresh_process(pid_obj);

        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = exited.wait_for(Option::is_some) => break,
                _ = ticker.tick() => {}
            }

            if !sys.refresh_process(pid_obj) {
                tracing::debug!(pid = pid, "Process vanished, ending stats stream");
                break;
            }
            let Some(process) = sys.process(pid_obj) else {
                break;
            };

            yield Ok(ResourceUsage {
                timestamp: Utc::now(),
                pid,
                cpu_percent: Some(process.cpu_usage()),
                memory_bytes: Some(process.memory()),
            });
        }
    }
    .boxed()
}
