//! Logging initialisation.
//!
//! Writes structured logs to a daily rolling `altqemu.log` under the
//! configured directory, filtered by `RUST_LOG` (default `info`). The
//! non-blocking writer's guard is kept for the lifetime of the process so
//! buffered lines are flushed on exit.

use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::constants::LOG_FILE_NAME;
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber writing into `log_dir`.
///
/// Only the first call has an effect. If the host process already installed
/// a subscriber, that one is left in place.
pub fn init_logging(log_dir: &Path) -> SupervisorResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(log_dir).map_err(|e| {
        SupervisorError::InvalidConfig(format!(
            "failed to create log directory {}: {}",
            log_dir.display(),
            e
        ))
    })?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        let _ = LOG_GUARD.set(guard);
        tracing::info!(log_dir = %log_dir.display(), "Logging initialized");
    }
    Ok(())
}
