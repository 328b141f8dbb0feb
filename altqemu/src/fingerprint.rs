//! Health and version probing of the host's virtualization binary.

use crate::runtime::constants::attributes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const HEALTHY_DESCRIPTION: &str = "Healthy";

/// Upper bound on one `--version` run.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"version (\d[\.\d+]+)").expect("version pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    /// The binary is missing or did not report a version. Not an error: the
    /// host simply cannot run VMs.
    Undetected,
    Unhealthy,
}

/// Result of one probe, relayed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub health: HealthState,
    pub health_description: String,
    pub attributes: BTreeMap<String, String>,
}

impl Fingerprint {
    fn undetected(description: impl Into<String>) -> Self {
        Self {
            health: HealthState::Undetected,
            health_description: description.into(),
            attributes: BTreeMap::new(),
        }
    }
}

/// Extract the version number from `--version` output.
pub fn parse_version(output: &str) -> Option<String> {
    VERSION_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Run `<bin> --version` and turn the answer into a fingerprint.
pub async fn probe(bin: &str) -> Fingerprint {
    probe_with_timeout(bin, PROBE_TIMEOUT).await
}

async fn probe_with_timeout(bin: &str, timeout: Duration) -> Fingerprint {
    let run = tokio::process::Command::new(bin)
        .arg("--version")
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(timeout, run).await {
        Err(_) => {
            tracing::warn!(
                binary = %bin,
                timeout_ms = timeout.as_millis() as u64,
                "Version probe timed out"
            );
            return Fingerprint::undetected("");
        }
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            tracing::debug!(binary = %bin, status = ?output.status, "Version probe failed");
            return Fingerprint::undetected("");
        }
        Ok(Err(e)) => {
            tracing::debug!(binary = %bin, error = %e, "Version probe could not run");
            return Fingerprint::undetected("");
        }
    };

    let out = String::from_utf8_lossy(&output.stdout);
    let out = out.trim();
    let Some(version) = parse_version(out) else {
        return Fingerprint::undetected(format!("Failed to parse qemu version from {}", out));
    };

    Fingerprint {
        health: HealthState::Healthy,
        health_description: HEALTHY_DESCRIPTION.to_string(),
        attributes: BTreeMap::from([
            (attributes::DRIVER.to_string(), "true".to_string()),
            (attributes::DRIVER_VERSION.to_string(), version),
        ]),
    }
}

/// Probe immediately, then every `period`, until either token fires.
pub(crate) fn fingerprint_stream(
    bin: String,
    period: Duration,
    cancel: CancellationToken,
    shutdown: CancellationToken,
) -> ReceiverStream<Fingerprint> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut delay = Duration::ZERO;
        loop {
            let fingerprint = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = shutdown.cancelled() => return,
                fingerprint = async {
                    tokio::time::sleep(delay).await;
                    probe(&bin).await
                } => fingerprint,
            };
            delay = period;
            tracing::trace!(health = ?fingerprint.health, "Fingerprinted");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = shutdown.cancelled() => return,
                sent = tx.send(fingerprint) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_parse_version() {
        let out = "QEMU emulator version 8.2.2 (Debian 1:8.2.2+ds-0ubuntu1)\nCopyright (c) 2003-2023";
        assert_eq!(parse_version(out).as_deref(), Some("8.2.2"));
        assert_eq!(parse_version("QEMU emulator version 2.11.1").as_deref(), Some("2.11.1"));
        assert_eq!(parse_version("no version here"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_undetected() {
        let fingerprint = probe("definitely-not-a-qemu-binary").await;
        assert_eq!(fingerprint.health, HealthState::Undetected);
        assert!(fingerprint.attributes.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_reports_version() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let bin = dir.path().join("qemu-system-x86_64");
        std::fs::write(&bin, "#!/bin/sh\necho 'QEMU emulator version 9.0.1'\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fingerprint = probe(bin.to_str().unwrap()).await;
        assert_eq!(fingerprint.health, HealthState::Healthy);
        assert_eq!(fingerprint.attributes[attributes::DRIVER], "true");
        assert_eq!(fingerprint.attributes[attributes::DRIVER_VERSION], "9.0.1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unparseable_version_is_undetected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let bin = dir.path().join("qemu-system-x86_64");
        std::fs::write(&bin, "#!/bin/sh\necho 'hello'\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fingerprint = probe(bin.to_str().unwrap()).await;
        assert_eq!(fingerprint.health, HealthState::Undetected);
        assert!(fingerprint.health_description.contains("hello"));
    }

    #[cfg(unix)]
    fn hanging_binary(dir: &tempfile::TempDir) -> String {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.path().join("qemu-system-x86_64");
        std::fs::write(&bin, "#!/bin/sh\nsleep 5\necho 'QEMU emulator version 9.0.1'\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin.to_str().unwrap().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_probe_times_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let bin = hanging_binary(&dir);

        let started = std::time::Instant::now();
        let fingerprint = probe_with_timeout(&bin, Duration::from_millis(200)).await;
        assert_eq!(fingerprint.health, HealthState::Undetected);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_interrupts_hung_probe() {
        let dir = tempfile::TempDir::new().unwrap();
        let shutdown = CancellationToken::new();
        let mut stream = fingerprint_stream(
            hanging_binary(&dir),
            Duration::from_secs(3600),
            CancellationToken::new(),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();

        let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_stream_sends_immediately_and_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let mut stream = fingerprint_stream(
            "definitely-not-a-qemu-binary".into(),
            Duration::from_secs(3600),
            cancel.clone(),
            CancellationToken::new(),
        );

        let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();
        assert!(first.is_some());

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
