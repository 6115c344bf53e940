//! Latency probes used by the `customized` selection mode.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Why a probe produced no latency figure.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("refusing to probe address '{0}'")]
    InvalidAddress(String),

    #[error("failed to run probe: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe exited with {0}")]
    Failed(String),

    #[error("no round-trip time in probe output")]
    Unparseable,
}

/// Round-trip measurement against a backend address.
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    async fn probe(&self, address: &str) -> Result<Duration, ProbeError>;
}

/// ICMP echo through the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl LatencyProbe for PingProbe {
    async fn probe(&self, address: &str) -> Result<Duration, ProbeError> {
        if address.is_empty() || address.starts_with('-') {
            return Err(ProbeError::InvalidAddress(address.to_string()));
        }

        let wait_seconds = self.timeout.as_secs().max(1);
        let child = Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait_seconds.to_string())
            .arg(address)
            .kill_on_drop(true)
            .output();

        // ping enforces -W itself; the extra second covers process startup.
        let limit = Duration::from_secs(wait_seconds + 1);
        let output = tokio::time::timeout(limit, child)
            .await
            .map_err(|_| ProbeError::Timeout(limit))?
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Failed(output.status.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ping_response(&stdout).ok_or(ProbeError::Unparseable)
    }
}

static PING_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time[=<]\s*(\d+(?:\.\d+)?)\s*ms").expect("ping time pattern is valid")
});

/// Extract the round-trip time from `ping` output (`time=0.512 ms`).
pub fn parse_ping_response(output: &str) -> Option<Duration> {
    let captures = PING_TIME.captures(output)?;
    let millis: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
}
