//! Reachability probes.

use crate::types::ProbeResult;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Reachability probe.
///
/// Implementations must bound the attempt by `timeout` and report an elapsed
/// timeout as [`ProbeResult::timeout`], never as a panic or an error value.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `address:port`.
    async fn probe(&self, address: &str, port: u16, timeout: Duration) -> ProbeResult;
}

/// TCP connect probe. The connection is dropped as soon as it is established.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, address: &str, port: u16, timeout_duration: Duration) -> ProbeResult {
        let start = Instant::now();

        match timeout(timeout_duration, TcpStream::connect((address, port))).await {
            Ok(Ok(_stream)) => {
                let duration = start.elapsed();
                debug!(address, port, duration_ms = duration.as_millis(), "TCP probe successful");
                ProbeResult::success(duration)
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                debug!(address, port, error = %e, "TCP probe failed");
                ProbeResult::failure(duration, format!("Connection failed: {}", e))
            }
            Err(_) => {
                let duration = start.elapsed();
                debug!(address, port, "TCP probe timed out");
                ProbeResult::timeout(duration)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProbeOutcome;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = TcpProbe::new()
            .probe("127.0.0.1", port, Duration::from_secs(1))
            .await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_tcp_probe_closed_port() {
        // Grab a free port, then close it again
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TcpProbe::new()
            .probe("127.0.0.1", port, Duration::from_millis(500))
            .await;
        assert!(!result.is_success());
        assert!(result.message.is_some());
    }

    #[tokio::test]
    async fn test_tcp_probe_bad_hostname_is_failure() {
        let result = TcpProbe::new()
            .probe("no-such-host.invalid", 3478, Duration::from_millis(500))
            .await;
        assert!(matches!(
            result.outcome,
            ProbeOutcome::Failure | ProbeOutcome::Timeout
        ));
    }
}
