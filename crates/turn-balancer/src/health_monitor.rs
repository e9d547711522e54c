//! Periodic health probing with rise/fall hysteresis.

use crate::metrics::MetricsRegistry;
use crate::registry::{Endpoint, EndpointRegistry, ProbeUpdate};
use crate::types::ProbeSettings;
use healthcheck::{HealthProbe, HealthState, ProbeOutcome, ProbeResult};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Drives one probing task per endpoint
#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<EndpointRegistry>,
    probe: Arc<dyn HealthProbe>,
    settings: ProbeSettings,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        probe: Arc<dyn HealthProbe>,
        settings: ProbeSettings,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            registry,
            probe,
            settings,
            metrics,
        }
    }

    /// Spawn one independent probing task per endpoint.
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(
            endpoints = self.registry.len(),
            interval_ms = self.settings.interval.as_millis() as u64,
            timeout_ms = self.settings.timeout.as_millis() as u64,
            rise = self.settings.thresholds.success,
            fall = self.settings.thresholds.failure,
            "Starting health monitor"
        );

        (0..self.registry.len())
            .map(|index| {
                let monitor = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { monitor.run_endpoint(index, cancel).await })
            })
            .collect()
    }

    async fn run_endpoint(self, index: usize, cancel: CancellationToken) {
        let Some(endpoint) = self.registry.get(index) else {
            return;
        };

        // First tick fires immediately so the pool leaves Initial quickly
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Dropping an in-flight probe on cancellation leaves the registry untouched
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.probe.probe(
                    endpoint.private_address(),
                    self.settings.port,
                    self.settings.timeout,
                ) => result,
            };

            self.apply(endpoint, result).await;
        }

        debug!(endpoint = endpoint.public_address(), "Health probing stopped");
    }

    /// Probe one endpoint once and apply the result.
    pub async fn probe_once(&self, index: usize) -> Option<ProbeUpdate> {
        let endpoint = self.registry.get(index)?;
        let result = self
            .probe
            .probe(
                endpoint.private_address(),
                self.settings.port,
                self.settings.timeout,
            )
            .await;
        Some(self.apply(endpoint, result).await)
    }

    async fn apply(&self, endpoint: &Endpoint, result: ProbeResult) -> ProbeUpdate {
        let update = endpoint.record_probe(result.outcome).await;
        let snapshot = &update.snapshot;
        let name = endpoint.public_address();

        match result.outcome {
            ProbeOutcome::Success => debug!(
                endpoint = name,
                duration_ms = result.duration.as_millis() as u64,
                consecutive = snapshot.consecutive_successes,
                "Health probe passed"
            ),
            ProbeOutcome::Failure => warn!(
                endpoint = name,
                message = result.message.as_deref().unwrap_or("unknown"),
                consecutive = snapshot.consecutive_failures,
                "Health probe failed"
            ),
            ProbeOutcome::Timeout => warn!(
                endpoint = name,
                consecutive = snapshot.consecutive_failures,
                "Health probe timed out"
            ),
        }

        if let Some(m) = &self.metrics {
            m.record_probe(name, result.outcome, result.duration);
            m.update_health(
                name,
                snapshot.state,
                snapshot.consecutive_successes,
                snapshot.consecutive_failures,
            );
        }

        if let Some(transition) = update.transition {
            if let Some(m) = &self.metrics {
                m.record_state_transition(name, transition.from, transition.to);
            }

            match transition.to {
                HealthState::Healthy => info!(
                    endpoint = name,
                    rise = snapshot.thresholds.success,
                    "Endpoint is now HEALTHY (rise threshold met)"
                ),
                _ => {
                    warn!(
                        endpoint = name,
                        fall = snapshot.thresholds.failure,
                        "Endpoint is now UNHEALTHY (fall threshold met)"
                    );
                    self.log_pool_health().await;
                }
            }
        }

        update
    }

    async fn log_pool_health(&self) {
        let healthy = self
            .registry
            .snapshot()
            .await
            .iter()
            .filter(|s| s.is_healthy())
            .count();

        if healthy == 0 {
            error!(
                endpoints = self.registry.len(),
                "No healthy TURN endpoint left"
            );
        } else {
            info!(healthy, endpoints = self.registry.len(), "Healthy endpoints remaining");
        }
    }
}
