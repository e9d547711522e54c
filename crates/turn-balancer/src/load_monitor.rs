//! Periodic load score collection.

use crate::metrics::MetricsRegistry;
use crate::metrics_source::{MetricsError, MetricsSource};
use crate::registry::EndpointRegistry;
use crate::types::LoadSettings;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one collection cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Endpoints whose score was overwritten
    pub updated: usize,
    /// Endpoints that kept their previous score
    pub failed: usize,
}

/// Refreshes every endpoint's load score from a [`MetricsSource`]
pub struct LoadMonitor {
    registry: Arc<EndpointRegistry>,
    source: Arc<dyn MetricsSource>,
    settings: LoadSettings,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl LoadMonitor {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        source: Arc<dyn MetricsSource>,
        settings: LoadSettings,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            registry,
            source,
            settings,
            metrics,
        }
    }

    /// Start the collection task. `None` when the source is disabled, since
    /// there is nothing to collect.
    pub fn spawn(self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.source.is_enabled() {
            info!(source = self.source.name(), "Load collection disabled");
            return None;
        }
        Some(tokio::spawn(async move { self.run(cancel).await }))
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            source = self.source.name(),
            interval_secs = self.settings.interval.as_secs(),
            window_secs = self.settings.window.as_secs(),
            "Starting load monitor"
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.collect(&cancel).await.is_none() {
                break;
            }
        }

        debug!("Load collection stopped");
    }

    /// Run a single collection cycle.
    pub async fn collect_once(&self) -> CycleReport {
        // A fresh token is never cancelled
        self.collect(&CancellationToken::new())
            .await
            .unwrap_or_default()
    }

    /// `None` when cancelled before the backend answered; nothing is written then.
    async fn collect(&self, cancel: &CancellationToken) -> Option<CycleReport> {
        let started = Instant::now();
        let addresses = self.registry.private_addresses();

        let results = tokio::select! {
            _ = cancel.cancelled() => return None,
            results = self.source.query_all(&addresses, self.settings.window) => results,
        };

        let mut report = CycleReport::default();
        for (address, result) in results {
            let Some(endpoint) = self.registry.find_private(&address) else {
                continue;
            };

            match result {
                Ok(score) => {
                    endpoint.record_load(score).await;
                    if let Some(m) = &self.metrics {
                        m.update_load_score(endpoint.public_address(), score);
                    }
                    debug!(endpoint = endpoint.public_address(), score, "Load score updated");
                    report.updated += 1;
                }
                Err(e) => {
                    if let Some(m) = &self.metrics {
                        m.record_fetch_error(e.kind());
                    }
                    log_fetch_error(endpoint.public_address(), &e);
                    report.failed += 1;
                }
            }
        }

        if let Some(m) = &self.metrics {
            m.record_load_cycle(started.elapsed());
        }
        debug!(
            updated = report.updated,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Load cycle complete"
        );

        Some(report)
    }
}

fn log_fetch_error(endpoint: &str, error: &MetricsError) {
    match error {
        MetricsError::InsufficientData { got, need } => warn!(
            endpoint,
            got, need, "Not enough load samples, keeping previous score"
        ),
        other => warn!(
            endpoint,
            error = %other,
            "Load fetch failed, keeping previous score"
        ),
    }
}
