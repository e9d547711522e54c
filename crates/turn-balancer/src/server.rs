//! Main balancer server: wires the registry, monitors and API.

use crate::health_monitor::HealthMonitor;
use crate::http_server::ApiServer;
use crate::load_monitor::LoadMonitor;
use crate::metrics::MetricsRegistry;
use crate::metrics_source::{self, MetricsSource};
use crate::registry::EndpointRegistry;
use crate::selector::Selector;
use crate::types::ServerConfig;
use healthcheck::{HealthProbe, TcpProbe};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// TURN balancer server
pub struct BalancerServer {
    config: ServerConfig,
    probe: Arc<dyn HealthProbe>,
    source: Option<Arc<dyn MetricsSource>>,
    listener: Option<TcpListener>,
}

impl BalancerServer {
    /// Create a server probing over TCP and reading load from the
    /// backend selected by the configured algorithm
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            probe: Arc::new(TcpProbe::new()),
            source: None,
            listener: None,
        }
    }

    /// Replace the health probe
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the metrics backend
    pub fn with_metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Serve the API on an already bound listener instead of `listen_addr`
    pub fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Run until `cancel` fires or a background task stops on its own.
    ///
    /// Monitor tasks only end on cancellation, so any earlier exit (a panic
    /// included) stops the API and is returned as [`common::Error::Task`].
    pub async fn run(self, cancel: CancellationToken) -> common::Result<()> {
        let config = self.config;
        info!(
            endpoints = config.endpoints.len(),
            algorithm = %config.algorithm,
            "Starting TURN balancer"
        );

        let source = match self.source {
            Some(source) => source,
            None => metrics_source::from_config(&config)?,
        };

        let metrics = if config.metrics_enabled {
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };

        let registry = Arc::new(EndpointRegistry::new(
            &config.endpoints,
            config.probe.thresholds,
        ));

        let mut monitors = JoinSet::new();
        let health_handles = HealthMonitor::new(
            registry.clone(),
            self.probe,
            config.probe.clone(),
            metrics.clone(),
        )
        .spawn(cancel.clone());
        for (handle, pair) in health_handles.into_iter().zip(&config.endpoints) {
            let task = format!("health probing for {}", pair.public);
            monitors.spawn(async move { (task, handle.await) });
        }

        let load_handle = LoadMonitor::new(
            registry.clone(),
            source,
            config.load.clone(),
            metrics.clone(),
        )
        .spawn(cancel.clone());
        if let Some(handle) = load_handle {
            monitors.spawn(async move { ("load collection".to_string(), handle.await) });
        }

        let api = ApiServer::new(
            registry,
            Selector::new(config.algorithm),
            metrics,
            config.listen_addr.clone(),
        );
        let listener = self.listener;
        let api_cancel = cancel.clone();
        let mut api_task = tokio::spawn(async move {
            match listener {
                Some(listener) => api.serve(listener, api_cancel).await,
                None => api.run(api_cancel).await,
            }
        });

        let mut failure = None;
        let api_result = loop {
            tokio::select! {
                joined = &mut api_task => break joined,
                Some(joined) = monitors.join_next() => {
                    if cancel.is_cancelled() {
                        continue;
                    }
                    let reason = match joined {
                        Ok((task, Ok(()))) => format!("{} exited", task),
                        Ok((task, Err(e))) => format!("{} failed: {}", task, e),
                        Err(e) => format!("monitor supervision failed: {}", e),
                    };
                    error!(reason = %reason, "Background task stopped, shutting down");
                    failure = Some(common::Error::task(reason));
                    cancel.cancel();
                }
            }
        };

        // The API is down either way; stop the monitors with it
        cancel.cancel();

        while let Some(joined) = monitors.join_next().await {
            match joined {
                Ok((task, Err(e))) => warn!(task = %task, error = %e, "Task failed during shutdown"),
                Err(e) => warn!(error = %e, "Task failed during shutdown"),
                Ok(_) => {}
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        api_result.map_err(|e| common::Error::task(format!("API server failed: {}", e)))??;
        info!("TURN balancer stopped");
        Ok(())
    }
}
