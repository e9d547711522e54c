//! HTTP API: status view, liveness and Prometheus metrics.

use crate::metrics::MetricsRegistry;
use crate::registry::EndpointRegistry;
use crate::selector::Selector;
use crate::status::StatusView;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared handler state
#[derive(Clone)]
struct AppState {
    registry: Arc<EndpointRegistry>,
    selector: Selector,
    metrics: Option<Arc<MetricsRegistry>>,
}

/// HTTP API server
pub struct ApiServer {
    state: AppState,
    listen_addr: String,
}

impl ApiServer {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        selector: Selector,
        metrics: Option<Arc<MetricsRegistry>>,
        listen_addr: String,
    ) -> Self {
        Self {
            state: AppState {
                registry,
                selector,
                metrics,
            },
            listen_addr,
        }
    }

    /// Build the router. `/metrics` is only mounted with a metrics registry.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/coturn", get(status_handler))
            .route("/p/health_check", get(health_handler));

        if self.state.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }

        router
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        self.serve(listener, cancel).await
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> std::io::Result<()> {
        info!(listen_addr = %listener.local_addr()?, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

/// Snapshot and select at request time
async fn current_view(state: &AppState) -> StatusView {
    let snapshot = state.registry.snapshot().await;
    let selection = state.selector.select(&snapshot);

    if let Some(m) = &state.metrics {
        m.record_selection(state.selector.algorithm().as_str(), selection.is_ok());
    }
    // Outages are logged once by the health monitor, not per request
    if let Err(e) = &selection {
        debug!(error = %e, "Serving status without a TURN server");
    }

    StatusView::build(&snapshot, &selection)
}

/// Handler for /coturn
async fn status_handler(State(state): State<AppState>) -> Json<StatusView> {
    Json(current_view(&state).await)
}

/// Handler for /p/health_check
async fn health_handler(State(state): State<AppState>) -> Response {
    if current_view(&state).await.turn_server.is_some() {
        (StatusCode::OK, Json(json!({ "health": "healthy" }))).into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "health": "unhealthy" })),
        )
            .into_response()
    }
}

/// Handler for /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(registry) = &state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &registry.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AddressPair, Algorithm};
    use healthcheck::{ProbeOutcome, Thresholds};
    use std::io;
    use std::sync::Mutex;
    use tracing::Level;

    /// Collects formatted log lines
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn state(metrics: bool) -> AppState {
        AppState {
            registry: Arc::new(EndpointRegistry::new(
                &[AddressPair::new("10.0.0.1", "turn1.example.com")],
                Thresholds {
                    success: 1,
                    failure: 1,
                },
            )),
            selector: Selector::new(Algorithm::Random),
            metrics: metrics.then(|| Arc::new(MetricsRegistry::new())),
        }
    }

    #[tokio::test]
    async fn test_health_handler_follows_selection() {
        let state = state(false);
        let response = health_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        state
            .registry
            .get(0)
            .unwrap()
            .record_probe(ProbeOutcome::Success)
            .await;
        let response = health_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_handler_selects_healthy() {
        let state = state(true);
        state
            .registry
            .get(0)
            .unwrap()
            .record_probe(ProbeOutcome::Success)
            .await;

        let Json(view) = status_handler(State(state)).await;
        assert_eq!(view.turn_server.as_deref(), Some("turn1.example.com"));
        assert!(view.turn_data["turn1.example.com"].healthy);
    }

    #[tokio::test]
    async fn test_outage_polls_stay_below_warn() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let state = state(false);
        for _ in 0..5 {
            let response = health_handler(State(state.clone())).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
        let Json(view) = status_handler(State(state)).await;
        assert!(view.turn_server.is_none());

        assert!(captured.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_handler_requires_registry() {
        let response = metrics_handler(State(state(false))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = metrics_handler(State(state(true))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
