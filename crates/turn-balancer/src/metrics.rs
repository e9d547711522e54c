//! Prometheus self metrics for the balancer.

use healthcheck::{HealthState, ProbeOutcome};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

type FloatGauge = Gauge<f64, AtomicU64>;

/// Labels for per-endpoint metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EndpointLabels {
    /// Public address of the endpoint
    pub endpoint: String,
}

/// Labels for probe result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    pub endpoint: String,
    /// success, failure, timeout
    pub result: String,
}

/// Labels for state transition metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StateTransitionLabels {
    pub endpoint: String,
    pub from: String,
    pub to: String,
}

/// Labels for metrics backend fetches
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchLabels {
    /// success or the error kind
    pub result: String,
}

/// Labels for selection metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SelectionLabels {
    pub algorithm: String,
    /// selected, no_healthy_endpoint
    pub result: String,
}

/// Metrics registry with all balancer metrics
///
/// Counters are registered without the `_total` suffix; the encoder adds it.
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    // Health
    probes_total: Family<ProbeLabels, Counter>,
    probe_duration_seconds: Family<EndpointLabels, Histogram>,
    health_state: Family<EndpointLabels, Gauge>,
    consecutive_successes: Family<EndpointLabels, Gauge>,
    consecutive_failures: Family<EndpointLabels, Gauge>,
    state_transitions_total: Family<StateTransitionLabels, Counter>,

    // Load
    load_score: Family<EndpointLabels, FloatGauge>,
    metrics_fetches_total: Family<FetchLabels, Counter>,
    load_cycle_duration_seconds: Histogram,

    // Selection
    selections_total: Family<SelectionLabels, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let probes_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "turn_balancer_probes",
            "Total health probes performed",
            probes_total.clone(),
        );

        let probe_duration_seconds =
            Family::<EndpointLabels, Histogram>::new_with_constructor(|| {
                // 1ms to ~16s
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "turn_balancer_probe_duration_seconds",
            "Health probe duration in seconds",
            probe_duration_seconds.clone(),
        );

        let health_state = Family::<EndpointLabels, Gauge>::default();
        registry.register(
            "turn_balancer_health_state",
            "Current health state (0=initial, 1=healthy, 2=unhealthy)",
            health_state.clone(),
        );

        let consecutive_successes = Family::<EndpointLabels, Gauge>::default();
        registry.register(
            "turn_balancer_consecutive_successes",
            "Current consecutive success count",
            consecutive_successes.clone(),
        );

        let consecutive_failures = Family::<EndpointLabels, Gauge>::default();
        registry.register(
            "turn_balancer_consecutive_failures",
            "Current consecutive failure count",
            consecutive_failures.clone(),
        );

        let state_transitions_total = Family::<StateTransitionLabels, Counter>::default();
        registry.register(
            "turn_balancer_state_transitions",
            "Total health state transitions",
            state_transitions_total.clone(),
        );

        let load_score = Family::<EndpointLabels, FloatGauge>::default();
        registry.register(
            "turn_balancer_load_score",
            "Last load score fetched for the endpoint (lower is preferred)",
            load_score.clone(),
        );

        let metrics_fetches_total = Family::<FetchLabels, Counter>::default();
        registry.register(
            "turn_balancer_metrics_fetches",
            "Per-endpoint metrics backend fetches",
            metrics_fetches_total.clone(),
        );

        let load_cycle_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 12));
        registry.register(
            "turn_balancer_load_cycle_duration_seconds",
            "Load collection cycle duration",
            load_cycle_duration_seconds.clone(),
        );

        let selections_total = Family::<SelectionLabels, Counter>::default();
        registry.register(
            "turn_balancer_selections",
            "Endpoint selections served",
            selections_total.clone(),
        );

        Self {
            registry,
            probes_total,
            probe_duration_seconds,
            health_state,
            consecutive_successes,
            consecutive_failures,
            state_transitions_total,
            load_score,
            metrics_fetches_total,
            load_cycle_duration_seconds,
            selections_total,
        }
    }

    /// Record a probe result
    pub fn record_probe(&self, endpoint: &str, outcome: ProbeOutcome, duration: Duration) {
        self.probes_total
            .get_or_create(&ProbeLabels {
                endpoint: endpoint.to_string(),
                result: outcome.as_str().to_string(),
            })
            .inc();

        self.probe_duration_seconds
            .get_or_create(&labels(endpoint))
            .observe(duration.as_secs_f64());
    }

    /// Update health state and consecutive count gauges
    pub fn update_health(&self, endpoint: &str, state: HealthState, successes: u32, failures: u32) {
        let labels = labels(endpoint);

        self.health_state
            .get_or_create(&labels)
            .set(state.as_gauge());
        self.consecutive_successes
            .get_or_create(&labels)
            .set(i64::from(successes));
        self.consecutive_failures
            .get_or_create(&labels)
            .set(i64::from(failures));
    }

    /// Record a state transition
    pub fn record_state_transition(&self, endpoint: &str, from: HealthState, to: HealthState) {
        self.state_transitions_total
            .get_or_create(&StateTransitionLabels {
                endpoint: endpoint.to_string(),
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
            .inc();
    }

    /// Record a successful load fetch
    pub fn update_load_score(&self, endpoint: &str, score: f64) {
        self.load_score.get_or_create(&labels(endpoint)).set(score);
        self.record_fetch("success");
    }

    /// Record a failed fetch by error kind
    pub fn record_fetch_error(&self, kind: &str) {
        self.record_fetch(kind);
    }

    fn record_fetch(&self, result: &str) {
        self.metrics_fetches_total
            .get_or_create(&FetchLabels {
                result: result.to_string(),
            })
            .inc();
    }

    /// Record load collection cycle duration
    pub fn record_load_cycle(&self, duration: Duration) {
        self.load_cycle_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Record a selection outcome
    pub fn record_selection(&self, algorithm: &str, selected: bool) {
        let result = if selected {
            "selected"
        } else {
            "no_healthy_endpoint"
        };
        self.selections_total
            .get_or_create(&SelectionLabels {
                algorithm: algorithm.to_string(),
                result: result.to_string(),
            })
            .inc();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn labels(endpoint: &str) -> EndpointLabels {
    EndpointLabels {
        endpoint: endpoint.to_string(),
    }
}
