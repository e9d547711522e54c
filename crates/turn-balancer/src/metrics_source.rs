//! Load metrics backends.
//!
//! Score convention: a load score is a non-negative utilization figure where
//! lower means less loaded and therefore more preferred. Every source must
//! produce scores on that scale.

use crate::types::{Algorithm, PrometheusTarget, ServerConfig};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Resolution of the Prometheus range query; one sample per minute.
const STEP: Duration = Duration::from_secs(60);

/// Metrics fetch failure. Routine: the caller keeps the previous score.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("backend answered with status {0}")]
    Status(u16),

    #[error("unable to decode backend response: {0}")]
    Decode(String),

    #[error("no series returned for endpoint")]
    NoData,

    #[error("not enough data points: got {got}, need {need}")]
    InsufficientData { got: usize, need: usize },

    #[error("metrics collection disabled")]
    Disabled,
}

impl MetricsError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MetricsError::Http(_) => "http",
            MetricsError::Status(_) => "status",
            MetricsError::Decode(_) => "decode",
            MetricsError::NoData => "no_data",
            MetricsError::InsufficientData { .. } => "insufficient_data",
            MetricsError::Disabled => "disabled",
        }
    }
}

/// Load metrics backend
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Load score of one endpoint over the trailing `window`.
    async fn query(&self, private_address: &str, window: Duration) -> Result<f64, MetricsError>;

    /// Scores for a set of endpoints. The default issues one concurrent
    /// [`query`](MetricsSource::query) per address; batched backends override it.
    async fn query_all(
        &self,
        private_addresses: &[String],
        window: Duration,
    ) -> Vec<(String, Result<f64, MetricsError>)> {
        join_all(private_addresses.iter().map(|address| async move {
            (address.clone(), self.query(address, window).await)
        }))
        .await
    }

    /// Whether the source can produce scores at all
    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Source used with the `random` algorithm: never produces a score.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSource;

#[async_trait]
impl MetricsSource for DisabledSource {
    async fn query(&self, _private_address: &str, _window: Duration) -> Result<f64, MetricsError> {
        Err(MetricsError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// `query_range` response envelope
#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryRangeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    result: Vec<RangeSeries>,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    metric: HashMap<String, String>,
    values: Vec<(f64, String)>,
}

/// Prometheus `query_range` source.
///
/// One HTTP call per cycle: every `%s` of the query template is replaced with
/// the alternation `addr1|addr2|...`, and each returned series is attributed
/// to the endpoint whose private address appears as one of its label values.
/// The score is the mean of the series' samples.
pub struct PrometheusSource {
    client: reqwest::Client,
    url: String,
    query_template: String,
    step: Duration,
}

impl PrometheusSource {
    pub fn new(target: &PrometheusTarget, timeout: Duration) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetricsError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: target.query_range_url(),
            query_template: target.query.clone(),
            step: STEP,
        })
    }

    /// Fill every placeholder with the address alternation
    pub fn render_query(&self, private_addresses: &[String]) -> String {
        self.query_template
            .replace("%s", &private_addresses.join("|"))
    }

    async fn fetch(
        &self,
        private_addresses: &[String],
        window: Duration,
    ) -> Result<Vec<RangeSeries>, MetricsError> {
        let end = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let start = end.saturating_sub(window.as_secs());
        let query = self.render_query(private_addresses);
        debug!(url = %self.url, query = %query, "Prometheus query");

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("query", query),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("step", self.step.as_secs().to_string()),
            ])
            .send()
            .await
            .map_err(|e| MetricsError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetricsError::Status(status.as_u16()));
        }

        let body: QueryRangeResponse = response
            .json()
            .await
            .map_err(|e| MetricsError::Decode(e.to_string()))?;

        if body.status != "success" {
            return Err(MetricsError::Decode(
                body.error.unwrap_or_else(|| format!("status {}", body.status)),
            ));
        }

        Ok(body.data.map(|d| d.result).unwrap_or_default())
    }

    fn min_samples(&self, window: Duration) -> usize {
        (window.as_secs() / self.step.as_secs().max(1)) as usize
    }
}

/// Mean of the finite samples of a series
fn mean(values: &[(f64, String)]) -> (usize, f64) {
    let samples: Vec<f64> = values
        .iter()
        .filter_map(|(_, v)| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect();

    if samples.is_empty() {
        return (0, 0.0);
    }
    (samples.len(), samples.iter().sum::<f64>() / samples.len() as f64)
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    async fn query(&self, private_address: &str, window: Duration) -> Result<f64, MetricsError> {
        let addresses = [private_address.to_string()];
        self.query_all(&addresses, window)
            .await
            .into_iter()
            .next()
            .map(|(_, result)| result)
            .unwrap_or(Err(MetricsError::NoData))
    }

    async fn query_all(
        &self,
        private_addresses: &[String],
        window: Duration,
    ) -> Vec<(String, Result<f64, MetricsError>)> {
        let series = match self.fetch(private_addresses, window).await {
            Ok(series) => series,
            Err(e) => {
                return private_addresses
                    .iter()
                    .map(|a| (a.clone(), Err(e.clone())))
                    .collect();
            }
        };

        let need = self.min_samples(window);
        let mut scores: HashMap<&str, Result<f64, MetricsError>> = HashMap::new();

        for s in &series {
            let Some(address) = private_addresses
                .iter()
                .find(|a| s.metric.values().any(|v| v == *a))
            else {
                warn!(
                    labels = ?s.metric,
                    "Unable to attribute series to an endpoint, check query and addressMapping"
                );
                continue;
            };

            let (got, score) = mean(&s.values);
            let result = if got < need {
                Err(MetricsError::InsufficientData { got, need })
            } else {
                Ok(score)
            };
            scores.insert(address.as_str(), result);
        }

        private_addresses
            .iter()
            .map(|a| {
                let result = scores
                    .remove(a.as_str())
                    .unwrap_or(Err(MetricsError::NoData));
                (a.clone(), result)
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}

/// Pick the source matching the configured algorithm
pub fn from_config(config: &ServerConfig) -> common::Result<Arc<dyn MetricsSource>> {
    match (config.algorithm, &config.prometheus) {
        (Algorithm::Metrics, Some(target)) => {
            let source =
                PrometheusSource::new(target, config.load.timeout).map_err(common::Error::metrics)?;
            Ok(Arc::new(source))
        }
        (Algorithm::Metrics, None) => Err(common::Error::config(
            "the metrics algorithm requires a prometheus section",
        )),
        (Algorithm::Random, _) => Ok(Arc::new(DisabledSource)),
    }
}
