//! Runtime types shared by the balancer components.

use healthcheck::Thresholds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Selection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Lowest load score among healthy endpoints
    Metrics,
    /// Uniform choice among healthy endpoints
    #[default]
    Random,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Metrics => "metrics",
            Algorithm::Random => "random",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the configured address mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPair {
    /// Address probed and queried for metrics
    pub private: String,
    /// Address handed out to clients
    pub public: String,
}

impl AddressPair {
    pub fn new(private: impl Into<String>, public: impl Into<String>) -> Self {
        Self {
            private: private.into(),
            public: public.into(),
        }
    }
}

/// Health probing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSettings {
    /// Time between two probes of the same endpoint
    pub interval: Duration,

    /// Upper bound of a single probe
    pub timeout: Duration,

    /// Port probed on every private address
    pub port: u16,

    /// Rise/fall thresholds
    pub thresholds: Thresholds,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
            port: 3478,
            thresholds: Thresholds::default(),
        }
    }
}

/// Load collection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    /// Time between two collection cycles
    pub interval: Duration,

    /// Trailing window each cycle queries
    pub window: Duration,

    /// Upper bound of one backend call
    pub timeout: Duration,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window: Duration::from_secs(5 * 60),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Prometheus connection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PrometheusTarget {
    /// Base URL without port, e.g. `http://prometheus`
    pub endpoint: String,
    pub port: u16,
    /// PromQL template; every `%s` receives the address alternation
    pub query: String,
}

impl PrometheusTarget {
    /// `query_range` URL of the configured backend
    pub fn query_range_url(&self) -> String {
        format!(
            "{}:{}/api/v1/query_range",
            self.endpoint.trim_end_matches('/'),
            self.port
        )
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Endpoints in configured order
    pub endpoints: Vec<AddressPair>,

    /// Health probing
    pub probe: ProbeSettings,

    /// Selection algorithm
    pub algorithm: Algorithm,

    /// Load collection
    pub load: LoadSettings,

    /// Metrics backend, required by [`Algorithm::Metrics`]
    pub prometheus: Option<PrometheusTarget>,

    /// HTTP API listen address
    pub listen_addr: String,

    /// Expose `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            probe: ProbeSettings::default(),
            algorithm: Algorithm::Random,
            load: LoadSettings::default(),
            prometheus: None,
            listen_addr: "0.0.0.0:8080".to_string(),
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_serde() {
        let parsed: Algorithm = serde_json::from_str("\"random\"").unwrap();
        assert_eq!(parsed, Algorithm::Random);
        assert_eq!(Algorithm::Metrics.to_string(), "metrics");
    }

    #[test]
    fn test_probe_defaults_match_tracker_defaults() {
        assert_eq!(ProbeSettings::default().thresholds, Thresholds::default());
        assert_eq!(
            Thresholds::default(),
            Thresholds {
                success: 3,
                failure: 3
            }
        );
    }

    #[test]
    fn test_query_range_url() {
        let target = PrometheusTarget {
            endpoint: "http://prometheus/".to_string(),
            port: 9090,
            query: "up{instance=~\"%s\"}".to_string(),
        };
        assert_eq!(
            target.query_range_url(),
            "http://prometheus:9090/api/v1/query_range"
        );
    }
}
