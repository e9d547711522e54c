//! Configuration loading and validation for the TURN balancer

use crate::types::{
    AddressPair, Algorithm, LoadSettings, PrometheusTarget, ProbeSettings, ServerConfig,
};
use common::LogFormat;
use healthcheck::Thresholds;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found in search paths")]
    FileNotFound,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),
}

impl From<ConfigError> for common::Error {
    fn from(err: ConfigError) -> Self {
        common::Error::config(err)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub log_format: Option<String>,

    pub turn: TurnSettings,

    pub health_check: HealthCheckSettings,

    pub load_balancer: LoadBalancerSettings,

    #[serde(default)]
    pub web_api: WebApiSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.turn.validate()?;
        self.health_check.validate()?;
        self.load_balancer.validate()?;
        self.web_api.validate()?;

        if let Some(format) = &self.log_format {
            if format.parse::<LogFormat>().is_err() {
                let mut errors = ValidationErrors::new();
                errors.add("logFormat", ValidationError::new("log_format_unknown"));
                return Err(errors);
            }
        }

        Ok(())
    }
}

/// TURN pool settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TurnSettings {
    /// Private -> public address pairs, in document order
    #[serde(
        deserialize_with = "deserialize_address_mapping",
        serialize_with = "serialize_address_mapping"
    )]
    #[validate(custom = "validate_address_mapping")]
    pub address_mapping: Vec<AddressPair>,
}

/// Health probing settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSettings {
    #[validate(range(min = 1, max = 3600))]
    pub interval_seconds: u64,

    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,

    #[validate(range(min = 1, max = 1000))]
    pub success_threshold: u32,

    /// Defaults to `success_threshold`
    #[serde(default)]
    #[validate(range(min = 1, max = 1000))]
    pub failure_threshold: Option<u32>,

    #[validate(range(min = 1))]
    pub port: u16,
}

/// Load balancing settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSettings {
    pub algorithm: Algorithm,

    #[validate(range(min = 1, max = 1440))]
    pub interval_minutes: u64,

    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: u64,

    /// Bound of one Prometheus call
    #[serde(default = "default_metrics_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub prometheus: Option<PrometheusSettings>,
}

/// Prometheus connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSettings {
    #[validate(url)]
    pub endpoint: String,

    #[validate(range(min = 1))]
    pub port: u16,

    #[validate(custom = "validate_query_template")]
    pub query: String,
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WebApiSettings {
    #[validate(length(min = 1))]
    pub host: String,

    pub port: u16,
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
}

/// Self metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default implementations

fn default_metrics_timeout() -> u64 {
    10
}

fn default_service_name() -> String {
    "turn-balancer".to_string()
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for WebApiSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
            otlp_endpoint: default_otlp_endpoint(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl HealthCheckSettings {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            success: self.success_threshold,
            failure: self.failure_threshold.unwrap_or(self.success_threshold),
        }
    }
}

impl LoadBalancerSettings {
    // Prometheus is only mandatory for the metrics algorithm.
    fn validate_backend(&self) -> Result<(), ValidationErrors> {
        match (&self.algorithm, &self.prometheus) {
            (Algorithm::Metrics, None) => {
                let mut errors = ValidationErrors::new();
                errors.add("prometheus", ValidationError::new("prometheus_required"));
                Err(errors)
            }
            (_, Some(prometheus)) => prometheus.validate(),
            (Algorithm::Random, None) => Ok(()),
        }
    }
}

// Address mapping (de)serialization keeps document order

fn deserialize_address_mapping<'de, D>(deserializer: D) -> Result<Vec<AddressPair>, D::Error>
where
    D: Deserializer<'de>,
{
    struct MappingVisitor;

    impl<'de> Visitor<'de> for MappingVisitor {
        type Value = Vec<AddressPair>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of private to public addresses")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((private, public)) = map.next_entry::<String, String>()? {
                pairs.push(AddressPair { private, public });
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(MappingVisitor)
}

fn serialize_address_mapping<S>(pairs: &[AddressPair], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for pair in pairs {
        map.serialize_entry(&pair.private, &pair.public)?;
    }
    map.end()
}

// Custom validators

fn validate_address_mapping(pairs: &[AddressPair]) -> Result<(), ValidationError> {
    if pairs.is_empty() {
        return Err(ValidationError::new("address_mapping_empty"));
    }

    let mut private = HashSet::new();
    let mut public = HashSet::new();
    for pair in pairs {
        if pair.private.trim().is_empty() || pair.public.trim().is_empty() {
            return Err(ValidationError::new("address_empty"));
        }
        if !private.insert(pair.private.as_str()) {
            return Err(ValidationError::new("private_address_duplicate"));
        }
        if !public.insert(pair.public.as_str()) {
            return Err(ValidationError::new("public_address_duplicate"));
        }
    }

    Ok(())
}

fn validate_query_template(query: &str) -> Result<(), ValidationError> {
    if !query.contains("%s") {
        return Err(ValidationError::new("query_missing_placeholder"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from `path`, or from the default search paths
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let path = Self::find_config_file().ok_or(ConfigError::FileNotFound)?;
                Self::load_from_file(&path)
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        config.load_balancer.validate_backend()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/turn-balancer/config.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./coturn_loadbalancer.yaml"));

        paths
            .into_iter()
            .find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/turn-balancer/config.yaml"))
    }

    /// Effective log level, `info` when unset
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Effective log format, text when unset
    pub fn log_format(&self) -> LogFormat {
        self.log_format
            .as_deref()
            .and_then(|f| f.parse().ok())
            .unwrap_or_default()
    }

    /// Convert to the runtime configuration
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            endpoints: self.turn.address_mapping.clone(),
            probe: ProbeSettings {
                interval: Duration::from_secs(self.health_check.interval_seconds),
                timeout: Duration::from_secs(self.health_check.timeout_seconds),
                port: self.health_check.port,
                thresholds: self.health_check.thresholds(),
            },
            algorithm: self.load_balancer.algorithm,
            load: LoadSettings {
                interval: Duration::from_secs(self.load_balancer.interval_minutes * 60),
                window: Duration::from_secs(self.load_balancer.duration_minutes * 60),
                timeout: Duration::from_secs(self.load_balancer.timeout_seconds),
            },
            prometheus: self
                .load_balancer
                .prometheus
                .as_ref()
                .map(|p| PrometheusTarget {
                    endpoint: p.endpoint.clone(),
                    port: p.port,
                    query: p.query.clone(),
                }),
            listen_addr: format!("{}:{}", self.web_api.host, self.web_api.port),
            metrics_enabled: self.metrics.enabled,
        }
    }
}
