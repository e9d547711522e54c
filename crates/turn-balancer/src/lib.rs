//! TURN balancer
//!
//! Picks a TURN relay for each client out of a fixed pool. Every endpoint is
//! a private address (probed and queried for load) paired with the public
//! address handed to clients.
//!
//! # Components
//!
//! - **HealthMonitor**: probes every endpoint on its own task and applies
//!   rise/fall hysteresis before changing its reported health
//! - **LoadMonitor**: refreshes load scores from a [`MetricsSource`]
//! - **Selector**: picks one healthy endpoint, uniformly or by lowest load
//! - **ApiServer**: serves the [`StatusView`], a liveness route and `/metrics`
//!
//! All components share one [`EndpointRegistry`] and one cancellation token.

pub mod config;
pub mod health_monitor;
pub mod http_server;
pub mod load_monitor;
pub mod metrics;
pub mod metrics_source;
pub mod registry;
pub mod selector;
pub mod server;
pub mod status;
pub mod telemetry;
pub mod types;

pub use config::{Config, ConfigError};
pub use health_monitor::HealthMonitor;
pub use http_server::ApiServer;
pub use load_monitor::{CycleReport, LoadMonitor};
pub use metrics::MetricsRegistry;
pub use metrics_source::{DisabledSource, MetricsError, MetricsSource, PrometheusSource};
pub use registry::{Endpoint, EndpointRegistry, EndpointSnapshot};
pub use selector::{Selection, SelectionError, Selector};
pub use server::BalancerServer;
pub use status::{EndpointStatus, StatusView};
pub use telemetry::{TelemetryGuard, setup_tracing};
pub use types::{AddressPair, Algorithm, ServerConfig};
