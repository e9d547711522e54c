//! Endpoint health checking for the TURN balancer.
//!
//! This crate provides the two building blocks of health evaluation:
//! - [`HealthProbe`]: a single reachability attempt bounded by a timeout
//!   (TCP connect by default)
//! - [`HealthTracker`]: the per-endpoint rise/fall state machine that turns
//!   a stream of probe outcomes into `Initial`/`Healthy`/`Unhealthy`
//!
//! # Example
//!
//! ```no_run
//! use healthcheck::{HealthProbe, HealthTracker, TcpProbe, Thresholds};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let probe = TcpProbe::new();
//! let mut tracker = HealthTracker::new(Thresholds { success: 3, failure: 2 });
//!
//! let result = probe.probe("10.0.0.1", 3478, Duration::from_secs(2)).await;
//! if let Some(transition) = tracker.record(result.outcome) {
//!     println!("{} -> {}", transition.from, transition.to);
//! }
//! # }
//! ```

pub mod probe;
pub mod types;

pub use probe::{HealthProbe, TcpProbe};
pub use types::{HealthState, HealthTracker, ProbeOutcome, ProbeResult, Thresholds, Transition};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_state_display() {
        assert_eq!(HealthState::Initial.to_string(), "initial");
        assert_eq!(HealthState::Healthy.to_string(), "healthy");
        assert_eq!(HealthState::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn test_probe_outcome_display() {
        assert_eq!(ProbeOutcome::Success.to_string(), "success");
        assert_eq!(ProbeOutcome::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_default_thresholds() {
        let t = HealthTracker::default();
        assert_eq!(t.thresholds(), Thresholds { success: 3, failure: 3 });
    }
}
