//! Health check types and the hysteresis state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// Endpoint answered
    Success,
    /// Connection refused, unreachable, reset...
    Failure,
    /// No answer within the probe timeout
    Timeout,
}

impl ProbeOutcome {
    /// Timeouts count as failures for the state machine.
    pub fn is_success(self) -> bool {
        self == ProbeOutcome::Success
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeOutcome::Success => "success",
            ProbeOutcome::Failure => "failure",
            ProbeOutcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe result
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Outcome of the probe
    pub outcome: ProbeOutcome,

    /// Duration of the probe
    pub duration: Duration,

    /// Optional error message
    pub message: Option<String>,
}

impl ProbeResult {
    /// Create a successful result
    pub fn success(duration: Duration) -> Self {
        Self {
            outcome: ProbeOutcome::Success,
            duration,
            message: None,
        }
    }

    /// Create a failed result
    pub fn failure(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            outcome: ProbeOutcome::Failure,
            duration,
            message: Some(message.into()),
        }
    }

    /// Create a timeout result
    pub fn timeout(duration: Duration) -> Self {
        Self {
            outcome: ProbeOutcome::Timeout,
            duration,
            message: Some("Probe timed out".to_string()),
        }
    }

    /// Check if the probe succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Health state of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Neither threshold has been crossed yet
    #[default]
    Initial,
    Healthy,
    Unhealthy,
}

impl HealthState {
    /// Numeric encoding used by the state gauge.
    pub fn as_gauge(self) -> i64 {
        match self {
            HealthState::Initial => 0,
            HealthState::Healthy => 1,
            HealthState::Unhealthy => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Initial => "initial",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rise/fall thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Consecutive successes required to become healthy
    pub success: u32,

    /// Consecutive failures required to become unhealthy
    pub failure: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            success: 3,
            failure: 3,
        }
    }
}

/// A state change produced by [`HealthTracker::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
}

/// Per-endpoint hysteresis state machine.
///
/// The fields are private: the state only moves through [`record`], which
/// compares the consecutive counters against the thresholds.
///
/// [`record`]: HealthTracker::record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthTracker {
    thresholds: Thresholds,
    state: HealthState,
    consecutive_successes: u32,
    consecutive_failures: u32,
    total_probes: u64,
    successful_probes: u64,
}

impl HealthTracker {
    /// Create a tracker in the `Initial` state.
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    /// Apply one probe outcome, returning the transition if the state changed.
    pub fn record(&mut self, outcome: ProbeOutcome) -> Option<Transition> {
        self.total_probes += 1;
        let from = self.state;

        if outcome.is_success() {
            self.successful_probes += 1;
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            self.consecutive_failures = 0;

            if self.state != HealthState::Healthy
                && self.consecutive_successes >= self.thresholds.success
            {
                self.state = HealthState::Healthy;
            }
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.consecutive_successes = 0;

            if self.state != HealthState::Unhealthy
                && self.consecutive_failures >= self.thresholds.failure
            {
                self.state = HealthState::Unhealthy;
            }
        }

        (from != self.state).then_some(Transition {
            from,
            to: self.state,
        })
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_probes(&self) -> u64 {
        self.total_probes
    }

    pub fn successful_probes(&self) -> u64 {
        self.successful_probes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProbeOutcome::{Failure, Success, Timeout};

    fn tracker(success: u32, failure: u32) -> HealthTracker {
        HealthTracker::new(Thresholds { success, failure })
    }

    #[test]
    fn test_starts_initial() {
        let t = tracker(3, 3);
        assert_eq!(t.state(), HealthState::Initial);
        assert_eq!(t.consecutive_successes(), 0);
        assert_eq!(t.consecutive_failures(), 0);
    }

    #[test]
    fn test_stays_initial_below_threshold() {
        let mut t = tracker(3, 2);
        assert_eq!(t.record(Success), None);
        assert_eq!(t.record(Success), None);
        assert_eq!(t.state(), HealthState::Initial);
        assert_eq!(t.consecutive_successes(), 2);
    }

    #[test]
    fn test_rise_exactly_at_threshold() {
        let mut t = tracker(3, 2);
        t.record(Success);
        t.record(Success);
        let transition = t.record(Success);
        assert_eq!(
            transition,
            Some(Transition {
                from: HealthState::Initial,
                to: HealthState::Healthy
            })
        );
    }

    #[test]
    fn test_initial_to_unhealthy() {
        let mut t = tracker(3, 2);
        t.record(Failure);
        assert_eq!(t.state(), HealthState::Initial);
        t.record(Timeout);
        assert_eq!(t.state(), HealthState::Unhealthy);
        assert_eq!(t.consecutive_failures(), 2);
    }

    #[test]
    fn test_failure_resets_success_run() {
        // S,S,F,S,S,S with rise=3 fall=2 ends healthy with a fresh run of 3
        let mut t = tracker(3, 2);
        for outcome in [Success, Success, Failure, Success, Success, Success] {
            t.record(outcome);
        }
        assert_eq!(t.state(), HealthState::Healthy);
        assert_eq!(t.consecutive_successes(), 3);
        assert_eq!(t.consecutive_failures(), 0);
        assert_eq!(t.total_probes(), 6);
        assert_eq!(t.successful_probes(), 5);
    }

    #[test]
    fn test_healthy_to_unhealthy_and_back() {
        let mut t = tracker(2, 2);
        t.record(Success);
        t.record(Success);
        assert_eq!(t.state(), HealthState::Healthy);

        assert_eq!(t.record(Failure), None);
        assert_eq!(t.state(), HealthState::Healthy);
        assert_eq!(
            t.record(Failure),
            Some(Transition {
                from: HealthState::Healthy,
                to: HealthState::Unhealthy
            })
        );

        t.record(Success);
        assert_eq!(t.state(), HealthState::Unhealthy);
        t.record(Success);
        assert_eq!(t.state(), HealthState::Healthy);
    }

    #[test]
    fn test_no_repeat_transition_once_healthy() {
        let mut t = tracker(1, 1);
        assert!(t.record(Success).is_some());
        for _ in 0..5 {
            assert_eq!(t.record(Success), None);
        }
        assert_eq!(t.consecutive_successes(), 6);
    }

    #[test]
    fn test_counters_never_both_nonzero() {
        let mut t = tracker(2, 3);
        let pattern = [
            Success, Failure, Timeout, Success, Success, Failure, Success, Timeout, Timeout,
            Timeout, Success,
        ];
        for outcome in pattern {
            t.record(outcome);
            assert!(t.consecutive_successes() == 0 || t.consecutive_failures() == 0);
        }
    }

    #[test]
    fn test_probe_result_constructors() {
        let ok = ProbeResult::success(Duration::from_millis(3));
        assert!(ok.is_success());
        assert!(ok.message.is_none());

        let timed_out = ProbeResult::timeout(Duration::from_secs(2));
        assert!(!timed_out.is_success());
        assert_eq!(timed_out.outcome, ProbeOutcome::Timeout);
    }

    #[test]
    fn test_health_state_serde() {
        assert_eq!(
            serde_json::to_string(&HealthState::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
        let parsed: HealthState = serde_json::from_str("\"initial\"").unwrap();
        assert_eq!(parsed, HealthState::Initial);
    }
}
