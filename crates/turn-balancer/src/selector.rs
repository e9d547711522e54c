//! Endpoint selection over a registry snapshot.

use crate::registry::EndpointSnapshot;
use crate::types::Algorithm;
use healthcheck::HealthState;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Selection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// No endpoint is currently `Healthy`
    #[error("no healthy TURN endpoint available")]
    NoHealthyEndpoint,
}

/// The chosen endpoint. Carries the public address only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub index: usize,
    pub public_address: String,
    pub state: HealthState,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub load_score: Option<f64>,
}

impl From<&EndpointSnapshot> for Selection {
    fn from(s: &EndpointSnapshot) -> Self {
        Self {
            index: s.index,
            public_address: s.public_address.clone(),
            state: s.state,
            consecutive_successes: s.consecutive_successes,
            consecutive_failures: s.consecutive_failures,
            load_score: s.load_score,
        }
    }
}

/// Stateless selector; every call decides afresh.
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    algorithm: Algorithm,
}

impl Selector {
    pub fn new(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Select among the healthy endpoints of `snapshot`.
    pub fn select(&self, snapshot: &[EndpointSnapshot]) -> Result<Selection, SelectionError> {
        self.select_with_rng(snapshot, &mut rand::rng())
    }

    /// Same as [`select`](Self::select) with a caller-provided RNG.
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        snapshot: &[EndpointSnapshot],
        rng: &mut R,
    ) -> Result<Selection, SelectionError> {
        let healthy: Vec<&EndpointSnapshot> =
            snapshot.iter().filter(|e| e.is_healthy()).collect();

        let chosen = match self.algorithm {
            Algorithm::Random => healthy.choose(rng).copied(),
            Algorithm::Metrics => healthy.iter().copied().min_by(|a, b| by_load(a, b)),
        };

        chosen
            .map(Selection::from)
            .ok_or(SelectionError::NoHealthyEndpoint)
    }
}

/// Scored before unscored, then lower score, then configured order.
fn by_load(a: &EndpointSnapshot, b: &EndpointSnapshot) -> Ordering {
    let score = match (a.load_score, b.load_score) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    score.then(a.index.cmp(&b.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthcheck::Thresholds;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn endpoint(index: usize, state: HealthState, load_score: Option<f64>) -> EndpointSnapshot {
        EndpointSnapshot {
            index,
            private_address: format!("10.0.0.{}", index + 1),
            public_address: format!("turn{}.example.com", index + 1),
            state,
            consecutive_successes: if state == HealthState::Healthy { 3 } else { 0 },
            consecutive_failures: if state == HealthState::Unhealthy { 3 } else { 0 },
            thresholds: Thresholds {
                success: 3,
                failure: 3,
            },
            total_probes: 3,
            successful_probes: 3,
            load_score,
            last_probe: None,
            last_metrics: None,
        }
    }

    use HealthState::{Healthy, Initial, Unhealthy};

    #[test]
    fn test_metrics_prefers_lowest_score() {
        let snapshot = vec![
            endpoint(0, Healthy, Some(5.0)),
            endpoint(1, Healthy, Some(2.0)),
            endpoint(2, Healthy, None),
        ];
        let selection = Selector::new(Algorithm::Metrics).select(&snapshot).unwrap();
        assert_eq!(selection.public_address, "turn2.example.com");
        assert_eq!(selection.load_score, Some(2.0));
    }

    #[test]
    fn test_metrics_zero_score_beats_unscored() {
        let snapshot = vec![endpoint(0, Healthy, None), endpoint(1, Healthy, Some(0.0))];
        let selection = Selector::new(Algorithm::Metrics).select(&snapshot).unwrap();
        assert_eq!(selection.index, 1);
    }

    #[test]
    fn test_metrics_all_unscored_falls_back_to_order() {
        let snapshot = vec![
            endpoint(0, Unhealthy, Some(0.1)),
            endpoint(1, Healthy, None),
            endpoint(2, Healthy, None),
        ];
        let selection = Selector::new(Algorithm::Metrics).select(&snapshot).unwrap();
        assert_eq!(selection.index, 1);
    }

    #[test]
    fn test_metrics_tie_broken_by_configured_order() {
        let snapshot = vec![
            endpoint(0, Healthy, Some(3.0)),
            endpoint(1, Healthy, Some(1.0)),
            endpoint(2, Healthy, Some(1.0)),
        ];
        let selector = Selector::new(Algorithm::Metrics);
        for _ in 0..10 {
            assert_eq!(selector.select(&snapshot).unwrap().index, 1);
        }
    }

    #[test]
    fn test_metrics_ignores_unhealthy_low_score() {
        let snapshot = vec![
            endpoint(0, Unhealthy, Some(0.0)),
            endpoint(1, Initial, Some(0.0)),
            endpoint(2, Healthy, Some(9.0)),
        ];
        let selection = Selector::new(Algorithm::Metrics).select(&snapshot).unwrap();
        assert_eq!(selection.index, 2);
    }

    #[test]
    fn test_no_healthy_endpoint() {
        let snapshot = vec![
            endpoint(0, Unhealthy, Some(1.0)),
            endpoint(1, Unhealthy, None),
            endpoint(2, Initial, None),
        ];
        for algorithm in [Algorithm::Metrics, Algorithm::Random] {
            assert_eq!(
                Selector::new(algorithm).select(&snapshot),
                Err(SelectionError::NoHealthyEndpoint)
            );
        }
        assert_eq!(
            Selector::new(Algorithm::Random).select(&[]),
            Err(SelectionError::NoHealthyEndpoint)
        );
    }

    #[test]
    fn test_random_single_healthy() {
        let snapshot = vec![
            endpoint(0, Unhealthy, None),
            endpoint(1, Healthy, None),
            endpoint(2, Initial, None),
        ];
        let selector = Selector::new(Algorithm::Random);
        for _ in 0..50 {
            assert_eq!(selector.select(&snapshot).unwrap().index, 1);
        }
    }

    #[test]
    fn test_random_rerolls_every_call() {
        let snapshot: Vec<_> = (0..4).map(|i| endpoint(i, Healthy, None)).collect();
        let selector = Selector::new(Algorithm::Random);
        let mut rng = StdRng::seed_from_u64(7);

        let seen: HashSet<usize> = (0..200)
            .map(|_| selector.select_with_rng(&snapshot, &mut rng).unwrap().index)
            .collect();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_selection_never_exposes_private_address() {
        let snapshot = vec![endpoint(0, Healthy, Some(1.0))];
        let selection = Selector::new(Algorithm::Metrics).select(&snapshot).unwrap();
        let json = serde_json::to_string(&selection).unwrap();
        assert!(!json.contains("10.0.0.1"));
    }
}
