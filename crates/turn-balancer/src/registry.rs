//! Endpoint registry: the only mutable state shared between tasks.
//!
//! Each endpoint carries one lock guarding its health and load fields. The
//! health fields are written only through [`Endpoint::record_probe`] and the
//! load fields only through [`Endpoint::record_load`]; readers copy an
//! [`EndpointSnapshot`] under the read guard, so a snapshot never shows a
//! counter bump without the transition it caused.

use crate::types::AddressPair;
use healthcheck::{HealthState, HealthTracker, ProbeOutcome, Thresholds, Transition};
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Mutable part of an endpoint
#[derive(Debug)]
struct EndpointState {
    health: HealthTracker,
    load_score: Option<f64>,
    last_probe: Option<SystemTime>,
    last_metrics: Option<SystemTime>,
}

/// One configured TURN server
#[derive(Debug)]
pub struct Endpoint {
    index: usize,
    private_address: String,
    public_address: String,
    state: RwLock<EndpointState>,
}

/// Point-in-time copy of an endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSnapshot {
    /// Position in the configured address mapping
    pub index: usize,
    pub private_address: String,
    pub public_address: String,
    pub state: HealthState,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub thresholds: Thresholds,
    pub total_probes: u64,
    pub successful_probes: u64,
    /// `None` until the first successful metrics fetch
    pub load_score: Option<f64>,
    pub last_probe: Option<SystemTime>,
    pub last_metrics: Option<SystemTime>,
}

impl EndpointSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }
}

/// Result of applying one probe outcome
#[derive(Debug, Clone)]
pub struct ProbeUpdate {
    pub snapshot: EndpointSnapshot,
    pub transition: Option<Transition>,
}

impl Endpoint {
    fn new(index: usize, pair: &AddressPair, thresholds: Thresholds) -> Self {
        Self {
            index,
            private_address: pair.private.clone(),
            public_address: pair.public.clone(),
            state: RwLock::new(EndpointState {
                health: HealthTracker::new(thresholds),
                load_score: None,
                last_probe: None,
                last_metrics: None,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn private_address(&self) -> &str {
        &self.private_address
    }

    pub fn public_address(&self) -> &str {
        &self.public_address
    }

    /// Apply a probe outcome to the health fields.
    pub async fn record_probe(&self, outcome: ProbeOutcome) -> ProbeUpdate {
        let mut state = self.state.write().await;
        let transition = state.health.record(outcome);
        state.last_probe = Some(SystemTime::now());

        ProbeUpdate {
            snapshot: self.copy(&state),
            transition,
        }
    }

    /// Overwrite the load score.
    pub async fn record_load(&self, score: f64) {
        let mut state = self.state.write().await;
        state.load_score = Some(score);
        state.last_metrics = Some(SystemTime::now());
    }

    pub async fn snapshot(&self) -> EndpointSnapshot {
        let state = self.state.read().await;
        self.copy(&state)
    }

    fn copy(&self, state: &EndpointState) -> EndpointSnapshot {
        EndpointSnapshot {
            index: self.index,
            private_address: self.private_address.clone(),
            public_address: self.public_address.clone(),
            state: state.health.state(),
            consecutive_successes: state.health.consecutive_successes(),
            consecutive_failures: state.health.consecutive_failures(),
            thresholds: state.health.thresholds(),
            total_probes: state.health.total_probes(),
            successful_probes: state.health.successful_probes(),
            load_score: state.load_score,
            last_probe: state.last_probe,
            last_metrics: state.last_metrics,
        }
    }
}

/// Fixed set of endpoints, in configured order
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistry {
    pub fn new(pairs: &[AddressPair], thresholds: Thresholds) -> Self {
        Self {
            endpoints: pairs
                .iter()
                .enumerate()
                .map(|(index, pair)| Endpoint::new(index, pair, thresholds))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn find_private(&self, private_address: &str) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.private_address == private_address)
    }

    pub fn private_addresses(&self) -> Vec<String> {
        self.endpoints
            .iter()
            .map(|e| e.private_address.clone())
            .collect()
    }

    /// Snapshot every endpoint, in configured order.
    pub async fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let mut snapshots = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            snapshots.push(endpoint.snapshot().await);
        }
        snapshots
    }
}
