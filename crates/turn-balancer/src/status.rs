//! Read-only status document served to clients.

use crate::registry::EndpointSnapshot;
use crate::selector::{Selection, SelectionError};
use healthcheck::HealthState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-endpoint entry of `turn_data`
///
/// `initial` is the floor of `failed_checks` (always 0) and `success_th` the
/// success threshold, so clients can place `failed_checks` within its range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub failed_checks: u32,
    pub healthy: bool,
    pub initial: u32,
    pub success_th: u32,
    pub successful_checks: u32,
    pub state: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_score: Option<f64>,
}

/// `{"turn_data": {...}, "turn_server": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    /// Keyed by public address
    pub turn_data: BTreeMap<String, EndpointStatus>,
    pub turn_server: Option<String>,
}

impl From<&EndpointSnapshot> for EndpointStatus {
    fn from(s: &EndpointSnapshot) -> Self {
        Self {
            failed_checks: s.consecutive_failures,
            healthy: s.is_healthy(),
            initial: 0,
            success_th: s.thresholds.success,
            successful_checks: s.consecutive_successes,
            state: s.state,
            load_score: s.load_score,
        }
    }
}

impl StatusView {
    /// Project a snapshot and the selection made from it.
    pub fn build(
        snapshot: &[EndpointSnapshot],
        selection: &Result<Selection, SelectionError>,
    ) -> Self {
        Self {
            turn_data: snapshot
                .iter()
                .map(|s| (s.public_address.clone(), EndpointStatus::from(s)))
                .collect(),
            turn_server: selection.as_ref().ok().map(|s| s.public_address.clone()),
        }
    }
}
