//! Health status types for a bridge instance.

use serde::{Deserialize, Serialize};

/// Health of a bridge. `Faulted` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    #[default]
    Healthy,
    /// Compute context failed or the bridge was destroyed. No way back.
    Faulted,
}

/// Point-in-time view of a bridge, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub bridge_id: uuid::Uuid,
    pub health: Health,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the fence closed (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faulted_at: Option<String>,
    /// Calls dispatched and not yet settled.
    pub in_flight: usize,
    /// Objects created in the compute context and not yet released.
    pub live_objects: usize,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.health == Health::Healthy
    }
}
