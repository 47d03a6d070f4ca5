//! Fault fence: the one-way `Healthy -> Faulted` switch of a bridge.
//!
//! Like slot poisoning in a permit pool, but for the whole compute context:
//! once tripped, there is no method that makes the bridge usable again.

use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::health::Health;

#[derive(Debug, Default)]
pub(crate) struct FaultFence {
    health: Health,
    reason: Option<String>,
    faulted_at: Option<DateTime<Utc>>,
}

impl FaultFence {
    pub fn health(&self) -> Health {
        self.health
    }

    pub fn is_faulted(&self) -> bool {
        self.health == Health::Faulted
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn faulted_at(&self) -> Option<DateTime<Utc>> {
        self.faulted_at
    }

    /// Close the fence. Returns false if it was already closed; the first
    /// reason is kept.
    pub fn trip(&mut self, reason: &str) -> bool {
        if self.is_faulted() {
            return false;
        }
        self.health = Health::Faulted;
        self.reason = Some(reason.to_string());
        self.faulted_at = Some(Utc::now());
        true
    }

    /// Dispatch-time check.
    pub fn check(&self) -> Result<(), BridgeError> {
        match self.health {
            Health::Healthy => Ok(()),
            Health::Faulted => Err(BridgeError::Unusable {
                reason: self.reason.clone().unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy() {
        let fence = FaultFence::default();
        assert_eq!(fence.health(), Health::Healthy);
        assert!(fence.check().is_ok());
        assert!(fence.reason().is_none());
        assert!(fence.faulted_at().is_none());
    }

    #[test]
    fn trip_is_one_way_and_keeps_first_reason() {
        let mut fence = FaultFence::default();
        assert!(fence.trip("worker crashed"));
        assert!(!fence.trip("second fault"));

        assert!(fence.is_faulted());
        assert_eq!(fence.reason(), Some("worker crashed"));
        assert!(fence.faulted_at().is_some());
        assert_eq!(
            fence.check(),
            Err(BridgeError::Unusable {
                reason: "worker crashed".to_string()
            })
        );
    }
}
