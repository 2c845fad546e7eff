//! Error types for per-entity toll processing.
//!
//! None of these escape a tick: the engine logs them against the booth or
//! vehicle that produced them and retries on the next tick.

use crate::domain::types::{BoothId, LaneId, VehicleId};

/// Failures raised while processing a single booth or vehicle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TollError {
    /// The world could not resolve the gate lane of a booth.
    #[error("gate lane unresolved for booth {0}")]
    GateLaneUnresolved(BoothId),

    /// The gate lane exists but carries no signal component.
    #[error("lane {0} has no signal")]
    SignalMissing(LaneId),

    /// The booth has not been assigned an owning road yet.
    #[error("booth {0} has no owning road")]
    RoadUnresolved(BoothId),

    /// Capability tags for a vehicle are not available.
    #[error("capabilities unavailable for vehicle {0}")]
    CapabilitiesMissing(VehicleId),

    /// The lane signal actuator rejected a command.
    #[error("actuator rejected signal change on lane {lane}: {reason}")]
    Actuator {
        /// Gate lane the command targeted.
        lane: LaneId,
        /// Reason reported by the world.
        reason: String,
    },

    /// A world adapter panicked while this entity was being processed.
    #[error("entity fault: {0}")]
    EntityFault(String),
}

impl TollError {
    /// Transient misses are expected while entities spawn or despawn.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TollError::GateLaneUnresolved(_)
                | TollError::SignalMissing(_)
                | TollError::RoadUnresolved(_)
                | TollError::CapabilitiesMissing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TollError::Actuator { lane: LaneId(4), reason: "locked".to_string() };
        assert_eq!(err.to_string(), "actuator rejected signal change on lane 4: locked");
        assert_eq!(TollError::SignalMissing(LaneId(2)).to_string(), "lane 2 has no signal");
    }

    #[test]
    fn test_transient_classification() {
        assert!(TollError::GateLaneUnresolved(BoothId(1)).is_transient());
        assert!(TollError::CapabilitiesMissing(VehicleId(1)).is_transient());
        assert!(!TollError::EntityFault("boom".into()).is_transient());
        assert!(!TollError::Actuator { lane: LaneId(1), reason: String::new() }.is_transient());
    }
}
