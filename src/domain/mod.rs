//! Domain models - core toll booth types and passage model
//!
//! This module contains the canonical data types used throughout the system:
//! - `VehicleType` - closed set of vehicle classes used for pricing and stats
//! - `CapabilitySet` - capability tags the classifier inspects
//! - `LaneSignal` - gate lane signal state (the barrier actuator)
//! - `Passage` - one vehicle visit to one booth, written to egress

pub mod passage;
pub mod types;
