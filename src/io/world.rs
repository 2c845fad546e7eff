//! Boundary to the host simulation
//!
//! The engine never touches host storage directly. It reads through
//! `WorldView`, drives gates through `LaneSignalActuator`, and asks a
//! `SimulationHost` to advance time when it runs its own loop.

use crate::domain::types::{
    BoothDescriptor, BoothId, CapabilitySet, GateQueue, LaneId, LaneSignal, Tick, VehicleId,
};
use crate::error::TollError;

/// Read access to the host world for one tick
pub trait WorldView {
    /// Monotonic tick counter
    fn current_tick(&self) -> Tick;

    /// Every toll booth currently present
    fn active_booths(&self) -> Vec<BoothDescriptor>;

    /// Gate lane of a booth, if the world can resolve it this tick
    fn gate_lane(&self, booth: BoothId) -> Option<LaneId>;

    /// Current signal of a lane; `None` when the lane has no signal
    fn lane_signal(&self, lane: LaneId) -> Option<LaneSignal>;

    /// Vehicles within `threshold` metres of the gate, nearest first
    fn vehicles_near_gate(&self, lane: LaneId, threshold: f32) -> GateQueue;

    /// Capability tags of a vehicle
    fn capabilities(&self, vehicle: VehicleId) -> Option<CapabilitySet>;

    fn vehicle_exists(&self, vehicle: VehicleId) -> bool;
}

/// Drives the gate lane signal
pub trait LaneSignalActuator {
    fn set_lane_signal(&mut self, lane: LaneId, signal: LaneSignal) -> Result<(), TollError>;
}

/// A world that can advance its own clock, used by the standalone run loop
pub trait SimulationHost: WorldView + LaneSignalActuator {
    /// Advance the world by one tick
    fn step(&mut self);
}
