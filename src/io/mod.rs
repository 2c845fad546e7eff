//! IO modules - host boundary and outputs
//!
//! - `world` - Traits the engine reads and actuates the host world through
//! - `sim_world` - In-memory world used by tests and the demo binaries
//! - `egress` - Passage output to file (JSONL format)
//! - `reporting` - Read-only booth reports for presentation layers

pub mod egress;
pub mod reporting;
pub mod sim_world;
pub mod world;

// Re-export commonly used types
pub use egress::Egress;
pub use reporting::{BoothReport, ReportHandle};
pub use sim_world::SimWorld;
pub use world::{LaneSignalActuator, SimulationHost, WorldView};
