//! Services - business logic and state management
//!
//! This module contains the core toll services:
//! - `engine` - Per-tick orchestrator owning all mutable toll state
//! - `vehicle_tracker` - Per-vehicle processing state machine
//! - `barrier` - Barrier (lane signal) controller
//! - `classifier` - Vehicle classification from capability tags
//! - `pricing` - Toll pricing table
//! - `insight_store` - Per-booth statistics
//! - `road_index` - Road to booth association index
//! - `booth_registry` - One-time booth setup and retirement
//! - `passage_log` - Passage records for egress

pub mod barrier;
pub mod booth_registry;
pub mod classifier;
pub mod engine;
pub mod insight_store;
pub mod passage_log;
pub mod pricing;
pub mod road_index;
pub mod vehicle_tracker;

// Re-export commonly used types
pub use barrier::{BarrierController, CloseReason};
pub use classifier::classify;
pub use engine::{TickSummary, TollEngine};
pub use insight_store::{TollBoothInsight, TollBoothInsightStore};
pub use pricing::{Charge, TollPricingTable};
pub use road_index::TollRoadAssociationIndex;
pub use vehicle_tracker::{PaymentCompletedEvent, VehicleProcessingTracker};
