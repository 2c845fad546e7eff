//! Passage data model: one vehicle visit to one booth

use crate::domain::types::{BoothId, Tick, Toll, VehicleId, VehicleType};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// How a passage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassageOutcome {
    InProgress,
    Cleared,  // paid and confirmed clear of the gate
    Departed, // vehicle entity vanished from the world
    TimedOut, // evicted by the absolute ceiling
    Retired,  // owning booth was removed or lost its road
}

impl PassageOutcome {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            PassageOutcome::InProgress => "in_progress",
            PassageOutcome::Cleared => "cleared",
            PassageOutcome::Departed => "departed",
            PassageOutcome::TimedOut => "timed_out",
            PassageOutcome::Retired => "retired",
        }
    }
}

/// Event types recorded during a passage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassageEventType {
    Detected,
    ProcessingStarted,
    PaymentCompleted,
    BarrierOpened,
    LeftZone,
    Evicted,
}

impl PassageEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassageEventType::Detected => "detected",
            PassageEventType::ProcessingStarted => "processing",
            PassageEventType::PaymentCompleted => "paid",
            PassageEventType::BarrierOpened => "barrier_open",
            PassageEventType::LeftZone => "left_zone",
            PassageEventType::Evicted => "evicted",
        }
    }
}

/// A single event in a passage
#[derive(Debug, Clone)]
pub struct PassageEvent {
    pub t: PassageEventType,
    pub tick: Tick,
    pub extra: Option<String>,
}

impl PassageEvent {
    pub fn new(event_type: PassageEventType, tick: Tick) -> Self {
        Self { t: event_type, tick, extra: None }
    }

    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extra = Some(extra.to_string());
        self
    }

    fn to_json_value(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("t".to_string(), serde_json::Value::String(self.t.as_str().to_string()));
        obj.insert("tick".to_string(), serde_json::Value::Number(self.tick.0.into()));
        if let Some(x) = &self.extra {
            obj.insert("x".to_string(), serde_json::Value::String(x.clone()));
        }
        serde_json::Value::Object(obj)
    }
}

/// Complete record of one vehicle visit
#[derive(Debug, Clone)]
pub struct Passage {
    pub pid: String, // UUIDv7 passage ID
    pub booth: BoothId,
    pub vehicle: VehicleId,
    pub vehicle_type: Option<VehicleType>, // set on payment
    pub amount: Toll,
    pub peak: bool,
    pub detected_at: Tick,
    pub paid_at: Option<Tick>,
    pub ended_at: Option<Tick>,
    pub outcome: PassageOutcome,
    pub events: Vec<PassageEvent>,
}

impl Passage {
    /// Create a new in-progress passage.
    ///
    /// # Example
    ///
    /// ```
    /// use tollbooth::domain::passage::{Passage, PassageOutcome};
    /// use tollbooth::domain::types::{BoothId, Tick, VehicleId};
    ///
    /// let passage = Passage::new(BoothId(1), VehicleId(7), Tick(0));
    /// assert_eq!(passage.outcome, PassageOutcome::InProgress);
    /// assert!(passage.paid_at.is_none());
    /// ```
    pub fn new(booth: BoothId, vehicle: VehicleId, detected_at: Tick) -> Self {
        Self {
            pid: new_uuid_v7(),
            booth,
            vehicle,
            vehicle_type: None,
            amount: 0,
            peak: false,
            detected_at,
            paid_at: None,
            ended_at: None,
            outcome: PassageOutcome::InProgress,
            events: Vec::with_capacity(8),
        }
    }

    pub fn add_event(&mut self, event: PassageEvent) {
        self.events.push(event);
    }

    /// Mark the passage finished
    pub fn complete(&mut self, outcome: PassageOutcome, at: Tick) {
        self.outcome = outcome;
        self.ended_at = Some(at);
    }

    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }

    /// Short-key JSON line for egress
    pub fn to_json(&self) -> String {
        serde_json::Value::Object(self.to_json_map(None)).to_string()
    }

    pub fn to_json_with_site(&self, site_id: &str) -> String {
        serde_json::Value::Object(self.to_json_map(Some(site_id))).to_string()
    }

    /// Short-key JSON object, open for writers to add their own fields
    pub fn to_json_map(&self, site_id: Option<&str>) -> serde_json::Map<String, serde_json::Value> {
        let mut obj = serde_json::Map::new();

        if let Some(site) = site_id {
            obj.insert("site".to_string(), serde_json::Value::String(site.to_string()));
        }

        obj.insert("pid".to_string(), serde_json::Value::String(self.pid.clone()));
        obj.insert("booth".to_string(), serde_json::Value::Number(self.booth.0.into()));
        obj.insert("veh".to_string(), serde_json::Value::Number(self.vehicle.0.into()));
        match self.vehicle_type {
            Some(t) => {
                obj.insert("type".to_string(), serde_json::Value::String(t.as_str().to_string()))
            }
            None => obj.insert("type".to_string(), serde_json::Value::Null),
        };
        obj.insert("amt".to_string(), serde_json::Value::Number(self.amount.into()));
        obj.insert("peak".to_string(), serde_json::Value::Bool(self.peak));
        obj.insert("out".to_string(), serde_json::Value::String(self.outcome.as_str().to_string()));
        obj.insert("t0".to_string(), serde_json::Value::Number(self.detected_at.0.into()));
        if let Some(paid) = self.paid_at {
            obj.insert("paid".to_string(), serde_json::Value::Number(paid.0.into()));
        }
        if let Some(ended) = self.ended_at {
            obj.insert("t1".to_string(), serde_json::Value::Number(ended.0.into()));
        }

        let events: Vec<serde_json::Value> =
            self.events.iter().map(|e| e.to_json_value()).collect();
        obj.insert("ev".to_string(), serde_json::Value::Array(events));
        obj
    }
}
