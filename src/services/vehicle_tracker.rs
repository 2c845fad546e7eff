//! Per-vehicle payment processing state
//!
//! Each vehicle inside a booth's detection zone gets one entry that walks
//! `Idle -> Processing -> PaymentCompleted`. The completion transition is the
//! only place a vehicle is charged, so a visit is billed at most once no matter
//! how often `advance` is called afterwards.
//!
//! Absence is judged per booth: the engine marks a booth as scanned before
//! feeding it detections, and a vehicle that was not reported in a scan counts
//! as gone from that gate.

use crate::domain::types::{BoothId, LaneId, Position, RoadId, Tick, Toll, VehicleId, VehicleType};
use crate::services::pricing::Charge;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Processing phase of a tracked vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingPhase {
    Idle,
    Processing,
    PaymentCompleted,
}

impl ProcessingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingPhase::Idle => "idle",
            ProcessingPhase::Processing => "processing",
            ProcessingPhase::PaymentCompleted => "paid",
        }
    }
}

/// Tracker entry for one vehicle visit
#[derive(Debug, Clone)]
pub struct VehicleProcessingState {
    pub booth: BoothId,
    pub road: RoadId,
    pub lane: LaneId,
    pub detected_at: Tick,
    pub processing_start: Option<Tick>,
    pub payment_completed: bool,
    pub processing_duration_ticks: u64,
    pub last_position: Position,
    /// Last scan of the owning booth that reported this vehicle
    pub last_seen: Tick,
    /// First scan of the owning booth that did not report this vehicle
    pub absent_since: Option<Tick>,
    /// Set on payment
    pub charge: Option<Charge>,
}

impl VehicleProcessingState {
    pub fn phase(&self) -> ProcessingPhase {
        if self.payment_completed {
            ProcessingPhase::PaymentCompleted
        } else if self.processing_start.is_some() {
            ProcessingPhase::Processing
        } else {
            ProcessingPhase::Idle
        }
    }

    pub fn is_absent(&self) -> bool {
        self.absent_since.is_some()
    }
}

/// Emitted exactly once per visit, when payment completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentCompletedEvent {
    pub vehicle: VehicleId,
    pub booth: BoothId,
    pub vehicle_type: VehicleType,
    pub amount: Toll,
    pub peak: bool,
}

/// Outcome of one `advance` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingEvent {
    /// No entry for this vehicle
    Untracked,
    /// Idle -> Processing on this call
    Started,
    /// Still processing
    Waiting { remaining_ticks: u64 },
    /// Processing -> PaymentCompleted on this call
    PaymentCompleted(PaymentCompletedEvent),
    /// Terminal state reached earlier
    AlreadyPaid,
}

/// Result of feeding one detection to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    New,
    Updated,
    /// Evicted by the ceiling and not yet seen leaving
    Quarantined,
    /// Already tracked by another booth's gate
    OtherBooth(BoothId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Vehicle no longer exists in the world
    Departed,
    /// Absolute lifetime exceeded
    Ceiling,
    /// Paid and confirmed clear of the gate
    Cleared,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Departed => "departed",
            EvictionReason::Ceiling => "ceiling",
            EvictionReason::Cleared => "cleared",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Eviction {
    pub vehicle: VehicleId,
    pub state: VehicleProcessingState,
    pub reason: EvictionReason,
}

/// Timing parameters, in ticks
#[derive(Debug, Clone, Copy)]
pub struct TrackerTiming {
    pub processing_duration_ticks: u64,
    pub cleanup_ceiling_ticks: u64,
    pub clearance_grace_ticks: u64,
}

/// Summary of a booth's tracked vehicles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoothLoad {
    pub tracked: usize,
    /// Unpaid entries (idle or processing)
    pub waiting: usize,
    /// Paid entries still reported at the gate
    pub paid_present: usize,
}

#[derive(Debug, Clone, Copy)]
struct QuarantineEntry {
    booth: BoothId,
    last_seen: Tick,
}

/// Owns every in-flight vehicle entry
pub struct VehicleProcessingTracker {
    timing: TrackerTiming,
    entries: FxHashMap<VehicleId, VehicleProcessingState>,
    scanned_at: FxHashMap<BoothId, Tick>,
    quarantine: FxHashMap<VehicleId, QuarantineEntry>,
}

impl VehicleProcessingTracker {
    pub fn new(timing: TrackerTiming) -> Self {
        Self {
            timing,
            entries: FxHashMap::default(),
            scanned_at: FxHashMap::default(),
            quarantine: FxHashMap::default(),
        }
    }

    pub fn timing(&self) -> TrackerTiming {
        self.timing
    }

    /// Record that `booth`'s detection zone is being scanned at `now`
    pub fn begin_scan(&mut self, booth: BoothId, now: Tick) {
        self.scanned_at.insert(booth, now);
    }

    /// Create an entry on first detection, otherwise refresh position and presence
    pub fn detect_or_update(
        &mut self,
        vehicle: VehicleId,
        booth: BoothId,
        road: RoadId,
        lane: LaneId,
        position: Position,
        now: Tick,
    ) -> Detection {
        if let Some(q) = self.quarantine.get_mut(&vehicle) {
            q.last_seen = now;
            return Detection::Quarantined;
        }

        if let Some(state) = self.entries.get_mut(&vehicle) {
            if state.booth != booth {
                return Detection::OtherBooth(state.booth);
            }
            state.last_position = position;
            state.last_seen = now;
            state.absent_since = None;
            return Detection::Updated;
        }

        debug!(vehicle = %vehicle, booth = %booth, tick = %now, "vehicle_detected");
        self.entries.insert(
            vehicle,
            VehicleProcessingState {
                booth,
                road,
                lane,
                detected_at: now,
                processing_start: None,
                payment_completed: false,
                processing_duration_ticks: self.timing.processing_duration_ticks,
                last_position: position,
                last_seen: now,
                absent_since: None,
                charge: None,
            },
        );
        Detection::New
    }

    /// Step the state machine for one vehicle. `charge` runs only on the completing call.
    pub fn advance<F>(&mut self, vehicle: VehicleId, now: Tick, charge: F) -> ProcessingEvent
    where
        F: FnOnce() -> Charge,
    {
        let Some(state) = self.entries.get_mut(&vehicle) else {
            return ProcessingEvent::Untracked;
        };

        if state.payment_completed {
            return ProcessingEvent::AlreadyPaid;
        }

        let (start, started_now) = match state.processing_start {
            Some(start) => (start, false),
            None => {
                state.processing_start = Some(now);
                (now, true)
            }
        };

        let elapsed = now.since(start);
        if elapsed < state.processing_duration_ticks {
            return if started_now {
                ProcessingEvent::Started
            } else {
                ProcessingEvent::Waiting { remaining_ticks: state.processing_duration_ticks - elapsed }
            };
        }

        let charged = charge();
        state.payment_completed = true;
        state.charge = Some(charged);

        info!(
            vehicle = %vehicle,
            booth = %state.booth,
            vehicle_type = %charged.vehicle_type,
            amount = %charged.amount,
            peak = %charged.peak,
            tick = %now,
            "payment_completed"
        );

        ProcessingEvent::PaymentCompleted(PaymentCompletedEvent {
            vehicle,
            booth: state.booth,
            vehicle_type: charged.vehicle_type,
            amount: charged.amount,
            peak: charged.peak,
        })
    }

    /// Remove departed, expired and cleared entries
    pub fn cleanup<F>(&mut self, now: Tick, exists: F) -> Vec<Eviction>
    where
        F: Fn(VehicleId) -> bool,
    {
        let timing = self.timing;
        let scanned_at = &self.scanned_at;
        let mut quarantined = Vec::new();
        let mut evicted: Vec<(VehicleId, EvictionReason)> = Vec::new();

        for (&vehicle, state) in self.entries.iter_mut() {
            let last_scan = scanned_at.get(&state.booth).copied().unwrap_or(state.last_seen);
            if last_scan > state.last_seen && state.absent_since.is_none() {
                state.absent_since = Some(last_scan);
            }

            let reason = if !exists(vehicle) {
                Some(EvictionReason::Departed)
            } else if now.since(state.detected_at) > timing.cleanup_ceiling_ticks {
                if state.absent_since.is_none() {
                    quarantined.push((vehicle, state.booth, state.last_seen));
                }
                Some(EvictionReason::Ceiling)
            } else if state.payment_completed
                && state.absent_since.is_some_and(|t| now.since(t) >= timing.clearance_grace_ticks)
                && state
                    .processing_start
                    .is_some_and(|t| now.since(t) >= timing.clearance_grace_ticks)
            {
                Some(EvictionReason::Cleared)
            } else {
                None
            };

            if let Some(reason) = reason {
                evicted.push((vehicle, reason));
            }
        }

        for (vehicle, booth, last_seen) in quarantined {
            debug!(vehicle = %vehicle, booth = %booth, "vehicle_quarantined");
            self.quarantine.insert(vehicle, QuarantineEntry { booth, last_seen });
        }

        self.quarantine.retain(|&vehicle, q| {
            let last_scan = scanned_at.get(&q.booth).copied().unwrap_or(q.last_seen);
            let keep = exists(vehicle) && last_scan <= q.last_seen;
            if !keep {
                debug!(vehicle = %vehicle, booth = %q.booth, "vehicle_quarantine_released");
            }
            keep
        });

        evicted.sort_unstable_by_key(|(vehicle, _)| *vehicle);
        evicted
            .into_iter()
            .filter_map(|(vehicle, reason)| {
                self.entries.remove(&vehicle).map(|state| Eviction { vehicle, state, reason })
            })
            .collect()
    }

    /// Drop every entry owned by a booth that no longer exists
    pub fn forget_booth(&mut self, booth: BoothId) -> Vec<(VehicleId, VehicleProcessingState)> {
        let vehicles: Vec<VehicleId> =
            self.entries.iter().filter(|(_, s)| s.booth == booth).map(|(v, _)| *v).collect();
        self.scanned_at.remove(&booth);
        self.quarantine.retain(|_, q| q.booth != booth);

        let mut removed: Vec<(VehicleId, VehicleProcessingState)> = vehicles
            .into_iter()
            .filter_map(|v| self.entries.remove(&v).map(|s| (v, s)))
            .collect();
        removed.sort_unstable_by_key(|(v, _)| *v);
        removed
    }

    pub fn booth_load(&self, booth: BoothId) -> BoothLoad {
        let last_scan = self.scanned_at.get(&booth).copied().unwrap_or_default();
        let mut load = BoothLoad::default();
        for state in self.entries.values().filter(|s| s.booth == booth) {
            load.tracked += 1;
            if !state.payment_completed {
                load.waiting += 1;
            } else if !state.is_absent() && state.last_seen >= last_scan {
                load.paid_present += 1;
            }
        }
        load
    }

    pub fn get(&self, vehicle: VehicleId) -> Option<&VehicleProcessingState> {
        self.entries.get(&vehicle)
    }

    pub fn is_quarantined(&self, vehicle: VehicleId) -> bool {
        self.quarantine.contains_key(&vehicle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.scanned_at.clear();
        self.quarantine.clear();
    }
}
