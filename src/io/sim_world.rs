//! In-memory world
//!
//! Implements the host boundary over plain maps. Used as the test double for
//! the engine and as the demo host for the binaries. Vehicles move along their
//! lane towards the gate, stop at a `Stop` signal, keep a gap to the vehicle
//! ahead and despawn some distance past the gate. Scenarios can also place,
//! pull and despawn vehicles directly.

use crate::domain::types::{
    BoothDescriptor, BoothId, CapabilitySet, GateApproach, GateQueue, LaneId, LaneSignal, Role,
    RoadId, Tick, VehicleId,
};
use crate::error::TollError;
use crate::infra::config::SimulationConfig;
use crate::io::world::{LaneSignalActuator, SimulationHost, WorldView};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use tracing::debug;

/// Minimum distance kept to the vehicle ahead (metres)
const FOLLOW_GAP: f32 = 6.0;

/// Vehicles this far past the gate leave the world (metres)
const DESPAWN_DISTANCE: f32 = 60.0;

#[derive(Debug, Clone)]
struct SimBooth {
    road: Option<RoadId>,
    name: Option<String>,
    lane: Option<LaneId>,
}

#[derive(Debug, Clone)]
struct SimVehicle {
    caps: Option<CapabilitySet>,
    lane: Option<LaneId>,
    /// Distance to the gate; negative once past it
    distance: f32,
    speed: f32,
}

/// One actuator command accepted by the world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCall {
    pub tick: Tick,
    pub lane: LaneId,
    pub signal: LaneSignal,
}

/// Seeded random traffic source
struct TrafficGenerator {
    rng: ChaCha8Rng,
    spawn_every_ticks: u64,
    speed: f32,
    spawn_distance: f32,
}

impl TrafficGenerator {
    fn random_caps(&mut self) -> CapabilitySet {
        match self.rng.gen_range(0..100) {
            0..=44 => CapabilitySet::passenger_vehicle(0),
            45..=52 => CapabilitySet::passenger_vehicle(1),
            53..=62 => CapabilitySet::delivery_truck(),
            63..=67 => CapabilitySet::delivery_truck().with_trailer(false),
            68..=70 => CapabilitySet::passenger_vehicle(0).with_trailer(true),
            71..=78 => CapabilitySet::public_transport(),
            79..=83 => CapabilitySet::passenger_vehicle(0).with_role(Role::Taxi),
            84..=86 => CapabilitySet::default().with_role(Role::Garbage),
            87..=88 => CapabilitySet::default().with_role(Role::Police),
            89..=90 => CapabilitySet::default().with_role(Role::Ambulance),
            91..=92 => CapabilitySet::default().with_role(Role::PostVan),
            93..=94 => CapabilitySet::default().with_role(Role::RoadMaintenance),
            95..=96 => CapabilitySet::default().with_role(Role::Hearse),
            _ => CapabilitySet::passenger_vehicle(3),
        }
    }
}

/// In-memory implementation of the host boundary
pub struct SimWorld {
    tick: Tick,
    booths: BTreeMap<BoothId, SimBooth>,
    signals: FxHashMap<LaneId, LaneSignal>,
    vehicles: BTreeMap<VehicleId, SimVehicle>,
    next_vehicle: u32,
    actuator_log: Vec<ActuatorCall>,
    failing_lanes: FxHashSet<LaneId>,
    faulty_booths: FxHashSet<BoothId>,
    traffic: Option<TrafficGenerator>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self {
            tick: Tick(0),
            booths: BTreeMap::new(),
            signals: FxHashMap::default(),
            vehicles: BTreeMap::new(),
            next_vehicle: 1,
            actuator_log: Vec::new(),
            failing_lanes: FxHashSet::default(),
            faulty_booths: FxHashSet::default(),
            traffic: None,
        }
    }

    /// Demo world: `config.booths` booths with random traffic
    pub fn from_config(config: &SimulationConfig) -> Self {
        let mut world = Self::new();
        for i in 1..=config.booths {
            world.add_booth(BoothId(i), RoadId(100 + i), LaneId(1000 + i));
        }
        world.traffic = Some(TrafficGenerator {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            spawn_every_ticks: config.spawn_every_ticks.max(1),
            speed: config.vehicle_speed,
            spawn_distance: config.spawn_distance,
        });
        world
    }

    /// Add a booth with a resolved road and a gate lane showing `Stop`
    pub fn add_booth(&mut self, booth: BoothId, road: RoadId, lane: LaneId) {
        self.booths.insert(booth, SimBooth { road: Some(road), name: None, lane: Some(lane) });
        self.signals.insert(lane, LaneSignal::Stop);
    }

    pub fn set_booth_name(&mut self, booth: BoothId, name: &str) {
        if let Some(b) = self.booths.get_mut(&booth) {
            b.name = Some(name.to_string());
        }
    }

    pub fn set_booth_road(&mut self, booth: BoothId, road: Option<RoadId>) {
        if let Some(b) = self.booths.get_mut(&booth) {
            b.road = road;
        }
    }

    /// Make the gate lane of a booth unresolvable (or restore it)
    pub fn set_booth_lane(&mut self, booth: BoothId, lane: Option<LaneId>) {
        if let Some(b) = self.booths.get_mut(&booth) {
            b.lane = lane;
        }
    }

    pub fn remove_booth(&mut self, booth: BoothId) {
        self.booths.remove(&booth);
    }

    /// Overwrite a lane signal from outside the engine (`None` removes it)
    pub fn set_signal(&mut self, lane: LaneId, signal: Option<LaneSignal>) {
        match signal {
            Some(s) => {
                self.signals.insert(lane, s);
            }
            None => {
                self.signals.remove(&lane);
            }
        }
    }

    pub fn signal(&self, lane: LaneId) -> Option<LaneSignal> {
        self.signals.get(&lane).copied()
    }

    /// Spawn a vehicle `distance` metres before the gate of `lane`
    pub fn spawn_vehicle(
        &mut self,
        lane: LaneId,
        distance: f32,
        speed: f32,
        caps: Option<CapabilitySet>,
    ) -> VehicleId {
        let id = VehicleId(self.next_vehicle);
        self.next_vehicle += 1;
        self.vehicles.insert(id, SimVehicle { caps, lane: Some(lane), distance, speed });
        id
    }

    /// Spawn a stationary vehicle at the gate
    pub fn park_at_gate(&mut self, lane: LaneId, caps: CapabilitySet) -> VehicleId {
        self.spawn_vehicle(lane, 0.0, 0.0, Some(caps))
    }

    /// Move a vehicle off every lane; it still exists in the world
    pub fn pull_from_lane(&mut self, vehicle: VehicleId) {
        if let Some(v) = self.vehicles.get_mut(&vehicle) {
            v.lane = None;
        }
    }

    pub fn place_vehicle(&mut self, vehicle: VehicleId, lane: LaneId, distance: f32) {
        if let Some(v) = self.vehicles.get_mut(&vehicle) {
            v.lane = Some(lane);
            v.distance = distance;
        }
    }

    pub fn despawn(&mut self, vehicle: VehicleId) {
        self.vehicles.remove(&vehicle);
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Reject every actuator command for `lane`
    pub fn fail_actuator(&mut self, lane: LaneId, fail: bool) {
        if fail {
            self.failing_lanes.insert(lane);
        } else {
            self.failing_lanes.remove(&lane);
        }
    }

    /// Make lookups for `booth` panic, simulating a malformed entity
    pub fn make_faulty(&mut self, booth: BoothId) {
        self.faulty_booths.insert(booth);
    }

    pub fn actuator_log(&self) -> &[ActuatorCall] {
        &self.actuator_log
    }

    pub fn actuator_calls(&self, lane: LaneId) -> usize {
        self.actuator_log.iter().filter(|c| c.lane == lane).count()
    }

    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    fn move_vehicles(&mut self) {
        let mut by_lane: BTreeMap<LaneId, Vec<(f32, VehicleId)>> = BTreeMap::new();
        for (&id, v) in &self.vehicles {
            if let Some(lane) = v.lane {
                by_lane.entry(lane).or_default().push((v.distance, id));
            }
        }

        for (lane, mut queue) in by_lane {
            let open = self.signals.get(&lane).map_or(true, |s| s.is_permissive());
            queue.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut ahead: Option<f32> = None;
            for (_, id) in queue {
                let Some(v) = self.vehicles.get_mut(&id) else { continue };
                if v.speed > 0.0 {
                    let mut target = v.distance - v.speed;
                    if !open && v.distance >= 0.0 {
                        target = target.max(0.0);
                    }
                    if let Some(leader) = ahead {
                        if v.distance > leader {
                            target = target.max(leader + FOLLOW_GAP);
                        }
                    }
                    v.distance = target.min(v.distance);
                }
                ahead = Some(v.distance);
            }
        }

        let gone: Vec<VehicleId> = self
            .vehicles
            .iter()
            .filter(|(_, v)| v.lane.is_some() && v.distance < -DESPAWN_DISTANCE)
            .map(|(id, _)| *id)
            .collect();
        for id in gone {
            debug!(vehicle = %id, "sim_vehicle_despawned");
            self.vehicles.remove(&id);
        }
    }

    fn spawn_traffic(&mut self) {
        let Some(mut traffic) = self.traffic.take() else {
            return;
        };
        if self.tick.0 % traffic.spawn_every_ticks == 0 {
            let lanes: Vec<LaneId> = self.booths.values().filter_map(|b| b.lane).collect();
            for lane in lanes {
                if traffic.rng.gen_bool(0.6) {
                    let caps = traffic.random_caps();
                    let id = self.spawn_vehicle(lane, traffic.spawn_distance, traffic.speed, Some(caps));
                    debug!(vehicle = %id, lane = %lane, "sim_vehicle_spawned");
                }
            }
        }
        self.traffic = Some(traffic);
    }

    fn check_faulty(&self, booth: BoothId) {
        if self.faulty_booths.contains(&booth) {
            panic!("malformed booth entity {booth}");
        }
    }
}

impl WorldView for SimWorld {
    fn current_tick(&self) -> Tick {
        self.tick
    }

    fn active_booths(&self) -> Vec<BoothDescriptor> {
        self.booths
            .iter()
            .map(|(&id, b)| BoothDescriptor { id, road: b.road, name: b.name.clone() })
            .collect()
    }

    fn gate_lane(&self, booth: BoothId) -> Option<LaneId> {
        self.check_faulty(booth);
        self.booths.get(&booth).and_then(|b| b.lane)
    }

    fn lane_signal(&self, lane: LaneId) -> Option<LaneSignal> {
        self.signals.get(&lane).copied()
    }

    fn vehicles_near_gate(&self, lane: LaneId, threshold: f32) -> GateQueue {
        let mut queue: GateQueue = self
            .vehicles
            .iter()
            .filter(|(_, v)| v.lane == Some(lane) && v.distance >= 0.0 && v.distance <= threshold)
            .map(|(&id, v)| GateApproach {
                vehicle: id,
                distance: v.distance,
                position: [v.distance, lane.0 as f32, 0.0],
            })
            .collect();
        queue.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        queue
    }

    fn capabilities(&self, vehicle: VehicleId) -> Option<CapabilitySet> {
        self.vehicles.get(&vehicle).and_then(|v| v.caps.clone())
    }

    fn vehicle_exists(&self, vehicle: VehicleId) -> bool {
        self.vehicles.contains_key(&vehicle)
    }
}

impl LaneSignalActuator for SimWorld {
    fn set_lane_signal(&mut self, lane: LaneId, signal: LaneSignal) -> Result<(), TollError> {
        if self.failing_lanes.contains(&lane) {
            return Err(TollError::Actuator { lane, reason: "signal controller offline".to_string() });
        }
        if !self.signals.contains_key(&lane) {
            return Err(TollError::SignalMissing(lane));
        }
        self.signals.insert(lane, signal);
        self.actuator_log.push(ActuatorCall { tick: self.tick, lane, signal });
        Ok(())
    }
}

impl SimulationHost for SimWorld {
    fn step(&mut self) {
        self.tick = self.tick.next();
        self.move_vehicles();
        self.spawn_traffic();
    }
}
