//! Shared types for the toll booth core

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Monotonic scheduler tick (one simulation loop invocation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Tick(pub u64);

impl Tick {
    /// Ticks elapsed since `earlier`, saturating at zero
    #[inline]
    pub fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    #[inline]
    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }

    #[inline]
    pub fn plus(self, ticks: u64) -> Tick {
        Tick(self.0.saturating_add(ticks))
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Stable identifier of a toll booth instance
    BoothId
);
id_newtype!(
    /// Stable identifier of a road segment
    RoadId
);
id_newtype!(
    /// Stable identifier of a lane (the gate lane of a booth)
    LaneId
);
id_newtype!(
    /// Stable identifier of a vehicle entity
    VehicleId
);

/// World-space position [x, y, z]
pub type Position = [f32; 3];

/// Currency amount charged for a single passage
pub type Toll = u32;

/// Closed set of vehicle classes used for pricing and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    None,
    PersonalCar,
    PersonalCarWithTrailer,
    Truck,
    TruckWithTrailer,
    Bus,
    Taxi,
    ParkMaintenance,
    RoadMaintenance,
    Ambulance,
    EvacuatingTransport,
    FireEngine,
    GarbageTruck,
    Hearse,
    PoliceCar,
    PostVan,
    PrisonerTransport,
    Motorcycle,
}

/// Number of `VehicleType` variants
pub const VEHICLE_TYPE_COUNT: usize = 18;

impl VehicleType {
    pub const ALL: [VehicleType; VEHICLE_TYPE_COUNT] = [
        VehicleType::None,
        VehicleType::PersonalCar,
        VehicleType::PersonalCarWithTrailer,
        VehicleType::Truck,
        VehicleType::TruckWithTrailer,
        VehicleType::Bus,
        VehicleType::Taxi,
        VehicleType::ParkMaintenance,
        VehicleType::RoadMaintenance,
        VehicleType::Ambulance,
        VehicleType::EvacuatingTransport,
        VehicleType::FireEngine,
        VehicleType::GarbageTruck,
        VehicleType::Hearse,
        VehicleType::PoliceCar,
        VehicleType::PostVan,
        VehicleType::PrisonerTransport,
        VehicleType::Motorcycle,
    ];

    /// Dense index into per-type arrays
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::None => "none",
            VehicleType::PersonalCar => "personal_car",
            VehicleType::PersonalCarWithTrailer => "personal_car_with_trailer",
            VehicleType::Truck => "truck",
            VehicleType::TruckWithTrailer => "truck_with_trailer",
            VehicleType::Bus => "bus",
            VehicleType::Taxi => "taxi",
            VehicleType::ParkMaintenance => "park_maintenance",
            VehicleType::RoadMaintenance => "road_maintenance",
            VehicleType::Ambulance => "ambulance",
            VehicleType::EvacuatingTransport => "evacuating_transport",
            VehicleType::FireEngine => "fire_engine",
            VehicleType::GarbageTruck => "garbage_truck",
            VehicleType::Hearse => "hearse",
            VehicleType::PoliceCar => "police_car",
            VehicleType::PostVan => "post_van",
            VehicleType::PrisonerTransport => "prisoner_transport",
            VehicleType::Motorcycle => "motorcycle",
        }
    }

    /// Public transport vehicles, affected by the public transport exemption
    pub fn is_public_transport(&self) -> bool {
        matches!(self, VehicleType::Bus)
    }

    /// City service vehicles, affected by the service vehicle exemption
    pub fn is_service(&self) -> bool {
        matches!(
            self,
            VehicleType::ParkMaintenance
                | VehicleType::RoadMaintenance
                | VehicleType::Ambulance
                | VehicleType::EvacuatingTransport
                | VehicleType::FireEngine
                | VehicleType::GarbageTruck
                | VehicleType::Hearse
                | VehicleType::PoliceCar
                | VehicleType::PostVan
                | VehicleType::PrisonerTransport
        )
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown vehicle type: {s}"))
    }
}

/// Role tags a vehicle can carry, checked in fixed priority by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Police,
    Garbage,
    Taxi,
    Ambulance,
    FireEngine,
    Evacuating,
    ParkMaintenance,
    RoadMaintenance,
    Hearse,
    PrisonerTransport,
    PostVan,
}

impl Role {
    #[inline]
    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Compact set of role tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet(u16);

impl RoleSet {
    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        let mut set = RoleSet::default();
        for role in roles {
            set.insert(role);
        }
        set
    }
}

const ALL_ROLES: [Role; 11] = [
    Role::Police,
    Role::Garbage,
    Role::Taxi,
    Role::Ambulance,
    Role::FireEngine,
    Role::Evacuating,
    Role::ParkMaintenance,
    Role::RoadMaintenance,
    Role::Hearse,
    Role::PrisonerTransport,
    Role::PostVan,
];

impl From<RoleSet> for Vec<Role> {
    fn from(set: RoleSet) -> Self {
        ALL_ROLES.iter().copied().filter(|r| set.contains(*r)).collect()
    }
}

/// One segment of a multi-part vehicle layout (tractor, trailer, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayoutSegment {
    #[serde(default)]
    pub personal_car: bool,
}

/// Capability tags of a vehicle, as reported by the world
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Trailer layout; empty for single-body vehicles
    #[serde(default)]
    pub layout: SmallVec<[LayoutSegment; 2]>,
    #[serde(default)]
    pub public_transport: bool,
    #[serde(default)]
    pub delivery_truck: bool,
    #[serde(default)]
    pub roles: RoleSet,
    /// Passenger list length, if the vehicle carries a passenger list
    #[serde(default)]
    pub passengers: Option<usize>,
}

impl CapabilitySet {
    /// Private vehicle with a passenger list of the given length
    pub fn passenger_vehicle(passengers: usize) -> Self {
        Self { passengers: Some(passengers), ..Default::default() }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn with_trailer(mut self, tractor_is_car: bool) -> Self {
        self.layout.clear();
        self.layout.push(LayoutSegment { personal_car: tractor_is_car });
        self.layout.push(LayoutSegment { personal_car: false });
        self
    }

    pub fn public_transport() -> Self {
        Self { public_transport: true, ..Default::default() }
    }

    pub fn delivery_truck() -> Self {
        Self { delivery_truck: true, ..Default::default() }
    }
}

/// Lane traffic signal state used as the barrier actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneSignal {
    /// Barrier down
    Stop,
    /// Barrier up
    Go,
}

impl LaneSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneSignal::Stop => "stop",
            LaneSignal::Go => "go",
        }
    }

    pub fn is_permissive(&self) -> bool {
        matches!(self, LaneSignal::Go)
    }
}

/// Booth as enumerated by the world each tick
#[derive(Debug, Clone, PartialEq)]
pub struct BoothDescriptor {
    pub id: BoothId,
    /// Owning road; `None` while the world has not resolved ownership yet
    pub road: Option<RoadId>,
    /// Name carried by the prefab instance, if any
    pub name: Option<String>,
}

/// A vehicle within the detection threshold of a gate lane
#[derive(Debug, Clone, PartialEq)]
pub struct GateApproach {
    pub vehicle: VehicleId,
    /// Distance to the gate along the lane (metres)
    pub distance: f32,
    pub position: Position,
}

/// Vehicles near a gate, ordered by proximity
pub type GateQueue = SmallVec<[GateApproach; 8]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_type_index_is_dense() {
        for (i, t) in VehicleType::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
        assert_eq!(VehicleType::Motorcycle.index(), VEHICLE_TYPE_COUNT - 1);
    }

    #[test]
    fn test_vehicle_type_from_str() {
        assert_eq!("police_car".parse::<VehicleType>().unwrap(), VehicleType::PoliceCar);
        assert_eq!(
            "truck_with_trailer".parse::<VehicleType>().unwrap(),
            VehicleType::TruckWithTrailer
        );
        assert!("hovercraft".parse::<VehicleType>().is_err());
    }

    #[test]
    fn test_exemption_groups_are_disjoint() {
        for t in VehicleType::ALL {
            assert!(!(t.is_public_transport() && t.is_service()), "{t} in both groups");
        }
        assert!(VehicleType::Bus.is_public_transport());
        assert!(VehicleType::Hearse.is_service());
        assert!(!VehicleType::PersonalCar.is_service());
    }

    #[test]
    fn test_role_set() {
        let mut roles = RoleSet::default();
        assert!(roles.is_empty());
        roles.insert(Role::Taxi);
        roles.insert(Role::Police);
        assert!(roles.contains(Role::Taxi));
        assert!(roles.contains(Role::Police));
        assert!(!roles.contains(Role::Hearse));

        let as_vec: Vec<Role> = roles.into();
        assert_eq!(as_vec, vec![Role::Police, Role::Taxi]);
    }

    #[test]
    fn test_capabilities_deserialize() {
        let caps: CapabilitySet =
            serde_json::from_str(r#"{"roles":["post_van"],"passengers":0}"#).unwrap();
        assert!(caps.roles.contains(Role::PostVan));
        assert_eq!(caps.passengers, Some(0));
        assert!(caps.layout.is_empty());
    }

    #[test]
    fn test_tick_since_saturates() {
        assert_eq!(Tick(10).since(Tick(4)), 6);
        assert_eq!(Tick(4).since(Tick(10)), 0);
        assert_eq!(Tick(4).next(), Tick(5));
    }
}
