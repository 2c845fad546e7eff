//! Vehicle classification from capability tags
//!
//! Evaluation order is fixed because capability sets overlap (a taxi also
//! carries a passenger list, a police car may carry a role and a layout).
//! The first rule that matches wins:
//! 1. Trailer layout with two or more segments
//! 2. Public transport
//! 3. Delivery truck
//! 4. Role tags, in `ROLE_PRIORITY` order
//! 5. Passenger list with 0 or 1 passengers
//! 6. `VehicleType::None`

use crate::domain::types::{CapabilitySet, Role, VehicleType};

/// Role tags in the order they are checked
const ROLE_PRIORITY: [(Role, VehicleType); 11] = [
    (Role::Police, VehicleType::PoliceCar),
    (Role::Garbage, VehicleType::GarbageTruck),
    (Role::Taxi, VehicleType::Taxi),
    (Role::Ambulance, VehicleType::Ambulance),
    (Role::FireEngine, VehicleType::FireEngine),
    (Role::Evacuating, VehicleType::EvacuatingTransport),
    (Role::ParkMaintenance, VehicleType::ParkMaintenance),
    (Role::RoadMaintenance, VehicleType::RoadMaintenance),
    (Role::Hearse, VehicleType::Hearse),
    (Role::PrisonerTransport, VehicleType::PrisonerTransport),
    (Role::PostVan, VehicleType::PostVan),
];

/// Classify a vehicle. Total: unmatched tag sets resolve to `VehicleType::None`.
pub fn classify(caps: &CapabilitySet) -> VehicleType {
    if caps.layout.len() >= 2 {
        return if caps.layout[0].personal_car || caps.layout[1].personal_car {
            VehicleType::PersonalCarWithTrailer
        } else {
            VehicleType::TruckWithTrailer
        };
    }

    if caps.public_transport {
        return VehicleType::Bus;
    }

    if caps.delivery_truck {
        return VehicleType::Truck;
    }

    if !caps.roles.is_empty() {
        if let Some((_, vehicle_type)) =
            ROLE_PRIORITY.iter().find(|(role, _)| caps.roles.contains(*role))
        {
            return *vehicle_type;
        }
    }

    // Passenger counts other than 0 or 1 deliberately fall through
    match caps.passengers {
        Some(1) => VehicleType::Motorcycle,
        Some(0) => VehicleType::PersonalCar,
        _ => VehicleType::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LayoutSegment;
    use smallvec::smallvec;

    #[test]
    fn test_empty_caps_is_none() {
        assert_eq!(classify(&CapabilitySet::default()), VehicleType::None);
    }

    #[test]
    fn test_trailer_layout() {
        let car_trailer = CapabilitySet::passenger_vehicle(0).with_trailer(true);
        assert_eq!(classify(&car_trailer), VehicleType::PersonalCarWithTrailer);

        let truck_trailer = CapabilitySet::delivery_truck().with_trailer(false);
        assert_eq!(classify(&truck_trailer), VehicleType::TruckWithTrailer);

        // Car flag on the second segment also counts
        let caps = CapabilitySet {
            layout: smallvec![
                LayoutSegment { personal_car: false },
                LayoutSegment { personal_car: true }
            ],
            ..Default::default()
        };
        assert_eq!(classify(&caps), VehicleType::PersonalCarWithTrailer);
    }

    #[test]
    fn test_single_segment_layout_is_ignored() {
        let caps = CapabilitySet {
            layout: smallvec![LayoutSegment { personal_car: true }],
            passengers: Some(0),
            ..Default::default()
        };
        assert_eq!(classify(&caps), VehicleType::PersonalCar);
    }

    #[test]
    fn test_public_transport_beats_delivery_and_roles() {
        let mut caps = CapabilitySet::public_transport().with_role(Role::Taxi);
        caps.delivery_truck = true;
        assert_eq!(classify(&caps), VehicleType::Bus);
    }

    #[test]
    fn test_delivery_beats_roles() {
        let caps = CapabilitySet::delivery_truck().with_role(Role::PostVan);
        assert_eq!(classify(&caps), VehicleType::Truck);
    }

    #[test]
    fn test_role_priority() {
        let caps = CapabilitySet::passenger_vehicle(0).with_role(Role::Taxi).with_role(Role::Police);
        assert_eq!(classify(&caps), VehicleType::PoliceCar);

        let caps = CapabilitySet::default().with_role(Role::PostVan).with_role(Role::Hearse);
        assert_eq!(classify(&caps), VehicleType::Hearse);

        let caps = CapabilitySet::default().with_role(Role::Evacuating).with_role(Role::FireEngine);
        assert_eq!(classify(&caps), VehicleType::FireEngine);
    }

    #[test]
    fn test_every_role_maps() {
        for (role, expected) in ROLE_PRIORITY {
            assert_eq!(classify(&CapabilitySet::default().with_role(role)), expected);
        }
    }

    #[test]
    fn test_passenger_counts() {
        assert_eq!(classify(&CapabilitySet::passenger_vehicle(0)), VehicleType::PersonalCar);
        assert_eq!(classify(&CapabilitySet::passenger_vehicle(1)), VehicleType::Motorcycle);
        assert_eq!(classify(&CapabilitySet::passenger_vehicle(3)), VehicleType::None);
    }

    #[test]
    fn test_totality_over_tag_combinations() {
        let roles = [None, Some(Role::Police), Some(Role::Taxi), Some(Role::PostVan)];
        let passengers = [None, Some(0), Some(1), Some(4)];
        for layout_segments in 0..3 {
            for public_transport in [false, true] {
                for delivery_truck in [false, true] {
                    for role in roles {
                        for pax in passengers {
                            let mut caps = CapabilitySet {
                                public_transport,
                                delivery_truck,
                                passengers: pax,
                                ..Default::default()
                            };
                            for _ in 0..layout_segments {
                                caps.layout.push(LayoutSegment::default());
                            }
                            if let Some(r) = role {
                                caps.roles.insert(r);
                            }
                            let t = classify(&caps);
                            assert!(VehicleType::ALL.contains(&t));
                        }
                    }
                }
            }
        }
    }
}
