//! Toll pricing table
//!
//! Prices come from an injected `PricingConfig` that can be swapped at runtime.
//! When no configuration is installed the table falls back to a small built-in
//! list covering the common classes; everything else is free.

use crate::domain::types::{CapabilitySet, Tick, Toll, VehicleType};
use crate::infra::config::{PeakPolicy, PricingConfig};
use crate::services::classifier::classify;
use parking_lot::RwLock;
use tracing::info;

/// Built-in prices used when configuration is unavailable: (type, peak, off-peak)
const FALLBACK_RATES: [(VehicleType, Toll, Toll); 3] = [
    (VehicleType::PersonalCar, 150, 100),
    (VehicleType::Truck, 450, 300),
    (VehicleType::Bus, 300, 200),
];

/// Result of pricing one vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charge {
    pub vehicle_type: VehicleType,
    pub amount: Toll,
    pub peak: bool,
}

/// Maps `(VehicleType, peak)` to a price
pub struct TollPricingTable {
    config: RwLock<Option<PricingConfig>>,
}

impl TollPricingTable {
    pub fn new(config: PricingConfig) -> Self {
        Self { config: RwLock::new(Some(config)) }
    }

    /// Table with no configuration installed (fallback prices only)
    pub fn unconfigured() -> Self {
        Self { config: RwLock::new(None) }
    }

    /// Swap in a new configuration
    pub fn reload(&self, config: PricingConfig) {
        let mut guard = self.config.write();
        if guard.as_ref() != Some(&config) {
            info!(peak_policy = ?config.peak_policy, "pricing_reloaded");
            *guard = Some(config);
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.read().is_some()
    }

    /// Price for a vehicle type. Exemptions zero the price; they never change gate behavior.
    pub fn price(&self, vehicle_type: VehicleType, is_peak: bool) -> Toll {
        let guard = self.config.read();
        let Some(config) = guard.as_ref() else {
            return fallback_price(vehicle_type, is_peak);
        };

        if (config.exemptions.public_transport && vehicle_type.is_public_transport())
            || (config.exemptions.service_vehicles && vehicle_type.is_service())
        {
            return 0;
        }

        let rate = config.rate(vehicle_type);
        if is_peak {
            rate.peak
        } else {
            rate.off_peak
        }
    }

    /// Whether `now` falls in peak hours under the installed policy
    pub fn is_peak(&self, now: Tick) -> bool {
        match self.config.read().as_ref() {
            Some(config) => peak_at(&config.peak_policy, now),
            None => true,
        }
    }

    /// Classify and price a vehicle at tick `now`
    pub fn charge(&self, caps: &CapabilitySet, now: Tick) -> Charge {
        let vehicle_type = classify(caps);
        let peak = self.is_peak(now);
        Charge { vehicle_type, amount: self.price(vehicle_type, peak), peak }
    }

    /// Effective (peak, off-peak) price per type, for reporting
    pub fn table(&self) -> Vec<(VehicleType, Toll, Toll)> {
        VehicleType::ALL
            .iter()
            .map(|&t| (t, self.price(t, true), self.price(t, false)))
            .collect()
    }
}

fn fallback_price(vehicle_type: VehicleType, is_peak: bool) -> Toll {
    FALLBACK_RATES
        .iter()
        .find(|(t, _, _)| *t == vehicle_type)
        .map(|&(_, peak, off_peak)| if is_peak { peak } else { off_peak })
        .unwrap_or(0)
}

fn peak_at(policy: &PeakPolicy, now: Tick) -> bool {
    match policy {
        PeakPolicy::AlwaysPeak => true,
        PeakPolicy::AlwaysOffPeak => false,
        PeakPolicy::Schedule { ticks_per_hour, windows } => {
            let hour = ((now.0 / (*ticks_per_hour).max(1)) % 24) as u8;
            windows.iter().any(|&(start, end)| hour >= start && hour < end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Role;
    use crate::infra::config::{default_rates, Config, ExemptionConfig};

    fn table_with(config: Config) -> TollPricingTable {
        TollPricingTable::new(config.pricing().clone())
    }

    #[test]
    fn test_default_prices() {
        let table = table_with(Config::default());
        let car = default_rates()[VehicleType::PersonalCar.index()];

        assert_eq!(table.price(VehicleType::PersonalCar, true), car.peak);
        assert_eq!(table.price(VehicleType::PersonalCar, false), car.off_peak);
        assert_eq!(table.price(VehicleType::None, true), 0);
    }

    #[test]
    fn test_unconfigured_fallback() {
        let table = TollPricingTable::unconfigured();
        assert!(!table.is_configured());
        assert_eq!(table.price(VehicleType::PersonalCar, true), 150);
        assert_eq!(table.price(VehicleType::Truck, false), 300);
        assert_eq!(table.price(VehicleType::Bus, true), 300);
        assert_eq!(table.price(VehicleType::Hearse, true), 0);
        assert!(table.is_peak(Tick(12345)));
    }

    #[test]
    fn test_exemptions_zero_price() {
        let table = table_with(Config::default().with_exemptions(true, false));
        assert_eq!(table.price(VehicleType::Bus, true), 0);
        assert!(table.price(VehicleType::PoliceCar, true) > 0);

        let table = table_with(Config::default().with_exemptions(false, true));
        assert!(table.price(VehicleType::Bus, true) > 0);
        assert_eq!(table.price(VehicleType::PoliceCar, true), 0);
        assert_eq!(table.price(VehicleType::GarbageTruck, false), 0);
        assert!(table.price(VehicleType::Taxi, true) > 0);
    }

    #[test]
    fn test_default_policy_is_always_peak() {
        let table = table_with(Config::default());
        assert!(table.is_peak(Tick(0)));
        assert!(table.is_peak(Tick(3600 * 3)));
    }

    #[test]
    fn test_schedule_policy() {
        let policy = PeakPolicy::Schedule { ticks_per_hour: 10, windows: vec![(7, 10)] };
        let table = table_with(Config::default().with_peak_policy(policy));

        assert!(!table.is_peak(Tick(69)));
        assert!(table.is_peak(Tick(70)));
        assert!(table.is_peak(Tick(99)));
        assert!(!table.is_peak(Tick(100)));
        // Wraps after 24 hours
        assert!(table.is_peak(Tick(240 + 75)));
    }

    #[test]
    fn test_charge_classifies_and_prices() {
        let table = table_with(Config::default().with_peak_policy(PeakPolicy::AlwaysOffPeak));
        let charge = table.charge(&CapabilitySet::passenger_vehicle(0), Tick(5));

        assert_eq!(charge.vehicle_type, VehicleType::PersonalCar);
        assert!(!charge.peak);
        assert_eq!(charge.amount, default_rates()[VehicleType::PersonalCar.index()].off_peak);

        let charge = table.charge(&CapabilitySet::default().with_role(Role::Police), Tick(5));
        assert_eq!(charge.vehicle_type, VehicleType::PoliceCar);
    }

    #[test]
    fn test_reload_swaps_config() {
        let table = TollPricingTable::unconfigured();
        let mut pricing = Config::default().pricing().clone();
        pricing.rates[VehicleType::Hearse.index()].peak = 999;
        pricing.exemptions = ExemptionConfig::default();

        table.reload(pricing);
        assert!(table.is_configured());
        assert_eq!(table.price(VehicleType::Hearse, true), 999);
    }

    #[test]
    fn test_table_covers_all_types() {
        let table = table_with(Config::default());
        let rows = table.table();
        assert_eq!(rows.len(), VehicleType::ALL.len());
        assert_eq!(rows[0], (VehicleType::None, 0, 0));
    }
}
