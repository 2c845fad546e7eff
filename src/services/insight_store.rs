//! Per-booth passage statistics
//!
//! Written by the engine on the simulation thread, read by reporting layers
//! from any thread. Each booth's ledger sits behind its own mutex so a reader
//! always copies a complete counter set.

use crate::domain::types::{BoothId, RoadId, Tick, Toll, VehicleType, VEHICLE_TYPE_COUNT};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Aggregate counters for one booth since the last reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TollBoothInsight {
    pub by_type: [u64; VEHICLE_TYPE_COUNT],
    pub total_vehicles: u64,
    pub total_revenue: u64,
    pub last_reset: Tick,
}

impl TollBoothInsight {
    pub fn count(&self, vehicle_type: VehicleType) -> u64 {
        self.by_type[vehicle_type.index()]
    }

    fn record(&mut self, vehicle_type: VehicleType, amount: Toll) {
        self.by_type[vehicle_type.index()] += 1;
        self.total_vehicles += 1;
        self.total_revenue += u64::from(amount);
    }
}

/// Everything the reporting layer shows for one booth
#[derive(Debug, Clone, Default)]
pub struct BoothLedger {
    pub name: Option<String>,
    pub road: Option<RoadId>,
    pub insight: TollBoothInsight,
    /// Lifetime income, unaffected by `reset`
    pub total_income: u64,
    /// Amount charged to the most recent vehicle
    pub current_toll: Toll,
    pub barrier_open: bool,
}

/// Concurrent store of booth ledgers
#[derive(Default)]
pub struct TollBoothInsightStore {
    booths: RwLock<FxHashMap<BoothId, Arc<Mutex<BoothLedger>>>>,
}

impl TollBoothInsightStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, booth: BoothId) -> Option<Arc<Mutex<BoothLedger>>> {
        self.booths.read().get(&booth).cloned()
    }

    fn entry_or_create(&self, booth: BoothId) -> Arc<Mutex<BoothLedger>> {
        if let Some(ledger) = self.entry(booth) {
            return ledger;
        }
        self.booths.write().entry(booth).or_default().clone()
    }

    /// Initialise (or refresh) a booth's identity. Counters are kept.
    pub fn register(&self, booth: BoothId, name: &str, road: Option<RoadId>) {
        let ledger = self.entry_or_create(booth);
        let mut ledger = ledger.lock();
        ledger.name = Some(name.to_string());
        ledger.road = road;
    }

    pub fn contains(&self, booth: BoothId) -> bool {
        self.booths.read().contains_key(&booth)
    }

    /// Count one paid passage
    pub fn record_passage(&self, booth: BoothId, vehicle_type: VehicleType, amount: Toll, now: Tick) {
        let ledger = match self.entry(booth) {
            Some(ledger) => ledger,
            None => {
                warn!(booth = %booth, tick = %now, "insight_missing_created");
                self.entry_or_create(booth)
            }
        };
        let mut ledger = ledger.lock();
        ledger.insight.record(vehicle_type, amount);
        ledger.total_income += u64::from(amount);
        ledger.current_toll = amount;
    }

    /// Zero all counters and stamp the reset tick. Returns false for unknown booths.
    pub fn reset(&self, booth: BoothId, now: Tick) -> bool {
        let Some(ledger) = self.entry(booth) else {
            return false;
        };
        let mut ledger = ledger.lock();
        ledger.insight = TollBoothInsight { last_reset: now, ..Default::default() };
        info!(booth = %booth, tick = %now, "insight_reset");
        true
    }

    pub fn snapshot(&self, booth: BoothId) -> Option<TollBoothInsight> {
        self.entry(booth).map(|ledger| ledger.lock().insight)
    }

    pub fn ledger(&self, booth: BoothId) -> Option<BoothLedger> {
        self.entry(booth).map(|ledger| ledger.lock().clone())
    }

    pub fn set_barrier_open(&self, booth: BoothId, open: bool) {
        if let Some(ledger) = self.entry(booth) {
            ledger.lock().barrier_open = open;
        }
    }

    pub fn set_road(&self, booth: BoothId, road: Option<RoadId>) {
        if let Some(ledger) = self.entry(booth) {
            ledger.lock().road = road;
        }
    }

    /// Known booth ids in ascending order
    pub fn booth_ids(&self) -> Vec<BoothId> {
        let mut ids: Vec<BoothId> = self.booths.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_reset() {
        let store = TollBoothInsightStore::new();
        let booth = BoothId(1);
        store.register(booth, "Toll Booth #1", Some(RoadId(10)));

        let passages = [
            (VehicleType::PersonalCar, 150),
            (VehicleType::Truck, 450),
            (VehicleType::PersonalCar, 150),
            (VehicleType::Bus, 300),
            (VehicleType::None, 0),
        ];
        for (i, (t, amount)) in passages.iter().enumerate() {
            store.record_passage(booth, *t, *amount, Tick(i as u64));
        }

        let insight = store.snapshot(booth).unwrap();
        assert_eq!(insight.total_vehicles, 5);
        assert_eq!(insight.total_revenue, 1050);
        assert_eq!(insight.count(VehicleType::PersonalCar), 2);
        assert_eq!(insight.count(VehicleType::None), 1);

        assert!(store.reset(booth, Tick(100)));
        let insight = store.snapshot(booth).unwrap();
        assert_eq!(insight, TollBoothInsight { last_reset: Tick(100), ..Default::default() });

        store.record_passage(booth, VehicleType::Truck, 450, Tick(101));
        let insight = store.snapshot(booth).unwrap();
        assert_eq!(insight.total_vehicles, 1);
        assert_eq!(insight.total_revenue, 450);

        // Lifetime income survives the reset
        let ledger = store.ledger(booth).unwrap();
        assert_eq!(ledger.total_income, 1500);
        assert_eq!(ledger.current_toll, 450);
        assert_eq!(ledger.name.as_deref(), Some("Toll Booth #1"));
    }

    #[test]
    fn test_missing_booth_created_lazily() {
        let store = TollBoothInsightStore::new();
        store.record_passage(BoothId(9), VehicleType::Taxi, 100, Tick(3));
        assert!(store.contains(BoothId(9)));
        assert_eq!(store.snapshot(BoothId(9)).unwrap().count(VehicleType::Taxi), 1);
    }

    #[test]
    fn test_reset_unknown_booth() {
        let store = TollBoothInsightStore::new();
        assert!(!store.reset(BoothId(4), Tick(0)));
        assert!(store.snapshot(BoothId(4)).is_none());
    }

    #[test]
    fn test_register_keeps_counters() {
        let store = TollBoothInsightStore::new();
        store.register(BoothId(1), "A", None);
        store.record_passage(BoothId(1), VehicleType::Truck, 450, Tick(0));
        store.register(BoothId(1), "B", Some(RoadId(2)));

        let ledger = store.ledger(BoothId(1)).unwrap();
        assert_eq!(ledger.name.as_deref(), Some("B"));
        assert_eq!(ledger.insight.total_vehicles, 1);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_counters() {
        use std::thread;

        let store = Arc::new(TollBoothInsightStore::new());
        store.register(BoothId(1), "A", None);

        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..2000 {
                    let insight = store.snapshot(BoothId(1)).unwrap();
                    let sum: u64 = insight.by_type.iter().sum();
                    assert_eq!(sum, insight.total_vehicles);
                    assert_eq!(insight.total_revenue, insight.total_vehicles * 100);
                }
            })
        };

        for i in 0..2000 {
            let t = VehicleType::ALL[i % VEHICLE_TYPE_COUNT];
            store.record_passage(BoothId(1), t, 100, Tick(i as u64));
        }
        reader.join().unwrap();

        assert_eq!(store.snapshot(BoothId(1)).unwrap().total_vehicles, 2000);
    }
}
