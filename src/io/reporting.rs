//! Read-only reporting snapshot for presentation layers
//!
//! `ReportHandle` is cheap to clone and safe to use from any thread while the
//! engine keeps writing. Every report is copied under the booth's lock.

use crate::domain::types::{BoothId, RoadId, Tick, Toll, VehicleType};
use crate::services::insight_store::{BoothLedger, TollBoothInsightStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a UI panel shows for one booth
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoothReport {
    pub booth: BoothId,
    pub name: Option<String>,
    pub road: Option<RoadId>,
    pub barrier_open: bool,
    pub current_toll: Toll,
    pub total_income: u64,
    pub total_vehicles: u64,
    pub total_revenue: u64,
    pub last_reset: Tick,
    pub by_type: BTreeMap<VehicleType, u64>,
}

impl BoothReport {
    pub fn from_ledger(booth: BoothId, ledger: &BoothLedger) -> Self {
        let insight = &ledger.insight;
        Self {
            booth,
            name: ledger.name.clone(),
            road: ledger.road,
            barrier_open: ledger.barrier_open,
            current_toll: ledger.current_toll,
            total_income: ledger.total_income,
            total_vehicles: insight.total_vehicles,
            total_revenue: insight.total_revenue,
            last_reset: insight.last_reset,
            by_type: VehicleType::ALL.iter().map(|&t| (t, insight.count(t))).collect(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Shared handle to the insight store for UI/reporting consumers
#[derive(Clone)]
pub struct ReportHandle {
    store: Arc<TollBoothInsightStore>,
}

impl ReportHandle {
    pub fn new(store: Arc<TollBoothInsightStore>) -> Self {
        Self { store }
    }

    pub fn report(&self, booth: BoothId) -> Option<BoothReport> {
        self.store.ledger(booth).map(|ledger| BoothReport::from_ledger(booth, &ledger))
    }

    /// Reports for every known booth, ordered by id
    pub fn reports(&self) -> Vec<BoothReport> {
        self.store.booth_ids().into_iter().filter_map(|id| self.report(id)).collect()
    }

    /// UI "reset statistics" command
    pub fn reset(&self, booth: BoothId, now: Tick) -> bool {
        self.store.reset(booth, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_contents() {
        let store = Arc::new(TollBoothInsightStore::new());
        store.register(BoothId(2), "Toll Booth #1", Some(RoadId(20)));
        store.record_passage(BoothId(2), VehicleType::Bus, 200, Tick(5));
        store.set_barrier_open(BoothId(2), true);

        let handle = ReportHandle::new(store);
        let report = handle.report(BoothId(2)).unwrap();
        assert_eq!(report.name.as_deref(), Some("Toll Booth #1"));
        assert!(report.barrier_open);
        assert_eq!(report.current_toll, 200);
        assert_eq!(report.by_type.len(), VehicleType::ALL.len());
        assert_eq!(report.by_type[&VehicleType::Bus], 1);

        let parsed: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(parsed["by_type"]["bus"], 1);
        assert_eq!(parsed["total_income"], 200);
        assert_eq!(parsed["booth"], 2);
    }

    #[test]
    fn test_reports_ordered_and_reset() {
        let store = Arc::new(TollBoothInsightStore::new());
        store.register(BoothId(3), "C", None);
        store.register(BoothId(1), "A", None);
        store.record_passage(BoothId(1), VehicleType::Truck, 450, Tick(0));

        let handle = ReportHandle::new(store);
        let ids: Vec<BoothId> = handle.reports().iter().map(|r| r.booth).collect();
        assert_eq!(ids, vec![BoothId(1), BoothId(3)]);

        assert!(handle.reset(BoothId(1), Tick(9)));
        let report = handle.report(BoothId(1)).unwrap();
        assert_eq!(report.total_vehicles, 0);
        assert_eq!(report.last_reset, Tick(9));
        assert_eq!(report.total_income, 450);
        assert!(handle.report(BoothId(7)).is_none());
    }
}
