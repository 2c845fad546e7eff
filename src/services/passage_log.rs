//! Passage lifecycle: one record per tracked visit, finalised on eviction

use crate::domain::passage::{Passage, PassageEvent, PassageEventType, PassageOutcome};
use crate::domain::types::{BoothId, Tick, VehicleId};
use crate::services::vehicle_tracker::{EvictionReason, PaymentCompletedEvent};
use rustc_hash::FxHashMap;
use tracing::debug;

impl From<EvictionReason> for PassageOutcome {
    fn from(reason: EvictionReason) -> Self {
        match reason {
            EvictionReason::Departed => PassageOutcome::Departed,
            EvictionReason::Ceiling => PassageOutcome::TimedOut,
            EvictionReason::Cleared => PassageOutcome::Cleared,
        }
    }
}

/// Tracks in-progress passages and collects finished ones for egress
#[derive(Default)]
pub struct PassageManager {
    active: FxHashMap<VehicleId, Passage>,
    finished: Vec<Passage>,
}

impl PassageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a passage for a newly detected vehicle
    pub fn open(&mut self, vehicle: VehicleId, booth: BoothId, now: Tick) {
        let mut passage = Passage::new(booth, vehicle, now);
        passage.add_event(PassageEvent::new(PassageEventType::Detected, now));
        debug!(vehicle = %vehicle, booth = %booth, pid = %passage.pid, "passage_opened");
        self.active.insert(vehicle, passage);
    }

    pub fn add_event(&mut self, vehicle: VehicleId, event: PassageEvent) {
        if let Some(passage) = self.active.get_mut(&vehicle) {
            passage.add_event(event);
        }
    }

    pub fn record_payment(&mut self, payment: &PaymentCompletedEvent, now: Tick) {
        if let Some(passage) = self.active.get_mut(&payment.vehicle) {
            passage.vehicle_type = Some(payment.vehicle_type);
            passage.amount = payment.amount;
            passage.peak = payment.peak;
            passage.paid_at = Some(now);
            passage.add_event(
                PassageEvent::new(PassageEventType::PaymentCompleted, now)
                    .with_extra(&format!("type={},amt={}", payment.vehicle_type, payment.amount)),
            );
        }
    }

    /// Finish a passage and queue it for egress
    pub fn close(&mut self, vehicle: VehicleId, outcome: PassageOutcome, now: Tick) {
        if let Some(mut passage) = self.active.remove(&vehicle) {
            passage.complete(outcome, now);
            debug!(
                vehicle = %vehicle,
                pid = %passage.pid,
                outcome = %outcome.as_str(),
                "passage_closed"
            );
            self.finished.push(passage);
        }
    }

    pub fn get(&self, vehicle: VehicleId) -> Option<&Passage> {
        self.active.get(&vehicle)
    }

    /// Take every finished passage
    pub fn drain(&mut self) -> Vec<Passage> {
        std::mem::take(&mut self.finished)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.finished.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::VehicleType;

    #[test]
    fn test_passage_lifecycle() {
        let mut log = PassageManager::new();
        let v = VehicleId(5);
        log.open(v, BoothId(1), Tick(0));
        log.add_event(v, PassageEvent::new(PassageEventType::ProcessingStarted, Tick(0)));
        log.record_payment(
            &PaymentCompletedEvent {
                vehicle: v,
                booth: BoothId(1),
                vehicle_type: VehicleType::Taxi,
                amount: 100,
                peak: true,
            },
            Tick(120),
        );
        assert!(log.drain().is_empty());

        log.close(v, EvictionReason::Cleared.into(), Tick(250));
        assert_eq!(log.active_len(), 0);

        let done = log.drain();
        assert_eq!(done.len(), 1);
        let p = &done[0];
        assert_eq!(p.outcome, PassageOutcome::Cleared);
        assert_eq!(p.vehicle_type, Some(VehicleType::Taxi));
        assert_eq!(p.paid_at, Some(Tick(120)));
        assert_eq!(p.ended_at, Some(Tick(250)));
        assert_eq!(p.events.len(), 3);
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_close_unknown_vehicle_is_noop() {
        let mut log = PassageManager::new();
        log.close(VehicleId(1), PassageOutcome::Departed, Tick(3));
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_eviction_reason_mapping() {
        assert_eq!(PassageOutcome::from(EvictionReason::Departed), PassageOutcome::Departed);
        assert_eq!(PassageOutcome::from(EvictionReason::Ceiling), PassageOutcome::TimedOut);
    }
}
