//! Per-tick handlers for the TollEngine
//!
//! Booth lifecycle, barrier control for a single booth, and the cleanup pass.

use super::{panic_message, TickSummary, TollEngine};
use crate::domain::passage::{PassageEvent, PassageEventType, PassageOutcome};
use crate::domain::types::{BoothDescriptor, BoothId, CapabilitySet, LaneId, Tick, VehicleId};
use crate::error::TollError;
use crate::io::world::{LaneSignalActuator, WorldView};
use crate::services::barrier::CloseReason;
use crate::services::vehicle_tracker::{Detection, EvictionReason, ProcessingEvent};
use rustc_hash::FxHashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

/// Result of one booth's control pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoothControl {
    Evaluated,
    Throttled,
}

impl TollEngine {
    /// Process booths that have not been set up yet
    pub(crate) fn process_spawns(&mut self, booths: &[BoothDescriptor], now: Tick) {
        for descriptor in booths {
            if self.registry.is_processed(descriptor.id) {
                continue;
            }
            match self.registry.process_once(descriptor, now, &mut self.roads, &self.insights) {
                Ok(true) => self.metrics.record_booth_registered(),
                Ok(false) => {}
                Err(e) => debug!(booth = %descriptor.id, error = %e, "booth_pending"),
            }
        }
    }

    /// Stand down booths whose road was taken over by another booth
    pub(crate) fn release_displaced<A>(&mut self, actuator: &mut A, now: Tick, summary: &mut TickSummary)
    where
        A: LaneSignalActuator + ?Sized,
    {
        for booth in self.registry.take_displaced() {
            warn!(booth = %booth, tick = %now, "booth_displaced");
            for (vehicle, _) in self.tracker.forget_booth(booth) {
                self.passages.close(vehicle, PassageOutcome::Retired, now);
            }
            let Some(&lane) = self.lanes.get(&booth) else { continue };
            if let Err(e) = self.close_barrier(&mut *actuator, booth, lane, now, CloseReason::Idle, summary) {
                warn!(booth = %booth, tick = %now, error = %e, "barrier_close_failed");
                self.metrics.record_actuator_error();
            }
        }
    }

    /// Retire booths the world stopped reporting. Statistics are kept.
    pub(crate) fn retire_missing(&mut self, booths: &[BoothDescriptor], now: Tick) {
        for booth in self.registry.retire_missing(booths, &mut self.roads) {
            self.barriers.remove(booth.id);
            self.lanes.remove(&booth.id);
            for (vehicle, _) in self.tracker.forget_booth(booth.id) {
                self.passages.close(vehicle, PassageOutcome::Retired, now);
            }
            self.insights.set_road(booth.id, None);
            self.insights.set_barrier_open(booth.id, false);
            self.metrics.record_booth_retired();
        }
    }

    /// Control one booth, isolating errors and panics to it
    pub(crate) fn run_booth_control<W>(
        &mut self,
        world: &mut W,
        booth: BoothId,
        now: Tick,
        summary: &mut TickSummary,
    ) where
        W: WorldView + LaneSignalActuator,
    {
        let result = catch_unwind(AssertUnwindSafe(|| self.control_booth(world, booth, now, summary)));

        match result {
            Ok(Ok(BoothControl::Evaluated)) => {
                summary.booths_evaluated += 1;
                self.metrics.record_booth_evaluated();
            }
            Ok(Ok(BoothControl::Throttled)) => self.metrics.record_booth_throttled(),
            Ok(Err(e)) if e.is_transient() => {
                debug!(booth = %booth, tick = %now, error = %e, "booth_skipped");
                summary.booths_skipped += 1;
                self.metrics.record_booth_skipped();
            }
            Ok(Err(e)) => {
                warn!(booth = %booth, tick = %now, error = %e, "booth_control_failed");
                if matches!(e, TollError::Actuator { .. }) {
                    self.metrics.record_actuator_error();
                }
            }
            Err(payload) => {
                let fault = TollError::EntityFault(panic_message(payload.as_ref()));
                error!(booth = %booth, tick = %now, error = %fault, "booth_entity_fault");
                summary.faults += 1;
                self.metrics.record_entity_fault();
            }
        }
    }

    /// Detect, advance and gate the traffic of one booth
    fn control_booth<W>(
        &mut self,
        world: &mut W,
        booth: BoothId,
        now: Tick,
        summary: &mut TickSummary,
    ) -> Result<BoothControl, TollError>
    where
        W: WorldView + LaneSignalActuator,
    {
        let road = self.roads.lookup_road_for_booth(booth).ok_or(TollError::RoadUnresolved(booth))?;
        let lane = world.gate_lane(booth).ok_or(TollError::GateLaneUnresolved(booth))?;
        let signal = world.lane_signal(lane).ok_or(TollError::SignalMissing(lane))?;
        self.lanes.insert(booth, lane);

        let signal_changed = self.barriers.observe_signal(booth, signal);
        if !self.barriers.should_evaluate(booth, now, signal_changed) {
            return Ok(BoothControl::Throttled);
        }

        if self.barriers.reconcile(booth, lane, now, &mut *world)? {
            self.metrics.record_signal_reassert();
        }
        if self.barriers.retry_pending_open(booth, lane, now, &mut *world)? {
            self.on_barrier_opened(booth, None, now, summary);
        }

        let queue = world.vehicles_near_gate(lane, self.config.detection_threshold());
        self.tracker.begin_scan(booth, now);
        for approach in &queue {
            let detection = self.tracker.detect_or_update(
                approach.vehicle,
                booth,
                road,
                lane,
                approach.position,
                now,
            );
            match detection {
                Detection::New => {
                    self.metrics.record_vehicle_detected();
                    self.passages.open(approach.vehicle, booth, now);
                }
                Detection::OtherBooth(owner) => {
                    debug!(vehicle = %approach.vehicle, booth = %booth, owner = %owner, "vehicle_owned_elsewhere");
                }
                Detection::Updated | Detection::Quarantined => {}
            }
        }

        let mut actuator_error = None;
        for approach in &queue {
            let vehicle = approach.vehicle;
            if self.tracker.get(vehicle).map_or(true, |s| s.booth != booth) {
                continue;
            }

            let pricing = &self.pricing;
            let view = &*world;
            let event = self.tracker.advance(vehicle, now, || {
                let caps = view.capabilities(vehicle).unwrap_or_else(|| {
                    debug!(error = %TollError::CapabilitiesMissing(vehicle), "vehicle_unclassified");
                    CapabilitySet::default()
                });
                pricing.charge(&caps, now)
            });

            match event {
                ProcessingEvent::Started => {
                    self.passages.add_event(
                        vehicle,
                        PassageEvent::new(PassageEventType::ProcessingStarted, now),
                    );
                }
                ProcessingEvent::PaymentCompleted(payment) => {
                    self.insights.record_passage(booth, payment.vehicle_type, payment.amount, now);
                    self.metrics.record_payment(u64::from(payment.amount));
                    self.passages.record_payment(&payment, now);
                    summary.payments.push(payment);

                    match self.barriers.request_open(booth, lane, now, &mut *world) {
                        Ok(true) => self.on_barrier_opened(booth, Some(vehicle), now, summary),
                        Ok(false) => {}
                        Err(e) => {
                            actuator_error.get_or_insert(e);
                        }
                    }
                }
                ProcessingEvent::Untracked
                | ProcessingEvent::Waiting { .. }
                | ProcessingEvent::AlreadyPaid => {}
            }
        }

        let load = self.tracker.booth_load(booth);
        self.barriers.set_vehicle_waiting(booth, load.waiting > 0);

        if self.barriers.open_timed_out(booth, now) {
            self.close_barrier(world, booth, lane, now, CloseReason::Timeout, summary)?;
        } else if load.tracked == 0 && queue.is_empty() {
            self.close_barrier(world, booth, lane, now, CloseReason::Idle, summary)?;
        }
        self.barriers.schedule_next(booth, now);

        match actuator_error {
            Some(e) => Err(e),
            None => Ok(BoothControl::Evaluated),
        }
    }

    fn on_barrier_opened(
        &mut self,
        booth: BoothId,
        vehicle: Option<VehicleId>,
        now: Tick,
        summary: &mut TickSummary,
    ) {
        summary.barriers_opened += 1;
        self.metrics.record_barrier_open();
        self.insights.set_barrier_open(booth, true);
        if let Some(vehicle) = vehicle {
            self.passages.add_event(vehicle, PassageEvent::new(PassageEventType::BarrierOpened, now));
        }
    }

    fn close_barrier<A>(
        &mut self,
        actuator: &mut A,
        booth: BoothId,
        lane: LaneId,
        now: Tick,
        reason: CloseReason,
        summary: &mut TickSummary,
    ) -> Result<(), TollError>
    where
        A: LaneSignalActuator + ?Sized,
    {
        if !self.barriers.request_close(booth, lane, now, reason, actuator)? {
            return Ok(());
        }

        summary.barriers_closed += 1;
        self.insights.set_barrier_open(booth, false);
        match reason {
            CloseReason::Idle => self.metrics.record_barrier_close_idle(),
            CloseReason::Cleared => self.metrics.record_barrier_close_cleared(),
            CloseReason::Timeout => self.metrics.record_barrier_close_timeout(),
        }
        Ok(())
    }

    /// Evict stale entries, then close barriers whose paid traffic has cleared
    pub(crate) fn run_cleanup<W>(&mut self, world: &mut W, now: Tick, summary: &mut TickSummary)
    where
        W: WorldView + LaneSignalActuator,
    {
        let metrics = &self.metrics;
        let view = &*world;
        let evictions = self.tracker.cleanup(now, |vehicle| {
            catch_unwind(AssertUnwindSafe(|| view.vehicle_exists(vehicle))).unwrap_or_else(|payload| {
                error!(
                    vehicle = %vehicle,
                    error = %TollError::EntityFault(panic_message(payload.as_ref())),
                    "vehicle_entity_fault"
                );
                metrics.record_entity_fault();
                true
            })
        });

        let mut cleared_booths = FxHashSet::default();
        for eviction in evictions {
            summary.evictions += 1;
            let state = &eviction.state;
            match eviction.reason {
                EvictionReason::Departed => {
                    self.metrics.record_eviction_departed();
                    // A paid vehicle that left the world has cleared the gate
                    if state.payment_completed {
                        cleared_booths.insert(state.booth);
                    }
                }
                EvictionReason::Ceiling => self.metrics.record_eviction_ceiling(),
                EvictionReason::Cleared => {
                    self.metrics.record_eviction_cleared();
                    cleared_booths.insert(state.booth);
                }
            }

            if eviction.reason == EvictionReason::Ceiling {
                info!(
                    vehicle = %eviction.vehicle,
                    booth = %state.booth,
                    phase = %state.phase().as_str(),
                    detected_at = %state.detected_at,
                    tick = %now,
                    "vehicle_evicted_ceiling"
                );
            } else {
                debug!(
                    vehicle = %eviction.vehicle,
                    booth = %state.booth,
                    reason = %eviction.reason.as_str(),
                    "vehicle_evicted"
                );
            }

            self.passages.add_event(
                eviction.vehicle,
                PassageEvent::new(PassageEventType::Evicted, now).with_extra(eviction.reason.as_str()),
            );
            self.passages.close(eviction.vehicle, eviction.reason.into(), now);
        }

        let mut cleared: Vec<BoothId> = cleared_booths.into_iter().collect();
        cleared.sort_unstable();
        for booth in cleared {
            if self.tracker.booth_load(booth).paid_present > 0 {
                continue;
            }
            let Some(&lane) = self.lanes.get(&booth) else { continue };
            if let Err(e) = self.close_barrier(&mut *world, booth, lane, now, CloseReason::Cleared, summary) {
                warn!(booth = %booth, tick = %now, error = %e, "barrier_close_failed");
                self.metrics.record_actuator_error();
            }
        }
    }
}
