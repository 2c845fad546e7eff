//! Barrier state machine
//!
//! One `BarrierState` per booth, `Closed` until a payment completes. Open and
//! close requests are idempotent: repeating the current state never reaches
//! the actuator and never logs.

use crate::domain::types::{BoothId, LaneId, LaneSignal, Tick};
use crate::error::TollError;
use crate::io::world::LaneSignalActuator;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

/// Why a barrier was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Nothing tracked and nothing at the gate
    Idle,
    /// The paid vehicle was confirmed clear of the gate
    Cleared,
    /// Open longer than the timeout since the last payment
    Timeout,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Idle => "idle",
            CloseReason::Cleared => "cleared",
            CloseReason::Timeout => "timeout",
        }
    }
}

/// Per-booth barrier state. `Default` is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierState {
    pub is_open: bool,
    pub last_update: Tick,
    pub has_vehicle_waiting: bool,
    pub last_vehicle_passed: Option<Tick>,
    pub last_lane_signal_observed: Option<LaneSignal>,
    /// A payment completed but the actuator rejected the open command
    pub open_pending: bool,
    /// Next tick the throttled controller evaluates this booth
    pub next_eval: Tick,
}

impl BarrierState {
    pub fn desired_signal(&self) -> LaneSignal {
        if self.is_open {
            LaneSignal::Go
        } else {
            LaneSignal::Stop
        }
    }
}

/// Poll intervals used when throttling is enabled
#[derive(Debug, Clone, Copy)]
pub struct ThrottlePolicy {
    pub enabled: bool,
    pub waiting_poll_ticks: u64,
    pub idle_poll_ticks: u64,
}

/// Owns every booth's `BarrierState` and drives the lane signal actuator
pub struct BarrierController {
    states: FxHashMap<BoothId, BarrierState>,
    throttle: ThrottlePolicy,
    open_timeout_ticks: u64,
}

impl BarrierController {
    pub fn new(open_timeout_ticks: u64, throttle: ThrottlePolicy) -> Self {
        Self { states: FxHashMap::default(), throttle, open_timeout_ticks }
    }

    pub fn state(&self, booth: BoothId) -> Option<&BarrierState> {
        self.states.get(&booth)
    }

    /// Lazily create a closed state for a booth
    pub fn state_mut(&mut self, booth: BoothId) -> &mut BarrierState {
        self.states.entry(booth).or_default()
    }

    pub fn is_open(&self, booth: BoothId) -> bool {
        self.states.get(&booth).is_some_and(|s| s.is_open)
    }

    pub fn open_count(&self) -> usize {
        self.states.values().filter(|s| s.is_open).count()
    }

    /// Closed -> Open. Already open only refreshes the passage stamp.
    ///
    /// Returns `Ok(true)` when the actuator was driven.
    pub fn request_open<A>(
        &mut self,
        booth: BoothId,
        lane: LaneId,
        now: Tick,
        actuator: &mut A,
    ) -> Result<bool, TollError>
    where
        A: LaneSignalActuator + ?Sized,
    {
        let state = self.states.entry(booth).or_default();
        if state.is_open {
            state.last_vehicle_passed = Some(now);
            return Ok(false);
        }

        state.open_pending = true;
        actuator.set_lane_signal(lane, LaneSignal::Go)?;
        state.open_pending = false;
        state.is_open = true;
        state.last_lane_signal_observed = Some(LaneSignal::Go);
        state.last_vehicle_passed = Some(now);
        state.last_update = now;
        info!(booth = %booth, lane = %lane, tick = %now, "barrier_opened");
        Ok(true)
    }

    /// Open -> Closed. Already closed is a no-op.
    pub fn request_close<A>(
        &mut self,
        booth: BoothId,
        lane: LaneId,
        now: Tick,
        reason: CloseReason,
        actuator: &mut A,
    ) -> Result<bool, TollError>
    where
        A: LaneSignalActuator + ?Sized,
    {
        let state = self.states.entry(booth).or_default();
        if !state.is_open {
            state.open_pending = false;
            return Ok(false);
        }

        actuator.set_lane_signal(lane, LaneSignal::Stop)?;
        state.is_open = false;
        state.last_lane_signal_observed = Some(LaneSignal::Stop);
        state.last_update = now;
        info!(
            booth = %booth,
            lane = %lane,
            tick = %now,
            reason = %reason.as_str(),
            "barrier_closed"
        );
        Ok(true)
    }

    /// Retry an open command the actuator rejected earlier
    pub fn retry_pending_open<A>(
        &mut self,
        booth: BoothId,
        lane: LaneId,
        now: Tick,
        actuator: &mut A,
    ) -> Result<bool, TollError>
    where
        A: LaneSignalActuator + ?Sized,
    {
        if !self.states.get(&booth).is_some_and(|s| s.open_pending) {
            return Ok(false);
        }
        debug!(booth = %booth, lane = %lane, "barrier_open_retry");
        self.request_open(booth, lane, now, actuator)
    }

    /// Open for longer than the timeout since the last payment
    pub fn open_timed_out(&self, booth: BoothId, now: Tick) -> bool {
        match self.states.get(&booth) {
            Some(s) if s.is_open => {
                let since = s.last_vehicle_passed.unwrap_or(s.last_update);
                now.since(since) > self.open_timeout_ticks
            }
            _ => false,
        }
    }

    /// Record the observed lane signal. Returns true if it changed since the last observation.
    pub fn observe_signal(&mut self, booth: BoothId, observed: LaneSignal) -> bool {
        let state = self.states.entry(booth).or_default();
        let changed = state.last_lane_signal_observed.is_some_and(|prev| prev != observed);
        state.last_lane_signal_observed = Some(observed);
        changed
    }

    /// Re-assert the desired signal when the lane disagrees with the barrier state
    pub fn reconcile<A>(
        &mut self,
        booth: BoothId,
        lane: LaneId,
        now: Tick,
        actuator: &mut A,
    ) -> Result<bool, TollError>
    where
        A: LaneSignalActuator + ?Sized,
    {
        let state = self.states.entry(booth).or_default();
        let desired = state.desired_signal();
        match state.last_lane_signal_observed {
            Some(observed) if observed != desired => {
                warn!(
                    booth = %booth,
                    lane = %lane,
                    observed = %observed.as_str(),
                    desired = %desired.as_str(),
                    tick = %now,
                    "lane_signal_drift"
                );
                actuator.set_lane_signal(lane, desired)?;
                state.last_lane_signal_observed = Some(desired);
                state.last_update = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn set_vehicle_waiting(&mut self, booth: BoothId, waiting: bool) {
        self.states.entry(booth).or_default().has_vehicle_waiting = waiting;
    }

    /// Whether the booth is due for evaluation this tick
    pub fn should_evaluate(&self, booth: BoothId, now: Tick, signal_changed: bool) -> bool {
        if !self.throttle.enabled || signal_changed {
            return true;
        }
        match self.states.get(&booth) {
            // Open barriers are watched every pass so the timeout stays exact
            Some(s) => s.is_open || now >= s.next_eval,
            None => true,
        }
    }

    /// Schedule the next evaluation after one was performed
    pub fn schedule_next(&mut self, booth: BoothId, now: Tick) {
        let throttle = self.throttle;
        let state = self.states.entry(booth).or_default();
        let interval = if state.has_vehicle_waiting {
            throttle.waiting_poll_ticks
        } else {
            throttle.idle_poll_ticks
        };
        state.next_eval = now.plus(interval);
        debug!(booth = %booth, next_eval = %state.next_eval, "barrier_eval_scheduled");
    }

    /// Drop a retired booth's state
    pub fn remove(&mut self, booth: BoothId) -> Option<BarrierState> {
        self.states.remove(&booth)
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingActuator {
        calls: Vec<(LaneId, LaneSignal)>,
        fail: bool,
    }

    impl LaneSignalActuator for RecordingActuator {
        fn set_lane_signal(&mut self, lane: LaneId, signal: LaneSignal) -> Result<(), TollError> {
            if self.fail {
                return Err(TollError::Actuator { lane, reason: "stuck".to_string() });
            }
            self.calls.push((lane, signal));
            Ok(())
        }
    }

    const B1: BoothId = BoothId(1);
    const L1: LaneId = LaneId(100);

    fn controller() -> BarrierController {
        BarrierController::new(
            180,
            ThrottlePolicy { enabled: false, waiting_poll_ticks: 120, idle_poll_ticks: 300 },
        )
    }

    #[test]
    fn test_default_closed() {
        assert!(!BarrierState::default().is_open);
        let mut c = controller();
        assert!(!c.is_open(B1));
        assert!(!c.state_mut(B1).is_open);
        assert_eq!(c.state(B1).unwrap().desired_signal(), LaneSignal::Stop);
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut c = controller();
        let mut act = RecordingActuator::default();

        assert!(c.request_open(B1, L1, Tick(10), &mut act).unwrap());
        assert!(!c.request_open(B1, L1, Tick(20), &mut act).unwrap());
        assert_eq!(act.calls, vec![(L1, LaneSignal::Go)]);
        // Second request still refreshes the passage stamp
        assert_eq!(c.state(B1).unwrap().last_vehicle_passed, Some(Tick(20)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut c = controller();
        let mut act = RecordingActuator::default();

        assert!(!c.request_close(B1, L1, Tick(0), CloseReason::Idle, &mut act).unwrap());
        assert!(act.calls.is_empty());

        c.request_open(B1, L1, Tick(1), &mut act).unwrap();
        assert!(c.request_close(B1, L1, Tick(2), CloseReason::Cleared, &mut act).unwrap());
        assert!(!c.request_close(B1, L1, Tick(3), CloseReason::Cleared, &mut act).unwrap());
        assert_eq!(act.calls, vec![(L1, LaneSignal::Go), (L1, LaneSignal::Stop)]);
    }

    #[test]
    fn test_actuator_error_keeps_state() {
        let mut c = controller();
        let mut act = RecordingActuator { fail: true, ..Default::default() };

        assert!(c.request_open(B1, L1, Tick(0), &mut act).is_err());
        assert!(!c.is_open(B1));
        assert!(c.state(B1).unwrap().open_pending);
        assert!(c.retry_pending_open(B1, L1, Tick(1), &mut act).is_err());

        act.fail = false;
        assert!(c.retry_pending_open(B1, L1, Tick(2), &mut act).unwrap());
        assert!(c.is_open(B1));
        assert!(!c.state(B1).unwrap().open_pending);
        assert!(!c.retry_pending_open(B1, L1, Tick(3), &mut act).unwrap());
    }

    #[test]
    fn test_open_timeout() {
        let mut c = controller();
        let mut act = RecordingActuator::default();
        c.request_open(B1, L1, Tick(100), &mut act).unwrap();

        assert!(!c.open_timed_out(B1, Tick(280)));
        assert!(c.open_timed_out(B1, Tick(281)));
        assert!(!c.open_timed_out(BoothId(2), Tick(1000)));
    }

    #[test]
    fn test_reconcile_reasserts_desired_signal() {
        let mut c = controller();
        let mut act = RecordingActuator::default();

        assert!(!c.observe_signal(B1, LaneSignal::Stop));
        assert!(!c.reconcile(B1, L1, Tick(0), &mut act).unwrap());

        // Something external flipped the lane to go while closed
        assert!(c.observe_signal(B1, LaneSignal::Go));
        assert!(c.reconcile(B1, L1, Tick(1), &mut act).unwrap());
        assert_eq!(act.calls, vec![(L1, LaneSignal::Stop)]);
    }

    #[test]
    fn test_throttle_schedule() {
        let mut c = BarrierController::new(
            180,
            ThrottlePolicy { enabled: true, waiting_poll_ticks: 120, idle_poll_ticks: 300 },
        );
        assert!(c.should_evaluate(B1, Tick(0), false));

        c.schedule_next(B1, Tick(0));
        assert!(!c.should_evaluate(B1, Tick(299), false));
        assert!(c.should_evaluate(B1, Tick(299), true));
        assert!(c.should_evaluate(B1, Tick(300), false));

        c.set_vehicle_waiting(B1, true);
        c.schedule_next(B1, Tick(300));
        assert!(!c.should_evaluate(B1, Tick(419), false));
        assert!(c.should_evaluate(B1, Tick(420), false));
    }

    #[test]
    fn test_remove_resets_to_closed() {
        let mut c = controller();
        let mut act = RecordingActuator::default();
        c.request_open(B1, L1, Tick(0), &mut act).unwrap();
        assert_eq!(c.open_count(), 1);

        assert!(c.remove(B1).unwrap().is_open);
        assert!(!c.is_open(B1));
        assert_eq!(c.open_count(), 0);
    }
}
