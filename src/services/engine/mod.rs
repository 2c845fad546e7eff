//! Toll engine: per-tick orchestration
//!
//! The engine is the single owner of all mutable toll state. Each tick it:
//! - processes newly spawned booths (every tick) and stands down booths
//!   that lost their road to one of them
//! - retires booths the world no longer reports
//! - runs barrier control for every booth (every `control_interval_ticks`)
//! - evicts stale tracker entries and closes barriers for cleared traffic
//! - writes finished passages to egress
//!
//! Every booth is processed in isolation: an error or a panic raised by the
//! world while handling one booth is logged and the tick moves on.

mod handlers;

use crate::domain::types::{BoothId, LaneId, Tick};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::egress::Egress;
use crate::io::reporting::ReportHandle;
use crate::io::world::{LaneSignalActuator, SimulationHost, WorldView};
use crate::services::barrier::{BarrierController, ThrottlePolicy};
use crate::services::booth_registry::BoothRegistry;
use crate::services::insight_store::TollBoothInsightStore;
use crate::services::passage_log::PassageManager;
use crate::services::pricing::TollPricingTable;
use crate::services::road_index::TollRoadAssociationIndex;
use crate::services::vehicle_tracker::{PaymentCompletedEvent, TrackerTiming, VehicleProcessingTracker};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// What happened during one tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: Tick,
    pub control_ran: bool,
    pub booths_evaluated: usize,
    pub booths_skipped: usize,
    pub faults: usize,
    pub payments: Vec<PaymentCompletedEvent>,
    pub barriers_opened: usize,
    pub barriers_closed: usize,
    pub evictions: usize,
}

/// Orchestrates booths, tracker, barriers, statistics and egress
pub struct TollEngine {
    pub(crate) config: Config,
    pub(crate) pricing: Arc<TollPricingTable>,
    pub(crate) insights: Arc<TollBoothInsightStore>,
    pub(crate) tracker: VehicleProcessingTracker,
    pub(crate) barriers: BarrierController,
    pub(crate) roads: TollRoadAssociationIndex,
    pub(crate) registry: BoothRegistry,
    pub(crate) passages: PassageManager,
    pub(crate) egress: Egress,
    pub(crate) metrics: Arc<Metrics>,
    /// Last resolved gate lane per booth
    pub(crate) lanes: FxHashMap<BoothId, LaneId>,
    last_control: Option<Tick>,
}

impl TollEngine {
    pub fn new(config: Config, metrics: Arc<Metrics>) -> Self {
        let pricing = Arc::new(TollPricingTable::new(config.pricing().clone()));
        Self::with_pricing(config, pricing, metrics)
    }

    /// Engine sharing an externally owned (hot-reloadable) pricing table
    pub fn with_pricing(config: Config, pricing: Arc<TollPricingTable>, metrics: Arc<Metrics>) -> Self {
        let tracker = VehicleProcessingTracker::new(TrackerTiming {
            processing_duration_ticks: config.processing_duration_ticks(),
            cleanup_ceiling_ticks: config.cleanup_ceiling_ticks(),
            clearance_grace_ticks: config.clearance_grace_ticks(),
        });
        let barriers = BarrierController::new(
            config.barrier_open_timeout_ticks(),
            ThrottlePolicy {
                enabled: config.throttle_enabled(),
                waiting_poll_ticks: config.waiting_poll_ticks(),
                idle_poll_ticks: config.idle_poll_ticks(),
            },
        );
        let egress = Egress::new(config.egress_file(), config.site_id());

        Self {
            pricing,
            insights: Arc::new(TollBoothInsightStore::new()),
            tracker,
            barriers,
            roads: TollRoadAssociationIndex::new(),
            registry: BoothRegistry::new(),
            passages: PassageManager::new(),
            egress,
            metrics,
            lanes: FxHashMap::default(),
            last_control: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pricing(&self) -> Arc<TollPricingTable> {
        self.pricing.clone()
    }

    pub fn insights(&self) -> Arc<TollBoothInsightStore> {
        self.insights.clone()
    }

    /// Read-only handle for reporting layers
    pub fn report_handle(&self) -> ReportHandle {
        ReportHandle::new(self.insights.clone())
    }

    pub fn roads(&self) -> &TollRoadAssociationIndex {
        &self.roads
    }

    pub fn barriers(&self) -> &BarrierController {
        &self.barriers
    }

    pub fn tracker(&self) -> &VehicleProcessingTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &BoothRegistry {
        &self.registry
    }

    /// UI command: zero a booth's statistics
    pub fn reset_statistics(&self, booth: BoothId, now: Tick) -> bool {
        self.insights.reset(booth, now)
    }

    /// Run one scheduler tick against `world`
    pub fn tick<W>(&mut self, world: &mut W) -> TickSummary
    where
        W: WorldView + LaneSignalActuator,
    {
        let tick_start = Instant::now();
        let now = world.current_tick();
        let mut summary = TickSummary { tick: now, ..Default::default() };

        let booths = match catch_unwind(AssertUnwindSafe(|| world.active_booths())) {
            Ok(booths) => booths,
            Err(payload) => {
                error!(tick = %now, error = %panic_message(payload.as_ref()), "booth_enumeration_fault");
                self.metrics.record_entity_fault();
                summary.faults += 1;
                return summary;
            }
        };

        self.process_spawns(&booths, now);
        self.release_displaced(&mut *world, now, &mut summary);
        self.retire_missing(&booths, now);

        if self.control_due(now) {
            self.last_control = Some(now);
            summary.control_ran = true;

            for descriptor in &booths {
                if !self.registry.is_processed(descriptor.id) {
                    continue;
                }
                self.run_booth_control(world, descriptor.id, now, &mut summary);
            }

            self.run_cleanup(world, now, &mut summary);
        }

        let finished = self.passages.drain();
        if !finished.is_empty() {
            self.egress.write_passages(&finished);
        }

        self.metrics.set_gauges(self.tracker.len(), self.barriers.open_count());
        self.metrics.record_tick(tick_start.elapsed().as_micros() as u64);
        summary
    }

    fn control_due(&self, now: Tick) -> bool {
        self.last_control
            .map_or(true, |last| now.since(last) >= self.config.control_interval_ticks())
    }

    /// Drive `host` at the configured tick rate until shutdown is signalled
    pub async fn run<H>(&mut self, host: &mut H, mut shutdown: watch::Receiver<bool>)
    where
        H: SimulationHost,
    {
        let mut tick_interval = interval(self.config.tick_period());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            ticks_per_second = %self.config.ticks_per_second(),
            control_interval = %self.config.control_interval_ticks(),
            "engine_started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tick_interval.tick() => {
                    host.step();
                    self.tick(host);
                }
            }
        }

        let remaining = self.passages.drain();
        self.egress.write_passages(&remaining);
        info!(
            ticks = %self.metrics.ticks_total(),
            tracked = %self.tracker.len(),
            "engine_stopped"
        );
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
