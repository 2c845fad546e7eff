//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Control ticks run (monotonic)
    ticks_total: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Sum of tick latencies in microseconds (reset on report)
    tick_latency_sum_us: AtomicU64,
    /// Max tick latency in microseconds (reset on report)
    tick_latency_max_us: AtomicU64,
    /// Tick latency histogram buckets (reset on report)
    tick_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Booths whose barrier logic ran
    booths_evaluated: AtomicU64,
    /// Booths skipped on a transient lookup miss
    booths_skipped: AtomicU64,
    /// Booths deferred by the poll throttle
    booths_throttled: AtomicU64,
    /// Booths registered through spawn processing
    booths_registered: AtomicU64,
    /// Booths retired after disappearing from the world
    booths_retired: AtomicU64,
    /// Per-entity faults caught and logged
    entity_faults: AtomicU64,
    /// New tracker entries created
    vehicles_detected: AtomicU64,
    /// Payments completed (one per billed passage)
    payments_total: AtomicU64,
    /// Revenue collected across all booths
    revenue_total: AtomicU64,
    /// Barrier Closed -> Open transitions
    barrier_opens: AtomicU64,
    /// Open -> Closed with no traffic pending
    barrier_closes_idle: AtomicU64,
    /// Open -> Closed after the paid vehicle cleared
    barrier_closes_cleared: AtomicU64,
    /// Open -> Closed forced by the open timeout
    barrier_closes_timeout: AtomicU64,
    /// Lane signal re-assertions after external drift
    signal_reasserts: AtomicU64,
    /// Actuator commands rejected by the world
    actuator_errors: AtomicU64,
    /// Tracker entries removed because the vehicle vanished
    evictions_departed: AtomicU64,
    /// Tracker entries removed by the absolute ceiling
    evictions_ceiling: AtomicU64,
    /// Tracker entries removed after confirmed clearance
    evictions_cleared: AtomicU64,
    /// Current tracked vehicle count (gauge)
    tracked_vehicles: AtomicU64,
    /// Current open barrier count (gauge)
    open_barriers: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            tick_latency_sum_us: AtomicU64::new(0),
            tick_latency_max_us: AtomicU64::new(0),
            tick_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            booths_evaluated: AtomicU64::new(0),
            booths_skipped: AtomicU64::new(0),
            booths_throttled: AtomicU64::new(0),
            booths_registered: AtomicU64::new(0),
            booths_retired: AtomicU64::new(0),
            entity_faults: AtomicU64::new(0),
            vehicles_detected: AtomicU64::new(0),
            payments_total: AtomicU64::new(0),
            revenue_total: AtomicU64::new(0),
            barrier_opens: AtomicU64::new(0),
            barrier_closes_idle: AtomicU64::new(0),
            barrier_closes_cleared: AtomicU64::new(0),
            barrier_closes_timeout: AtomicU64::new(0),
            signal_reasserts: AtomicU64::new(0),
            actuator_errors: AtomicU64::new(0),
            evictions_departed: AtomicU64::new(0),
            evictions_ceiling: AtomicU64::new(0),
            evictions_cleared: AtomicU64::new(0),
            tracked_vehicles: AtomicU64::new(0),
            open_barriers: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed control tick (lock-free)
    #[inline]
    pub fn record_tick(&self, latency_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.tick_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.tick_latency_max_us, latency_us);
        self.tick_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_booth_evaluated(&self) {
        self.booths_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_booth_skipped(&self) {
        self.booths_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_booth_throttled(&self) {
        self.booths_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn booths_skipped(&self) -> u64 {
        self.booths_skipped.load(Ordering::Relaxed)
    }

    pub fn booths_throttled(&self) -> u64 {
        self.booths_throttled.load(Ordering::Relaxed)
    }

    pub fn record_booth_registered(&self) {
        self.booths_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_booth_retired(&self) {
        self.booths_retired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity_fault(&self) {
        self.entity_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entity_faults(&self) -> u64 {
        self.entity_faults.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_vehicle_detected(&self) {
        self.vehicles_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a billed passage
    pub fn record_payment(&self, amount: u64) {
        self.payments_total.fetch_add(1, Ordering::Relaxed);
        self.revenue_total.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn payments_total(&self) -> u64 {
        self.payments_total.load(Ordering::Relaxed)
    }

    pub fn revenue_total(&self) -> u64 {
        self.revenue_total.load(Ordering::Relaxed)
    }

    pub fn record_barrier_open(&self) {
        self.barrier_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn barrier_opens(&self) -> u64 {
        self.barrier_opens.load(Ordering::Relaxed)
    }

    pub fn record_barrier_close_idle(&self) {
        self.barrier_closes_idle.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_barrier_close_cleared(&self) {
        self.barrier_closes_cleared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_barrier_close_timeout(&self) {
        self.barrier_closes_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn barrier_closes_timeout(&self) -> u64 {
        self.barrier_closes_timeout.load(Ordering::Relaxed)
    }

    pub fn record_signal_reassert(&self) {
        self.signal_reasserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actuator_error(&self) {
        self.actuator_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn actuator_errors(&self) -> u64 {
        self.actuator_errors.load(Ordering::Relaxed)
    }

    pub fn record_eviction_departed(&self) {
        self.evictions_departed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction_ceiling(&self) {
        self.evictions_ceiling.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction_cleared(&self) {
        self.evictions_cleared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evictions_ceiling(&self) -> u64 {
        self.evictions_ceiling.load(Ordering::Relaxed)
    }

    /// Point-in-time gauges, set once per tick by the engine
    pub fn set_gauges(&self, tracked_vehicles: usize, open_barriers: usize) {
        self.tracked_vehicles.store(tracked_vehicles as u64, Ordering::Relaxed);
        self.open_barriers.store(open_barriers as u64, Ordering::Relaxed);
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let ticks_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.tick_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.tick_latency_max_us.swap(0, Ordering::Relaxed);
        let tick_lat_buckets = swap_buckets(&self.tick_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            ticks_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if ticks_count > 0 { latency_sum / ticks_count } else { 0 };

        MetricsSummary {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_per_sec,
            avg_tick_latency_us: avg_latency,
            max_tick_latency_us: max_latency,
            tick_lat_p50_us: percentile_from_buckets(&tick_lat_buckets, 0.50),
            tick_lat_p99_us: percentile_from_buckets(&tick_lat_buckets, 0.99),
            tick_lat_buckets,
            booths_evaluated: self.booths_evaluated.load(Ordering::Relaxed),
            booths_skipped: self.booths_skipped.load(Ordering::Relaxed),
            booths_throttled: self.booths_throttled.load(Ordering::Relaxed),
            booths_registered: self.booths_registered.load(Ordering::Relaxed),
            booths_retired: self.booths_retired.load(Ordering::Relaxed),
            entity_faults: self.entity_faults.load(Ordering::Relaxed),
            vehicles_detected: self.vehicles_detected.load(Ordering::Relaxed),
            payments_total: self.payments_total.load(Ordering::Relaxed),
            revenue_total: self.revenue_total.load(Ordering::Relaxed),
            barrier_opens: self.barrier_opens.load(Ordering::Relaxed),
            barrier_closes_idle: self.barrier_closes_idle.load(Ordering::Relaxed),
            barrier_closes_cleared: self.barrier_closes_cleared.load(Ordering::Relaxed),
            barrier_closes_timeout: self.barrier_closes_timeout.load(Ordering::Relaxed),
            signal_reasserts: self.signal_reasserts.load(Ordering::Relaxed),
            actuator_errors: self.actuator_errors.load(Ordering::Relaxed),
            evictions_departed: self.evictions_departed.load(Ordering::Relaxed),
            evictions_ceiling: self.evictions_ceiling.load(Ordering::Relaxed),
            evictions_cleared: self.evictions_cleared.load(Ordering::Relaxed),
            tracked_vehicles: self.tracked_vehicles.load(Ordering::Relaxed),
            open_barriers: self.open_barriers.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub avg_tick_latency_us: u64,
    pub max_tick_latency_us: u64,
    /// Tick latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub tick_lat_buckets: [u64; NUM_BUCKETS],
    pub tick_lat_p50_us: u64,
    pub tick_lat_p99_us: u64,
    pub booths_evaluated: u64,
    pub booths_skipped: u64,
    pub booths_throttled: u64,
    pub booths_registered: u64,
    pub booths_retired: u64,
    pub entity_faults: u64,
    pub vehicles_detected: u64,
    pub payments_total: u64,
    pub revenue_total: u64,
    pub barrier_opens: u64,
    pub barrier_closes_idle: u64,
    pub barrier_closes_cleared: u64,
    pub barrier_closes_timeout: u64,
    pub signal_reasserts: u64,
    pub actuator_errors: u64,
    pub evictions_departed: u64,
    pub evictions_ceiling: u64,
    pub evictions_cleared: u64,
    pub tracked_vehicles: u64,
    pub open_barriers: u64,
}

impl MetricsSummary {
    pub fn barrier_closes_total(&self) -> u64 {
        self.barrier_closes_idle + self.barrier_closes_cleared + self.barrier_closes_timeout
    }

    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            avg_tick_us = %self.avg_tick_latency_us,
            max_tick_us = %self.max_tick_latency_us,
            p99_tick_us = %self.tick_lat_p99_us,
            tracked = %self.tracked_vehicles,
            open_barriers = %self.open_barriers,
            payments = %self.payments_total,
            revenue = %self.revenue_total,
            opens = %self.barrier_opens,
            closes = %self.barrier_closes_total(),
            timeouts = %self.barrier_closes_timeout,
            skipped = %self.booths_skipped,
            faults = %self.entity_faults,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.ticks_total(), 0);
        assert_eq!(metrics.payments_total(), 0);
        assert_eq!(metrics.revenue_total(), 0);
    }

    #[test]
    fn test_record_tick() {
        let metrics = Metrics::new();

        metrics.record_tick(100);
        assert_eq!(metrics.ticks_total(), 1);
        assert_eq!(metrics.tick_latency_sum_us.load(Ordering::Relaxed), 100);

        metrics.record_tick(200);
        assert_eq!(metrics.ticks_total(), 2);
        assert_eq!(metrics.tick_latency_sum_us.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_record_payment() {
        let metrics = Metrics::new();
        metrics.record_payment(150);
        metrics.record_payment(450);
        assert_eq!(metrics.payments_total(), 2);
        assert_eq!(metrics.revenue_total(), 600);
    }

    #[test]
    fn test_report() {
        let metrics = Metrics::new();

        metrics.record_tick(100);
        metrics.record_tick(200);
        metrics.record_tick(300);
        metrics.record_barrier_open();
        metrics.record_barrier_close_cleared();
        metrics.record_barrier_close_timeout();
        metrics.set_gauges(4, 1);

        let summary = metrics.report();

        assert_eq!(summary.ticks_total, 3);
        assert_eq!(summary.avg_tick_latency_us, 200);
        assert_eq!(summary.max_tick_latency_us, 300);
        assert_eq!(summary.barrier_opens, 1);
        assert_eq!(summary.barrier_closes_total(), 2);
        assert_eq!(summary.tracked_vehicles, 4);
        assert_eq!(summary.open_barriers, 1);

        // Periodic counters should be reset, monotonic ones kept
        assert_eq!(metrics.ticks_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_latency_sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_latency_max_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.ticks_total(), 3);
    }

    #[test]
    fn test_report_empty() {
        let metrics = Metrics::new();
        let summary = metrics.report();

        assert_eq!(summary.ticks_total, 0);
        assert_eq!(summary.avg_tick_latency_us, 0);
        assert_eq!(summary.tick_lat_p99_us, 0);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    m.record_tick(i as u64);
                    m.record_payment(1);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.ticks_total(), 10_000);
        assert_eq!(metrics.revenue_total(), 10_000);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_tick(150);
        }

        let summary = metrics.report();
        assert_eq!(summary.tick_lat_buckets[1], 100);
        assert_eq!(summary.tick_lat_p50_us, 200);
        assert_eq!(summary.tick_lat_p99_us, 200);
    }
}
