//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section and key is optional; missing values take the defaults below.

use crate::domain::types::{Toll, VehicleType, VEHICLE_TYPE_COUNT};
use anyhow::{ensure, Context};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "tollbooth".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u32,
    /// Simulated payment processing time per vehicle
    #[serde(default = "default_processing_duration_secs")]
    pub processing_duration_secs: f64,
    /// Distance along the gate lane within which vehicles are processed (metres)
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f32,
    /// Absolute lifetime of a tracker entry, regardless of state
    #[serde(default = "default_cleanup_ceiling_ticks")]
    pub cleanup_ceiling_ticks: u64,
    /// Time a paid vehicle must be gone before it counts as clear of the gate
    #[serde(default = "default_clearance_grace_ticks")]
    pub clearance_grace_ticks: u64,
    /// Longest the barrier may stay open after the last payment
    #[serde(default = "default_barrier_open_timeout_ticks")]
    pub barrier_open_timeout_ticks: u64,
    /// Ticks between barrier control passes (booth spawn processing runs every tick)
    #[serde(default = "default_control_interval_ticks")]
    pub control_interval_ticks: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: default_ticks_per_second(),
            processing_duration_secs: default_processing_duration_secs(),
            detection_threshold: default_detection_threshold(),
            cleanup_ceiling_ticks: default_cleanup_ceiling_ticks(),
            clearance_grace_ticks: default_clearance_grace_ticks(),
            barrier_open_timeout_ticks: default_barrier_open_timeout_ticks(),
            control_interval_ticks: default_control_interval_ticks(),
        }
    }
}

fn default_ticks_per_second() -> u32 {
    60
}

fn default_processing_duration_secs() -> f64 {
    2.0
}

fn default_detection_threshold() -> f32 {
    20.0
}

fn default_cleanup_ceiling_ticks() -> u64 {
    600
}

fn default_clearance_grace_ticks() -> u64 {
    120
}

fn default_barrier_open_timeout_ticks() -> u64 {
    180
}

fn default_control_interval_ticks() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Poll interval while a vehicle is waiting at the gate
    #[serde(default = "default_waiting_poll_ticks")]
    pub waiting_poll_ticks: u64,
    /// Poll interval for idle booths
    #[serde(default = "default_idle_poll_ticks")]
    pub idle_poll_ticks: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            waiting_poll_ticks: default_waiting_poll_ticks(),
            idle_poll_ticks: default_idle_poll_ticks(),
        }
    }
}

fn default_waiting_poll_ticks() -> u64 {
    120
}

fn default_idle_poll_ticks() -> u64 {
    300
}

/// Peak and off-peak price for one vehicle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub peak: Toll,
    pub off_peak: Toll,
}

impl Rate {
    pub const fn new(peak: Toll, off_peak: Toll) -> Self {
        Self { peak, off_peak }
    }
}

/// Partial rate as written in TOML; unset fields keep the default
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RateOverride {
    #[serde(default)]
    pub peak: Option<Toll>,
    #[serde(default)]
    pub off_peak: Option<Toll>,
}

/// How the pricing table decides whether a tick falls in peak hours
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakPeriod {
    #[default]
    AlwaysPeak,
    AlwaysOffPeak,
    Schedule,
}

/// Peak-hour source resolved from `[pricing]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PeakPolicy {
    #[default]
    AlwaysPeak,
    AlwaysOffPeak,
    /// Peak when the in-game hour of day falls in one of `windows` (`[start, end)`)
    Schedule { ticks_per_hour: u64, windows: Vec<(u8, u8)> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ExemptionConfig {
    #[serde(default)]
    pub public_transport: bool,
    #[serde(default)]
    pub service_vehicles: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingSection {
    #[serde(default)]
    pub period: PeakPeriod,
    #[serde(default = "default_ticks_per_hour")]
    pub ticks_per_hour: u64,
    #[serde(default = "default_peak_windows")]
    pub peak_windows: Vec<[u8; 2]>,
    #[serde(default)]
    pub rates: BTreeMap<VehicleType, RateOverride>,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            period: PeakPeriod::default(),
            ticks_per_hour: default_ticks_per_hour(),
            peak_windows: default_peak_windows(),
            rates: BTreeMap::new(),
        }
    }
}

fn default_ticks_per_hour() -> u64 {
    3600
}

fn default_peak_windows() -> Vec<[u8; 2]> {
    vec![[7, 10], [16, 19]]
}

/// Effective pricing configuration injected into the pricing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    pub rates: [Rate; VEHICLE_TYPE_COUNT],
    pub peak_policy: PeakPolicy,
    pub exemptions: ExemptionConfig,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rates: default_rates(),
            peak_policy: PeakPolicy::default(),
            exemptions: ExemptionConfig::default(),
        }
    }
}

impl PricingConfig {
    fn from_sections(pricing: PricingSection, exemptions: ExemptionConfig) -> Self {
        let mut rates = default_rates();
        for (vehicle_type, over) in pricing.rates {
            let rate = &mut rates[vehicle_type.index()];
            if let Some(peak) = over.peak {
                rate.peak = peak;
            }
            if let Some(off_peak) = over.off_peak {
                rate.off_peak = off_peak;
            }
        }

        let peak_policy = match pricing.period {
            PeakPeriod::AlwaysPeak => PeakPolicy::AlwaysPeak,
            PeakPeriod::AlwaysOffPeak => PeakPolicy::AlwaysOffPeak,
            PeakPeriod::Schedule => PeakPolicy::Schedule {
                ticks_per_hour: pricing.ticks_per_hour,
                windows: pricing.peak_windows.iter().map(|w| (w[0], w[1])).collect(),
            },
        };

        Self { rates, peak_policy, exemptions }
    }

    pub fn rate(&self, vehicle_type: VehicleType) -> Rate {
        self.rates[vehicle_type.index()]
    }
}

/// Default price list, indexed by `VehicleType::index()`
pub fn default_rates() -> [Rate; VEHICLE_TYPE_COUNT] {
    [
        Rate::new(0, 0),     // None
        Rate::new(150, 100), // PersonalCar
        Rate::new(220, 150), // PersonalCarWithTrailer
        Rate::new(450, 300), // Truck
        Rate::new(700, 500), // TruckWithTrailer
        Rate::new(300, 200), // Bus
        Rate::new(150, 100), // Taxi
        Rate::new(80, 50),   // ParkMaintenance
        Rate::new(80, 50),   // RoadMaintenance
        Rate::new(50, 50),   // Ambulance
        Rate::new(50, 50),   // EvacuatingTransport
        Rate::new(50, 50),   // FireEngine
        Rate::new(200, 150), // GarbageTruck
        Rate::new(150, 100), // Hearse
        Rate::new(50, 50),   // PoliceCar
        Rate::new(200, 150), // PostVan
        Rate::new(150, 100), // PrisonerTransport
        Rate::new(80, 50),   // Motorcycle
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for passage egress (JSONL format); empty disables egress
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "passages.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

/// Parameters for the in-memory demo world
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_sim_booths")]
    pub booths: u32,
    #[serde(default = "default_spawn_every_ticks")]
    pub spawn_every_ticks: u64,
    /// Metres travelled per tick when the lane is clear
    #[serde(default = "default_vehicle_speed")]
    pub vehicle_speed: f32,
    /// Distance from the gate at which vehicles spawn (metres)
    #[serde(default = "default_spawn_distance")]
    pub spawn_distance: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            booths: default_sim_booths(),
            spawn_every_ticks: default_spawn_every_ticks(),
            vehicle_speed: default_vehicle_speed(),
            spawn_distance: default_spawn_distance(),
            seed: default_seed(),
        }
    }
}

fn default_sim_booths() -> u32 {
    3
}

fn default_spawn_every_ticks() -> u64 {
    90
}

fn default_vehicle_speed() -> f32 {
    0.25
}

fn default_spawn_distance() -> f32 {
    60.0
}

fn default_seed() -> u64 {
    7
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub pricing: PricingSection,
    #[serde(default)]
    pub exemptions: ExemptionConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    ticks_per_second: u32,
    processing_duration_secs: f64,
    detection_threshold: f32,
    cleanup_ceiling_ticks: u64,
    clearance_grace_ticks: u64,
    barrier_open_timeout_ticks: u64,
    control_interval_ticks: u64,
    throttle_enabled: bool,
    waiting_poll_ticks: u64,
    idle_poll_ticks: u64,
    pricing: PricingConfig,
    egress_file: String,
    metrics_interval_secs: u64,
    simulation: SimulationConfig,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            ticks_per_second: toml_config.timing.ticks_per_second,
            processing_duration_secs: toml_config.timing.processing_duration_secs,
            detection_threshold: toml_config.timing.detection_threshold,
            cleanup_ceiling_ticks: toml_config.timing.cleanup_ceiling_ticks,
            clearance_grace_ticks: toml_config.timing.clearance_grace_ticks,
            barrier_open_timeout_ticks: toml_config.timing.barrier_open_timeout_ticks,
            control_interval_ticks: toml_config.timing.control_interval_ticks,
            throttle_enabled: toml_config.throttle.enabled,
            waiting_poll_ticks: toml_config.throttle.waiting_poll_ticks,
            idle_poll_ticks: toml_config.throttle.idle_poll_ticks,
            pricing: PricingConfig::from_sections(toml_config.pricing, toml_config.exemptions),
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            simulation: toml_config.simulation,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {source}"))?;
        let config = Self::from_toml(toml_config, source.to_string());
        config.validate().with_context(|| format!("Invalid config file {source}"))?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.ticks_per_second > 0, "timing.ticks_per_second must be positive");
        ensure!(
            self.processing_duration_secs.is_finite() && self.processing_duration_secs >= 0.0,
            "timing.processing_duration_secs must be a non-negative number"
        );
        ensure!(self.control_interval_ticks > 0, "timing.control_interval_ticks must be positive");
        ensure!(self.detection_threshold > 0.0, "timing.detection_threshold must be positive");
        if let PeakPolicy::Schedule { ticks_per_hour, windows } = &self.pricing.peak_policy {
            ensure!(*ticks_per_hour > 0, "pricing.ticks_per_hour must be positive");
            for (start, end) in windows {
                ensure!(start < end && *end <= 24, "invalid peak window [{start}, {end})");
            }
        }
        Ok(())
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }

    pub fn processing_duration_secs(&self) -> f64 {
        self.processing_duration_secs
    }

    /// Processing duration converted with the fixed ticks-per-second rate
    pub fn processing_duration_ticks(&self) -> u64 {
        (self.processing_duration_secs * f64::from(self.ticks_per_second)).round() as u64
    }

    pub fn detection_threshold(&self) -> f32 {
        self.detection_threshold
    }

    pub fn cleanup_ceiling_ticks(&self) -> u64 {
        self.cleanup_ceiling_ticks
    }

    pub fn clearance_grace_ticks(&self) -> u64 {
        self.clearance_grace_ticks
    }

    pub fn barrier_open_timeout_ticks(&self) -> u64 {
        self.barrier_open_timeout_ticks
    }

    pub fn control_interval_ticks(&self) -> u64 {
        self.control_interval_ticks
    }

    pub fn throttle_enabled(&self) -> bool {
        self.throttle_enabled
    }

    pub fn waiting_poll_ticks(&self) -> u64 {
        self.waiting_poll_ticks
    }

    pub fn idle_poll_ticks(&self) -> u64 {
        self.idle_poll_ticks
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Wall-clock period of one tick
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / u64::from(self.ticks_per_second.max(1)))
    }

    pub fn with_processing_duration_secs(mut self, secs: f64) -> Self {
        self.processing_duration_secs = secs;
        self
    }

    pub fn with_ticks_per_second(mut self, ticks: u32) -> Self {
        self.ticks_per_second = ticks;
        self
    }

    pub fn with_detection_threshold(mut self, metres: f32) -> Self {
        self.detection_threshold = metres;
        self
    }

    pub fn with_cleanup_ceiling_ticks(mut self, ticks: u64) -> Self {
        self.cleanup_ceiling_ticks = ticks;
        self
    }

    pub fn with_clearance_grace_ticks(mut self, ticks: u64) -> Self {
        self.clearance_grace_ticks = ticks;
        self
    }

    pub fn with_barrier_open_timeout_ticks(mut self, ticks: u64) -> Self {
        self.barrier_open_timeout_ticks = ticks;
        self
    }

    pub fn with_control_interval_ticks(mut self, ticks: u64) -> Self {
        self.control_interval_ticks = ticks.max(1);
        self
    }

    pub fn with_throttle(mut self, enabled: bool) -> Self {
        self.throttle_enabled = enabled;
        self
    }

    pub fn with_peak_policy(mut self, policy: PeakPolicy) -> Self {
        self.pricing.peak_policy = policy;
        self
    }

    pub fn with_exemptions(mut self, public_transport: bool, service_vehicles: bool) -> Self {
        self.pricing.exemptions = ExemptionConfig { public_transport, service_vehicles };
        self
    }

    pub fn with_egress_file(mut self, file: &str) -> Self {
        self.egress_file = file.to_string();
        self
    }
}
