//! Toll Simulation Controller
//!
//! Runs scripted scenarios against the in-memory world and checks the outcome.
//!
//! Usage:
//!   cargo run --bin simctl -- run                         # Run all scenarios
//!   cargo run --bin simctl -- run --test happy_path,convoy
//!   cargo run --bin simctl -- run --test mixed --verbose  # Print booth reports
//!   cargo run --bin simctl -- prices --config config/dev.toml

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tollbooth::domain::types::{BoothId, CapabilitySet, LaneId, Role, RoadId, VehicleId};
use tollbooth::infra::{Config, Metrics};
use tollbooth::io::{SimWorld, SimulationHost};
use tollbooth::services::{TollEngine, TollPricingTable};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simctl")]
#[command(about = "Toll Simulation Controller - scripted scenarios and pricing")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run test scenarios
    Run {
        /// Scenarios to run, comma separated, or "all"
        #[arg(short, long, default_value = "all")]
        test: String,

        /// Print booth reports and engine logs
        #[arg(short, long)]
        verbose: bool,

        /// Base configuration; scenario overrides are applied on top
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Print the effective pricing table
    Prices {
        #[arg(short, long, default_value = "config/dev.toml")]
        config: String,
    },
}

// ============================================================================
// Scenarios
// ============================================================================

const BOOTH: BoothId = BoothId(1);
const ROAD: RoadId = RoadId(10);
const LANE: LaneId = LaneId(100);

#[derive(Debug, Clone, Copy, PartialEq)]
enum VehicleKind {
    Car,
    Motorcycle,
    Truck,
    Bus,
    Police,
    Unclassified,
}

impl VehicleKind {
    fn capabilities(self) -> Option<CapabilitySet> {
        match self {
            VehicleKind::Car => Some(CapabilitySet::passenger_vehicle(0)),
            VehicleKind::Motorcycle => Some(CapabilitySet::passenger_vehicle(1)),
            VehicleKind::Truck => Some(CapabilitySet::delivery_truck()),
            VehicleKind::Bus => Some(CapabilitySet::public_transport()),
            VehicleKind::Police => Some(CapabilitySet::default().with_role(Role::Police)),
            VehicleKind::Unclassified => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScenarioStep {
    /// Spawn a vehicle `distance` metres before the gate
    Spawn { kind: VehicleKind, distance: f32, speed: f32 },
    /// Advance the world and the engine
    Run(u64),
    /// Remove the n-th spawned vehicle from the world
    Despawn(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Expected {
    payments: u64,
    revenue: u64,
    barrier_open: bool,
    tracked: usize,
}

#[derive(Debug, Clone)]
struct Scenario {
    name: &'static str,
    description: &'static str,
    steps: &'static [ScenarioStep],
    /// Random traffic from `[simulation]` instead of a scripted booth
    random_traffic: bool,
    processing_secs: Option<f64>,
    expected: Option<Expected>,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "happy_path",
        description: "Car stops, pays, barrier opens and closes after it leaves",
        steps: &[
            ScenarioStep::Spawn { kind: VehicleKind::Car, distance: 10.0, speed: 0.5 },
            ScenarioStep::Run(600),
        ],
        random_traffic: false,
        processing_secs: None,
        expected: Some(Expected { payments: 1, revenue: 150, barrier_open: false, tracked: 0 }),
    },
    Scenario {
        name: "convoy",
        description: "Three vehicles queue, one barrier cycle serves them all",
        steps: &[
            ScenarioStep::Spawn { kind: VehicleKind::Car, distance: 4.0, speed: 0.5 },
            ScenarioStep::Spawn { kind: VehicleKind::Truck, distance: 11.0, speed: 0.5 },
            ScenarioStep::Spawn { kind: VehicleKind::Motorcycle, distance: 18.0, speed: 0.5 },
            ScenarioStep::Run(900),
        ],
        random_traffic: false,
        processing_secs: None,
        expected: Some(Expected { payments: 3, revenue: 150 + 450 + 80, barrier_open: false, tracked: 0 }),
    },
    Scenario {
        name: "stalled",
        description: "Processing outlasts the cleanup ceiling - evicted, never billed",
        steps: &[
            ScenarioStep::Spawn { kind: VehicleKind::Car, distance: 0.0, speed: 0.0 },
            ScenarioStep::Run(1500),
        ],
        random_traffic: false,
        processing_secs: Some(20.0),
        expected: Some(Expected { payments: 0, revenue: 0, barrier_open: false, tracked: 0 }),
    },
    Scenario {
        name: "unclassified",
        description: "Vehicle without capabilities passes for free",
        steps: &[
            ScenarioStep::Spawn { kind: VehicleKind::Unclassified, distance: 0.0, speed: 0.0 },
            ScenarioStep::Run(150),
            ScenarioStep::Despawn(0),
            ScenarioStep::Run(10),
        ],
        random_traffic: false,
        processing_secs: None,
        expected: Some(Expected { payments: 1, revenue: 0, barrier_open: false, tracked: 0 }),
    },
    Scenario {
        name: "service",
        description: "Bus and police car pay their class price",
        steps: &[
            ScenarioStep::Spawn { kind: VehicleKind::Bus, distance: 0.0, speed: 0.5 },
            ScenarioStep::Spawn { kind: VehicleKind::Police, distance: 8.0, speed: 0.5 },
            ScenarioStep::Run(900),
        ],
        random_traffic: false,
        processing_secs: None,
        expected: Some(Expected { payments: 2, revenue: 300 + 50, barrier_open: false, tracked: 0 }),
    },
    Scenario {
        name: "mixed",
        description: "Seeded random traffic across all configured booths",
        steps: &[ScenarioStep::Run(3600)],
        random_traffic: true,
        processing_secs: None,
        expected: None,
    },
];

fn get_scenario(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

fn get_all_scenario_names() -> Vec<&'static str> {
    SCENARIOS.iter().map(|s| s.name).collect()
}

// ============================================================================
// Scenario runner
// ============================================================================

struct ScenarioResult {
    payments: u64,
    revenue: u64,
    barrier_open: bool,
    tracked: usize,
    faults: u64,
    reports: Vec<String>,
}

fn run_scenario(scenario: &Scenario, base: &Config) -> ScenarioResult {
    let mut config = base.clone().with_egress_file("");
    if let Some(secs) = scenario.processing_secs {
        config = config.with_processing_duration_secs(secs);
    }

    let mut world = if scenario.random_traffic {
        SimWorld::from_config(config.simulation())
    } else {
        let mut world = SimWorld::new();
        world.add_booth(BOOTH, ROAD, LANE);
        world
    };

    let metrics = Arc::new(Metrics::new());
    let mut engine = TollEngine::new(config, metrics.clone());
    let mut spawned: Vec<VehicleId> = Vec::new();

    for step in scenario.steps {
        match *step {
            ScenarioStep::Spawn { kind, distance, speed } => {
                spawned.push(world.spawn_vehicle(LANE, distance, speed, kind.capabilities()));
            }
            ScenarioStep::Run(ticks) => {
                for _ in 0..ticks {
                    world.step();
                    engine.tick(&mut world);
                }
            }
            ScenarioStep::Despawn(index) => {
                if let Some(&vehicle) = spawned.get(index) {
                    world.despawn(vehicle);
                }
            }
        }
    }

    let summary = metrics.report();
    ScenarioResult {
        payments: summary.payments_total,
        revenue: summary.revenue_total,
        barrier_open: engine.barriers().open_count() > 0,
        tracked: engine.tracker().len(),
        faults: summary.entity_faults,
        reports: engine.report_handle().reports().iter().map(|r| r.to_json()).collect(),
    }
}

fn check(expected: &Option<Expected>, result: &ScenarioResult) -> Result<(), String> {
    if result.faults > 0 {
        return Err(format!("{} entity faults", result.faults));
    }
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = Expected {
        payments: result.payments,
        revenue: result.revenue,
        barrier_open: result.barrier_open,
        tracked: result.tracked,
    };
    if actual == *expected {
        Ok(())
    } else {
        Err(format!("expected {expected:?}, got {actual:?}"))
    }
}

fn run_test_mode(test_arg: &str, verbose: bool, config: &Config) -> i32 {
    let scenarios_to_run: Vec<&Scenario> = if test_arg == "all" {
        SCENARIOS.iter().collect()
    } else {
        let mut selected = Vec::new();
        for name in test_arg.split(',').map(str::trim) {
            match get_scenario(name) {
                Some(s) => selected.push(s),
                None => {
                    eprintln!("Unknown scenario: {}", name);
                    eprintln!("Available: {}", get_all_scenario_names().join(", "));
                    return 2;
                }
            }
        }
        selected
    };

    println!("Running {} scenario(s)", scenarios_to_run.len());
    let mut results: Vec<(&str, bool, String)> = Vec::new();

    for scenario in scenarios_to_run {
        println!();
        println!("Running: {} - {}", scenario.name, scenario.description);
        let result = run_scenario(scenario, config);
        if verbose {
            for report in &result.reports {
                println!("  {}", report);
            }
        }
        match check(&scenario.expected, &result) {
            Ok(()) => {
                println!("  PASSED ({} payments, revenue {})", result.payments, result.revenue);
                results.push((scenario.name, true, String::new()));
            }
            Err(msg) => {
                println!("  FAILED: {}", msg);
                results.push((scenario.name, false, msg));
            }
        }
    }

    let passed = results.iter().filter(|(_, ok, _)| *ok).count();
    let failed = results.len() - passed;
    println!();
    println!("TEST RESULTS");
    for (name, success, detail) in &results {
        let status = if *success { "PASS" } else { "FAIL" };
        println!("  {:4} {:14} {}", status, name, detail);
    }
    println!("Total: {} passed, {} failed", passed, failed);

    if failed > 0 {
        1
    } else {
        0
    }
}

fn print_prices(config: &Config) {
    let table = TollPricingTable::new(config.pricing().clone());
    println!("{:28} {:>6} {:>9}", "vehicle_type", "peak", "off_peak");
    for (vehicle_type, peak, off_peak) in table.table() {
        println!("{:28} {:>6} {:>9}", vehicle_type.as_str(), peak, off_peak);
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = match &args.command {
        Command::Run { verbose: true, .. } => "info",
        _ => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    match args.command {
        Command::Run { test, verbose, config } => {
            let config = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::default(),
            };
            let code = run_test_mode(&test, verbose, &config);
            std::process::exit(code);
        }
        Command::Prices { config } => {
            let config = Config::from_file(&config)?;
            print_prices(&config);
        }
    }
    Ok(())
}
