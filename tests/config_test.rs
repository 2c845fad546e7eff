//! Integration tests for configuration loading

use std::io::Write;
use tempfile::NamedTempFile;
use tollbooth::domain::types::{Tick, VehicleType};
use tollbooth::infra::{Config, PeakPolicy};
use tollbooth::services::TollPricingTable;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "test-site"

[timing]
ticks_per_second = 30
processing_duration_secs = 3.0
detection_threshold = 15.5
cleanup_ceiling_ticks = 900
control_interval_ticks = 16

[throttle]
enabled = true
idle_poll_ticks = 240

[pricing]
period = "always_off_peak"

[pricing.rates.bus]
off_peak = 120

[exemptions]
service_vehicles = true

[egress]
file = ""

[metrics]
interval_secs = 15

[simulation]
booths = 5
seed = 42
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.ticks_per_second(), 30);
    assert_eq!(config.processing_duration_ticks(), 90);
    assert_eq!(config.detection_threshold(), 15.5);
    assert_eq!(config.cleanup_ceiling_ticks(), 900);
    assert_eq!(config.clearance_grace_ticks(), 120);
    assert_eq!(config.control_interval_ticks(), 16);
    assert!(config.throttle_enabled());
    assert_eq!(config.waiting_poll_ticks(), 120);
    assert_eq!(config.idle_poll_ticks(), 240);
    assert_eq!(config.pricing().peak_policy, PeakPolicy::AlwaysOffPeak);
    assert!(config.pricing().exemptions.service_vehicles);
    assert!(!config.pricing().exemptions.public_transport);
    assert_eq!(config.egress_file(), "");
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.simulation().booths, 5);
    assert_eq!(config.simulation().seed, 42);

    let pricing = TollPricingTable::new(config.pricing().clone());
    assert!(!pricing.is_peak(Tick(0)));
    assert_eq!(pricing.price(VehicleType::Bus, false), 120);
    assert_eq!(pricing.price(VehicleType::PoliceCar, false), 0);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.site_id(), "tollbooth");
    assert_eq!(config.processing_duration_ticks(), 120);
    assert_eq!(config.pricing().peak_policy, PeakPolicy::AlwaysPeak);
}

#[test]
fn test_invalid_values_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[timing]\nticks_per_second = 0\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("ticks_per_second"));

    // Invalid files fall back to defaults
    let config = Config::load_from_path(temp_file.path().to_str().unwrap());
    assert_eq!(config.ticks_per_second(), 60);
}

#[test]
fn test_unknown_vehicle_type_rejected() {
    let result = Config::from_toml_str("[pricing.rates.spaceship]\npeak = 1\n", "inline");
    assert!(result.is_err());
}

#[test]
fn test_dev_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.site_id(), "dev-tollbooth");
    assert!(matches!(config.pricing().peak_policy, PeakPolicy::Schedule { .. }));
    assert_eq!(config.pricing().rate(VehicleType::TruckWithTrailer).peak, 750);
}

#[test]
fn test_pricing_reload_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[pricing.rates.personal_car]\npeak = 150\n").unwrap();
    temp_file.flush().unwrap();
    let pricing = TollPricingTable::new(Config::from_file(temp_file.path()).unwrap().pricing().clone());
    assert_eq!(pricing.price(VehicleType::PersonalCar, true), 150);

    let mut rewritten = std::fs::File::create(temp_file.path()).unwrap();
    rewritten.write_all(b"[pricing.rates.personal_car]\npeak = 175\n").unwrap();
    rewritten.flush().unwrap();

    pricing.reload(Config::from_file(temp_file.path()).unwrap().pricing().clone());
    assert_eq!(pricing.price(VehicleType::PersonalCar, true), 175);
}
