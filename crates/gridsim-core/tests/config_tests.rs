//! Integration tests for configuration loading

use std::io::Write;

use gridsim_core::config::{default_generators, GridSimConfig};
use gridsim_core::{BelowMinPolicy, CostCurve};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_explicit_file() {
    let file = write_config(
        r#"
[environment]
horizon = 48
below_min_policy = "shut_down"

[[generators]]
name = "base"
capacity_mw = 300
min_stable_mw = 100
ramp_rate_mw = 25
cost = { type = "linear", marginal = 12.5 }

[[generators]]
name = "peaker"
capacity_mw = 80
min_stable_mw = 0
ramp_rate_mw = 80
emissions_t_per_mwh = 0.7
cost = { type = "quadratic", a = 50, b = 60, c = 0.1 }
"#,
    );

    let config = GridSimConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.environment.horizon, 48);
    assert_eq!(config.environment.below_min_policy, BelowMinPolicy::ShutDown);
    assert_eq!(config.generators.len(), 2);
    assert_eq!(config.generators[0].capacity_mw, 300.0);
    assert_eq!(
        config.generators[1].cost,
        CostCurve::Quadratic {
            a: 50.0,
            b: 60.0,
            c: 0.1
        }
    );
}

#[test]
fn test_missing_explicit_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(GridSimConfig::load(Some(&missing)).is_err());
    assert!(GridSimConfig::locate(Some(&missing)).is_err());
}

#[test]
fn test_locate_then_load_from() {
    let file = write_config("[logging]\nlevel = \"debug\"\njson = true\n");

    let source = GridSimConfig::locate(Some(file.path())).unwrap();
    assert_eq!(source.as_deref(), Some(file.path()));
    let config = GridSimConfig::load_from(source.as_deref()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn test_invalid_generator_is_rejected_before_use() {
    let file = write_config(
        r#"
[[generators]]
name = "broken"
capacity_mw = 100
min_stable_mw = 150
ramp_rate_mw = 10
cost = { type = "linear", marginal = 1.0 }
"#,
    );

    let err = GridSimConfig::load(Some(file.path())).unwrap_err();
    assert!(format!("{err:#}").contains("min stable"));
}

#[test]
fn test_environment_override() {
    std::env::set_var("GRIDSIM__EVALUATION__WORKERS", "8");
    let file = write_config("[evaluation]\nworkers = 2\n");

    let config = GridSimConfig::load(Some(file.path())).unwrap();
    std::env::remove_var("GRIDSIM__EVALUATION__WORKERS");

    assert_eq!(config.evaluation.workers, 8);
    assert_eq!(config.generators, default_generators());
}
