//! CLI command tests: config files on disk in, reports out.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rigsmith-tests --test cli_build
//! ```

use std::fs;
use std::process::ExitCode;

use pretty_assertions::assert_eq;
use serde_json::Value;

use rigsmith_cli::commands::{build, markers, validate};
use rigsmith_core::hash::config_hash;
use rigsmith_core::{BodyKind, LimbMode, MarkerSet, RigConfig, SpineKind};
use rigsmith_tests::ConfigFixture;

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn build_writes_a_report() {
    let config = RigConfig::new()
        .with_name("hero")
        .with_arms(LimbMode::FkIk)
        .with_legs(LimbMode::Ik);
    let fixture = ConfigFixture::new(&config);
    let report_path = fixture.output("report.json");

    let code = build::run(
        Some(fixture.config_str()),
        report_path.to_str(),
        false,
        Some("ik-to-fk"),
    )
    .unwrap();
    assert_eq!(code, ExitCode::SUCCESS);

    let report = read_json(&report_path);
    assert_eq!(report["name"], "hero");
    assert_eq!(report["stage"], "done");
    assert_eq!(report["config_hash"], config_hash(&config).unwrap());
    assert_eq!(report["snaps"].as_array().unwrap().len(), 2);
    assert_eq!(report["handles"]["arms"]["left"]["mode"], "fk_ik");
    assert_eq!(report["handles"]["legs"]["right"]["mode"], "ik");

    let outline = report["outline"].as_array().unwrap();
    assert_eq!(outline.len() as u64, report["summary"]["nodes"].as_u64().unwrap());
    assert!(outline.iter().any(|e| e["name"] == "arm_l_switch"));
}

#[test]
fn half_body_build_mirrors_on_request() {
    let fixture = ConfigFixture::new(&RigConfig::new().with_body(BodyKind::Half));
    let report_path = fixture.output("half.json");

    build::run(Some(fixture.config_str()), report_path.to_str(), true, None).unwrap();
    let report = read_json(&report_path);
    assert!(report["mirrored"].as_u64().unwrap() > 0);
    assert!(report["handles"]["legs"].get("right").is_some());
    assert!(report.get("snaps").is_none());
}

#[test]
fn build_rejects_bad_input() {
    let fixture = ConfigFixture::from_json(r#"{"name": "hero", "tail": true}"#);
    let err = build::run(Some(fixture.config_str()), None, false, None).unwrap_err();
    assert!(format!("{:#}", err).contains("unknown field"));

    let full = ConfigFixture::new(&RigConfig::default());
    let out = full.output("never.json");
    let err = build::run(Some(full.config_str()), out.to_str(), true, None).unwrap_err();
    assert!(format!("{:#}", err).contains("half body"));
    assert!(!out.exists());
}

#[test]
fn validate_reports_exit_codes() {
    let good = ConfigFixture::new(&RigConfig::new().with_spine(SpineKind::Spline));
    assert_eq!(validate::run(good.config_str(), true).unwrap(), ExitCode::SUCCESS);

    let bad = ConfigFixture::from_json(r#"{"name": "has space"}"#);
    assert_eq!(validate::run(bad.config_str(), false).unwrap(), ExitCode::from(1));

    let config = rigsmith_cli::input::read_config(bad.config_str()).unwrap();
    let output = validate::check(bad.config_str(), &config);
    assert!(!output.valid);
    assert!(output.error.unwrap().contains("has space"));
}

#[test]
fn marker_file_feeds_a_build() {
    let fixture = ConfigFixture::new(&RigConfig::default());
    let markers_path = fixture.output("markers.json");
    markers::run("full", "spline", markers_path.to_str()).unwrap();

    let set: MarkerSet =
        serde_json::from_str(&fs::read_to_string(&markers_path).unwrap()).unwrap();
    let config = RigConfig::new()
        .with_spine(SpineKind::Spline)
        .with_markers(set);
    let report = build::build_report(config, build::BuildOptions::default()).unwrap();
    assert!(report.outline.iter().any(|e| e.name == "spine_ik"));
}
