//! Setup and inspection commands in text and JSON output.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

use crate::common::fixtures::Scratch;

fn booth() -> Command {
    let mut cmd = Command::cargo_bin("booth").unwrap();
    cmd.env_remove("BOOTH_CONFIG")
        .env_remove("BOOTH_FORMAT")
        .env("RUST_LOG", "off")
        .env("NO_COLOR", "1");
    cmd
}

fn parse_json(bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes);
    serde_json::from_str(text.trim()).unwrap_or_else(|_| panic!("Failed to parse JSON:\n{text}"))
}

/// Scratch directory holding an initialized configuration.
fn initialized() -> (Scratch, String) {
    let scratch = Scratch::new();
    let config = scratch.join("booth.yaml").display().to_string();
    booth().args(["-c", &config, "init"]).assert().success();
    (scratch, config)
}

#[test]
fn quick_start_without_command() {
    booth()
        .assert()
        .success()
        .stdout(predicate::str::contains("QUICK START"))
        .stdout(predicate::str::contains("booth init"));
}

#[test]
fn quick_start_json_names_tool() {
    let output = booth().args(["--format", "json"]).output().unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["tool"], "booth");
    assert!(json.get("output_modes").is_some());
}

#[test]
fn version_text_and_json() {
    booth()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("booth "));

    let output = booth().args(["version", "--format=json-compact"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim().lines().count(), 1);
    let json = parse_json(&output.stdout);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn init_then_check() {
    let (scratch, config) = initialized();
    assert!(scratch.join("resources").is_dir());

    booth()
        .args(["-c", &config, "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("Four"));

    let output = booth().args(["-c", &config, "--format", "json", "check"]).output().unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["ok"], true);
    assert_eq!(json["modes"].as_array().map(Vec::len), Some(3));
    assert_eq!(json["modes"][1]["frames"], 4);
}

#[test]
fn init_refuses_to_overwrite() {
    let (_scratch, config) = initialized();

    booth()
        .args(["-c", &config, "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    booth().args(["-c", &config, "init", "--force"]).assert().success();
}

#[test]
fn check_missing_config_suggests_init() {
    let scratch = Scratch::new();
    let config = scratch.join("absent.yaml").display().to_string();

    booth()
        .args(["-c", &config, "check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("booth init"));
}

#[test]
fn json_error_object_on_stderr() {
    let scratch = Scratch::new();
    let config = scratch.join("absent.yaml").display().to_string();

    let output = booth()
        .args(["-c", &config, "--format", "json", "check"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let json = parse_json(&output.stderr);
    assert_eq!(json["error"], true);
    assert_eq!(json["recoverable"], true);
    assert_eq!(json["suggestion"], "Run: booth init");
}

#[test]
fn check_rejects_missing_resource() {
    let (scratch, config) = initialized();
    std::fs::remove_file(scratch.join("resources/collage_four_square.png")).unwrap();

    booth()
        .args(["-c", &config, "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("collage_four_square.png"));
}

#[test]
fn effects_lists_palette() {
    let (_scratch, config) = initialized();

    booth()
        .args(["-c", &config, "effects"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sketch"))
        .stdout(predicate::str::contains("watercolor1"));

    let output = booth().args(["-c", &config, "-f", "json", "effects"]).output().unwrap();
    let json = parse_json(&output.stdout);
    assert_eq!(json["effects"].as_object().map(serde_json::Map::len), Some(13));
    assert!(json["palette"].as_array().is_some_and(|p| !p.is_empty()));
}

#[test]
fn snap_rejects_unknown_mode() {
    booth()
        .args(["snap", "Six"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode"));
}

#[test]
fn completions_for_bash() {
    booth()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("booth"));
}
