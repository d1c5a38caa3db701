// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn spiprobe() -> Command {
    Command::new(env!("CARGO_BIN_EXE_spiprobe"))
}

fn bench_fixture() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/bench.yaml")
}

#[test]
fn test_fixed_read_passes() {
    spiprobe()
        .args(["run", "--scenario", "fixed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fixed_read: PASS"));
}

#[test]
fn test_bundled_config_sweep() {
    spiprobe()
        .arg("run")
        .arg("--config")
        .arg(bench_fixture())
        .args(["--scenario", "sweep", "--iterations", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("phase_sweep: PASS (12 reads"));
}

#[test]
fn test_json_report() -> Result<(), Box<dyn std::error::Error>> {
    let output = spiprobe()
        .args([
            "run",
            "--scenario",
            "sweep",
            "--iterations",
            "3",
            "--seed",
            "7",
            "--json",
        ])
        .output()?;
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(result["status"], "pass");
    assert_eq!(result["result_schema_version"], "1.0");
    let sweep = &result["scenarios"][0];
    assert_eq!(sweep["scenario"], "phase_sweep");
    assert_eq!(sweep["seed"], 7);
    assert_eq!(sweep["reads"].as_array().map(Vec::len), Some(5));
    assert_eq!(sweep["expected"], 10924);
    Ok(())
}

#[test]
fn test_output_dir_and_vcd() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let output_dir = temp_dir.path().join("artifacts");
    let vcd_dir = temp_dir.path().join("waves");

    spiprobe()
        .args(["run", "--scenario", "fixed", "--output-dir"])
        .arg(&output_dir)
        .arg("--vcd-dir")
        .arg(&vcd_dir)
        .assert()
        .success();

    let result = fs::read_to_string(output_dir.join("result.json"))?;
    assert!(result.contains("\"fixed_read\""));

    let vcd = fs::read_to_string(vcd_dir.join("fixed_read.vcd"))?;
    assert!(vcd.contains("$timescale"));
    assert!(vcd.contains("spi_sce"));
    assert!(vcd.contains("adc_miso"));
    Ok(())
}

#[test]
fn test_mismatch_exits_with_assert_failure() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let config = temp_dir.path().join("short.yaml");
    fs::write(
        &config,
        r#"
schema_version: "1.0"
master:
  bit_count: 8
"#,
    )?;

    spiprobe()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--scenario", "fixed"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("expected 0x2aac (10924)"));
    Ok(())
}

#[test]
fn test_invalid_config_exit_code() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let config = temp_dir.path().join("bad.yaml");
    fs::write(&config, "schema_version: \"1.0\"\ncalibration:\n  divisor: 0\n")?;

    spiprobe()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2);

    spiprobe()
        .args(["run", "--config", "does-not-exist.yaml"])
        .assert()
        .code(2);

    spiprobe()
        .args(["run", "--iterations", "0"])
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn test_time_limit_is_runtime_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let config = temp_dir.path().join("limit.yaml");
    fs::write(
        &config,
        r#"
schema_version: "1.0"
limits:
  max_time: { value: 2, unit: us }
"#,
    )?;

    spiprobe()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--scenario", "fixed"])
        .assert()
        .code(3);
    Ok(())
}
