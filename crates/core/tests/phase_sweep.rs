// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use proptest::prelude::*;
use spiprobe_config::BenchConfig;
use spiprobe_core::bench::Testbench;
use spiprobe_core::calibration::Calibration;
use spiprobe_core::device::TempSensor;
use spiprobe_core::metrics::SignalActivity;
use spiprobe_core::scenario::{ScenarioKind, ScenarioRunner, ScenarioSettings};
use spiprobe_core::spi::{FixedSlave, SpiMaster};
use spiprobe_core::{Sim, SimTime};
use std::sync::Arc;

fn default_settings() -> ScenarioSettings {
    ScenarioSettings::from_config(&BenchConfig::default()).unwrap()
}

/// One read of the device at `phase_ps` after reset and settle.
fn read_device_at(phase_ps: u64) -> u32 {
    let sim = Sim::new();
    let mut bench = Testbench::new(
        &sim,
        SimTime::from_ns(100),
        TempSensor::new(Calibration::default(), 1000),
    )
    .unwrap();
    let master = SpiMaster::new(1_000_000, 16).unwrap();
    let word = sim
        .run(async move {
            bench.reset(10).await;
            bench.attach_adc(FixedSlave::new(0x0150));
            bench.wait_cycles(40).await;
            let word = master.read(&mut bench.host, SimTime::from_ps(phase_ps)).await;
            bench.teardown();
            word
        })
        .unwrap();
    sim.shutdown();
    word
}

#[test]
fn test_fixture_code_reads_back_10924() {
    let report = ScenarioRunner::new(default_settings()).fixed_read().unwrap();
    assert!(report.passed());
    assert_eq!(report.expected, 10924);
    assert_eq!(report.reads[0].value, 0x2AAC);
}

#[test]
fn test_hundred_read_sweep() {
    let settings = default_settings();
    let report = ScenarioRunner::new(settings.clone()).phase_sweep().unwrap();
    assert!(report.passed(), "{:?}", report.mismatch);
    assert_eq!(report.reads.len(), 102);
    assert!(report.reads.iter().all(|r| r.value == 10924 && r.passed));
    assert_eq!(report.seed, Some(settings.seed));
    // One ADC frame per conversion, never a partial one.
    assert!(report.slave.frames_completed >= 1);
    assert_eq!(report.slave.frames_aborted, 0);
}

#[test]
fn test_boundary_phases() {
    let report = ScenarioRunner::new(default_settings()).phase_sweep().unwrap();
    assert_eq!(report.reads[0].phase_offset, SimTime::ZERO);
    assert_eq!(report.reads[1].phase_offset, SimTime::from_ps(99_999));
    assert!(report.reads[0].passed && report.reads[1].passed);

    assert_eq!(read_device_at(0), 10924);
    assert_eq!(read_device_at(99_999), 10924);
}

#[test]
fn test_identical_configuration_identical_results() {
    let mut settings = default_settings();
    settings.iterations = 10;
    let first = ScenarioRunner::new(settings.clone()).phase_sweep().unwrap();
    let second = ScenarioRunner::new(settings).phase_sweep().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_every_scenario_passes_with_defaults() {
    let mut settings = default_settings();
    settings.iterations = 5;
    let runner = ScenarioRunner::new(settings);
    for kind in ScenarioKind::ALL {
        let report = runner.run(kind).unwrap();
        assert_eq!(report.scenario, kind);
        assert!(report.passed(), "{kind}: {:?}", report.mismatch);
    }
}

#[test]
fn test_observer_sees_bus_activity() {
    let activity = Arc::new(SignalActivity::new());
    let mut runner = ScenarioRunner::new(default_settings());
    runner.add_observer(activity.clone());
    let report = runner.fixed_read().unwrap();
    assert!(report.passed());
    // Select falls and rises once per read.
    assert_eq!(activity.transitions("spi_sce"), 2);
    assert_eq!(activity.transitions("adc_sce"), 2);
    assert!(activity.transitions("clk") > 100);
    assert_eq!(activity.stopped_at(), report.sim_time);
}

#[test]
fn test_report_serializes() {
    let report = ScenarioRunner::new(default_settings()).fixed_read().unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["scenario"], "fixed_read");
    assert_eq!(json["expected"], 10924);
    assert_eq!(json["reads"][0]["phase_offset"], 0);
    assert!(json.get("mismatch").is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_any_phase_reads_same_word(phase in 0u64..100_000) {
        prop_assert_eq!(read_device_at(phase), 10924);
    }
}
