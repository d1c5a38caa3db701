// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! End-to-end scenarios against the device model.
//!
//! Every scenario runs in a fresh [`Sim`]: reset the device, put a fixed
//! code on its ADC bus, let it settle and read the converted word back over
//! the host bus, comparing each read against the calibrated expectation.
//! A scenario stops at its first mismatching read.

use crate::bench::Testbench;
use crate::calibration::Calibration;
use crate::clock::Clock;
use crate::device::TempSensor;
use crate::kernel::Sim;
use crate::spi::{DividedMaster, FixedSlave, SlaveStats, SpiMaster};
use crate::time::SimTime;
use crate::{SimResult, SimulationObserver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use spiprobe_config::BenchConfig;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Simulated time after which a scenario is abandoned when the bench file
/// sets no limit.
pub const DEFAULT_TIME_LIMIT: SimTime = SimTime::from_us(100_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    FixedRead,
    PhaseSweep,
    DividedRead,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [
        ScenarioKind::FixedRead,
        ScenarioKind::PhaseSweep,
        ScenarioKind::DividedRead,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::FixedRead => "fixed_read",
            ScenarioKind::PhaseSweep => "phase_sweep",
            ScenarioKind::DividedRead => "divided_read",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved, validated parameters shared by all scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSettings {
    pub ref_period: SimTime,
    pub reset_cycles: u32,
    pub settle_cycles: u32,
    pub inter_read_cycles: u32,
    pub conversion_interval_cycles: u32,
    pub master: SpiMaster,
    pub divided: DividedMaster,
    pub code: u16,
    pub calibration: Calibration,
    pub iterations: u32,
    pub seed: u64,
    pub time_limit: SimTime,
}

impl ScenarioSettings {
    pub fn from_config(config: &BenchConfig) -> SimResult<Self> {
        let ref_period = SimTime::from(config.reference_clock.period);
        Clock::new(ref_period)?;

        let mut master = SpiMaster::new(config.master.frequency_hz, config.master.bit_count)?;
        if let Some(lead) = config.master.lead {
            master = master.with_lead(lead.into());
        }

        Ok(Self {
            ref_period,
            reset_cycles: config.reset_cycles,
            settle_cycles: config.settle_cycles,
            inter_read_cycles: config.inter_read_cycles,
            conversion_interval_cycles: config.device.conversion_interval_cycles,
            master,
            divided: DividedMaster::new(config.master.divider, config.master.bit_count)?,
            code: config.slave.code,
            calibration: Calibration::try_from(&config.calibration)?,
            iterations: config.sweep.iterations,
            seed: config.sweep.seed,
            time_limit: config
                .limits
                .max_time
                .map(SimTime::from)
                .unwrap_or(DEFAULT_TIME_LIMIT),
        })
    }

    /// Word every read must return.
    pub fn expected(&self) -> u32 {
        u32::from(self.calibration.encode(self.code))
    }

    /// Phase offsets of a sweep: both ends of the reference period, then
    /// `iterations` draws uniform over `[0, ref_period)`.
    pub fn sweep_offsets(&self) -> Vec<SimTime> {
        sweep_offsets(self.ref_period, self.iterations, self.seed)
    }
}

pub fn sweep_offsets(ref_period: SimTime, iterations: u32, seed: u64) -> Vec<SimTime> {
    let period = ref_period.as_ps().max(1);
    let mut offsets = Vec::with_capacity(iterations as usize + 2);
    offsets.push(SimTime::ZERO);
    if period > 1 {
        offsets.push(SimTime::from_ps(period - 1));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    offsets.extend((0..iterations).map(|_| SimTime::from_ps(rng.gen_range(0..period))));
    offsets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadRecord {
    pub phase_offset: SimTime,
    pub value: u32,
    pub passed: bool,
}

/// The read that failed a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadMismatch {
    pub index: usize,
    pub phase_offset: SimTime,
    pub expected: u32,
    pub actual: u32,
}

impl fmt::Display for ReadMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read #{} at phase {}: expected {:#06x} ({}), got {:#06x} ({})",
            self.index, self.phase_offset, self.expected, self.expected, self.actual, self.actual
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario: ScenarioKind,
    pub expected: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub reads: Vec<ReadRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<ReadMismatch>,
    pub slave: SlaveStats,
    pub sim_time: SimTime,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.mismatch.is_none() && !self.reads.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    Sampled,
    Divided,
}

/// Runs scenarios with a fixed set of settings and observers.
#[derive(Debug)]
pub struct ScenarioRunner {
    settings: ScenarioSettings,
    observers: Vec<Arc<dyn SimulationObserver>>,
}

impl ScenarioRunner {
    pub fn new(settings: ScenarioSettings) -> Self {
        Self {
            settings,
            observers: Vec::new(),
        }
    }

    /// Attached to the session of every scenario run afterwards.
    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn settings(&self) -> &ScenarioSettings {
        &self.settings
    }

    pub fn run(&self, kind: ScenarioKind) -> SimResult<ScenarioReport> {
        match kind {
            ScenarioKind::FixedRead => self.fixed_read(),
            ScenarioKind::PhaseSweep => self.phase_sweep(),
            ScenarioKind::DividedRead => self.divided_read(),
        }
    }

    /// One read with the sampling clock aligned to the start of the lead.
    pub fn fixed_read(&self) -> SimResult<ScenarioReport> {
        self.execute(ScenarioKind::FixedRead, ReadMode::Sampled, vec![SimTime::ZERO])
    }

    pub fn phase_sweep(&self) -> SimResult<ScenarioReport> {
        let mut report = self.execute(
            ScenarioKind::PhaseSweep,
            ReadMode::Sampled,
            self.settings.sweep_offsets(),
        )?;
        report.seed = Some(self.settings.seed);
        Ok(report)
    }

    /// One read clocked from the reference clock through the divider.
    pub fn divided_read(&self) -> SimResult<ScenarioReport> {
        self.execute(ScenarioKind::DividedRead, ReadMode::Divided, vec![SimTime::ZERO])
    }

    fn execute(
        &self,
        kind: ScenarioKind,
        mode: ReadMode,
        offsets: Vec<SimTime>,
    ) -> SimResult<ScenarioReport> {
        let settings = self.settings.clone();
        let expected = settings.expected();
        info!(
            "{}: {} read(s), code {:#06x}, expecting {:#06x} ({})",
            kind,
            offsets.len(),
            settings.code,
            expected,
            expected
        );

        let sim = Sim::new();
        sim.set_time_limit(Some(settings.time_limit));
        for observer in &self.observers {
            sim.add_observer(Arc::clone(observer));
        }
        let sensor = TempSensor::new(settings.calibration, settings.conversion_interval_cycles);
        let mut bench = Testbench::new(&sim, settings.ref_period, sensor)?;

        let outcome = sim.run(async move {
            bench.reset(settings.reset_cycles).await;
            bench.attach_adc(FixedSlave::new(settings.code));
            bench.wait_cycles(settings.settle_cycles).await;

            let mut reads = Vec::with_capacity(offsets.len());
            let mut mismatch = None;
            for (index, phase_offset) in offsets.into_iter().enumerate() {
                let value = match mode {
                    ReadMode::Sampled => settings.master.read(&mut bench.host, phase_offset).await,
                    ReadMode::Divided => settings.divided.read(&mut bench.host, &bench.clk).await,
                };
                let passed = value == expected;
                debug!("{} read #{}: {:#06x}", kind, index, value);
                reads.push(ReadRecord {
                    phase_offset,
                    value,
                    passed,
                });
                if !passed {
                    let miss = ReadMismatch {
                        index,
                        phase_offset,
                        expected,
                        actual: value,
                    };
                    warn!("{}: {}", kind, miss);
                    mismatch = Some(miss);
                    break;
                }
                bench.wait_cycles(settings.inter_read_cycles).await;
            }

            let slave = bench.detach_adc().unwrap_or_default();
            bench.teardown();
            (reads, mismatch, slave)
        });

        let sim_time = sim.now();
        sim.shutdown();
        let (reads, mismatch, slave) = outcome?;

        let report = ScenarioReport {
            scenario: kind,
            expected,
            seed: None,
            reads,
            mismatch,
            slave,
            sim_time,
        };
        info!(
            "{}: {} after {} read(s) at {}",
            kind,
            if report.passed() { "passed" } else { "FAILED" },
            report.reads.len(),
            sim_time
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ScenarioSettings {
        ScenarioSettings::from_config(&BenchConfig::default()).unwrap()
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = settings();
        assert_eq!(settings.ref_period, SimTime::from_ns(100));
        assert_eq!(settings.master.period(), SimTime::from_us(1));
        assert_eq!(settings.master.lead(), SimTime::from_us(1));
        assert_eq!(settings.expected(), 10924);
        assert_eq!(settings.time_limit, DEFAULT_TIME_LIMIT);
    }

    #[test]
    fn test_lead_override() {
        let mut config = BenchConfig::default();
        config.master.lead = Some(spiprobe_config::Duration::new(
            3,
            spiprobe_config::TimeUnit::Us,
        ));
        let settings = ScenarioSettings::from_config(&config).unwrap();
        assert_eq!(settings.master.lead(), SimTime::from_us(3));
    }

    #[test]
    fn test_sweep_offsets_include_boundaries() {
        let offsets = sweep_offsets(SimTime::from_ns(100), 20, 1);
        assert_eq!(offsets.len(), 22);
        assert_eq!(offsets[0], SimTime::ZERO);
        assert_eq!(offsets[1], SimTime::from_ps(99_999));
        assert!(offsets.iter().all(|o| *o < SimTime::from_ns(100)));
        assert_eq!(offsets, sweep_offsets(SimTime::from_ns(100), 20, 1));
        assert_ne!(offsets, sweep_offsets(SimTime::from_ns(100), 20, 2));
    }

    #[test]
    fn test_fixed_read_passes() {
        let report = ScenarioRunner::new(settings()).fixed_read().unwrap();
        assert!(report.passed(), "{:?}", report.mismatch);
        assert_eq!(report.reads.len(), 1);
        assert_eq!(report.reads[0].value, 0x2AAC);
        assert_eq!(report.slave.frames_completed, 1);
        assert_eq!(report.slave.frames_aborted, 0);
    }

    #[test]
    fn test_divided_read_passes() {
        let report = ScenarioRunner::new(settings()).divided_read().unwrap();
        assert!(report.passed(), "{:?}", report.mismatch);
        assert_eq!(report.reads[0].value, 10924);
    }

    #[test]
    fn test_calibration_reaches_device() {
        let mut settings = settings();
        settings.calibration = Calibration::new(100, 100, 0x0100, 1).unwrap();
        let report = ScenarioRunner::new(settings).fixed_read().unwrap();
        assert!(report.passed());
        assert_eq!(report.expected, 8100);
        assert_eq!(report.reads[0].value, 0x1FA4);
    }

    #[test]
    fn test_truncated_read_fails_with_verdict() {
        let mut settings = settings();
        settings.master = SpiMaster::new(1_000_000, 8).unwrap();
        let report = ScenarioRunner::new(settings).fixed_read().unwrap();
        assert!(!report.passed());
        let mismatch = report.mismatch.unwrap();
        assert_eq!(mismatch.expected, 0x2AAC);
        assert_eq!(mismatch.actual, 0x2A);
        assert!(mismatch.to_string().contains("expected 0x2aac (10924), got 0x002a (42)"));
    }

    #[test]
    fn test_time_limit_surfaces_as_error() {
        let mut settings = settings();
        settings.time_limit = SimTime::from_us(2);
        let err = ScenarioRunner::new(settings).fixed_read().unwrap_err();
        assert_eq!(
            err,
            crate::SimulationError::TimeLimitExceeded {
                limit: SimTime::from_us(2)
            }
        );
    }
}
