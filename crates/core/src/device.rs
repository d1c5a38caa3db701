// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Behavioural model of the temperature-sensor device.
//!
//! The device runs on the rising edges of its reference clock. It polls an
//! external ADC over its own SPI master port, converts the code with a
//! [`Calibration`] and serves the latest word to the host over a slave
//! port. Host-side `sck` and `sce` come from an unrelated clock domain and
//! pass through two-stage synchronizers before use.

use crate::calibration::Calibration;
use crate::kernel::TaskHandle;
use crate::signals::{DigitalLevel, Edge, SignalReader};
use crate::spi::{SpiMasterPort, SpiSlavePort, FRAME_BITS};
use tracing::{debug, trace};

/// Reference-clock edges one ADC conversion takes: select, two per bit,
/// deselect.
pub const CONVERSION_EDGES: u32 = 2 * FRAME_BITS + 2;

/// Lines the device is wired to.
#[derive(Debug)]
pub struct DevicePins {
    pub clk: SignalReader,
    pub rst_n: SignalReader,
    pub ena: SignalReader,
    pub host: SpiSlavePort,
    pub adc: SpiMasterPort,
}

/// Two flip-flop synchronizer with edge detection on its output.
#[derive(Debug, Clone, Copy)]
struct Synchronizer {
    stages: [DigitalLevel; 2],
}

impl Synchronizer {
    fn new(idle: DigitalLevel) -> Self {
        Self {
            stages: [idle, idle],
        }
    }

    fn sample(&mut self, pin: DigitalLevel) -> Option<Edge> {
        let previous = self.stages[1];
        self.stages[1] = self.stages[0];
        self.stages[0] = pin;
        Edge::between(previous, self.stages[1])
    }

    fn level(&self) -> DigitalLevel {
        self.stages[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdcPhase {
    Idle { remaining: u32 },
    Shift { bits: u32, code: u16 },
}

/// Register state of the device.
#[derive(Debug, Clone)]
pub struct TempSensor {
    calibration: Calibration,
    conversion_interval_cycles: u32,
    sce_sync: Synchronizer,
    sck_sync: Synchronizer,
    shift: u16,
    holding: u16,
    latest: u16,
    adc: AdcPhase,
    conversions: u64,
}

impl TempSensor {
    pub fn new(calibration: Calibration, conversion_interval_cycles: u32) -> Self {
        Self {
            calibration,
            conversion_interval_cycles,
            sce_sync: Synchronizer::new(DigitalLevel::High),
            sck_sync: Synchronizer::new(DigitalLevel::Low),
            shift: 0,
            holding: 0,
            latest: 0,
            adc: AdcPhase::Idle { remaining: 0 },
            conversions: 0,
        }
    }

    /// Last converted word.
    pub fn latest(&self) -> u16 {
        self.latest
    }

    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    /// Runs the device as a task clocked by `pins.clk`.
    pub fn spawn(self, pins: DevicePins) -> TaskHandle {
        let sim = pins.clk.sim().clone();
        sim.spawn("device", run(self, pins))
    }

    fn reset(&mut self, pins: &mut DevicePins) {
        *self = Self::new(self.calibration, self.conversion_interval_cycles);
        pins.host.miso.set(DigitalLevel::Low);
        pins.adc.sce.set(DigitalLevel::High);
        pins.adc.sck.set(DigitalLevel::Low);
        pins.adc.mosi.set(DigitalLevel::Low);
    }

    /// One rising edge of the reference clock.
    pub fn tick(&mut self, pins: &mut DevicePins) {
        if pins.rst_n.is_low() {
            self.reset(pins);
            return;
        }
        if pins.ena.is_low() {
            return;
        }
        self.tick_host(&mut pins.host);
        self.tick_adc(&mut pins.adc);
    }

    fn tick_host(&mut self, host: &mut SpiSlavePort) {
        let sce_edge = self.sce_sync.sample(host.sce.level());
        let sck_edge = self.sck_sync.sample(host.sck.level());

        match sce_edge {
            Some(Edge::Falling) => {
                self.shift = self.holding;
                host.miso.set(msb(self.shift));
            }
            Some(Edge::Rising) => host.miso.set(DigitalLevel::Low),
            None if self.sce_sync.level() == DigitalLevel::Low => {
                if sck_edge == Some(Edge::Falling) {
                    self.shift <<= 1;
                    host.miso.set(msb(self.shift));
                }
            }
            None => {}
        }

        // The word served to the host only changes between frames.
        if self.sce_sync.level().is_high() {
            self.holding = self.latest;
        }
    }

    fn tick_adc(&mut self, adc: &mut SpiMasterPort) {
        let phase = self.adc;
        self.adc = match phase {
            AdcPhase::Idle { remaining: 0 } => {
                adc.sce.set(DigitalLevel::Low);
                AdcPhase::Shift { bits: 0, code: 0 }
            }
            AdcPhase::Idle { remaining } => AdcPhase::Idle {
                remaining: remaining - 1,
            },
            AdcPhase::Shift { bits, code } if adc.sck.level().is_high() => {
                adc.sck.set(DigitalLevel::Low);
                AdcPhase::Shift { bits, code }
            }
            AdcPhase::Shift { bits, code } if bits == FRAME_BITS => {
                adc.sce.set(DigitalLevel::High);
                self.latest = self.calibration.encode(code);
                self.conversions += 1;
                debug!(
                    "device: adc code {:#06x} -> {:#06x} ({})",
                    code, self.latest, self.latest
                );
                AdcPhase::Idle {
                    remaining: self.conversion_interval_cycles,
                }
            }
            AdcPhase::Shift { bits, code } => {
                let code = (code << 1) | adc.miso.level().bit() as u16;
                adc.sck.set(DigitalLevel::High);
                AdcPhase::Shift {
                    bits: bits + 1,
                    code,
                }
            }
        };
    }
}

fn msb(word: u16) -> DigitalLevel {
    DigitalLevel::of_bit(u32::from(word), FRAME_BITS - 1)
}

async fn run(mut device: TempSensor, mut pins: DevicePins) {
    loop {
        pins.clk.rising_edge().await;
        device.tick(&mut pins);
        trace!("device tick, adc {:?}", device.adc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::kernel::Sim;
    use crate::spi::{link, FixedSlave, SpiMaster};
    use crate::time::SimTime;
    use crate::triggers::clock_cycles;

    #[test]
    fn test_synchronizer_delays_two_samples() {
        let mut sync = Synchronizer::new(DigitalLevel::High);
        assert_eq!(sync.sample(DigitalLevel::Low), None);
        assert_eq!(sync.sample(DigitalLevel::Low), Some(Edge::Falling));
        assert_eq!(sync.sample(DigitalLevel::Low), None);
        assert_eq!(sync.level(), DigitalLevel::Low);
    }

    #[test]
    fn test_conversion_edges() {
        assert_eq!(CONVERSION_EDGES, 34);
    }

    #[test]
    fn test_converts_and_serves_code() {
        let sim = Sim::new();
        let clk = sim.signal("clk", DigitalLevel::Low);
        let clk_view = clk.reader();
        let mut rst_n = sim.signal("rst_n", DigitalLevel::Low);
        let ena = sim.signal("ena", DigitalLevel::High);
        let (mut host, device_host) = link(&sim, "spi");
        let (device_adc, adc) = link(&sim, "adc");

        let pins = DevicePins {
            clk: clk_view.clone(),
            rst_n: rst_n.reader(),
            ena: ena.reader(),
            host: device_host,
            adc: device_adc,
        };
        let ref_clock = Clock::new(SimTime::from_ns(100)).unwrap().spawn(clk);
        let device = TempSensor::new(Calibration::default(), 1000).spawn(pins);
        let slave = FixedSlave::new(0x0150).spawn(adc);
        let master = SpiMaster::new(1_000_000, 16).unwrap();

        let word = sim
            .run(async move {
                clock_cycles(&clk_view, 10).await;
                rst_n.set(DigitalLevel::High);
                clock_cycles(&clk_view, 40).await;
                master.read(&mut host, SimTime::from_ns(42)).await
            })
            .unwrap();

        assert_eq!(word, 10924);
        assert_eq!(slave.stats().frames_completed, 1);
        assert_eq!(slave.stats().frames_aborted, 0);
        ref_clock.cancel();
        device.cancel();
        sim.shutdown();
    }

    #[test]
    fn test_holds_reset_outputs() {
        let sim = Sim::new();
        let clk = sim.signal("clk", DigitalLevel::Low);
        let clk_view = clk.reader();
        let rst_n = sim.signal("rst_n", DigitalLevel::Low);
        let ena = sim.signal("ena", DigitalLevel::High);
        let (_host, device_host) = link(&sim, "spi");
        let (device_adc, adc) = link(&sim, "adc");
        let adc_sce = adc.sce.clone();

        let pins = DevicePins {
            clk: clk_view.clone(),
            rst_n: rst_n.reader(),
            ena: ena.reader(),
            host: device_host,
            adc: device_adc,
        };
        let ref_clock = Clock::new(SimTime::from_ns(100)).unwrap().spawn(clk);
        let device = TempSensor::new(Calibration::default(), 1000).spawn(pins);

        sim.run(async move { clock_cycles(&clk_view, 100).await })
            .unwrap();

        assert!(adc_sce.is_high());
        ref_clock.cancel();
        device.cancel();
        sim.shutdown();
    }
}
