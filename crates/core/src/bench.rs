// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::clock::Clock;
use crate::device::{DevicePins, TempSensor};
use crate::kernel::{Sim, TaskHandle};
use crate::signals::{DigitalLevel, SignalDriver, SignalReader};
use crate::spi::{self, FixedSlave, SlaveHandle, SlaveStats, SpiMasterPort, SpiSlavePort};
use crate::time::SimTime;
use crate::triggers::clock_cycles;
use crate::SimResult;
use tracing::info;

/// The device wired into a session, seen from the harness side.
///
/// Creates the lines `clk`, `rst_n`, `ena`, `spi_*` (host bus) and `adc_*`
/// (device ADC bus), starts the reference clock and the device model.
#[derive(Debug)]
pub struct Testbench {
    pub clk: SignalReader,
    pub rst_n: SignalDriver,
    pub ena: SignalDriver,
    pub host: SpiMasterPort,
    adc: Option<SpiSlavePort>,
    responder: Option<SlaveHandle>,
    ref_clock: TaskHandle,
    device: TaskHandle,
}

impl Testbench {
    pub fn new(sim: &Sim, ref_period: SimTime, device: TempSensor) -> SimResult<Self> {
        let clock = Clock::new(ref_period)?;
        let clk = sim.signal("clk", DigitalLevel::Low);
        let rst_n = sim.signal("rst_n", DigitalLevel::Low);
        let ena = sim.signal("ena", DigitalLevel::Low);
        let (host, device_host) = spi::link(sim, "spi");
        let (device_adc, adc) = spi::link(sim, "adc");

        let clk_view = clk.reader();
        let ref_clock = clock.spawn(clk);
        let device = device.spawn(DevicePins {
            clk: clk_view.clone(),
            rst_n: rst_n.reader(),
            ena: ena.reader(),
            host: device_host,
            adc: device_adc,
        });

        Ok(Self {
            clk: clk_view,
            rst_n,
            ena,
            host,
            adc: Some(adc),
            responder: None,
            ref_clock,
            device,
        })
    }

    /// Holds reset with the device enabled for `cycles` reference cycles.
    pub async fn reset(&mut self, cycles: u32) {
        info!("reset");
        self.rst_n.set(DigitalLevel::Low);
        self.ena.set(DigitalLevel::High);
        clock_cycles(&self.clk, cycles).await;
        self.rst_n.set(DigitalLevel::High);
    }

    pub async fn wait_cycles(&self, cycles: u32) {
        clock_cycles(&self.clk, cycles).await;
    }

    /// Puts `slave` on the ADC bus, replacing any running responder.
    pub fn attach_adc(&mut self, slave: FixedSlave) {
        self.detach_adc();
        if let Some(port) = self.adc.take() {
            self.responder = Some(slave.spawn(port));
        }
    }

    /// Stops the ADC responder, returning its final counters.
    pub fn detach_adc(&mut self) -> Option<SlaveStats> {
        let handle = self.responder.take()?;
        let stats = handle.stats();
        self.adc = Some(handle.stop());
        Some(stats)
    }

    pub fn adc_stats(&self) -> SlaveStats {
        self.responder
            .as_ref()
            .map(SlaveHandle::stats)
            .unwrap_or_default()
    }

    /// Stops every background task of the bench.
    pub fn teardown(mut self) {
        self.detach_adc();
        self.device.cancel();
        self.ref_clock.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;

    #[test]
    fn test_creates_named_lines() {
        let sim = Sim::new();
        let bench = Testbench::new(
            &sim,
            SimTime::from_ns(100),
            TempSensor::new(Calibration::default(), 1000),
        )
        .unwrap();
        let names: Vec<String> = sim.signals().into_iter().map(|s| s.name).collect();
        for expected in [
            "clk", "rst_n", "ena", "spi_sck", "spi_sce", "spi_mosi", "spi_miso", "adc_sck",
            "adc_sce", "adc_mosi", "adc_miso",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        bench.teardown();
        sim.shutdown();
    }

    #[test]
    fn test_reset_holds_for_cycles() {
        let sim = Sim::new();
        let mut bench = Testbench::new(
            &sim,
            SimTime::from_ns(100),
            TempSensor::new(Calibration::default(), 1000),
        )
        .unwrap();
        let inner = sim.clone();
        let released_at = sim
            .run(async move {
                bench.reset(10).await;
                let at = inner.now();
                assert!(bench.rst_n.level().is_high());
                assert!(bench.ena.level().is_high());
                bench.teardown();
                at
            })
            .unwrap();
        assert_eq!(released_at, SimTime::from_ns(1000));
        sim.shutdown();
    }

    #[test]
    fn test_attach_and_detach_adc() {
        let sim = Sim::new();
        let mut bench = Testbench::new(
            &sim,
            SimTime::from_ns(100),
            TempSensor::new(Calibration::default(), 1000),
        )
        .unwrap();
        assert_eq!(bench.detach_adc(), None);
        bench.attach_adc(FixedSlave::new(0x0150));
        bench.attach_adc(FixedSlave::new(0x0151));
        assert_eq!(bench.adc_stats(), SlaveStats::default());
        assert_eq!(bench.detach_adc(), Some(SlaveStats::default()));
        bench.teardown();
        sim.shutdown();
    }
}
