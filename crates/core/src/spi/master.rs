// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::SpiMasterPort;
use crate::clock::Clock;
use crate::signals::{DigitalLevel, SignalReader};
use crate::time::SimTime;
use crate::triggers::clock_cycles;
use crate::{SimResult, SimulationError};
use tracing::debug;

/// Host-side reader with its own sampling clock.
///
/// The sampling clock is unrelated to any clock of the device being read;
/// `phase_offset` on [`SpiMaster::read`] places its first rising edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiMaster {
    clock: Clock,
    bit_count: u32,
    lead: SimTime,
}

impl SpiMaster {
    pub fn new(frequency_hz: u64, bit_count: u32) -> SimResult<Self> {
        check_bit_count(bit_count)?;
        let clock = Clock::from_hz(frequency_hz)?;
        Ok(Self {
            clock,
            bit_count,
            lead: clock.period(),
        })
    }

    /// Delay between asserting select and starting the sampling clock.
    /// Defaults to one sampling period; a zero lead starts the clock right
    /// after select.
    pub fn with_lead(mut self, lead: SimTime) -> Self {
        self.lead = lead;
        self
    }

    pub fn period(&self) -> SimTime {
        self.clock.period()
    }

    pub fn bit_count(&self) -> u32 {
        self.bit_count
    }

    pub fn lead(&self) -> SimTime {
        self.lead
    }

    /// Performs one transfer and returns the sampled word, MSB first.
    ///
    /// `mosi` is held low for the whole transfer. On return `sck` is low and
    /// `sce` is high.
    pub async fn read(&self, port: &mut SpiMasterPort, phase_offset: SimTime) -> u32 {
        let sim = port.sim().clone();
        port.sce.set(DigitalLevel::Low);
        port.mosi.set(DigitalLevel::Low);
        port.sck.set(DigitalLevel::Low);
        if !self.lead.is_zero() {
            sim.timer(self.lead).await;
        }

        let sck = port.sck.reader();
        let clock = self.clock.with_start_delay(phase_offset);
        let generator = clock.drive(&mut port.sck);
        let mut word = 0u32;
        for _ in 0..self.bit_count {
            sck.rising_edge().await;
            word = (word << 1) | port.miso.level().bit();
        }
        sim.timer(self.clock.period()).await;
        generator.stop();

        port.sck.set(DigitalLevel::Low);
        port.sce.set(DigitalLevel::High);
        debug!(
            "read {:#x} ({} bits, phase {}) at {}",
            word,
            self.bit_count,
            phase_offset,
            sim.now()
        );
        word
    }
}

fn check_bit_count(bit_count: u32) -> SimResult<()> {
    if (1..=32).contains(&bit_count) {
        Ok(())
    } else {
        Err(SimulationError::InvalidBitCount(bit_count))
    }
}

/// Reader that bit-bangs `sck` from a reference clock instead of running its
/// own generator: every half bit lasts `divider` reference cycles and `miso`
/// is sampled just before `sck` rises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DividedMaster {
    divider: u32,
    bit_count: u32,
}

impl DividedMaster {
    pub fn new(divider: u32, bit_count: u32) -> SimResult<Self> {
        check_bit_count(bit_count)?;
        if divider == 0 {
            return Err(SimulationError::InvalidDivider);
        }
        Ok(Self { divider, bit_count })
    }

    pub fn divider(&self) -> u32 {
        self.divider
    }

    pub async fn read(&self, port: &mut SpiMasterPort, ref_clk: &SignalReader) -> u32 {
        port.sce.set(DigitalLevel::Low);
        port.mosi.set(DigitalLevel::Low);
        port.sck.set(DigitalLevel::Low);
        let mut word = 0u32;
        for _ in 0..self.bit_count {
            clock_cycles(ref_clk, self.divider).await;
            word = (word << 1) | port.miso.level().bit();
            port.sck.set(DigitalLevel::High);
            clock_cycles(ref_clk, self.divider).await;
            port.sck.set(DigitalLevel::Low);
        }
        port.sce.set(DigitalLevel::High);
        debug!(
            "divided read {:#x} ({} bits, /{}) at {}",
            word,
            self.bit_count,
            self.divider,
            port.sim().now()
        );
        word
    }
}
