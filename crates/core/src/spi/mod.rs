// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Four-wire SPI link, mode 0 (CPOL=0, CPHA=0), MSB first, active-low select.
//!
//! Write ownership of the lines is split between the two ports: the master
//! drives `sck`, `sce` and `mosi`, the slave drives `miso`.

pub mod master;
pub mod slave;

pub use master::{DividedMaster, SpiMaster};
pub use slave::{FixedSlave, SlaveHandle, SlaveStats};

use crate::kernel::Sim;
use crate::signals::{DigitalLevel, SignalDriver, SignalReader};

/// Bits per frame on every link in this harness.
pub const FRAME_BITS: u32 = 16;

/// Read-only view of the four lines of a link.
#[derive(Clone, Debug)]
pub struct SpiBus {
    pub sck: SignalReader,
    pub sce: SignalReader,
    pub mosi: SignalReader,
    pub miso: SignalReader,
}

impl std::fmt::Display for SpiBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SPI bus sck={} sce={} mosi={} miso={}",
            self.sck.name(),
            self.sce.name(),
            self.mosi.name(),
            self.miso.name()
        )
    }
}

/// Controller end of a link.
#[derive(Debug)]
pub struct SpiMasterPort {
    pub sck: SignalDriver,
    pub sce: SignalDriver,
    pub mosi: SignalDriver,
    pub miso: SignalReader,
}

impl SpiMasterPort {
    pub fn bus(&self) -> SpiBus {
        SpiBus {
            sck: self.sck.reader(),
            sce: self.sce.reader(),
            mosi: self.mosi.reader(),
            miso: self.miso.clone(),
        }
    }

    pub fn sim(&self) -> &Sim {
        self.sce.sim()
    }
}

/// Responder end of a link.
#[derive(Debug)]
pub struct SpiSlavePort {
    pub sck: SignalReader,
    pub sce: SignalReader,
    pub mosi: SignalReader,
    pub miso: SignalDriver,
}

impl SpiSlavePort {
    pub fn bus(&self) -> SpiBus {
        SpiBus {
            sck: self.sck.clone(),
            sce: self.sce.clone(),
            mosi: self.mosi.clone(),
            miso: self.miso.reader(),
        }
    }

    pub fn sim(&self) -> &Sim {
        self.miso.sim()
    }
}

/// Creates the lines `{prefix}_sck`, `{prefix}_sce`, `{prefix}_mosi` and
/// `{prefix}_miso` at their idle levels and splits them into two ports.
pub fn link(sim: &Sim, prefix: &str) -> (SpiMasterPort, SpiSlavePort) {
    let sck = sim.signal(&format!("{prefix}_sck"), DigitalLevel::Low);
    let sce = sim.signal(&format!("{prefix}_sce"), DigitalLevel::High);
    let mosi = sim.signal(&format!("{prefix}_mosi"), DigitalLevel::Low);
    let miso = sim.signal(&format!("{prefix}_miso"), DigitalLevel::Low);

    let slave = SpiSlavePort {
        sck: sck.reader(),
        sce: sce.reader(),
        mosi: mosi.reader(),
        miso,
    };
    let master = SpiMasterPort {
        miso: slave.miso.reader(),
        sck,
        sce,
        mosi,
    };
    (master, slave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_idle_levels() {
        let sim = Sim::new();
        let (master, slave) = link(&sim, "spi");
        let bus = master.bus();
        assert!(bus.sck.is_low());
        assert!(bus.sce.is_high());
        assert_eq!(slave.bus().miso.id(), bus.miso.id());
        assert_eq!(
            bus.to_string(),
            "SPI bus sck=spi_sck sce=spi_sce mosi=spi_mosi miso=spi_miso"
        );
    }
}
