// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{SpiSlavePort, FRAME_BITS};
use crate::kernel::{Sim, TaskHandle};
use crate::signals::{DigitalLevel, SignalDriver, SignalReader};
use std::cell::Cell;
use std::rc::Rc;
use tracing::debug;

/// Frame counters kept by a running responder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SlaveStats {
    pub frames_completed: u64,
    pub frames_aborted: u64,
}

/// Responder that answers every selection with the same 16-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSlave {
    data: u16,
}

impl FixedSlave {
    pub fn new(data: u16) -> Self {
        Self { data }
    }

    pub fn data(&self) -> u16 {
        self.data
    }

    /// Starts responding on `port` in the background.
    pub fn spawn(&self, port: SpiSlavePort) -> SlaveHandle {
        let stats = Rc::new(Cell::new(SlaveStats::default()));
        let name = format!("slave:{}", port.sce.name());
        let task = port.sim().spawn(
            &name,
            respond(
                self.data,
                port.sck.clone(),
                port.sce.clone(),
                port.miso.alias(),
                Rc::clone(&stats),
            ),
        );
        SlaveHandle { task, port, stats }
    }
}

async fn respond(
    data: u16,
    sck: SignalReader,
    sce: SignalReader,
    mut miso: SignalDriver,
    stats: Rc<Cell<SlaveStats>>,
) {
    let sim: Sim = miso.sim().clone();
    loop {
        if sce.is_high() {
            sce.falling_edge().await;
        }

        let mut aborted_at = None;
        for i in 0..FRAME_BITS {
            miso.set(DigitalLevel::of_bit(u32::from(data), FRAME_BITS - 1 - i));
            if sim.first_of([sck.falling(), sce.rising()]).await == 1 {
                aborted_at = Some(i);
                break;
            }
            // Clock wins a tie with deselect. Only the last falling edge may
            // complete the frame that way; earlier ones still abort it.
            if sce.is_high() && i + 1 < FRAME_BITS {
                aborted_at = Some(i + 1);
                break;
            }
        }

        let mut current = stats.get();
        match aborted_at {
            Some(bit) => {
                current.frames_aborted += 1;
                debug!("{}: frame aborted after {} bits", sce.name(), bit);
            }
            None => {
                current.frames_completed += 1;
                debug!("{}: frame {:#06x} shifted out", sce.name(), data);
            }
        }
        stats.set(current);

        if aborted_at.is_none() && sce.is_low() {
            sce.rising_edge().await;
        }
    }
}

/// Running responder. Owns the port until stopped.
#[derive(Debug)]
pub struct SlaveHandle {
    task: TaskHandle,
    port: SpiSlavePort,
    stats: Rc<Cell<SlaveStats>>,
}

impl SlaveHandle {
    pub fn stats(&self) -> SlaveStats {
        self.stats.get()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancels the responder and hands the port back. `miso` keeps its last
    /// driven level.
    pub fn stop(self) -> SpiSlavePort {
        self.task.cancel();
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::{link, SpiMasterPort};
    use crate::time::SimTime;

    async fn bitbang(sim: &Sim, port: &mut SpiMasterPort, bits: u32) -> u32 {
        let half = SimTime::from_ns(5);
        port.sce.set(DigitalLevel::Low);
        let mut word = 0;
        for _ in 0..bits {
            sim.timer(half).await;
            port.sck.set(DigitalLevel::High);
            word = (word << 1) | port.miso.level().bit();
            sim.timer(half).await;
            port.sck.set(DigitalLevel::Low);
        }
        sim.timer(half).await;
        port.sce.set(DigitalLevel::High);
        sim.timer(half).await;
        word
    }

    #[test]
    fn test_shifts_word_msb_first() {
        let sim = Sim::new();
        let (mut master, slave_port) = link(&sim, "spi");
        let slave = FixedSlave::new(0xA5C3).spawn(slave_port);

        let inner = sim.clone();
        let words = sim
            .run(async move {
                let first = bitbang(&inner, &mut master, 16).await;
                let second = bitbang(&inner, &mut master, 16).await;
                (first, second)
            })
            .unwrap();

        assert_eq!(words, (0xA5C3, 0xA5C3));
        assert_eq!(
            slave.stats(),
            SlaveStats {
                frames_completed: 2,
                frames_aborted: 0
            }
        );
        assert!(slave.is_running());
        let port = slave.stop();
        assert_eq!(port.sce.name(), "spi_sce");
        sim.shutdown();
    }

    #[test]
    fn test_abort_restarts_at_msb() {
        let sim = Sim::new();
        let (mut master, slave_port) = link(&sim, "spi");
        let slave = FixedSlave::new(0x8001).spawn(slave_port);

        let inner = sim.clone();
        let (partial, full) = sim
            .run(async move {
                let partial = bitbang(&inner, &mut master, 5).await;
                let full = bitbang(&inner, &mut master, 16).await;
                (partial, full)
            })
            .unwrap();

        assert_eq!(partial, 0b10000);
        assert_eq!(full, 0x8001);
        assert_eq!(slave.stats().frames_aborted, 1);
        assert_eq!(slave.stats().frames_completed, 1);
        drop(slave.stop());
        sim.shutdown();
    }

    #[test]
    fn test_stopped_slave_stops_driving() {
        let sim = Sim::new();
        let (mut master, slave_port) = link(&sim, "spi");
        let slave = FixedSlave::new(0xFFFF).spawn(slave_port);
        let miso = master.miso.clone();

        let inner = sim.clone();
        let port = sim
            .run(async move {
                let port = slave.stop();
                master.sce.set(DigitalLevel::Low);
                inner.timer(SimTime::from_ns(10)).await;
                port
            })
            .unwrap();

        assert!(miso.is_low());
        assert_eq!(port.miso.level(), DigitalLevel::Low);
        sim.shutdown();
    }
}
