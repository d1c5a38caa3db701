// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::kernel::Sim;
use crate::triggers::Trigger;
use std::fmt;
use std::ops::Not;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl DigitalLevel {
    /// Level of bit `bit` in `word`.
    pub fn of_bit(word: u32, bit: u32) -> Self {
        DigitalLevel::from((word >> bit) & 1 == 1)
    }

    pub fn bit(self) -> u32 {
        match self {
            DigitalLevel::High => 1,
            DigitalLevel::Low => 0,
        }
    }

    pub fn is_high(self) -> bool {
        self == DigitalLevel::High
    }
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

impl Not for DigitalLevel {
    type Output = DigitalLevel;

    fn not(self) -> DigitalLevel {
        match self {
            DigitalLevel::High => DigitalLevel::Low,
            DigitalLevel::Low => DigitalLevel::High,
        }
    }
}

/// Index of a line inside one [`Sim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct SignalId(pub(crate) usize);

impl SignalId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Direction of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// The edge produced by going from `old` to `new`, if any.
    pub fn between(old: DigitalLevel, new: DigitalLevel) -> Option<Edge> {
        match (old, new) {
            (DigitalLevel::Low, DigitalLevel::High) => Some(Edge::Rising),
            (DigitalLevel::High, DigitalLevel::Low) => Some(Edge::Falling),
            _ => None,
        }
    }
}

/// Read-only view of a line. Cheap to clone; any number of tasks may
/// observe the same line.
#[derive(Clone)]
pub struct SignalReader {
    id: SignalId,
    sim: Sim,
}

impl SignalReader {
    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn name(&self) -> String {
        self.sim.signal_name(self.id)
    }

    pub fn level(&self) -> DigitalLevel {
        self.sim.read(self.id)
    }

    pub fn is_high(&self) -> bool {
        self.level().is_high()
    }

    pub fn is_low(&self) -> bool {
        !self.is_high()
    }

    /// Trigger on the next 0→1 transition, for use with [`Sim::first_of`].
    pub fn rising(&self) -> Trigger {
        Trigger::Edge {
            signal: self.id,
            edge: Edge::Rising,
        }
    }

    /// Trigger on the next 1→0 transition, for use with [`Sim::first_of`].
    pub fn falling(&self) -> Trigger {
        Trigger::Edge {
            signal: self.id,
            edge: Edge::Falling,
        }
    }

    pub async fn rising_edge(&self) {
        self.sim.first_of([self.rising()]).await;
    }

    pub async fn falling_edge(&self) {
        self.sim.first_of([self.falling()]).await;
    }

    pub fn sim(&self) -> &Sim {
        &self.sim
    }
}

impl fmt::Debug for SignalReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.name(), self.level())
    }
}

/// The single write-capable handle of a line.
///
/// Not `Clone`: whoever owns the driver is the only writer. Lending the
/// line to a background task (see [`crate::clock::Clock::drive`]) holds a
/// mutable borrow for as long as the task runs.
pub struct SignalDriver {
    reader: SignalReader,
}

impl SignalDriver {
    pub(crate) fn new(id: SignalId, sim: Sim) -> Self {
        Self {
            reader: SignalReader { id, sim },
        }
    }

    /// Second write handle for the same line, handed to a task that writes
    /// on behalf of the owner while the owner's handle is borrowed or parked.
    pub(crate) fn alias(&self) -> SignalDriver {
        SignalDriver {
            reader: self.reader.clone(),
        }
    }

    pub fn set(&mut self, level: impl Into<DigitalLevel>) {
        self.reader.sim.write(self.reader.id, level.into());
    }

    pub fn reader(&self) -> SignalReader {
        self.reader.clone()
    }

    pub fn id(&self) -> SignalId {
        self.reader.id
    }

    pub fn level(&self) -> DigitalLevel {
        self.reader.level()
    }

    pub fn sim(&self) -> &Sim {
        &self.reader.sim
    }
}

impl fmt::Debug for SignalDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver({:?})", self.reader)
    }
}
