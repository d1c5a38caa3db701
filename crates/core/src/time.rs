// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use spiprobe_config::{Duration, TimeUnit};
use std::fmt;
use std::ops::{Add, Sub};

const PS_PER_SECOND: u64 = 1_000_000_000_000;

/// Simulated time, in picoseconds.
///
/// Used both for absolute instants and for durations; the kernel never
/// needs anything finer than one picosecond.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_ps(ps: u64) -> Self {
        Self(ps)
    }

    pub const fn from_ns(ns: u64) -> Self {
        Self(ns * 1_000)
    }

    pub const fn from_us(us: u64) -> Self {
        Self(us * 1_000_000)
    }

    pub fn from_unit(value: u64, unit: TimeUnit) -> Self {
        Self(value.saturating_mul(unit.picoseconds()))
    }

    pub const fn as_ps(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Period of a clock running at `hz`, rounded to the nearest picosecond.
    ///
    /// Returns `None` for 0 Hz.
    pub fn period_of_hz(hz: u64) -> Option<Self> {
        if hz == 0 {
            return None;
        }
        let hz = hz as u128;
        let ps = (PS_PER_SECOND as u128 + hz / 2) / hz;
        Some(Self(ps as u64))
    }
}

impl From<Duration> for SimTime {
    fn from(d: Duration) -> Self {
        SimTime(d.as_picoseconds())
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Largest unit that represents the value exactly.
        const UNITS: [(u64, &str); 4] = [
            (1_000_000_000, "ms"),
            (1_000_000, "us"),
            (1_000, "ns"),
            (1, "ps"),
        ];
        if self.0 == 0 {
            return write!(f, "0ps");
        }
        for (scale, name) in UNITS {
            if self.0 % scale == 0 {
                return write!(f, "{}{}", self.0 / scale, name);
            }
        }
        write!(f, "{}ps", self.0)
    }
}
