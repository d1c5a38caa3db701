// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bench;
pub mod calibration;
pub mod clock;
pub mod device;
pub mod kernel;
pub mod metrics;
pub mod scenario;
pub mod signals;
pub mod spi;
pub mod time;
pub mod triggers;

pub use kernel::{Sim, TaskHandle};
pub use signals::{DigitalLevel, SignalDriver, SignalId, SignalReader};
pub use time::SimTime;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("clock period must be at least 2ps, got {0}")]
    InvalidClockPeriod(SimTime),
    #[error("clock frequency must be greater than zero")]
    InvalidFrequency,
    #[error("bit count must be within 1..=32, got {0}")]
    InvalidBitCount(u32),
    #[error("clock divider must be greater than zero")]
    InvalidDivider,
    #[error("calibration divisor must be non-zero")]
    InvalidCalibration,
    #[error("simulation stalled at {0}: no pending event can wake the root task")]
    Stalled(SimTime),
    #[error("simulation time limit of {limit} exceeded")]
    TimeLimitExceeded { limit: SimTime },
    #[error("more than {limit} delta steps at {time}")]
    DeltaOverflow { time: SimTime, limit: u32 },
}

pub type SimResult<T> = Result<T, SimulationError>;

/// A line as seen by observers when a run starts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SignalInfo {
    pub id: SignalId,
    pub name: String,
    pub level: DigitalLevel,
}

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self, _signals: &[SignalInfo]) {}
    fn on_simulation_stop(&self, _time: SimTime) {}
    fn on_signal_change(&self, _time: SimTime, _signal: SignalId, _level: DigitalLevel) {}
}
