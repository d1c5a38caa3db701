// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::kernel::TaskHandle;
use crate::signals::{DigitalLevel, SignalDriver};
use crate::time::SimTime;
use crate::{SimResult, SimulationError};
use std::marker::PhantomData;

/// Free-running square wave description.
///
/// The line goes high `start_delay` after the generator starts, stays high
/// for `period / 2` and low for the remainder of the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    period: SimTime,
    start_delay: SimTime,
}

impl Clock {
    pub fn new(period: SimTime) -> SimResult<Self> {
        if period.as_ps() < 2 {
            return Err(SimulationError::InvalidClockPeriod(period));
        }
        Ok(Self {
            period,
            start_delay: SimTime::ZERO,
        })
    }

    pub fn from_hz(hz: u64) -> SimResult<Self> {
        let period = SimTime::period_of_hz(hz).ok_or(SimulationError::InvalidFrequency)?;
        Self::new(period)
    }

    pub fn with_start_delay(mut self, delay: SimTime) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn period(&self) -> SimTime {
        self.period
    }

    pub fn start_delay(&self) -> SimTime {
        self.start_delay
    }

    pub fn high_time(&self) -> SimTime {
        SimTime::from_ps(self.period.as_ps() / 2)
    }

    pub fn low_time(&self) -> SimTime {
        self.period - self.high_time()
    }

    /// Toggles a line the caller keeps owning. The line stays borrowed until
    /// the returned handle is stopped or dropped.
    pub fn drive<'a>(&self, line: &'a mut SignalDriver) -> ClockHandle<'a> {
        let sim = line.sim().clone();
        let name = format!("clock:{}", line.reader().name());
        let task = sim.spawn(&name, toggle(*self, line.alias()));
        ClockHandle {
            task,
            _line: PhantomData,
        }
    }

    /// Hands the line over to a generator that runs until cancelled.
    pub fn spawn(&self, line: SignalDriver) -> TaskHandle {
        let sim = line.sim().clone();
        let name = format!("clock:{}", line.reader().name());
        sim.spawn(&name, toggle(*self, line))
    }
}

async fn toggle(clock: Clock, mut line: SignalDriver) {
    let sim = line.sim().clone();
    if !clock.start_delay.is_zero() {
        sim.timer(clock.start_delay).await;
    }
    loop {
        line.set(DigitalLevel::High);
        sim.timer(clock.high_time()).await;
        line.set(DigitalLevel::Low);
        sim.timer(clock.low_time()).await;
    }
}

/// Running generator on a borrowed line. Stopping (or dropping) cancels the
/// task synchronously and leaves the line at its last level.
#[must_use = "dropping a ClockHandle stops the clock"]
pub struct ClockHandle<'a> {
    task: TaskHandle,
    _line: PhantomData<&'a mut SignalDriver>,
}

impl ClockHandle<'_> {
    pub fn stop(self) {}
}

impl Drop for ClockHandle<'_> {
    fn drop(&mut self) {
        self.task.cancel();
    }
}
