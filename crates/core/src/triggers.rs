// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::kernel::Sim;
use crate::signals::{Edge, SignalId, SignalReader};
use crate::time::SimTime;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A wakeup source a task can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Edge { signal: SignalId, edge: Edge },
    /// Fires once the given duration has elapsed from registration.
    Timer(SimTime),
}

/// Future returned by [`Sim::first_of`] and [`Sim::timer`].
///
/// Resolves to the index of the trigger that fired. Triggers are registered
/// with the kernel on first poll, in slice order.
#[must_use = "futures do nothing unless awaited"]
pub struct Wait {
    sim: Sim,
    triggers: Vec<Trigger>,
    epoch: Option<u64>,
}

impl Wait {
    pub(crate) fn new(sim: Sim, triggers: Vec<Trigger>) -> Self {
        debug_assert!(!triggers.is_empty(), "a wait needs at least one trigger");
        Self {
            sim,
            triggers,
            epoch: None,
        }
    }
}

impl Future for Wait {
    type Output = usize;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<usize> {
        let this = self.get_mut();
        match this.epoch {
            None => {
                this.epoch = Some(this.sim.register_wait(&this.triggers));
                Poll::Pending
            }
            Some(epoch) => match this.sim.take_fired(epoch) {
                Some(index) => Poll::Ready(index),
                None => Poll::Pending,
            },
        }
    }
}

/// Waits for `cycles` rising edges of `clock`.
pub async fn clock_cycles(clock: &SignalReader, cycles: u32) {
    for _ in 0..cycles {
        clock.rising_edge().await;
    }
}
