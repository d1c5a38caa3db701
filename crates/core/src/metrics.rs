// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::{DigitalLevel, SignalId};
use crate::time::SimTime;
use crate::{SignalInfo, SimulationObserver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counts transitions per line over a run.
#[derive(Debug, Default)]
pub struct SignalActivity {
    names: Mutex<HashMap<SignalId, String>>,
    transitions: Mutex<HashMap<SignalId, u64>>,
    total: AtomicU64,
    stopped_at: AtomicU64,
}

impl SignalActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::SeqCst);
        self.stopped_at.store(0, Ordering::SeqCst);
        if let Ok(mut m) = self.transitions.lock() {
            m.clear();
        }
    }

    pub fn total_transitions(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn transitions(&self, name: &str) -> u64 {
        let Some(id) = self.lookup(name) else {
            return 0;
        };
        self.transitions
            .lock()
            .ok()
            .and_then(|m| m.get(&id).copied())
            .unwrap_or(0)
    }

    /// Simulated time at which the last observed run stopped.
    pub fn stopped_at(&self) -> SimTime {
        SimTime::from_ps(self.stopped_at.load(Ordering::SeqCst))
    }

    /// Per-line counts sorted by line name.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let names = match self.names.lock() {
            Ok(m) => m.clone(),
            Err(_) => return Vec::new(),
        };
        let counts = match self.transitions.lock() {
            Ok(m) => m.clone(),
            Err(_) => return Vec::new(),
        };
        let mut out: Vec<(String, u64)> = names
            .into_iter()
            .map(|(id, name)| (name, counts.get(&id).copied().unwrap_or(0)))
            .collect();
        out.sort();
        out
    }

    fn lookup(&self, name: &str) -> Option<SignalId> {
        self.names
            .lock()
            .ok()?
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
    }
}

impl SimulationObserver for SignalActivity {
    fn on_simulation_start(&self, signals: &[SignalInfo]) {
        if let Ok(mut m) = self.names.lock() {
            for info in signals {
                m.insert(info.id, info.name.clone());
            }
        }
    }

    fn on_simulation_stop(&self, time: SimTime) {
        self.stopped_at.store(time.as_ps(), Ordering::SeqCst);
    }

    fn on_signal_change(&self, _time: SimTime, signal: SignalId, _level: DigitalLevel) {
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.transitions.lock() {
            *m.entry(signal).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Sim;
    use std::sync::Arc;

    #[test]
    fn test_counts_per_line() {
        let sim = Sim::new();
        let activity = Arc::new(SignalActivity::new());
        sim.add_observer(activity.clone());
        let mut a = sim.signal("a", DigitalLevel::Low);
        let mut b = sim.signal("b", DigitalLevel::Low);

        let inner = sim.clone();
        sim.run(async move {
            for _ in 0..3 {
                a.set(DigitalLevel::High);
                inner.timer(SimTime::from_ns(1)).await;
                a.set(DigitalLevel::Low);
            }
            b.set(DigitalLevel::High);
            b.set(DigitalLevel::High);
        })
        .unwrap();

        assert_eq!(activity.transitions("a"), 6);
        assert_eq!(activity.transitions("b"), 1);
        assert_eq!(activity.transitions("missing"), 0);
        assert_eq!(activity.total_transitions(), 7);
        assert_eq!(activity.stopped_at(), SimTime::from_ns(3));
        assert_eq!(
            activity.snapshot(),
            vec![("a".to_string(), 6), ("b".to_string(), 1)]
        );

        activity.reset();
        assert_eq!(activity.total_transitions(), 0);
    }
}
