// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use spiprobe_core::{DigitalLevel, SignalId, SignalInfo, SimTime, SimulationObserver};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use vcd::{IdCode, TimescaleUnit, Value, Writer};

/// Dumps every line of a session to a VCD file with 1ps resolution.
///
/// The header is written when the run starts, since that is the first
/// point at which all lines are known.
pub struct VcdObserver {
    path: PathBuf,
    state: Mutex<VcdState>,
}

struct VcdState {
    writer: Option<Writer<BufWriter<File>>>,
    ids: Vec<IdCode>,
    current_time: Option<u64>,
}

impl VcdObserver {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(VcdState {
                writer: Some(Writer::new(BufWriter::new(file))),
                ids: Vec::new(),
                current_time: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn scalar(level: DigitalLevel) -> Value {
    match level {
        DigitalLevel::High => Value::V1,
        DigitalLevel::Low => Value::V0,
    }
}

fn write_header(
    writer: &mut Writer<BufWriter<File>>,
    signals: &[SignalInfo],
) -> std::io::Result<Vec<IdCode>> {
    writer.timescale(1, TimescaleUnit::PS)?;
    writer.add_module("bench")?;
    let mut ids = Vec::with_capacity(signals.len());
    for info in signals {
        ids.push(writer.add_wire(1, &info.name)?);
    }
    writer.upscope()?;
    writer.enddefinitions()?;

    writer.timestamp(0)?;
    for (info, id) in signals.iter().zip(&ids) {
        writer.change_scalar(*id, scalar(info.level))?;
    }
    Ok(ids)
}

impl core::fmt::Debug for VcdObserver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VcdObserver({:?})", self.path)
    }
}

impl SimulationObserver for VcdObserver {
    fn on_simulation_start(&self, signals: &[SignalInfo]) {
        if let Ok(mut state) = self.state.lock() {
            let Some(writer) = state.writer.as_mut() else {
                return;
            };
            match write_header(writer, signals) {
                Ok(ids) => {
                    state.ids = ids;
                    state.current_time = Some(0);
                }
                Err(e) => {
                    tracing::error!("Failed to write VCD header to {:?}: {}", self.path, e);
                    state.writer = None;
                }
            }
        }
    }

    fn on_signal_change(&self, time: SimTime, signal: SignalId, level: DigitalLevel) {
        if let Ok(mut state) = self.state.lock() {
            let Some(&id) = state.ids.get(signal.index()) else {
                return;
            };
            let now = time.as_ps();
            let advance = state.current_time != Some(now);
            state.current_time = Some(now);
            if let Some(writer) = state.writer.as_mut() {
                if advance {
                    let _ = writer.timestamp(now);
                }
                let _ = writer.change_scalar(id, scalar(level));
            }
        }
    }

    fn on_simulation_stop(&self, time: SimTime) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(mut writer) = state.writer.take() {
                if state.current_time != Some(time.as_ps()) {
                    let _ = writer.timestamp(time.as_ps());
                }
                // Dropping the writer flushes the buffered file.
                drop(writer);
            }
        }
    }
}
