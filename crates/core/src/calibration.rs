// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{SimResult, SimulationError};
use spiprobe_config::CalibrationConfig;

/// Linear ADC-code to temperature-word conversion:
/// `(offset + slope * (code - base_code)) / divisor`, truncating toward zero
/// and clamped to the 16-bit frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Calibration {
    offset: i64,
    slope: i64,
    base_code: i64,
    divisor: i64,
}

impl Default for Calibration {
    fn default() -> Self {
        let config = CalibrationConfig::default();
        Self {
            offset: config.offset,
            slope: config.slope,
            base_code: config.base_code,
            divisor: config.divisor,
        }
    }
}

impl Calibration {
    pub fn new(offset: i64, slope: i64, base_code: i64, divisor: i64) -> SimResult<Self> {
        if divisor == 0 {
            return Err(SimulationError::InvalidCalibration);
        }
        Ok(Self {
            offset,
            slope,
            base_code,
            divisor,
        })
    }

    pub fn encode(&self, code: u16) -> u16 {
        let delta = i64::from(code).saturating_sub(self.base_code);
        let scaled = self.offset.saturating_add(self.slope.saturating_mul(delta));
        let value = scaled / self.divisor;
        value.clamp(0, i64::from(u16::MAX)) as u16
    }
}

impl TryFrom<&CalibrationConfig> for Calibration {
    type Error = SimulationError;

    fn try_from(config: &CalibrationConfig) -> SimResult<Self> {
        Self::new(
            config.offset,
            config.slope,
            config.base_code,
            config.divisor,
        )
    }
}
