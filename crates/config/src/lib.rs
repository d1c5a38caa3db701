// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

/// Unit attached to a duration in a bench file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Ps,
    #[default]
    Ns,
    Us,
    Ms,
    S,
}

impl TimeUnit {
    /// Number of picoseconds in one unit.
    pub fn picoseconds(self) -> u64 {
        match self {
            TimeUnit::Ps => 1,
            TimeUnit::Ns => 1_000,
            TimeUnit::Us => 1_000_000,
            TimeUnit::Ms => 1_000_000_000,
            TimeUnit::S => 1_000_000_000_000,
        }
    }
}

/// A duration written as `{ value: 100, unit: ns }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub value: u64,
    #[serde(default)]
    pub unit: TimeUnit,
}

impl Duration {
    pub const fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// Exact length in picoseconds, saturating on overflow.
    pub fn as_picoseconds(&self) -> u64 {
        self.value.saturating_mul(self.unit.picoseconds())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceClockConfig {
    pub period: Duration,
}

impl Default for ReferenceClockConfig {
    fn default() -> Self {
        Self {
            period: Duration::new(100, TimeUnit::Ns),
        }
    }
}

fn default_conversion_interval() -> u32 {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Reference cycles the device idles between two ADC acquisitions.
    #[serde(default = "default_conversion_interval")]
    pub conversion_interval_cycles: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            conversion_interval_cycles: default_conversion_interval(),
        }
    }
}

fn default_frequency_hz() -> u64 {
    1_000_000
}

fn default_bit_count() -> u32 {
    16
}

fn default_divider() -> u32 {
    4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterConfig {
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u64,
    #[serde(default = "default_bit_count")]
    pub bit_count: u32,
    /// Select-to-first-clock lead time. Defaults to one sampling period.
    #[serde(default)]
    pub lead: Option<Duration>,
    /// Reference-clock cycles per half bit in the divided read mode.
    #[serde(default = "default_divider")]
    pub divider: u32,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency_hz(),
            bit_count: default_bit_count(),
            lead: None,
            divider: default_divider(),
        }
    }
}

fn default_slave_code() -> u16 {
    0x0150
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlaveConfig {
    /// Fixed ADC code the responder returns on every frame.
    #[serde(default = "default_slave_code")]
    pub code: u16,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            code: default_slave_code(),
        }
    }
}

/// Linear transfer function `(offset + slope * (code - base_code)) / divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationConfig {
    pub offset: i64,
    pub slope: i64,
    pub base_code: i64,
    pub divisor: i64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            offset: 33536,
            slope: 127,
            base_code: 0x0100,
            divisor: 4,
        }
    }
}

fn default_iterations() -> u32 {
    100
}

fn default_seed() -> u64 {
    0x5EED_0150
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BenchLimits {
    /// Simulated time after which a scenario is abandoned.
    #[serde(default)]
    pub max_time: Option<Duration>,
}

fn default_reset_cycles() -> u32 {
    10
}

fn default_settle_cycles() -> u32 {
    40
}

fn default_inter_read_cycles() -> u32 {
    4
}

/// Top-level bench description, usually loaded from `configs/*.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub reference_clock: ReferenceClockConfig,
    #[serde(default = "default_reset_cycles")]
    pub reset_cycles: u32,
    #[serde(default = "default_settle_cycles")]
    pub settle_cycles: u32,
    /// Reference cycles between two reads so the device observes deselect.
    #[serde(default = "default_inter_read_cycles")]
    pub inter_read_cycles: u32,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub slave: SlaveConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub limits: BenchLimits,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            reference_clock: ReferenceClockConfig::default(),
            reset_cycles: default_reset_cycles(),
            settle_cycles: default_settle_cycles(),
            inter_read_cycles: default_inter_read_cycles(),
            device: DeviceConfig::default(),
            master: MasterConfig::default(),
            slave: SlaveConfig::default(),
            calibration: CalibrationConfig::default(),
            sweep: SweepConfig::default(),
            limits: BenchLimits::default(),
        }
    }
}

impl BenchConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bench config at {:?}", path.as_ref()))?;
        let config = Self::from_yaml(&contents)?;
        tracing::debug!("Loaded bench config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse Bench Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.reference_clock.period.as_picoseconds() < 2 {
            anyhow::bail!("Reference clock period must be at least 2ps");
        }

        if self.master.frequency_hz == 0 {
            anyhow::bail!("Master 'frequency_hz' must be greater than zero");
        }

        if !(1..=32).contains(&self.master.bit_count) {
            anyhow::bail!(
                "Master 'bit_count' must be within 1..=32, got {}",
                self.master.bit_count
            );
        }

        if self.master.divider == 0 {
            anyhow::bail!("Master 'divider' must be greater than zero");
        }

        if self.calibration.divisor == 0 {
            anyhow::bail!("Calibration 'divisor' must be non-zero");
        }

        if self.sweep.iterations == 0 {
            anyhow::bail!("Sweep 'iterations' must be greater than zero");
        }

        if self.device.conversion_interval_cycles == 0 {
            anyhow::bail!("Device 'conversion_interval_cycles' must be greater than zero");
        }

        if self.inter_read_cycles == 0 {
            anyhow::bail!("'inter_read_cycles' must be greater than zero");
        }

        if let Some(max_time) = self.limits.max_time {
            if max_time.as_picoseconds() == 0 {
                anyhow::bail!("Limit 'max_time' must be greater than zero");
            }
        }

        Ok(())
    }
}
