//! Harness configuration loaded from TOML.
//!
//! Values here are only defaults for the front end: they are rendered back to text and
//! go through the same validation as anything typed at the console.

use std::{env, fs, path::Path};

use log::info;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::settings::values::{PidSettingsInput, PlotSettingsInput, SignalSettingsInput};
use crate::utils::series::DEFAULT_BUFFER_CAPACITY;

pub const CONFIG_ENV_VAR: &str = "PID_HARNESS_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "harness.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub plot: PlotConfig,
    pub signal: SignalConfig,
    pub pid: PidConfig,
    pub buffer: BufferConfig,
    pub functions: FunctionsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub domain_length: u64,
    pub range_maximum: f64,
    pub range_minimum: f64,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self { domain_length: 20_000, range_maximum: 2.0, range_minimum: -2.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub calculation_skip: u64,
    pub sample_time_ms: u64,
    pub offset: f64,
    pub factor: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self { calculation_skip: 0, sample_time_ms: 100, offset: 0.0, factor: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub proportional_gain: f64,
    pub integral_gain: f64,
    pub derivative_gain: f64,
    pub filter_coefficient: f64,
    pub proportional_on_measurement: bool,
    pub inverse: bool,
    pub output_maximum: f64,
    pub output_minimum: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            proportional_gain: 1.0,
            integral_gain: 0.0,
            derivative_gain: 0.0,
            filter_coefficient: 0.0,
            proportional_on_measurement: false,
            inverse: false,
            output_maximum: 1.0,
            output_minimum: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_BUFFER_CAPACITY }
    }
}

/// Catalog names bound when a session starts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FunctionsConfig {
    pub generator: String,
    pub feedback: String,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self { generator: "sine".to_string(), feedback: "direct".to_string() }
    }
}

impl HarnessConfig {
    /// `$PID_HARNESS_CONFIG`, else `./harness.toml` if present, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }
        info!("[Config] no config file, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        info!("[Config] loaded {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn plot_input(&self) -> PlotSettingsInput {
        PlotSettingsInput {
            domain_length: self.plot.domain_length.to_string(),
            range_maximum: self.plot.range_maximum.to_string(),
            range_minimum: self.plot.range_minimum.to_string(),
        }
    }

    pub fn pid_input(&self) -> PidSettingsInput {
        let p = &self.pid;
        PidSettingsInput {
            proportional_gain: p.proportional_gain.to_string(),
            integral_gain: p.integral_gain.to_string(),
            derivative_gain: p.derivative_gain.to_string(),
            filter_coefficient: p.filter_coefficient.to_string(),
            proportional_on_measurement: p.proportional_on_measurement,
            inverse: p.inverse,
            output_maximum: p.output_maximum.to_string(),
            output_minimum: p.output_minimum.to_string(),
        }
    }

    pub fn signal_input(&self) -> SignalSettingsInput {
        SignalSettingsInput {
            calculation_skip: self.signal.calculation_skip.to_string(),
            sample_time: self.signal.sample_time_ms.to_string(),
            offset: self.signal.offset.to_string(),
            factor: self.signal.factor.to_string(),
        }
    }
}
