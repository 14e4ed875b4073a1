//! Simulation configuration from environment and JSON files.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uav_core::{ConfigError, DeconflictionConfig, SimulationConfig};

pub const ENV_TIME_STEP: &str = "UAV_SIM_TIME_STEP";
pub const ENV_SAFETY_MARGIN: &str = "UAV_SIM_SAFETY_MARGIN";
pub const ENV_SEPARATION: &str = "UAV_SIM_SEPARATION";
pub const ENV_HORIZON: &str = "UAV_SIM_HORIZON";
pub const ENV_SEED: &str = "UAV_SIM_SEED";
pub const ENV_EXPORT: &str = "UAV_SIM_EXPORT";

/// Seed used when none is configured, so runs are reproducible by default.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub deconfliction: DeconflictionConfig,
    /// Seed for weather randomness and random scenarios
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Where to write results after a run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
}

impl Config {
    /// Defaults overlaid with `UAV_SIM_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay `UAV_SIM_*` environment variables on this configuration.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Overlay values from any key lookup. Unparsable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parsed(&lookup, ENV_TIME_STEP) {
            self.simulation.time_step = v;
        }
        if let Some(v) = parsed(&lookup, ENV_SEPARATION) {
            self.simulation.default_separation = v;
        }
        if let Some(v) = parsed(&lookup, ENV_HORIZON) {
            self.simulation.conflict_detection_horizon = v;
        }
        if let Some(v) = parsed(&lookup, ENV_SAFETY_MARGIN) {
            self.deconfliction.safety_margin_multiplier = v;
        }
        if let Some(v) = parsed(&lookup, ENV_SEED) {
            self.seed = Some(v);
        }
        if let Some(path) = lookup(ENV_EXPORT).filter(|s| !s.is_empty()) {
            self.export_path = Some(PathBuf::from(path));
        }
        self
    }

    /// Read `{ "simulation": {...}, "deconfliction": {...} }`. Missing
    /// fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SimError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SimError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| SimError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulation.validate()?;
        self.deconfliction.validate()
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}
