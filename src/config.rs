//! Pipeline tuning loaded from `{data_path}/pulse.toml`.
//!
//! ```toml
//! [backfill]
//! batch_size = 50
//! max_parallel_batches = 4
//! deadline_secs = 600
//!
//! [search]
//! top_k = 100
//!
//! [ingest]
//! excluded_questions = ["Email address"]
//! ```
//!
//! `PULSE_BATCH_SIZE`, `PULSE_MAX_PARALLEL_BATCHES` and `PULSE_TOP_K` override
//! the file.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embedding::BackfillConfig;
use crate::services::search::DEFAULT_TOP_K;
use crate::PulseError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub backfill: BackfillSettings,
    pub search: SearchSettings,
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillSettings {
    pub batch_size: usize,
    pub max_parallel_batches: usize,
    /// Overall time budget for one run, in seconds.
    pub deadline_secs: Option<u64>,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        let defaults = BackfillConfig::default();
        Self {
            batch_size: defaults.batch_size,
            max_parallel_batches: defaults.max_parallel_batches,
            deadline_secs: None,
        }
    }
}

impl BackfillSettings {
    pub fn to_backfill_config(&self) -> BackfillConfig {
        BackfillConfig {
            batch_size: self.batch_size,
            max_parallel_batches: self.max_parallel_batches,
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub top_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Question names left out when flattening responses.
    pub excluded_questions: BTreeSet<String>,
}

impl PulseConfig {
    /// Parse a config file, failing on unreadable or invalid content.
    pub fn from_file(path: &Path) -> Result<Self, PulseError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PulseError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&contents)
            .map_err(|e| PulseError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Apply `PULSE_*` overrides looked up through `var`.
    ///
    /// Values that do not parse as positive integers are ignored with a warning.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| -> Option<usize> {
            let raw = var(name)?;
            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => Some(value),
                _ => {
                    tracing::warn!("Ignoring {}={:?}: expected a positive integer", name, raw);
                    None
                }
            }
        };

        if let Some(value) = read("PULSE_BATCH_SIZE") {
            self.backfill.batch_size = value;
        }
        if let Some(value) = read("PULSE_MAX_PARALLEL_BATCHES") {
            self.backfill.max_parallel_batches = value;
        }
        if let Some(value) = read("PULSE_TOP_K") {
            self.search.top_k = value;
        }
    }

    pub fn validate(&self) -> Result<(), PulseError> {
        self.backfill.to_backfill_config().validate()
    }
}

/// Load pipeline config with priority:
/// 1. `PULSE_*` env overrides
/// 2. `{data_path}/pulse.toml` file
/// 3. Defaults
///
/// A broken file is logged and replaced by defaults.
pub fn load_pulse_config(data_path: &Path) -> PulseConfig {
    let config_path = data_path.join("pulse.toml");
    let mut config = if config_path.exists() {
        match PulseConfig::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded pipeline config from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("{}. Using default.", e);
                PulseConfig::default()
            }
        }
    } else {
        PulseConfig::default()
    };

    config.apply_env_overrides(|name| std::env::var(name).ok());
    config
}
