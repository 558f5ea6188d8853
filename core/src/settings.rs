//! Declarative registry configuration
//!
//! Settings are plain TOML. `[defaults]` adjusts [`Config::default`] for every
//! breaker; each `[instances.<name>]` table adjusts one name on top of that.
//! Fields left out keep the value from the layer below.
//!
//! ```toml
//! [defaults]
//! failure_rate_threshold = 50.0
//! timeout_ms = 4000
//!
//! [instances.slow]
//! timeout_ms = 2000
//! ```
//!
//! Durations are in milliseconds and must not be negative.

use crate::{circuit::Config, errors::ConfigError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Registry-wide settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySettings {
    #[serde(default)]
    pub defaults: ConfigOverride,
    #[serde(default)]
    pub instances: HashMap<String, ConfigOverride>,
}

impl RegistrySettings {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// Partial configuration; `None` keeps the underlying value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverride {
    pub failure_rate_threshold: Option<f64>,
    pub minimum_calls: Option<usize>,
    pub sliding_window_size: Option<usize>,
    pub open_duration_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub half_open_permitted_calls: Option<usize>,
    pub jitter_factor: Option<f64>,
}

impl ConfigOverride {
    /// Overlay the fields that are set onto `base`
    pub fn apply(&self, base: Config) -> Config {
        Config {
            failure_rate_threshold: self
                .failure_rate_threshold
                .unwrap_or(base.failure_rate_threshold),
            minimum_calls: self.minimum_calls.unwrap_or(base.minimum_calls),
            sliding_window_size: self.sliding_window_size.unwrap_or(base.sliding_window_size),
            open_duration: self
                .open_duration_ms
                .map_or(base.open_duration, Duration::from_millis),
            timeout: self.timeout_ms.map_or(base.timeout, Duration::from_millis),
            half_open_permitted_calls: self
                .half_open_permitted_calls
                .unwrap_or(base.half_open_permitted_calls),
            jitter_factor: self.jitter_factor.unwrap_or(base.jitter_factor),
        }
    }
}
