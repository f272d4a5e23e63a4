// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test-wide configuration
//!
//! Loaded from TOML. Durations use humantime notation (`"250ms"`, `"15m"`).

use crate::event::ParameterMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Event bus tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of dispatch worker threads
    pub workers: usize,
    /// Clock ticks per second; 0 disables the clock
    pub clock_frequency: f64,
    /// Handlers running longer than this are reported
    #[serde(with = "humantime_serde")]
    pub slow_handler: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            clock_frequency: 1.0,
            slow_handler: Duration::from_millis(250),
        }
    }
}

impl BusConfig {
    /// Interval between ticks, if the clock is enabled
    pub fn tick_period(&self) -> Option<Duration> {
        if self.clock_frequency > 0.0 && self.clock_frequency.is_finite() {
            Some(Duration::from_secs_f64(1.0 / self.clock_frequency))
        } else {
            None
        }
    }
}

/// A test parameter and its initial value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default = "default_parameter_value")]
    pub default: Value,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
}

fn default_parameter_value() -> Value {
    serde_json::json!(0.0)
}

/// A metric collected per axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    /// Names of the summarizers applied to this metric
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub summarize: Vec<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
}

/// An indicator reducing all axes to one number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub name: String,
    /// Indicator implementation, e.g. `"NormalizedMeanMetricIndicator"`
    pub class: String,
    /// `metric.summarizer` pair to read from each axis
    pub metric: String,
    /// Expression over the axis parameters to divide by
    #[serde(default)]
    pub normalize_to: Option<String>,
}

/// Configuration shared by every component of a test session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// How many times the whole policy set is run
    pub runs: u32,
    /// A policy without a state transition for this long is stalled
    #[serde(with = "humantime_serde")]
    pub stale_timeout: Duration,
    pub bus: BusConfig,
    #[serde(rename = "parameter")]
    pub parameters: Vec<ParameterSpec>,
    #[serde(rename = "metric")]
    pub metrics: Vec<MetricSpec>,
    #[serde(rename = "indicator")]
    pub indicators: Vec<IndicatorSpec>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            runs: 1,
            stale_timeout: Duration::from_secs(15 * 60),
            bus: BusConfig::default(),
            parameters: Vec::new(),
            metrics: Vec::new(),
            indicators: Vec::new(),
        }
    }
}

impl GeneralConfig {
    /// Parse and validate configuration from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GeneralConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.workers == 0 {
            return Err(ConfigError::Invalid("bus.workers must be at least 1".to_string()));
        }
        if self.bus.clock_frequency.is_nan() || self.bus.clock_frequency < 0.0 {
            return Err(ConfigError::Invalid(
                "bus.clock_frequency must be zero or positive".to_string(),
            ));
        }
        check_unique("parameter", self.parameters.iter().map(|p| p.name.as_str()))?;
        check_unique("metric", self.metrics.iter().map(|m| m.name.as_str()))?;
        check_unique("indicator", self.indicators.iter().map(|i| i.name.as_str()))?;
        Ok(())
    }

    /// The parameter vector before any change is applied
    pub fn defaults(&self) -> ParameterMap {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect()
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(ConfigError::Invalid(format!("{} with an empty name", kind)));
        }
        if !seen.insert(name) {
            return Err(ConfigError::Invalid(format!("duplicate {} '{}'", kind, name)));
        }
    }
    Ok(())
}

fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrVec;

    impl<'de> de::Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a summarizer name or array of names")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_owned()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut names = Vec::new();
            while let Some(name) = seq.next_element()? {
                names.push(name);
            }
            Ok(names)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
