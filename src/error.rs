//! Error taxonomy for the thermal core.
//!
//! `ConfigError` covers everything raised before any state mutation:
//! out-of-range targets, unknown names at lookup time, and configuration
//! file problems. `InterlockError` is the safety-trip side: it pre-empts
//! heating and is never retried automatically.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("heater {name}: requested temperature {requested:.1} out of range ({min:.1}:{max:.1})")]
    TargetOutOfRange {
        name: String,
        requested: f64,
        min: f64,
        max: f64,
    },
    #[error("unknown heater '{0}'")]
    UnknownHeater(String),
    #[error("unknown sensor '{0}'")]
    UnknownSensor(String),
    #[error("heater '{0}' already registered")]
    DuplicateHeater(String),
    #[error("sensor id '{0}' already registered")]
    DuplicateSensor(String),
    #[error("temperature wait on '{0}': missing minimum or maximum bound")]
    MissingWaitBounds(String),
    #[error("heater {heater}: invalid {field} ({value})")]
    InvalidSetting {
        heater: String,
        field: &'static str,
        value: f64,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum InterlockError {
    #[error(
        "{heater}: cooling fan stalled while heating (last fan speed {fan_speed:.1}), heater disabled"
    )]
    FanStalled { heater: String, fan_speed: f64 },
}
