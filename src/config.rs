//! # Heater Configuration
//!
//! Configuration structs for heaters and their control algorithms.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [heaters.extruder]
//! kind = "extruder"
//! heater_pin = "PA3"
//! sensor_type = "EPCOS 100K B57560G104F"
//! sensor_pin = "PA4"
//! sensor_id = "T0"
//! min_temp = 0.0
//! max_temp = 300.0
//!
//! [heaters.extruder.control]
//! algorithm = "pid"
//! pid_kp = 21.7
//! pid_ki = 1.2
//! pid_kd = 98.1
//!
//! [heaters.chamber_heater]
//! kind = "chamber"
//! heater_pin = "PB1"
//! sensor_type = "NTC 100K MGB18-104F39050L32"
//! sensor_pin = "PB2"
//! max_temp = 70.0
//!
//! [heaters.chamber_heater.control]
//! algorithm = "hysteresis"
//! max_delta = 2.0
//! ```
//!
//! Every tuning constant of the control algorithms is a defaulted field, so a
//! minimal config only names pins and limits; the shaping numbers can be
//! overridden per heater when a machine needs different behavior.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;

/// Gains in the configuration are expressed on the conventional 0-255 scale
/// and divided down before use.
pub const PID_PARAM_BASE: f64 = 255.0;

/// Top-level configuration: a named heater section per heating element.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub heaters: HashMap<String, HeaterConfig>,
}

/// Load a TOML configuration file from disk.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

/// What role a heater plays in the machine. The role selects control-strategy
/// wrapping (bed status publication, chamber power shaping) and which wait
/// flag a blocking temperature wait raises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaterKind {
    Extruder,
    Bed,
    Chamber,
    #[default]
    Generic,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaterConfig {
    #[serde(default)]
    pub kind: HeaterKind,
    #[serde(default)]
    pub heater_pin: String,
    #[serde(default)]
    pub sensor_type: String,
    #[serde(default)]
    pub sensor_pin: String,
    /// Reporting id used in console temperature echoes (e.g. "T0", "B").
    /// Heaters without an id are controlled but not echoed.
    #[serde(default)]
    pub sensor_id: Option<String>,
    #[serde(default = "default_min_temp")]
    pub min_temp: f64,
    #[serde(default = "default_max_temp")]
    pub max_temp: f64,
    #[serde(default = "default_min_extrude_temp")]
    pub min_extrude_temp: f64,
    #[serde(default = "default_max_power")]
    pub max_power: f64,
    /// Time constant of the exponential smoothing filter, seconds.
    #[serde(default = "default_smooth_time")]
    pub smooth_time: f64,
    /// Native report cadence of the bound sensor, seconds.
    #[serde(default = "default_report_interval")]
    pub report_interval: f64,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub chamber: ChamberConfig,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            kind: HeaterKind::Generic,
            heater_pin: String::new(),
            sensor_type: String::new(),
            sensor_pin: String::new(),
            sensor_id: None,
            min_temp: default_min_temp(),
            max_temp: default_max_temp(),
            min_extrude_temp: default_min_extrude_temp(),
            max_power: default_max_power(),
            smooth_time: default_smooth_time(),
            report_interval: default_report_interval(),
            control: ControlConfig::default(),
            chamber: ChamberConfig::default(),
        }
    }
}

impl HeaterConfig {
    /// Reject settings that would make the control loop meaningless before
    /// any heater state is built from them.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let bad = |field: &'static str, value: f64| ConfigError::InvalidSetting {
            heater: name.to_string(),
            field,
            value,
        };
        if !(self.max_power > 0.0 && self.max_power <= 1.0) {
            return Err(bad("max_power", self.max_power));
        }
        if self.smooth_time <= 0.0 {
            return Err(bad("smooth_time", self.smooth_time));
        }
        if self.report_interval <= 0.0 {
            return Err(bad("report_interval", self.report_interval));
        }
        if self.max_temp < self.min_temp {
            return Err(bad("max_temp", self.max_temp));
        }
        if let ControlConfig::Pid(pid) = &self.control {
            if pid.pid_ki < 0.0 {
                return Err(bad("pid_ki", pid.pid_ki));
            }
        }
        Ok(())
    }
}

/// Control algorithm selection, tagged by `algorithm` in TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ControlConfig {
    Hysteresis(HysteresisConfig),
    Pid(PidConfig),
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig::Hysteresis(HysteresisConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HysteresisConfig {
    /// Half-width of the plain hysteresis band used outside the tuned
    /// target range.
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,
    #[serde(flatten)]
    pub tuning: HysteresisTuning,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            max_delta: default_max_delta(),
            tuning: HysteresisTuning::default(),
        }
    }
}

/// Shaping constants for the threshold-hysteresis algorithm. The thresholds
/// that enter and leave the heating state are linear functions of the target
/// within `band_min..=band_max`; separate coefficient pairs apply during a
/// long warm-up (deep recovery) and during steady hold, which keeps the band
/// wide while a cold mass is absorbing heat and narrow once it has settled.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HysteresisTuning {
    #[serde(default = "default_band_min")]
    pub band_min: f64,
    #[serde(default = "default_band_max")]
    pub band_max: f64,
    /// Degrees below target that enter deep recovery.
    #[serde(default = "default_recovery_enter_delta")]
    pub recovery_enter_delta: f64,
    /// Degrees from target that leave deep recovery.
    #[serde(default = "default_recovery_exit_delta")]
    pub recovery_exit_delta: f64,
    /// Consecutive falling samples that abandon deep recovery.
    #[serde(default = "default_recovery_stall_samples")]
    pub recovery_stall_samples: u32,
    #[serde(default = "default_warmup_on_base")]
    pub warmup_on_base: f64,
    #[serde(default = "default_warmup_on_slope")]
    pub warmup_on_slope: f64,
    #[serde(default = "default_warmup_off_base")]
    pub warmup_off_base: f64,
    #[serde(default = "default_warmup_off_slope")]
    pub warmup_off_slope: f64,
    #[serde(default = "default_steady_on_base")]
    pub steady_on_base: f64,
    #[serde(default = "default_steady_on_slope")]
    pub steady_on_slope: f64,
    #[serde(default = "default_steady_off_base")]
    pub steady_off_base: f64,
    #[serde(default = "default_steady_off_slope")]
    pub steady_off_slope: f64,
    /// Power-coefficient decay applied per overshoot band, largest band
    /// first. An off-cycle peak more than `overshoot` above target scales
    /// the coefficient by `scale` on the next heating cycle.
    #[serde(default = "default_decay_bands")]
    pub decay_bands: Vec<DecayBand>,
    /// Coefficient growth applied when the previous off-cycle peak stayed
    /// below target.
    #[serde(default = "default_undershoot_gain")]
    pub undershoot_gain: f64,
    /// Lower clamp of the power coefficient.
    #[serde(default = "default_power_floor")]
    pub power_floor: f64,
    /// Degrees of trailing error that reset the coefficient to full power.
    #[serde(default = "default_reset_lead")]
    pub reset_lead: f64,
}

impl Default for HysteresisTuning {
    fn default() -> Self {
        Self {
            band_min: default_band_min(),
            band_max: default_band_max(),
            recovery_enter_delta: default_recovery_enter_delta(),
            recovery_exit_delta: default_recovery_exit_delta(),
            recovery_stall_samples: default_recovery_stall_samples(),
            warmup_on_base: default_warmup_on_base(),
            warmup_on_slope: default_warmup_on_slope(),
            warmup_off_base: default_warmup_off_base(),
            warmup_off_slope: default_warmup_off_slope(),
            steady_on_base: default_steady_on_base(),
            steady_on_slope: default_steady_on_slope(),
            steady_off_base: default_steady_off_base(),
            steady_off_slope: default_steady_off_slope(),
            decay_bands: default_decay_bands(),
            undershoot_gain: default_undershoot_gain(),
            power_floor: default_power_floor(),
            reset_lead: default_reset_lead(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DecayBand {
    pub overshoot: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PidConfig {
    pub pid_kp: f64,
    pub pid_ki: f64,
    pub pid_kd: f64,
    /// Alternate gain set used when the target exceeds `high_temp_value`.
    /// Unset fields fall back to the base gains.
    #[serde(default)]
    pub pid_kp_high_temp: Option<f64>,
    #[serde(default)]
    pub pid_ki_high_temp: Option<f64>,
    #[serde(default)]
    pub pid_kd_high_temp: Option<f64>,
    #[serde(default = "default_high_temp_value")]
    pub high_temp_value: f64,
    #[serde(default = "default_settle_delta")]
    pub settle_delta: f64,
    #[serde(default = "default_settle_slope")]
    pub settle_slope: f64,
}

/// Chamber-specific shaping and interlock settings. Ignored for other kinds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChamberConfig {
    /// Fan polled by the 1 Hz watchdog.
    #[serde(default = "default_paired_fan")]
    pub paired_fan: String,
    /// Samples of a heating session that run at reduced power.
    #[serde(default = "default_soft_start_samples")]
    pub soft_start_samples: u32,
    /// Power fraction (of max_power) held during soft start.
    #[serde(default = "default_soft_start_power")]
    pub soft_start_power: f64,
    /// A new target above this re-arms a tripped interlock.
    #[serde(default = "default_rearm_threshold")]
    pub rearm_threshold: f64,
    /// Consecutive failing 1 Hz checks before the watchdog trips.
    #[serde(default = "default_fan_fault_checks")]
    pub fan_fault_checks: u32,
}

impl Default for ChamberConfig {
    fn default() -> Self {
        Self {
            paired_fan: default_paired_fan(),
            soft_start_samples: default_soft_start_samples(),
            soft_start_power: default_soft_start_power(),
            rearm_threshold: default_rearm_threshold(),
            fan_fault_checks: default_fan_fault_checks(),
        }
    }
}

fn default_min_temp() -> f64 {
    0.0
}
fn default_max_temp() -> f64 {
    250.0
}
fn default_min_extrude_temp() -> f64 {
    170.0
}
fn default_max_power() -> f64 {
    1.0
}
fn default_smooth_time() -> f64 {
    1.0
}
fn default_report_interval() -> f64 {
    0.3
}
fn default_max_delta() -> f64 {
    2.0
}
fn default_band_min() -> f64 {
    20.0
}
fn default_band_max() -> f64 {
    120.0
}
fn default_recovery_enter_delta() -> f64 {
    5.0
}
fn default_recovery_exit_delta() -> f64 {
    0.7
}
fn default_recovery_stall_samples() -> u32 {
    10
}
fn default_warmup_on_base() -> f64 {
    16.1
}
fn default_warmup_on_slope() -> f64 {
    1.029
}
fn default_warmup_off_base() -> f64 {
    16.3
}
fn default_warmup_off_slope() -> f64 {
    1.032
}
fn default_steady_on_base() -> f64 {
    19.1
}
fn default_steady_on_slope() -> f64 {
    1.006
}
fn default_steady_off_base() -> f64 {
    19.3
}
fn default_steady_off_slope() -> f64 {
    1.009
}
fn default_decay_bands() -> Vec<DecayBand> {
    vec![
        DecayBand {
            overshoot: 3.0,
            scale: 0.3,
        },
        DecayBand {
            overshoot: 2.0,
            scale: 0.5,
        },
        DecayBand {
            overshoot: 1.5,
            scale: 0.65,
        },
        DecayBand {
            overshoot: 1.0,
            scale: 0.8,
        },
    ]
}
fn default_undershoot_gain() -> f64 {
    1.5
}
fn default_power_floor() -> f64 {
    0.3
}
fn default_reset_lead() -> f64 {
    1.5
}
fn default_high_temp_value() -> f64 {
    280.0
}
fn default_settle_delta() -> f64 {
    2.0
}
fn default_settle_slope() -> f64 {
    0.5
}
fn default_paired_fan() -> String {
    "fan0".to_string()
}
fn default_soft_start_samples() -> u32 {
    200
}
fn default_soft_start_power() -> f64 {
    0.5
}
fn default_rearm_threshold() -> f64 {
    40.0
}
fn default_fan_fault_checks() -> u32 {
    15
}
