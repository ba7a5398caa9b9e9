// hearth: thermal regulation core for multi-heater machine controllers
//
// Keeps independently configured heating elements (extruder, bed, chamber)
// at operator-requested temperatures with closed-loop control, and enforces
// the safety interlocks between heaters and their cooling hardware. Sensor
// drivers, pin-level actuation, the command console, and the MCU wire
// protocol are external collaborators behind narrow traits.

pub mod config;
pub mod error;
pub mod hardware;
pub mod time;

pub use config::{
    ChamberConfig, Config, ControlConfig, HeaterConfig, HeaterKind, HysteresisConfig, PidConfig,
    load_config,
};
pub use error::{ConfigError, InterlockError};
pub use hardware::control::{
    BedHeatingStatus, BedStateHandle, Control, ControlContext, GainSet, Hysteresis, Pid,
};
pub use hardware::{
    ChamberWatchdog, FanFeedback, Heater, HeaterOutput, HeaterRegistry, HeaterStatus,
    RegistryStatus, ShutoffAction, TemperatureReporter,
};
pub use time::{TimeInterface, TokioTime};
