// src/hardware/mod.rs - Heater hardware: collaborator seams and the thermal pipeline
pub mod control;
pub mod heater;
pub mod registry;
pub mod watchdog;

pub use heater::{Heater, HeaterStatus};
pub use registry::{HeaterRegistry, RegistryStatus};
pub use watchdog::ChamberWatchdog;

/// Actuation sink for one heating element. Owned exclusively by its Heater
/// and only written from the sample path under the heater's lock. The
/// implementation owns its own minimum-cycle-time and maximum-on-duration
/// safety enforcement.
pub trait HeaterOutput: Send + Sync {
    /// Apply a normalized power command in [0, 1] effective at `time`.
    fn set_output(&self, time: f64, value: f64);
}

/// Read-only fan telemetry, polled by the chamber watchdog at 1 Hz.
pub trait FanFeedback: Send + Sync {
    fn current_speed(&self, fan: &str) -> f64;
}

/// External "heater off" action invoked when an interlock trips. In the full
/// machine this routes through the command console (the equivalent of an
/// M141 S0); here it is a narrow injected seam.
pub trait ShutoffAction: Send + Sync {
    fn heater_off(&self, heater: &str);
}

/// Anything that can answer a temperature status query: heaters, but also
/// bare sensors registered for console reporting only.
pub trait TemperatureReporter: Send + Sync {
    /// Returns (current, target). Current reads 0 when no sample has arrived
    /// recently enough.
    fn get_temp(&self, eventtime: f64) -> (f64, f64);
}
