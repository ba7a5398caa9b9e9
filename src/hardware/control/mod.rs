// src/hardware/control/mod.rs - Control-law selection and the cross-heater status seam
pub mod chamber;
pub mod hysteresis;
pub mod pid;

pub use chamber::ChamberShaper;
pub use hysteresis::Hysteresis;
pub use pid::{BedStatusPublisher, GainSet, Pid};

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{ControlConfig, HeaterConfig, HeaterKind};

/// Heater state the control laws read back while computing an actuation
/// value. These are the only heater fields a strategy may observe; everything
/// else flows in through the update arguments.
#[derive(Debug, Clone, Copy)]
pub struct ControlContext {
    /// Last value actually forwarded to the actuator.
    pub last_output: f64,
    /// Interlock-tripped flag; forces shaped strategies to zero output.
    pub heating_suppressed: bool,
}

/// Uniform contract over the control-algorithm variants. One instance is
/// owned by exactly one heater and called under that heater's lock.
pub trait Control: Send {
    /// Consume one time-stamped temperature sample and produce an actuation
    /// value in [0, max_power]. Must be O(1) and must not block.
    fn update(&mut self, time: f64, temp: f64, target: f64, ctx: &ControlContext) -> f64;

    /// Whether the loop still considers itself far from the target.
    fn busy(&self, smoothed_temp: f64, target_temp: f64) -> bool;

    /// Whether the strategy is actively driving the element. Observed by the
    /// chamber watchdog.
    fn is_heating(&self) -> bool;

    /// Hook invoked when a new target is committed (gain-set selection).
    fn target_changed(&mut self, _target: f64) {}
}

/// Heating status a bed heater publishes after every sample, read by the
/// chamber strategy for the bed-priority interlock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BedHeatingStatus {
    #[default]
    Off,
    Heating,
    Overshoot,
    Settled,
}

#[derive(Debug, Clone, Copy, Default)]
struct BedPeerState {
    status: BedHeatingStatus,
    last_output: f64,
}

/// Shared handle to the bed heater's published state. The bed heater's
/// sample path writes it; every other reader is read-only. This is the only
/// cross-heater channel in the core.
#[derive(Debug, Clone, Default)]
pub struct BedStateHandle {
    inner: Arc<Mutex<BedPeerState>>,
}

impl BedStateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> BedHeatingStatus {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    pub fn last_output(&self) -> f64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_output
    }

    pub(crate) fn publish(&self, status: BedHeatingStatus, last_output: f64) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.status = status;
        state.last_output = last_output;
    }
}

/// Build the configured control strategy for a heater, applying the
/// kind-specific wrapper: bed heaters publish their status, chamber heaters
/// get power shaping and interlock suppression layered over the base law.
pub fn build_control(cfg: &HeaterConfig, bed: BedStateHandle) -> Box<dyn Control> {
    match &cfg.control {
        ControlConfig::Hysteresis(hysteresis_cfg) => {
            let base = Hysteresis::new(hysteresis_cfg.clone(), cfg.max_power);
            if cfg.kind == HeaterKind::Chamber {
                Box::new(ChamberShaper::new(
                    base,
                    cfg.chamber.clone(),
                    cfg.max_power,
                    hysteresis_cfg.max_delta,
                    bed,
                ))
            } else {
                Box::new(base)
            }
        }
        ControlConfig::Pid(pid_cfg) => {
            let base = Pid::new(pid_cfg.clone(), cfg.max_power, cfg.smooth_time);
            if cfg.kind == HeaterKind::Bed {
                Box::new(BedStatusPublisher::new(base, bed))
            } else {
                Box::new(base)
            }
        }
    }
}
