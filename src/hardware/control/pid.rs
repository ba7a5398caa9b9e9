// src/hardware/control/pid.rs - PID control with dual gain sets and anti-windup
//
// The derivative estimate is low-pass filtered against sample-rate jitter:
// below min_deriv_time the new slope is blended with the previous estimate
// instead of being trusted outright. The integral is clamped to
// [0, max_power/Ki] and is only committed when the output is not saturating,
// so a long saturated climb cannot wind up a delayed overshoot.

use crate::config::{PID_PARAM_BASE, PidConfig};

use super::{BedHeatingStatus, BedStateHandle, Control, ControlContext};

const AMBIENT_TEMP: f64 = 25.0;

/// One set of PID gains in configuration units (0-255 scale).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainSet {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl GainSet {
    fn scaled(self) -> (f64, f64, f64) {
        (
            self.kp / PID_PARAM_BASE,
            self.ki / PID_PARAM_BASE,
            self.kd / PID_PARAM_BASE,
        )
    }
}

pub struct Pid {
    max_power: f64,
    min_deriv_time: f64,
    high_temp_value: f64,
    settle_delta: f64,
    settle_slope: f64,
    base_gains: GainSet,
    high_temp_gains: GainSet,
    // active (scaled) gains
    kp: f64,
    ki: f64,
    kd: f64,
    integ_max: f64,
    prev_temp: f64,
    prev_temp_time: f64,
    prev_deriv: f64,
    prev_integ: f64,
    last_output: f64,
}

impl Pid {
    pub fn new(cfg: PidConfig, max_power: f64, smooth_time: f64) -> Self {
        let base_gains = GainSet {
            kp: cfg.pid_kp,
            ki: cfg.pid_ki,
            kd: cfg.pid_kd,
        };
        let high_temp_gains = GainSet {
            kp: cfg.pid_kp_high_temp.unwrap_or(cfg.pid_kp),
            ki: cfg.pid_ki_high_temp.unwrap_or(cfg.pid_ki),
            kd: cfg.pid_kd_high_temp.unwrap_or(cfg.pid_kd),
        };
        let mut pid = Self {
            max_power,
            min_deriv_time: smooth_time,
            high_temp_value: cfg.high_temp_value,
            settle_delta: cfg.settle_delta,
            settle_slope: cfg.settle_slope,
            base_gains,
            high_temp_gains,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            integ_max: 0.0,
            prev_temp: AMBIENT_TEMP,
            prev_temp_time: 0.0,
            prev_deriv: 0.0,
            prev_integ: 0.0,
            last_output: 0.0,
        };
        pid.select_gains(0.0);
        pid
    }

    pub(crate) fn settle_delta(&self) -> f64 {
        self.settle_delta
    }

    /// Install calibrated gains for either set. The active gains refresh on
    /// the next target change, matching how calibration hands results back.
    pub fn set_calibrated_gains(&mut self, gains: GainSet, high_temp: bool) {
        if high_temp {
            self.high_temp_gains = gains;
        } else {
            self.base_gains = gains;
        }
    }

    fn select_gains(&mut self, target: f64) {
        let set = if target > self.high_temp_value {
            self.high_temp_gains
        } else {
            self.base_gains
        };
        let (kp, ki, kd) = set.scaled();
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self.integ_max = if ki != 0.0 { self.max_power / ki } else { 0.0 };
    }
}

impl Control for Pid {
    fn update(&mut self, time: f64, temp: f64, target: f64, _ctx: &ControlContext) -> f64 {
        let time_diff = time - self.prev_temp_time;
        let temp_diff = temp - self.prev_temp;
        let temp_deriv = if time_diff >= self.min_deriv_time {
            temp_diff / time_diff
        } else {
            (self.prev_deriv * (self.min_deriv_time - time_diff) + temp_diff)
                / self.min_deriv_time
        };
        let temp_err = target - temp;
        let temp_integ = (self.prev_integ + temp_err * time_diff).clamp(0.0, self.integ_max);
        let co = self.kp * temp_err + self.ki * temp_integ - self.kd * temp_deriv;
        let bounded_co = co.clamp(0.0, self.max_power);
        self.prev_temp = temp;
        self.prev_temp_time = time;
        self.prev_deriv = temp_deriv;
        if co == bounded_co {
            self.prev_integ = temp_integ;
        }
        self.last_output = bounded_co;
        bounded_co
    }

    fn busy(&self, smoothed_temp: f64, target_temp: f64) -> bool {
        (target_temp - smoothed_temp).abs() > self.settle_delta
            || self.prev_deriv.abs() > self.settle_slope
    }

    fn is_heating(&self) -> bool {
        self.last_output > 0.0
    }

    fn target_changed(&mut self, target: f64) {
        self.select_gains(target);
        tracing::debug!(
            target_temp = target,
            kp = self.kp,
            ki = self.ki,
            kd = self.kd,
            "selected pid gains"
        );
    }
}

/// Wrapper for bed-type heaters: after every sample the heating status and
/// last output are published for cross-heater interlock reads.
pub struct BedStatusPublisher {
    inner: Pid,
    handle: BedStateHandle,
}

impl BedStatusPublisher {
    pub fn new(inner: Pid, handle: BedStateHandle) -> Self {
        Self { inner, handle }
    }
}

impl Control for BedStatusPublisher {
    fn update(&mut self, time: f64, temp: f64, target: f64, ctx: &ControlContext) -> f64 {
        let value = self.inner.update(time, temp, target, ctx);
        let status = if target == 0.0 {
            BedHeatingStatus::Off
        } else if temp > target + self.inner.settle_delta() {
            BedHeatingStatus::Overshoot
        } else if self.inner.busy(temp, target) {
            BedHeatingStatus::Heating
        } else {
            BedHeatingStatus::Settled
        };
        self.handle.publish(status, value);
        value
    }

    fn busy(&self, smoothed_temp: f64, target_temp: f64) -> bool {
        self.inner.busy(smoothed_temp, target_temp)
    }

    fn is_heating(&self) -> bool {
        self.inner.is_heating()
    }

    fn target_changed(&mut self, target: f64) {
        self.inner.target_changed(target);
    }
}
