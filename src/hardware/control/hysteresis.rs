// src/hardware/control/hysteresis.rs - Threshold-hysteresis control with adaptive banding
//
// Plain on/off hysteresis oscillates badly on elements with high thermal
// mass: by the time the sensor crosses the target the element has stored
// enough heat to overshoot by several degrees. Two countermeasures here:
// the on/off thresholds are linear functions of the target with separate
// coefficients for long warm-ups vs. steady hold, and the drive power is
// scaled by a coefficient that decays after overshoots.

use crate::config::HysteresisConfig;

use super::{Control, ControlContext};

const AMBIENT_TEMP: f64 = 25.0;

pub struct Hysteresis {
    cfg: HysteresisConfig,
    max_power: f64,
    heating: bool,
    /// Deep-recovery sub-state: entered when temp falls well below target
    /// (cold start, filament load), exited near target or when the climb
    /// stalls.
    deep_recovery: bool,
    /// Highest temperature seen during the current recovery climb.
    recovery_high: f64,
    recovery_stalls: u32,
    /// Peak temperature recorded while the element was off; drives the
    /// power-coefficient decay on the next heating cycle.
    peak_since_off: f64,
    power_coeff: f64,
    on_threshold: f64,
    off_threshold: f64,
}

impl Hysteresis {
    pub fn new(cfg: HysteresisConfig, max_power: f64) -> Self {
        Self {
            cfg,
            max_power,
            heating: false,
            deep_recovery: false,
            recovery_high: 0.0,
            recovery_stalls: 0,
            peak_since_off: AMBIENT_TEMP,
            power_coeff: 1.0,
            on_threshold: 0.0,
            off_threshold: 0.0,
        }
    }

    /// Current power coefficient, clamped into [power_floor, 1.0] while
    /// heating.
    pub fn power_coeff(&self) -> f64 {
        self.power_coeff
    }

    fn update_thresholds(&mut self, temp: f64, target: f64) {
        let tuning = &self.cfg.tuning;
        if temp + tuning.recovery_exit_delta > target {
            self.deep_recovery = false;
        }
        if self.deep_recovery {
            if self.recovery_high <= 0.01 || self.recovery_high < temp {
                self.recovery_high = temp;
                self.recovery_stalls = 0;
                self.on_threshold =
                    tuning.warmup_on_base + tuning.warmup_on_slope * (target - tuning.band_min);
                self.off_threshold =
                    tuning.warmup_off_base + tuning.warmup_off_slope * (target - tuning.band_min);
            } else if self.recovery_high > temp {
                self.recovery_stalls += 1;
                if self.recovery_stalls > tuning.recovery_stall_samples {
                    self.deep_recovery = false;
                }
            }
        } else {
            self.on_threshold =
                tuning.steady_on_base + tuning.steady_on_slope * (target - tuning.band_min);
            self.off_threshold =
                tuning.steady_off_base + tuning.steady_off_slope * (target - tuning.band_min);
        }
    }

    fn decay_power_coeff(&mut self, target: f64) {
        if self.peak_since_off > 0.1 {
            let overshoot = self.peak_since_off - target;
            let mut scaled = false;
            for band in &self.cfg.tuning.decay_bands {
                if overshoot > band.overshoot {
                    self.power_coeff *= band.scale;
                    scaled = true;
                    break;
                }
            }
            if !scaled && self.peak_since_off < target {
                self.power_coeff *= self.cfg.tuning.undershoot_gain;
            }
        }
    }
}

impl Control for Hysteresis {
    fn update(&mut self, _time: f64, temp: f64, target: f64, _ctx: &ControlContext) -> f64 {
        if temp + self.cfg.tuning.recovery_enter_delta < target {
            self.deep_recovery = true;
            self.recovery_high = 0.0;
            self.recovery_stalls = 0;
        }
        if target >= self.cfg.tuning.band_min && target <= self.cfg.tuning.band_max {
            self.update_thresholds(temp, target);
            if self.heating && temp >= self.off_threshold {
                self.heating = false;
            } else if !self.heating && temp <= self.on_threshold {
                self.heating = true;
            }
        } else if self.heating && temp >= target {
            self.heating = false;
        } else if !self.heating && temp <= target - self.cfg.max_delta {
            self.heating = true;
        }

        if self.heating {
            self.decay_power_coeff(target);
            if temp + self.cfg.tuning.reset_lead < target {
                self.power_coeff = 1.0;
            }
            self.power_coeff = self.power_coeff.clamp(self.cfg.tuning.power_floor, 1.0);
            self.peak_since_off = 0.0;
            self.max_power * self.power_coeff
        } else {
            if target > 0.1 {
                if self.peak_since_off < temp {
                    self.peak_since_off = temp;
                }
            } else {
                self.peak_since_off = 0.0;
                self.power_coeff = 1.0;
            }
            0.0
        }
    }

    fn busy(&self, smoothed_temp: f64, target_temp: f64) -> bool {
        smoothed_temp < target_temp - self.cfg.max_delta
    }

    fn is_heating(&self) -> bool {
        self.heating
    }
}
