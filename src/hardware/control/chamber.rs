// src/hardware/control/chamber.rs - Power shaping for the chamber heater
//
// The chamber element shares a power budget with the bed, so the bed always
// wins: while the bed reports an active heating phase the chamber output is
// forced to zero. A fresh heating session also soft-starts at reduced power,
// and a tripped fan interlock pins the output at zero until the operator
// re-arms with a new target.

use crate::config::ChamberConfig;

use super::{BedHeatingStatus, BedStateHandle, Control, ControlContext, Hysteresis};

pub struct ChamberShaper {
    inner: Hysteresis,
    cfg: ChamberConfig,
    max_power: f64,
    max_delta: f64,
    bed: BedStateHandle,
    soft_start_count: u32,
}

impl ChamberShaper {
    pub fn new(
        inner: Hysteresis,
        cfg: ChamberConfig,
        max_power: f64,
        max_delta: f64,
        bed: BedStateHandle,
    ) -> Self {
        Self {
            inner,
            cfg,
            max_power,
            max_delta,
            bed,
            soft_start_count: 0,
        }
    }
}

impl Control for ChamberShaper {
    fn update(&mut self, time: f64, temp: f64, target: f64, ctx: &ControlContext) -> f64 {
        let mut value = self.inner.update(time, temp, target, ctx);
        if !self.inner.is_heating() {
            self.soft_start_count = 0;
            return value;
        }
        if self.bed.status() == BedHeatingStatus::Heating {
            // bed heating has priority; resume (and restart the soft-start
            // window) once it settles
            self.soft_start_count = 0;
            value = 0.0;
        } else if temp < target - self.max_delta
            && self.soft_start_count < self.cfg.soft_start_samples
        {
            self.soft_start_count += 1;
            value = self.cfg.soft_start_power * self.max_power;
        }
        if ctx.heating_suppressed {
            value = 0.0;
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HysteresisConfig;

    fn ctx() -> ControlContext {
        ControlContext {
            last_output: 0.0,
            heating_suppressed: false,
        }
    }

    fn shaper(bed: BedStateHandle) -> ChamberShaper {
        let hysteresis_cfg = HysteresisConfig::default();
        let max_delta = hysteresis_cfg.max_delta;
        ChamberShaper::new(
            Hysteresis::new(hysteresis_cfg, 1.0),
            ChamberConfig::default(),
            1.0,
            max_delta,
            bed,
        )
    }

    #[test]
    fn soft_start_limits_early_session_power() {
        let bed = BedStateHandle::new();
        let mut control = shaper(bed);
        let target = 60.0;
        // cold start, far below target: soft-start power for the first
        // soft_start_samples samples
        for step in 0..200 {
            let value = control.update(step as f64, 25.0, target, &ctx());
            assert_eq!(value, 0.5, "sample {step}");
        }
        // window exhausted: full shaped power
        let value = control.update(200.0, 25.0, target, &ctx());
        assert_eq!(value, 1.0);
    }

    #[test]
    fn soft_start_not_applied_near_target() {
        let bed = BedStateHandle::new();
        let mut control = shaper(bed);
        let target = 60.0;
        // within max_delta of target the soft-start clamp does not apply
        let value = control.update(0.0, 58.5, target, &ctx());
        assert!(value > 0.5);
    }

    #[test]
    fn bed_heating_forces_zero_and_resets_soft_start() {
        let bed = BedStateHandle::new();
        let mut control = shaper(bed.clone());
        let target = 60.0;
        for step in 0..50 {
            control.update(step as f64, 25.0, target, &ctx());
        }
        assert_eq!(control.soft_start_count, 50);
        bed.publish(BedHeatingStatus::Heating, 0.8);
        assert_eq!(control.update(50.0, 25.0, target, &ctx()), 0.0);
        assert_eq!(control.soft_start_count, 0);
        // bed settles: chamber resumes with a fresh soft-start window
        bed.publish(BedHeatingStatus::Settled, 0.2);
        assert_eq!(control.update(51.0, 25.0, target, &ctx()), 0.5);
        assert_eq!(control.soft_start_count, 1);
    }

    #[test]
    fn interlock_suppression_pins_output_at_zero() {
        let bed = BedStateHandle::new();
        let mut control = shaper(bed);
        let target = 60.0;
        let suppressed = ControlContext {
            last_output: 0.5,
            heating_suppressed: true,
        };
        assert_eq!(control.update(0.0, 25.0, target, &suppressed), 0.0);
        assert!(control.is_heating(), "base strategy still wants heat");
    }

    #[test]
    fn no_shaping_while_strategy_idle() {
        let bed = BedStateHandle::new();
        let mut control = shaper(bed);
        // at target, base strategy never starts heating
        let value = control.update(0.0, 60.0, 60.0, &ctx());
        assert_eq!(value, 0.0);
        assert_eq!(control.soft_start_count, 0);
    }
}
