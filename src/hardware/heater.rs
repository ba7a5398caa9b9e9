// src/hardware/heater.rs - Per-heater state, smoothing, and actuation pipeline
//
// Two logically concurrent paths touch a heater: the sensor-sample path and
// the command path. Everything they share (temperature pair, target,
// actuation bookkeeping, the control strategy) lives behind ONE mutex and is
// only ever read or written as a unit, so neither path can observe a torn
// temp/target pair. The actuator channel is written exclusively from the
// sample path under that lock.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::config::{HeaterConfig, HeaterKind};
use crate::error::ConfigError;

use super::control::{BedStateHandle, Control, ControlContext, build_control};
use super::{HeaterOutput, TemperatureReporter};

/// Upper bound the actuator enforces on a single uninterrupted on-command;
/// the resend rate limit is derived from it.
pub const MAX_HEAT_TIME: f64 = 5.0;
/// Output changes smaller than this do not force a resend.
const OUTPUT_EPSILON: f64 = 0.05;
/// Temperature queries report 0 when the newest sample is older than this.
const STALE_SAMPLE_WINDOW: f64 = 5.0;

struct HeaterState {
    last_temp: f64,
    last_temp_time: f64,
    have_sample: bool,
    smoothed_temp: f64,
    target_temp: f64,
    last_output: f64,
    next_output_time: f64,
    /// Interlock-tripped flag (chamber kind only). Cleared by a new target
    /// above the re-arm threshold.
    stop_heating: bool,
    control: Box<dyn Control>,
}

pub struct Heater {
    name: String,
    kind: HeaterKind,
    min_temp: f64,
    max_temp: f64,
    min_extrude_temp: f64,
    max_power: f64,
    smooth_time: f64,
    inv_smooth_time: f64,
    report_interval: f64,
    rearm_threshold: f64,
    state: Mutex<HeaterState>,
    /// Published copy of the extrusion gate so the motion path can read it
    /// without taking the heater lock.
    can_extrude: AtomicBool,
    output: Box<dyn HeaterOutput>,
}

/// Consolidated status snapshot for one heater.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeaterStatus {
    pub temperature: f64,
    pub target: f64,
    pub power: f64,
}

impl std::fmt::Debug for Heater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heater")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("min_temp", &self.min_temp)
            .field("max_temp", &self.max_temp)
            .finish_non_exhaustive()
    }
}

impl Heater {
    pub fn new(
        name: &str,
        cfg: &HeaterConfig,
        output: Box<dyn HeaterOutput>,
        bed: BedStateHandle,
    ) -> Result<Self, ConfigError> {
        cfg.validate(name)?;
        let control = build_control(cfg, bed);
        tracing::info!(
            heater = name,
            kind = ?cfg.kind,
            min_temp = cfg.min_temp,
            max_temp = cfg.max_temp,
            "configured heater"
        );
        Ok(Self {
            name: name.to_string(),
            kind: cfg.kind,
            min_temp: cfg.min_temp,
            max_temp: cfg.max_temp,
            min_extrude_temp: cfg.min_extrude_temp,
            max_power: cfg.max_power,
            smooth_time: cfg.smooth_time,
            inv_smooth_time: 1.0 / cfg.smooth_time,
            report_interval: cfg.report_interval,
            rearm_threshold: cfg.chamber.rearm_threshold,
            state: Mutex::new(HeaterState {
                last_temp: 0.0,
                last_temp_time: 0.0,
                have_sample: false,
                smoothed_temp: 0.0,
                target_temp: 0.0,
                last_output: 0.0,
                next_output_time: 0.0,
                stop_heating: false,
                control,
            }),
            can_extrude: AtomicBool::new(cfg.min_extrude_temp <= 0.0),
            output,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeaterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> HeaterKind {
        self.kind
    }

    pub fn max_power(&self) -> f64 {
        self.max_power
    }

    pub fn smooth_time(&self) -> f64 {
        self.smooth_time
    }

    /// Whether the smoothed temperature has reached the extrusion gate.
    pub fn can_extrude(&self) -> bool {
        self.can_extrude.load(Ordering::Relaxed)
    }

    /// Commit a new target temperature. Fails before any state mutation when
    /// the request is outside the configured limits (0 always means "off"
    /// and is accepted).
    pub fn set_target(&self, degrees: f64) -> Result<(), ConfigError> {
        if degrees != 0.0 && (degrees < self.min_temp || degrees > self.max_temp) {
            return Err(ConfigError::TargetOutOfRange {
                name: self.name.clone(),
                requested: degrees,
                min: self.min_temp,
                max: self.max_temp,
            });
        }
        let mut state = self.lock();
        state.target_temp = degrees;
        state.control.target_changed(degrees);
        if self.kind == HeaterKind::Chamber && degrees > self.rearm_threshold {
            state.stop_heating = false;
        }
        tracing::info!(heater = %self.name, target = degrees, "set heater target");
        Ok(())
    }

    /// Unvalidated target adjustment used by calibration flows; nonzero
    /// values are clamped into the configured limits.
    pub fn alter_target(&self, degrees: f64) {
        let degrees = if degrees != 0.0 {
            degrees.clamp(self.min_temp, self.max_temp)
        } else {
            0.0
        };
        self.lock().target_temp = degrees;
    }

    /// Accept one sensor sample. O(1), does not block: the control update
    /// and smoothing run inline and the actuator write is rate limited.
    /// Samples that do not advance the clock are discarded.
    pub fn on_sample(&self, time: f64, temp: f64) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.have_sample && time <= state.last_temp_time {
            tracing::debug!(
                heater = %self.name,
                sample_time = time,
                last_time = state.last_temp_time,
                "discarding stale sample"
            );
            return;
        }
        let time_diff = time - state.last_temp_time;
        state.last_temp = temp;
        let ctx = ControlContext {
            last_output: state.last_output,
            heating_suppressed: state.stop_heating,
        };
        let target = state.target_temp;
        let value = state.control.update(time, temp, target, &ctx);
        if state.have_sample {
            let adj = (time_diff * self.inv_smooth_time).min(1.0);
            state.smoothed_temp += (temp - state.smoothed_temp) * adj;
        } else {
            state.smoothed_temp = temp;
            state.have_sample = true;
        }
        state.last_temp_time = time;
        self.can_extrude.store(
            state.smoothed_temp >= self.min_extrude_temp,
            Ordering::Relaxed,
        );
        self.actuate(state, time, value);
    }

    /// Forward an actuation value, suppressing insignificant updates: a
    /// change smaller than the epsilon is dropped while the rate-limit
    /// window is open (or while the output is already at zero).
    fn actuate(&self, state: &mut HeaterState, read_time: f64, mut value: f64) {
        if state.target_temp <= 0.0 {
            value = 0.0;
        }
        if (read_time < state.next_output_time || state.last_output == 0.0)
            && (value - state.last_output).abs() < OUTPUT_EPSILON
        {
            return;
        }
        let output_time = read_time + self.report_interval;
        state.next_output_time = output_time + 0.75 * MAX_HEAT_TIME;
        state.last_output = value;
        self.output.set_output(output_time, value);
    }

    /// Current (smoothed) temperature and target. Reports temperature 0 when
    /// no sample has arrived recently enough.
    pub fn get_temp(&self, eventtime: f64) -> (f64, f64) {
        let state = self.lock();
        if !state.have_sample || state.last_temp_time < eventtime - STALE_SAMPLE_WINDOW {
            return (0.0, state.target_temp);
        }
        (state.smoothed_temp, state.target_temp)
    }

    pub fn is_busy(&self, _eventtime: f64) -> bool {
        let state = self.lock();
        state.control.busy(state.smoothed_temp, state.target_temp)
    }

    pub fn get_status(&self, _eventtime: f64) -> HeaterStatus {
        let state = self.lock();
        HeaterStatus {
            temperature: (state.smoothed_temp * 100.0).round() / 100.0,
            target: state.target_temp,
            power: state.last_output,
        }
    }

    /// One-line activity summary for periodic host statistics.
    pub fn stats(&self, _eventtime: f64) -> (bool, String) {
        let state = self.lock();
        let is_active = state.target_temp != 0.0 || state.last_temp > 50.0;
        (
            is_active,
            format!(
                "{}: target={:.0} temp={:.1} pwm={:.3}",
                self.name, state.target_temp, state.last_temp, state.last_output
            ),
        )
    }

    /// Swap the control strategy (calibration), forcing the target off.
    /// Returns the previous strategy so the caller can restore it.
    pub fn set_control(&self, control: Box<dyn Control>) -> Box<dyn Control> {
        let mut state = self.lock();
        let old = std::mem::replace(&mut state.control, control);
        state.target_temp = 0.0;
        old
    }

    /// Latch the interlock: shaped strategies output zero until re-armed by
    /// a target above the re-arm threshold.
    pub(crate) fn trip_interlock(&self) {
        self.lock().stop_heating = true;
    }

    pub fn interlock_tripped(&self) -> bool {
        self.lock().stop_heating
    }

    /// Snapshot read by the chamber watchdog: (strategy actively heating,
    /// last actuation value, target).
    pub(crate) fn heating_state(&self) -> (bool, f64, f64) {
        let state = self.lock();
        (
            state.control.is_heating(),
            state.last_output,
            state.target_temp,
        )
    }
}

impl TemperatureReporter for Heater {
    fn get_temp(&self, eventtime: f64) -> (f64, f64) {
        Heater::get_temp(self, eventtime)
    }
}
