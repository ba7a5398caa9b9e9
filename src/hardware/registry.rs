// src/hardware/registry.rs - Registry coordinating all heaters
//
// The registry exclusively owns every heater and is passed by reference to
// anything that needs lookup; there is no ambient global. The blocking
// "wait for temperature" used by print flows lives here: it never sleeps the
// OS thread, it yields back to the shared scheduler in ~1 s increments and
// re-checks busy state and the cancellation flag on every resumption.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::config::{HeaterConfig, HeaterKind};
use crate::error::ConfigError;
use crate::time::TimeInterface;

use super::control::BedStateHandle;
use super::heater::Heater;
use super::{HeaterOutput, TemperatureReporter};

const WAIT_POLL_INTERVAL: f64 = 1.0;

pub struct HeaterRegistry {
    time: Arc<dyn TimeInterface>,
    heaters: Mutex<HashMap<String, Arc<Heater>>>,
    /// Reporting id -> temperature source, sorted for stable console echoes.
    /// Non-owning with respect to heater lifecycle: purely a status relation.
    sensors: Mutex<BTreeMap<String, Arc<dyn TemperatureReporter>>>,
    bed_state: BedStateHandle,
    bed_wait: AtomicBool,
    other_wait: AtomicBool,
    cancel: AtomicBool,
    shutdown: AtomicBool,
}

/// Wait-state and inventory snapshot for external status queries.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub available_heaters: Vec<String>,
    pub available_sensors: Vec<String>,
    pub bed_temperature_wait: bool,
    pub other_temperature_wait: bool,
}

impl HeaterRegistry {
    pub fn new(time: Arc<dyn TimeInterface>) -> Self {
        Self {
            time,
            heaters: Mutex::new(HashMap::new()),
            sensors: Mutex::new(BTreeMap::new()),
            bed_state: BedStateHandle::new(),
            bed_wait: AtomicBool::new(false),
            other_wait: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Build a heater from its configuration, bind it to its actuator, and
    /// take ownership. Registers the reporting sensor id when one is
    /// configured.
    pub fn setup_heater(
        &self,
        name: &str,
        cfg: &HeaterConfig,
        output: Box<dyn HeaterOutput>,
    ) -> Result<Arc<Heater>, ConfigError> {
        let mut heaters = lock(&self.heaters);
        if heaters.contains_key(name) {
            return Err(ConfigError::DuplicateHeater(name.to_string()));
        }
        let heater = Arc::new(Heater::new(name, cfg, output, self.bed_state.clone())?);
        if let Some(sensor_id) = &cfg.sensor_id {
            self.register_sensor(sensor_id, heater.clone())?;
        }
        heaters.insert(name.to_string(), heater.clone());
        Ok(heater)
    }

    /// Register a temperature source under a reporting id. Bare sensors
    /// (no heating element) appear in console echoes through this path too.
    pub fn register_sensor(
        &self,
        sensor_id: &str,
        reporter: Arc<dyn TemperatureReporter>,
    ) -> Result<(), ConfigError> {
        let mut sensors = lock(&self.sensors);
        if sensors.contains_key(sensor_id) {
            return Err(ConfigError::DuplicateSensor(sensor_id.to_string()));
        }
        sensors.insert(sensor_id.to_string(), reporter);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Heater>, ConfigError> {
        lock(&self.heaters)
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownHeater(name.to_string()))
    }

    /// Handle the chamber strategy reads for bed-priority decisions; the bed
    /// heater's sample path is the only writer.
    pub fn bed_state(&self) -> BedStateHandle {
        self.bed_state.clone()
    }

    pub fn get_status(&self) -> RegistryStatus {
        let mut available_heaters: Vec<String> = lock(&self.heaters).keys().cloned().collect();
        available_heaters.sort();
        RegistryStatus {
            available_heaters,
            available_sensors: lock(&self.sensors).keys().cloned().collect(),
            bed_temperature_wait: self.bed_wait.load(Ordering::Relaxed),
            other_temperature_wait: self.other_wait.load(Ordering::Relaxed),
        }
    }

    /// Set every heater's target to 0. Invoked on explicit command and on
    /// any abort/restart event.
    pub fn turn_off_all(&self) {
        tracing::info!("turning off all heaters");
        let heaters: Vec<Arc<Heater>> = lock(&self.heaters).values().cloned().collect();
        for heater in heaters {
            heater.alter_target(0.0);
        }
    }

    /// Raise the shared cancellation flag; any in-progress wait loop exits
    /// within one poll interval without altering its heater's target.
    pub fn request_cancel(&self) {
        tracing::debug!("temperature wait cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Final teardown: stop all heating and release any waiters.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.turn_off_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Commit a target and optionally block (cooperatively) until the
    /// heater settles. Waiting for "off" is meaningless and skipped.
    pub async fn set_temperature(
        &self,
        heater: &Arc<Heater>,
        temp: f64,
        wait: bool,
    ) -> Result<(), ConfigError> {
        heater.set_target(temp)?;
        if wait && temp != 0.0 {
            self.wait_for_temperature(heater).await;
        }
        Ok(())
    }

    /// Console echo of every registered sensor: `"id:cur /target"`, space
    /// separated in id order; `"T:0"` when nothing is registered.
    pub fn report_temps(&self, eventtime: f64) -> String {
        let sensors: Vec<(String, Arc<dyn TemperatureReporter>)> = lock(&self.sensors)
            .iter()
            .map(|(id, reporter)| (id.clone(), reporter.clone()))
            .collect();
        if sensors.is_empty() {
            return "T:0".to_string();
        }
        sensors
            .iter()
            .map(|(id, reporter)| {
                let (current, target) = reporter.get_temp(eventtime);
                format!("{id}:{current:.1} /{target:.1}")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn wait_for_temperature(&self, heater: &Arc<Heater>) {
        let flag = if heater.kind() == HeaterKind::Bed {
            &self.bed_wait
        } else {
            &self.other_wait
        };
        // a cancellation requested before the wait started does not apply
        self.cancel.store(false, Ordering::SeqCst);
        flag.store(true, Ordering::SeqCst);
        loop {
            if self.is_shutdown() {
                break;
            }
            let eventtime = self.time.monotonic();
            if !heater.is_busy(eventtime) {
                break;
            }
            if self.cancel.swap(false, Ordering::SeqCst) {
                tracing::info!(heater = heater.name(), "temperature wait cancelled");
                break;
            }
            tracing::info!("{}", self.report_temps(eventtime));
            self.time.pause(WAIT_POLL_INTERVAL).await;
        }
        flag.store(false, Ordering::SeqCst);
    }

    /// Block (cooperatively) until a sensor reads within [min_temp,
    /// max_temp]. At least one bound must be finite.
    pub async fn temperature_wait(
        &self,
        sensor: &str,
        min_temp: f64,
        max_temp: f64,
    ) -> Result<(), ConfigError> {
        let reporter = lock(&self.sensors)
            .get(sensor)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSensor(sensor.to_string()))?;
        if min_temp == f64::NEG_INFINITY && max_temp == f64::INFINITY {
            return Err(ConfigError::MissingWaitBounds(sensor.to_string()));
        }
        loop {
            if self.is_shutdown() || self.cancel.swap(false, Ordering::SeqCst) {
                return Ok(());
            }
            let eventtime = self.time.monotonic();
            let (current, _target) = reporter.get_temp(eventtime);
            if current >= min_temp && current <= max_temp {
                return Ok(());
            }
            tracing::info!("{}", self.report_temps(eventtime));
            self.time.pause(WAIT_POLL_INTERVAL).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
