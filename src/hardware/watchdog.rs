// src/hardware/watchdog.rs - Chamber fan interlock watchdog
//
// The chamber element sits behind a fan; driving it with the fan stalled
// cooks the element. The watchdog polls at 1 Hz and trips only after a full
// run of consecutive failing checks, so a momentary tach dropout never
// kills a heat soak. It fails closed: the trip latches stop_heating, logs at
// critical severity, and fires the external heater-off action. Re-arm is
// operator-driven (a new target above the re-arm threshold).

use std::sync::Arc;

use crate::error::InterlockError;
use crate::time::TimeInterface;

use super::heater::Heater;
use super::{FanFeedback, ShutoffAction};

pub struct ChamberWatchdog {
    heater: Arc<Heater>,
    fan: Arc<dyn FanFeedback>,
    shutoff: Arc<dyn ShutoffAction>,
    fan_name: String,
    trip_checks: u32,
    consecutive: u32,
}

impl ChamberWatchdog {
    pub fn new(
        heater: Arc<Heater>,
        fan: Arc<dyn FanFeedback>,
        shutoff: Arc<dyn ShutoffAction>,
        fan_name: &str,
        trip_checks: u32,
    ) -> Self {
        Self {
            heater,
            fan,
            shutoff,
            fan_name: fan_name.to_string(),
            trip_checks,
            consecutive: 0,
        }
    }

    /// One 1 Hz observation. The failing condition is: strategy actively
    /// heating, last actuation above zero, target set, fan speed zero. The
    /// counter resets the instant any single check passes; the trip fires on
    /// exactly the `trip_checks`-th consecutive failure.
    pub fn check(&mut self) -> Option<InterlockError> {
        let (heating, last_output, target) = self.heater.heating_state();
        let fan_speed = self.fan.current_speed(&self.fan_name);
        let failing = heating && last_output > 0.0 && target > 0.0 && fan_speed == 0.0;
        if !failing {
            self.consecutive = 0;
            return None;
        }
        self.consecutive += 1;
        if self.consecutive < self.trip_checks {
            return None;
        }
        self.consecutive = 0;
        self.heater.trip_interlock();
        let fault = InterlockError::FanStalled {
            heater: self.heater.name().to_string(),
            fan_speed,
        };
        tracing::error!(heater = self.heater.name(), fan = %self.fan_name, "{fault}");
        self.shutoff.heater_off(self.heater.name());
        Some(fault)
    }

    /// Run the watchdog for the lifetime of the process.
    pub async fn run(mut self, time: Arc<dyn TimeInterface>) {
        loop {
            time.pause(1.0).await;
            self.check();
        }
    }

    /// Spawn the 1 Hz watchdog task onto the current runtime.
    pub fn spawn(self, time: Arc<dyn TimeInterface>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(time))
    }
}
