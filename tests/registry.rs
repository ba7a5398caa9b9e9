// Integration tests for the heater registry: lookup, blocking waits,
// cancellation, and console temperature reporting.

use std::sync::Arc;
use std::time::Duration;

use hearth_rs::{
    Config, ConfigError, ControlConfig, HeaterConfig, HeaterKind, HeaterOutput, HeaterRegistry,
    PidConfig, TokioTime,
};

struct NullOutput;

impl HeaterOutput for NullOutput {
    fn set_output(&self, _time: f64, _value: f64) {}
}

fn extruder_config() -> HeaterConfig {
    HeaterConfig {
        kind: HeaterKind::Extruder,
        min_temp: 0.0,
        max_temp: 300.0,
        sensor_id: Some("T0".to_string()),
        control: ControlConfig::Pid(PidConfig {
            pid_kp: 21.7,
            pid_ki: 1.2,
            pid_kd: 98.1,
            pid_kp_high_temp: None,
            pid_ki_high_temp: None,
            pid_kd_high_temp: None,
            high_temp_value: 280.0,
            settle_delta: 2.0,
            settle_slope: 0.5,
        }),
        ..HeaterConfig::default()
    }
}

fn bed_config() -> HeaterConfig {
    HeaterConfig {
        kind: HeaterKind::Bed,
        min_temp: 0.0,
        max_temp: 130.0,
        sensor_id: Some("B".to_string()),
        ..extruder_config()
    }
}

fn registry() -> Arc<HeaterRegistry> {
    Arc::new(HeaterRegistry::new(Arc::new(TokioTime::new())))
}

#[tokio::test]
async fn register_and_lookup() {
    let registry = registry();
    let heater = registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    assert_eq!(heater.name(), "extruder");
    assert_eq!(registry.lookup("extruder").unwrap().name(), "extruder");

    let err = registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateHeater(_)));

    let err = registry.lookup("heater_bed").unwrap_err();
    assert!(matches!(err, ConfigError::UnknownHeater(_)));
}

#[tokio::test]
async fn duplicate_sensor_id_rejected() {
    let registry = registry();
    registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    let mut second = extruder_config();
    second.sensor_id = Some("T0".to_string());
    let err = registry
        .setup_heater("extruder1", &second, Box::new(NullOutput))
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateSensor(_)));
}

#[tokio::test]
async fn set_temperature_rejects_out_of_range_target() {
    let registry = registry();
    let heater = registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    registry.set_temperature(&heater, 200.0, false).await.unwrap();
    let err = registry
        .set_temperature(&heater, 500.0, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::TargetOutOfRange { .. }));
    // the failed request left the previous target in place
    assert_eq!(heater.get_temp(0.0).1, 200.0);
}

#[tokio::test(start_paused = true)]
async fn wait_returns_once_settled() {
    let registry = registry();
    let heater = registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    // already at temperature: samples settle the loop before the wait starts
    heater.set_target(200.0).unwrap();
    for step in 0..30 {
        heater.on_sample(step as f64 * 0.3, 200.0);
    }
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        registry.set_temperature(&heater, 200.0, true),
    )
    .await;
    assert!(result.is_ok(), "settled wait must return promptly");
}

#[tokio::test(start_paused = true)]
async fn cancellation_releases_wait_within_one_interval() {
    let registry = registry();
    let heater = registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    heater.on_sample(0.0, 20.0); // cold: far from any target

    let wait_registry = registry.clone();
    let wait_heater = heater.clone();
    let waiter = tokio::spawn(async move {
        wait_registry
            .set_temperature(&wait_heater, 200.0, true)
            .await
            .unwrap();
    });

    // let the wait loop run a few polls, then cancel
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(registry.get_status().other_temperature_wait);
    registry.request_cancel();
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("wait must observe cancellation within one poll interval")
        .unwrap();
    // cancellation leaves the target untouched
    assert_eq!(heater.get_temp(3.0).1, 200.0);
    assert!(!registry.get_status().other_temperature_wait);
}

#[tokio::test(start_paused = true)]
async fn bed_wait_raises_bed_flag() {
    let registry = registry();
    let bed = registry
        .setup_heater("heater_bed", &bed_config(), Box::new(NullOutput))
        .unwrap();
    bed.on_sample(0.0, 20.0);

    let wait_registry = registry.clone();
    let wait_bed = bed.clone();
    let waiter = tokio::spawn(async move {
        wait_registry
            .set_temperature(&wait_bed, 60.0, true)
            .await
            .unwrap();
    });
    tokio::time::sleep(Duration::from_secs(2)).await;
    let status = registry.get_status();
    assert!(status.bed_temperature_wait);
    assert!(!status.other_temperature_wait);
    registry.request_cancel();
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn turn_off_all_zeroes_every_target() {
    let registry = registry();
    let extruder = registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    let bed = registry
        .setup_heater("heater_bed", &bed_config(), Box::new(NullOutput))
        .unwrap();
    extruder.set_target(200.0).unwrap();
    bed.set_target(60.0).unwrap();
    registry.turn_off_all();
    assert_eq!(extruder.get_temp(0.0).1, 0.0);
    assert_eq!(bed.get_temp(0.0).1, 0.0);
}

#[tokio::test]
async fn report_temps_renders_sorted_sensor_ids() {
    let registry = registry();
    assert_eq!(registry.report_temps(0.0), "T:0");
    let extruder = registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    let bed = registry
        .setup_heater("heater_bed", &bed_config(), Box::new(NullOutput))
        .unwrap();
    extruder.set_target(200.0).unwrap();
    extruder.on_sample(0.1, 150.04);
    bed.on_sample(0.1, 55.26);
    assert_eq!(registry.report_temps(0.2), "B:55.3 /0.0 T0:150.0 /200.0");
}

#[tokio::test(start_paused = true)]
async fn temperature_wait_validates_inputs() {
    let registry = registry();
    registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    let err = registry
        .temperature_wait("T9", 40.0, f64::INFINITY)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownSensor(_)));
    let err = registry
        .temperature_wait("T0", f64::NEG_INFINITY, f64::INFINITY)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingWaitBounds(_)));
}

#[tokio::test(start_paused = true)]
async fn temperature_wait_returns_inside_band() {
    let registry = registry();
    let heater = registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    heater.on_sample(0.0, 45.0);
    tokio::time::timeout(
        Duration::from_secs(3),
        registry.temperature_wait("T0", 40.0, f64::INFINITY),
    )
    .await
    .expect("sensor already inside the band")
    .unwrap();
}

#[tokio::test]
async fn status_lists_inventory() {
    let registry = registry();
    registry
        .setup_heater("extruder", &extruder_config(), Box::new(NullOutput))
        .unwrap();
    registry
        .setup_heater("heater_bed", &bed_config(), Box::new(NullOutput))
        .unwrap();
    let status = registry.get_status();
    assert_eq!(status.available_heaters, vec!["extruder", "heater_bed"]);
    assert_eq!(status.available_sensors, vec!["B", "T0"]);
    assert!(!status.bed_temperature_wait);
    assert!(!status.other_temperature_wait);
}

#[tokio::test]
async fn registry_builds_from_config_file() {
    let toml_str = r#"
        [heaters.extruder]
        kind = "extruder"
        sensor_id = "T0"
        max_temp = 300.0

        [heaters.extruder.control]
        algorithm = "pid"
        pid_kp = 21.7
        pid_ki = 1.2
        pid_kd = 98.1

        [heaters.heater_bed]
        kind = "bed"
        sensor_id = "B"
        max_temp = 130.0
    "#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let registry = registry();
    let mut names: Vec<&String> = config.heaters.keys().collect();
    names.sort();
    for name in names {
        registry
            .setup_heater(name, &config.heaters[name], Box::new(NullOutput))
            .unwrap();
    }
    assert_eq!(
        registry.get_status().available_heaters,
        vec!["extruder", "heater_bed"]
    );
}
