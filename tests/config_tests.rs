use simtemp::config::{DEFAULT_SAMPLING_MS, DEFAULT_THRESHOLD_MC, SAMPLING_MS_MAX, SAMPLING_MS_MIN};
use simtemp::generator::TEMP_MIN_MC;
use simtemp::*;

fn manual_device(initial: &InitialConfig) -> SimTempDevice {
    SimTempDevice::attach_manual(0, initial).unwrap()
}

#[test]
fn test_defaults() {
    let device = manual_device(&InitialConfig::default());
    let config = device.config();
    assert_eq!(config.sampling_ms, DEFAULT_SAMPLING_MS);
    assert_eq!(config.threshold_mc, DEFAULT_THRESHOLD_MC);
    assert_eq!(config.mode, SimMode::Normal);
}

#[test]
fn test_sampling_interval_clamps() {
    let device = manual_device(&InitialConfig::default());

    let update = device.set_sampling_ms(1);
    assert!(update.clamped());
    assert_eq!(device.sampling_ms(), SAMPLING_MS_MIN);

    device.set_sampling_ms(10_000);
    assert_eq!(device.sampling_ms(), SAMPLING_MS_MAX);

    let update = device.set_sampling_ms(250);
    assert!(!update.clamped());
    assert_eq!(device.sampling_ms(), 250);

    // Clamping is not an error
    assert_eq!(device.stats().errors, 0);
}

#[test]
fn test_settings_round_trip() {
    let device = manual_device(&InitialConfig::default());
    device.configure(Setting::SamplingMs(40)).unwrap();
    device.configure(Setting::ThresholdMc(-12_500)).unwrap();
    device.configure(Setting::Mode("NOISY\n".into())).unwrap();

    let config = device.config();
    assert_eq!(config.sampling_ms, 40);
    assert_eq!(config.threshold_mc, -12_500);
    assert_eq!(config.mode, SimMode::Noisy);
}

#[test]
fn test_switching_to_ramp_restarts_trajectory() {
    let device = manual_device(&InitialConfig::default());
    device.set_mode("ramp").unwrap();
    for _ in 0..10 {
        device.trigger().unwrap();
    }

    // Writing ramp again resets even though the mode is unchanged
    device.set_mode("ramp").unwrap();
    assert_eq!(device.trigger().unwrap().temp_mc, TEMP_MIN_MC + 800);
}

#[test]
fn test_initial_config_from_json() {
    let initial = InitialConfig::from_json_str(
        r#"{"sampling_ms": 2, "threshold_mc": 30000, "mode": "ramp", "seed": 99}"#,
    )
    .unwrap();
    let device = manual_device(&initial);

    assert_eq!(device.sampling_ms(), SAMPLING_MS_MIN);
    assert_eq!(device.threshold_mc(), 30_000);
    assert_eq!(device.mode(), SimMode::Ramp);
}

#[test]
fn test_invalid_initial_mode_keeps_default() {
    let initial = InitialConfig::from_json_str(r#"{"mode": "blazing"}"#).unwrap();

    // The attach still succeeds
    let device = manual_device(&initial);
    assert_eq!(device.mode(), SimMode::Normal);
    assert_eq!(device.stats().errors, 1);
}

#[test]
fn test_unknown_config_keys_rejected() {
    assert!(matches!(
        InitialConfig::from_json_str(r#"{"sampling": 100}"#),
        Err(ConfigFileError::Json(_))
    ));
    assert!(matches!(
        InitialConfig::from_file("/nonexistent/simtemp.json"),
        Err(ConfigFileError::Io(_))
    ));
}

#[test]
fn test_seed_makes_samples_reproducible() {
    let initial = InitialConfig {
        seed: Some(42),
        mode: Some("noisy".into()),
        ..InitialConfig::default()
    };
    let first = manual_device(&initial);
    let second = SimTempDevice::attach_manual(1, &initial).unwrap();

    for _ in 0..50 {
        assert_eq!(
            first.trigger().unwrap().temp_mc,
            second.trigger().unwrap().temp_mc
        );
    }
}
