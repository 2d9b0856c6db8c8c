// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use photobox::{CameraMode, Config};
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.backend, CameraMode::Auto);
    assert!(!config.studio_mode);
    assert_eq!(config.forward_folder, None);
    assert!(config.webcam.mirror, "Webcam preview should be mirrored by default");
    assert_eq!(config.dslr.tool, "gphoto2");
    assert_eq!(config.dslr.preview_interval, Duration::from_millis(500));
    assert_eq!(config.dslr.failure_budget, 5);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.backend = CameraMode::Webcam;
    config.studio_mode = true;
    config.forward_folder = Some(dir.path().join("outbox"));
    config.dslr.usb_settle = Duration::from_millis(1500);
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_file_fills_in_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "backend": "dslr", "dslr": { "preview_interval": 250 } }"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.backend, CameraMode::Dslr);
    assert_eq!(config.dslr.preview_interval, Duration::from_millis(250));
    assert_eq!(config.dslr.failure_budget, 5);
    assert_eq!(config.webcam, Config::default().webcam);
}

#[test]
fn test_durations_serialize_as_milliseconds() {
    let json = serde_json::to_value(Config::default()).unwrap();
    assert_eq!(json["dslr"]["preview_interval"], 500);
    assert_eq!(json["dslr"]["usb_settle"], 3000);
    assert_eq!(json["backend"], "auto");
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, photobox::AppError::Config(_)), "{}", err);
}

#[test]
fn test_synthetic_frame_rate_is_clamped() {
    let mut config = Config::default();
    config.synthetic.fps = 500;
    assert_eq!(config.synthetic.frame_period(), Duration::from_micros(16_666));
    config.synthetic.fps = 1;
    assert_eq!(config.synthetic.frame_period(), Duration::from_micros(33_333));
}
