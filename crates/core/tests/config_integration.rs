//! icsguard.toml 통합 설정 테스트
//!
//! - icsguard.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use icsguard_core::config::{CaptureSource, IcsguardConfig};
use icsguard_core::error::{ConfigError, IcsguardError};

// =============================================================================
// icsguard.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let content = include_str!("../../../icsguard.toml.example");
    let config = IcsguardConfig::parse(content).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");

    assert_eq!(config.capture.source, CaptureSource::Live);
    assert_eq!(config.capture.filter, "ip");
    assert_eq!(config.detector.batch_size, 100);
    assert_eq!(config.alert_bus.topic, "ics/anomaly");
    assert_eq!(config.result_file.path, "/var/lib/icsguard/results.jsonl");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../icsguard.toml.example");
    let parsed = IcsguardConfig::parse(content).expect("should parse");
    let defaults = IcsguardConfig::default();

    assert_eq!(parsed.general.log_level, defaults.general.log_level);
    assert_eq!(parsed.capture.interface, defaults.capture.interface);
    assert_eq!(parsed.capture.snaplen, defaults.capture.snaplen);
    assert_eq!(parsed.detector.batch_timeout_secs, defaults.detector.batch_timeout_secs);
    assert_eq!(parsed.detector.queue_capacity, defaults.detector.queue_capacity);
    assert_eq!(parsed.training.n_estimators, defaults.training.n_estimators);
    assert_eq!(parsed.training.random_seed, defaults.training.random_seed);
    assert_eq!(parsed.alert_bus.port, defaults.alert_bus.port);
    assert_eq!(parsed.result_store.url, defaults.result_store.url);
    assert_eq!(parsed.metrics.port, defaults.metrics.port);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_training_only() {
    let config = IcsguardConfig::parse(
        r#"
[training]
contamination = 0.05
"#,
    )
    .expect("should parse");
    assert!((config.training.contamination - 0.05).abs() < f64::EPSILON);
    assert_eq!(config.training.n_estimators, 100);
    assert_eq!(config.detector.batch_size, 100);
}

#[test]
fn partial_config_sinks_disabled() {
    let config = IcsguardConfig::parse(
        r#"
[alert_bus]
enabled = false
topic = ""

[result_store]
enabled = false
"#,
    )
    .expect("should parse");
    config.validate().expect("disabled sinks skip validation");
    assert!(!config.alert_bus.enabled);
    assert!(!config.result_store.enabled);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[detector]
batch_size = 10
"#;

    let original = std::env::var("ICSGUARD_DETECTOR_BATCH_SIZE").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("ICSGUARD_DETECTOR_BATCH_SIZE", "500");
    }

    let mut config = IcsguardConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.detector.batch_size;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("ICSGUARD_DETECTOR_BATCH_SIZE", val),
            None => std::env::remove_var("ICSGUARD_DETECTOR_BATCH_SIZE"),
        }
    }

    assert_eq!(result, 500);
}

#[test]
#[serial_test::serial]
fn env_override_capture_source() {
    let original = std::env::var("ICSGUARD_CAPTURE_SOURCE").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("ICSGUARD_CAPTURE_SOURCE", "replay");
    }

    let mut config = IcsguardConfig::default();
    config.apply_env_overrides();
    let result = config.capture.source;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("ICSGUARD_CAPTURE_SOURCE", val),
            None => std::env::remove_var("ICSGUARD_CAPTURE_SOURCE"),
        }
    }

    assert_eq!(result, CaptureSource::Replay);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_keeps_toml_value() {
    let original = std::env::var("ICSGUARD_ALERT_BUS_PORT").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("ICSGUARD_ALERT_BUS_PORT", "not-a-port");
    }

    let mut config = IcsguardConfig::parse("[alert_bus]\nport = 8883").expect("should parse");
    config.apply_env_overrides();
    let result = config.alert_bus.port;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("ICSGUARD_ALERT_BUS_PORT", val),
            None => std::env::remove_var("ICSGUARD_ALERT_BUS_PORT"),
        }
    }

    assert_eq!(result, 8883);
}

// =============================================================================
// 에러 테스트
// =============================================================================

#[test]
fn malformed_toml_returns_parse_error() {
    let result = IcsguardConfig::parse("[detector\nbatch_size = 1");
    assert!(matches!(
        result,
        Err(IcsguardError::Config(ConfigError::ParseFailed { .. }))
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let result = IcsguardConfig::parse("[detector]\nbatch_size = \"many\"");
    assert!(matches!(
        result,
        Err(IcsguardError::Config(ConfigError::ParseFailed { .. }))
    ));
}

#[test]
fn unknown_section_is_ignored() {
    let config = IcsguardConfig::parse(
        r#"
[unknown_section]
key = "value"
"#,
    )
    .expect("unknown sections are ignored");
    config.validate().expect("defaults validate");
}

#[tokio::test]
async fn load_from_disk_applies_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("icsguard.toml");
    tokio::fs::write(&path, "[detector]\nbatch_size = 0\n")
        .await
        .expect("write config");

    let err = IcsguardConfig::load(&path).await.unwrap_err();
    assert!(matches!(
        err,
        IcsguardError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn load_example_config_from_disk() {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let example_path = format!("{}/../../icsguard.toml.example", manifest_dir);

    let config = IcsguardConfig::from_file(&example_path)
        .await
        .expect("example file should load");
    config.validate().expect("loaded example should validate");
}
