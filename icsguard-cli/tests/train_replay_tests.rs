//! Integration tests for `icsguard train`, `replay` and `model inspect`.
//!
//! Exercises the offline workflow end to end: rows file -> model file ->
//! replayed packets -> result file.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use icsguard_cli::cli::{ModelAction, ModelArgs, OutputFormat, ReplayArgs, TrainArgs};
use icsguard_cli::commands::{model, replay, train};
use icsguard_cli::error::CliError;
use icsguard_cli::output::OutputWriter;
use icsguard_core::types::WindowSample;
use icsguard_detector::Model;

const REPLAY: &str = r#"{"timestamp":0.0,"length":120,"ip":{"version":4,"protocol":6,"src":"10.0.0.1","dst":"10.0.0.2"},"tcp":{"src_port":49152,"dst_port":502,"flags":24,"window":8192},"payload":{"length":12}}
{"timestamp":0.1,"length":60}
{"timestamp":0.2,"length":130,"ip":{"version":4,"protocol":6,"src":"10.0.0.1","dst":"10.0.0.2"},"tcp":{"src_port":49152,"dst_port":502,"flags":24,"window":8192}}
{"timestamp":0.3,"length":1400,"ip":{"version":4,"protocol":17,"src":"10.0.0.9","dst":"10.0.0.3"},"udp":{"src_port":5000,"dst_port":20000}}
{"timestamp":0.4,"length":1450,"ip":{"version":4,"protocol":17,"src":"10.0.0.9","dst":"10.0.0.3"},"udp":{"src_port":5000,"dst_port":20000}}
"#;

fn writer() -> OutputWriter {
    OutputWriter::new(OutputFormat::Json)
}

fn training_rows() -> Vec<WindowSample> {
    (0..64u64)
        .map(|i| WindowSample {
            packet_size: 120 + i % 10,
            inter_arrival_time: 0.2,
            protocol_type: 6,
            port_number: 502,
            packet_count: 2,
            byte_count: 250 + i % 8,
            flow_duration: 0.2,
            tcp_flags: 24,
            tcp_window_size: 8192,
            payload_length: 12,
        })
        .collect()
}

fn train_args(dir: &Path) -> TrainArgs {
    TrainArgs {
        input: dir.join("rows.json"),
        output: dir.join("model.json"),
        contamination: Some(0.1),
        n_estimators: Some(20),
        max_samples: Some(32),
        seed: Some(11),
    }
}

fn replay_args(dir: &Path) -> ReplayArgs {
    ReplayArgs {
        input: dir.join("packets.jsonl"),
        model: Some(dir.join("model.json")),
        batch_size: Some(2),
        batch_timeout: None,
        output: Some(dir.join("out").join("results.jsonl")),
        pace: false,
        fail_on_anomaly: false,
    }
}

/// Write rows and packets into `dir` and train a model there.
async fn prepare(dir: &Path) -> PathBuf {
    let rows = serde_json::to_string(&training_rows()).unwrap();
    tokio::fs::write(dir.join("rows.json"), rows).await.unwrap();
    tokio::fs::write(dir.join("packets.jsonl"), REPLAY)
        .await
        .unwrap();

    let config_path = dir.join("icsguard.toml");
    train::execute(train_args(dir), &config_path, &writer())
        .await
        .expect("training should succeed");
    config_path
}

async fn read_results(path: &Path) -> Vec<serde_json::Value> {
    tokio::fs::read_to_string(path)
        .await
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_train_writes_loadable_model() {
    // Given: A rows file and no config file
    let dir = TempDir::new().unwrap();

    // When: Training with explicit parameters
    prepare(dir.path()).await;

    // Then: The saved model carries those parameters
    let model = Model::load(dir.path().join("model.json")).await.unwrap();
    assert_eq!(model.training_samples(), 64);
    assert_eq!(model.params().n_estimators, 20);
    assert_eq!(model.params().random_seed, 11);
    assert_eq!(model.feature_names().len(), 10);
}

#[tokio::test]
async fn test_train_missing_column_is_model_error() {
    // Given: Rows that lack most feature columns
    let dir = TempDir::new().unwrap();
    tokio::fs::write(
        dir.path().join("rows.json"),
        r#"[{"packet_size": 60}, {"packet_size": 70}]"#,
    )
    .await
    .unwrap();

    // When: Training
    let err = train::execute(
        train_args(dir.path()),
        &dir.path().join("icsguard.toml"),
        &writer(),
    )
    .await
    .unwrap_err();

    // Then: Model exit code, nothing written
    assert_eq!(err.exit_code(), 3);
    assert!(!dir.path().join("model.json").exists());
}

#[tokio::test]
async fn test_train_invalid_contamination_is_config_error() {
    let dir = TempDir::new().unwrap();
    let rows = serde_json::to_string(&training_rows()).unwrap();
    tokio::fs::write(dir.path().join("rows.json"), rows)
        .await
        .unwrap();

    let mut args = train_args(dir.path());
    args.contamination = Some(0.9);
    let err = train::execute(args, &dir.path().join("icsguard.toml"), &writer())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_replay_writes_one_line_per_window() {
    // Given: A trained model and 4 IP packets + 1 non-IP packet
    let dir = TempDir::new().unwrap();
    let config_path = prepare(dir.path()).await;

    // When: Replaying with batch_size 2
    replay::execute(replay_args(dir.path()), &config_path, &writer())
        .await
        .expect("replay should succeed");

    // Then: Windows [120,130] and [1400,1450]
    let results = read_results(&dir.path().join("out").join("results.jsonl")).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["features"]["byte_count"], 250);
    assert_eq!(results[0]["features"]["port_number"], 502);
    assert_eq!(results[1]["features"]["byte_count"], 2850);
    assert_eq!(results[1]["features"]["protocol_type"], 17);
    assert!(results.iter().all(|r| r["is_anomaly"].is_boolean()));
}

#[tokio::test]
async fn test_replay_fail_on_anomaly_matches_results() {
    // Given: A trained model
    let dir = TempDir::new().unwrap();
    let config_path = prepare(dir.path()).await;
    let mut args = replay_args(dir.path());
    args.fail_on_anomaly = true;

    // When: Replaying with --fail-on-anomaly
    let outcome = replay::execute(args, &config_path, &writer()).await;

    // Then: The exit status agrees with the anomalies in the result file
    let results = read_results(&dir.path().join("out").join("results.jsonl")).await;
    let anomalies = results.iter().filter(|r| r["is_anomaly"] == true).count() as u64;
    match outcome {
        Ok(()) => assert_eq!(anomalies, 0),
        Err(CliError::AnomaliesDetected(n)) => {
            assert_eq!(n, anomalies);
            assert!(n > 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_replay_missing_model_exit_code() {
    let dir = TempDir::new().unwrap();
    tokio::fs::write(dir.path().join("packets.jsonl"), REPLAY)
        .await
        .unwrap();

    let err = replay::execute(
        replay_args(dir.path()),
        &dir.path().join("icsguard.toml"),
        &writer(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_replay_missing_input_exit_code() {
    let dir = TempDir::new().unwrap();
    let config_path = prepare(dir.path()).await;
    let mut args = replay_args(dir.path());
    args.input = dir.path().join("absent.jsonl");

    let err = replay::execute(args, &config_path, &writer())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 5);
}

#[tokio::test]
async fn test_model_inspect_uses_config_model_path() {
    // Given: A config whose detector.model_path points to the trained model
    let dir = TempDir::new().unwrap();
    let config_path = prepare(dir.path()).await;
    let model_path = dir.path().join("model.json");
    tokio::fs::write(
        &config_path,
        format!("[detector]\nmodel_path = {:?}\n", model_path.display().to_string()),
    )
    .await
    .unwrap();

    // When: Inspecting without a path
    let args = ModelArgs {
        action: ModelAction::Inspect { path: None },
    };
    let result = model::execute(args, &config_path, &writer()).await;

    // Then: The configured model is found
    assert!(result.is_ok(), "inspect failed: {:?}", result);
}
