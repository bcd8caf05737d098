use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempdir::TempDir;

use arenabot::config::{EngineConfig, SessionConfig, StoreConfig, TrainerConfig};
use arenabot::{Command, Engine, NoopObserver};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine(dir: &TempDir) -> Engine {
    let config = EngineConfig {
        trainer: TrainerConfig {
            max_steps: 40,
            ..TrainerConfig::default()
        },
        session: SessionConfig {
            stop_timeout_ms: 5_000,
            pause_slices: 1,
            pause_slice_ms: 5,
        },
        store: StoreConfig::in_dir(dir.path()),
        ..EngineConfig::default()
    };
    Engine::new(config, Arc::new(NoopObserver)).expect("engine")
}

fn call(engine: &mut Engine, request: &str) -> Value {
    serde_json::from_str(&engine.dispatch_json(request)).expect("reply is json")
}

#[test]
fn ping_answers_pong() {
    let dir = TempDir::new("arenabot-ping").expect("tempdir");
    let mut engine = engine(&dir);
    let reply = call(&mut engine, r#"{"command":"ping"}"#);
    assert_eq!(reply, serde_json::json!({"ok": true, "data": "pong"}));
}

#[test]
fn malformed_requests_are_reported() {
    let dir = TempDir::new("arenabot-malformed").expect("tempdir");
    let mut engine = engine(&dir);
    for request in ["not json", r#"{"command":"fly"}"#, r#"{"command":"save_training_data"}"#] {
        let reply = call(&mut engine, request);
        assert_eq!(reply["ok"], false);
        assert!(reply["error"].is_string());
    }
}

#[test]
fn status_reports_idle_engine() {
    let dir = TempDir::new("arenabot-status").expect("tempdir");
    let mut engine = engine(&dir);
    let reply = call(&mut engine, r#"{"command":"get_status"}"#);
    assert_eq!(reply["running"], false);
    assert_eq!(reply["episode"], 0);
    assert_eq!(reply["last_reward"], 0.0);
    assert_eq!(reply["avg_reward"], 0.0);
    assert_eq!(reply["success_rate"], 0.0);
}

#[test]
fn lifecycle_commands_report_usage_errors() {
    init();
    let dir = TempDir::new("arenabot-lifecycle").expect("tempdir");
    let mut engine = engine(&dir);

    assert_eq!(engine.dispatch(Command::StopTraining).ok, false);
    assert!(engine.dispatch(Command::StartTraining).ok);
    let second = engine.dispatch(Command::StartTraining);
    assert!(!second.ok);
    assert_eq!(second.error.as_deref(), Some("training already running"));

    let save = engine.dispatch(Command::SaveModel { path: None });
    assert!(!save.ok);

    assert!(engine.dispatch(Command::StopTraining).ok);
    let status = engine.dispatch(Command::GetStatus);
    assert_eq!(status.running, Some(false));
}

#[test]
fn model_round_trip_through_commands() {
    init();
    let dir = TempDir::new("arenabot-model").expect("tempdir");
    let mut engine = engine(&dir);

    let missing = call(&mut engine, r#"{"command":"load_model"}"#);
    assert_eq!(missing["ok"], false);
    assert!(
        missing["error"]
            .as_str()
            .is_some_and(|error| error.starts_with("file not found"))
    );

    let saved = engine.dispatch(Command::SaveModel { path: None });
    assert!(saved.ok);
    let path = saved.path.expect("saved path");
    assert_eq!(path, dir.path().join("model.bin"));
    assert!(path.exists());

    let custom = dir.path().join("nested").join("policy.bin");
    let reply = engine.dispatch(Command::SaveModel {
        path: Some(custom.clone()),
    });
    assert!(reply.ok);
    assert!(custom.exists());

    let loaded = engine.dispatch(Command::LoadModel { path: Some(custom) });
    assert!(loaded.ok, "{:?}", loaded.error);
}

#[test]
fn training_data_passes_through_unchanged() {
    let dir = TempDir::new("arenabot-data").expect("tempdir");
    let mut engine = engine(&dir);

    let missing = engine.dispatch(Command::LoadTrainingData);
    assert!(!missing.ok);

    let blob = r#"{"episodes":[1,2,3],"note":"opaque"}"#;
    let saved = engine.dispatch(Command::SaveTrainingData {
        blob: blob.to_string(),
    });
    assert!(saved.ok);
    assert_eq!(saved.path, Some(dir.path().join("training_data.json")));

    let loaded = engine.dispatch(Command::LoadTrainingData);
    assert!(loaded.ok);
    assert_eq!(loaded.data.as_deref(), Some(blob));
}

#[test]
fn reset_starts_training_over() {
    init();
    let dir = TempDir::new("arenabot-reset").expect("tempdir");
    let mut engine = engine(&dir);

    assert!(engine.dispatch(Command::StartTraining).ok);
    let busy = engine.dispatch(Command::ResetTraining);
    assert!(!busy.ok);
    assert_eq!(
        busy.error.as_deref(),
        Some("operation unavailable while training is running")
    );

    let deadline = Instant::now() + Duration::from_secs(30);
    while engine.dispatch(Command::GetStatus).episode < Some(2) {
        assert!(Instant::now() < deadline, "episodes stalled");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(engine.dispatch(Command::StopTraining).ok);
    let trained = engine.dispatch(Command::GetStatus);
    assert!(trained.success_rate.is_some_and(|rate| (0.0..=1.0).contains(&rate)));

    let reply = call(&mut engine, r#"{"command":"reset_training"}"#);
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["running"], false);
    assert_eq!(reply["episode"], 0);
    assert_eq!(reply["avg_reward"], 0.0);
    assert_eq!(reply["success_rate"], 0.0);
}
