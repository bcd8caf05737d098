//! Fixed command set behind a single dispatch entry point.
//!
//! Transport is left to the host: [`Engine::dispatch`] takes typed commands and
//! [`Engine::dispatch_json`] takes one `{"command": ...}` object per call.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::observer::ProgressObserver;
use crate::persist::ModelStore;
use crate::session::{SessionStatus, TrainingSession};
use crate::trainer::Trainer;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    StartTraining,
    StopTraining,
    GetStatus,
    SaveModel {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    LoadModel {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    SaveTrainingData {
        blob: String,
    },
    LoadTrainingData,
    ResetTraining,
    Ping,
}

/// Structured result of a command. Fields that do not apply are omitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reward: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_reward: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f32>,
}

impl Reply {
    pub fn success() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn failure(err: &EngineError) -> Self {
        Self {
            ok: false,
            error: Some(err.to_string()),
            ..Self::default()
        }
    }

    fn with_path(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            ..Self::success()
        }
    }

    fn with_data(data: String) -> Self {
        Self {
            data: Some(data),
            ..Self::success()
        }
    }

    fn status(status: SessionStatus) -> Self {
        Self {
            running: Some(status.running),
            episode: Some(status.episode),
            last_reward: Some(status.last_reward),
            avg_reward: Some(status.avg_reward),
            success_rate: Some(status.success_rate),
            ..Self::success()
        }
    }
}

impl From<Result<Reply, EngineError>> for Reply {
    fn from(result: Result<Reply, EngineError>) -> Self {
        result.unwrap_or_else(|err| Reply::failure(&err))
    }
}

/// The training engine as seen by its host.
pub struct Engine {
    config: EngineConfig,
    session: TrainingSession,
    store: ModelStore,
}

impl Engine {
    pub fn new(config: EngineConfig, observer: Arc<dyn ProgressObserver>) -> Result<Self, EngineError> {
        config.validate()?;
        let trainer = Trainer::from_config(&config);
        Ok(Self {
            session: TrainingSession::new(trainer, config.session.clone(), observer),
            store: ModelStore::new(config.store.clone()),
            config,
        })
    }

    pub fn session(&self) -> &TrainingSession {
        &self.session
    }

    pub fn dispatch(&mut self, command: Command) -> Reply {
        debug!("dispatching {command:?}");
        let reply: Reply = self.execute(command).into();
        if let Some(error) = &reply.error {
            warn!("command failed: {error}");
        }
        reply
    }

    /// Parses `request`, dispatches it and serializes the reply.
    pub fn dispatch_json(&mut self, request: &str) -> String {
        let reply = match serde_json::from_str::<Command>(request) {
            Ok(command) => self.dispatch(command),
            Err(err) => Reply::failure(&EngineError::Json(err)),
        };
        serde_json::to_string(&reply)
            .unwrap_or_else(|err| format!("{{\"ok\":false,\"error\":{:?}}}", err.to_string()))
    }

    fn execute(&mut self, command: Command) -> Result<Reply, EngineError> {
        match command {
            Command::StartTraining => {
                self.session.start()?;
                Ok(Reply::success())
            }
            Command::StopTraining => {
                self.session.stop()?;
                Ok(Reply::success())
            }
            Command::GetStatus => Ok(Reply::status(self.session.status())),
            Command::SaveModel { path } => {
                let store = &self.store;
                let path = self
                    .session
                    .with_trainer(|trainer| store.save_model(trainer, path.as_deref()))?;
                Ok(Reply::with_path(path))
            }
            Command::LoadModel { path } => {
                let store = &self.store;
                let path = self
                    .session
                    .with_trainer(|trainer| store.load_model(trainer, path.as_deref()))?;
                Ok(Reply::with_path(path))
            }
            Command::SaveTrainingData { blob } => {
                let path = self.store.save_training_data(&blob)?;
                Ok(Reply::with_path(path))
            }
            Command::LoadTrainingData => Ok(Reply::with_data(self.store.load_training_data()?)),
            Command::ResetTraining => {
                self.session
                    .replace_trainer(Trainer::from_config(&self.config))?;
                Ok(Reply::status(self.session.status()))
            }
            Command::Ping => Ok(Reply::with_data("pong".to_string())),
        }
    }
}
