//! Model checkpoints and the opaque training snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::{EngineError, Mismatch};
use crate::ml::{Learner, LearnerKind};
use crate::trainer::Trainer;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub kind: LearnerKind,
    pub observation_len: usize,
    pub hidden: usize,
    pub episodes: u64,
}

impl PolicyMetadata {
    pub fn describe(learner: &dyn Learner, episodes: u64) -> Self {
        Self {
            kind: learner.kind(),
            observation_len: learner.observation_len(),
            hidden: learner.hidden_size(),
            episodes,
        }
    }

    /// Checks that weights recorded under `self` fit `learner`.
    pub fn ensure_compatible(&self, learner: &dyn Learner) -> Result<(), Mismatch> {
        if self.kind != learner.kind() {
            return Err(Mismatch::Kind {
                expected: learner.kind(),
                found: self.kind,
            });
        }
        if self.observation_len != learner.observation_len() {
            return Err(Mismatch::ObservationLen {
                expected: learner.observation_len(),
                found: self.observation_len,
            });
        }
        if self.hidden != learner.hidden_size() {
            return Err(Mismatch::Hidden {
                expected: learner.hidden_size(),
                found: self.hidden,
            });
        }
        Ok(())
    }
}

/// Weights recorded by burn plus what is needed to check them on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyCheckpoint {
    pub metadata: PolicyMetadata,
    pub weights: Vec<u8>,
}

impl PolicyCheckpoint {
    pub fn capture(trainer: &Trainer) -> Result<Self, EngineError> {
        let learner = trainer.learner();
        Ok(Self {
            metadata: PolicyMetadata::describe(learner, trainer.episodes()),
            weights: learner.export_weights()?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let (checkpoint, _): (PolicyCheckpoint, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(checkpoint)
    }

    /// Installs the weights into `trainer` and restores its episode count.
    pub fn restore(self, trainer: &mut Trainer) -> Result<(), EngineError> {
        self.metadata
            .ensure_compatible(trainer.learner())
            .map_err(EngineError::IncompatibleModel)?;
        trainer.learner_mut().import_weights(self.weights)?;
        trainer.set_episodes(self.metadata.episodes);
        Ok(())
    }
}

/// Reads and writes files at the configured default locations unless a
/// request names its own path.
#[derive(Clone, Debug, Default)]
pub struct ModelStore {
    config: StoreConfig,
}

impl ModelStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn save_model(&self, trainer: &Trainer, path: Option<&Path>) -> Result<PathBuf, EngineError> {
        let path = path.unwrap_or(self.config.model_path.as_path()).to_path_buf();
        let bytes = PolicyCheckpoint::capture(trainer)?.to_bytes()?;
        write_file(&path, &bytes)?;
        info!("model saved to {}", path.display());
        Ok(path)
    }

    pub fn load_model(&self, trainer: &mut Trainer, path: Option<&Path>) -> Result<PathBuf, EngineError> {
        let path = path.unwrap_or(self.config.model_path.as_path()).to_path_buf();
        let bytes = read_file(&path)?;
        PolicyCheckpoint::from_bytes(&bytes)?.restore(trainer)?;
        info!("model loaded from {}", path.display());
        Ok(path)
    }

    /// Stores `blob` verbatim.
    pub fn save_training_data(&self, blob: &str) -> Result<PathBuf, EngineError> {
        let path = self.config.data_path.clone();
        write_file(&path, blob.as_bytes())?;
        info!("training data saved to {}", path.display());
        Ok(path)
    }

    pub fn load_training_data(&self) -> Result<String, EngineError> {
        let path = &self.config.data_path;
        if !path.exists() {
            return Err(EngineError::NotFound(path.clone()));
        }
        Ok(fs::read_to_string(path)?)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, EngineError> {
    if !path.exists() {
        return Err(EngineError::NotFound(path.to_path_buf()));
    }
    Ok(fs::read(path)?)
}
