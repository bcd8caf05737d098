//! Tunable constants for the arenas, learners and session lifecycle.
//!
//! Every struct implements `Default` with the values the engine was tuned with,
//! and deserializes with `#[serde(default)]` so a JSON config file only needs
//! the fields it overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Constants of the two-agent combat arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub width: f32,
    pub height: f32,
    /// Minimum distance kept from the top and bottom edges.
    pub edge_margin: f32,
    pub max_health: f32,
    pub speed: f32,
    pub attack_range: f32,
    /// Range within which the opponent heuristic fires back.
    pub detection_range: f32,
    /// `Approach` stops closing in once the horizontal gap is this small.
    pub approach_stop: f32,
    pub cooldown_ticks: u32,
    pub projectile_speed: f32,
    pub hit_radius: f32,
    pub damage: f32,
    /// Per-tick probability of a random vertical drift by the opponent.
    pub drift_chance: f64,
    /// Full width of the uniform drift band.
    pub drift_span: f32,
    /// Per-tick probability that the opponent fires when able.
    pub attack_chance: f64,
    /// Normalizer applied to the distance feature.
    pub distance_scale: f32,
    pub approach_reward: f32,
    pub cast_reward: f32,
    pub miss_penalty: f32,
    pub hit_reward: f32,
    pub terminal_reward: f32,
    pub tick_reward: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 400.0,
            edge_margin: 30.0,
            max_health: 100.0,
            speed: 2.5,
            attack_range: 60.0,
            detection_range: 200.0,
            approach_stop: 70.0,
            cooldown_ticks: 30,
            projectile_speed: 5.0,
            hit_radius: 20.0,
            damage: 20.0,
            drift_chance: 0.02,
            drift_span: 10.0,
            attack_chance: 0.05,
            distance_scale: 500.0,
            approach_reward: 0.01,
            cast_reward: 0.1,
            miss_penalty: 0.05,
            hit_reward: 1.0,
            terminal_reward: 5.0,
            tick_reward: 0.005,
        }
    }
}

/// Constants of the single-agent hazard dodging arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DodgeConfig {
    pub width: f32,
    pub height: f32,
    pub agent_size: f32,
    pub agent_speed: f32,
    pub hazard_size: f32,
    /// Hazards further than this outside the arena are culled.
    pub cull_margin: f32,
    pub spawn_interval: u64,
    pub max_hazards: usize,
    pub hazard_min_speed: f32,
    pub hazard_speed_jitter: f32,
    pub hazard_lateral_span: f32,
    /// Normalizer applied to hazard velocity features.
    pub velocity_scale: f32,
    pub survival_reward: f32,
    /// Distance at which the proximity bonus saturates.
    pub distance_cap: f32,
    pub hit_penalty: f32,
}

impl Default for DodgeConfig {
    fn default() -> Self {
        Self {
            width: 840.0,
            height: 600.0,
            agent_size: 20.0,
            agent_speed: 4.0,
            hazard_size: 8.0,
            cull_margin: 50.0,
            spawn_interval: 60,
            max_hazards: 8,
            hazard_min_speed: 2.0,
            hazard_speed_jitter: 2.0,
            hazard_lateral_span: 4.0,
            velocity_scale: 5.0,
            survival_reward: 0.1,
            distance_cap: 1000.0,
            hit_penalty: 10.0,
        }
    }
}

/// Arena variant driven by the trainer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvConfig {
    Combat(CombatConfig),
    Dodge(DodgeConfig),
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig::Combat(CombatConfig::default())
    }
}

/// REINFORCE hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyGradientConfig {
    pub hidden: usize,
    pub learning_rate: f64,
    pub gamma: f32,
    pub init_scale: f32,
}

impl Default for PolicyGradientConfig {
    fn default() -> Self {
        Self {
            hidden: 16,
            learning_rate: 1.0e-3,
            gamma: 0.99,
            init_scale: 0.25,
        }
    }
}

/// Q-learning with experience replay hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueReplayConfig {
    pub hidden: usize,
    pub learning_rate: f32,
    pub gamma: f32,
    pub init_scale: f32,
    pub epsilon_start: f32,
    pub epsilon_decay: f32,
    pub epsilon_min: f32,
    pub buffer_capacity: usize,
    pub batch_size: usize,
    /// Extra factor applied to input-layer weight deltas.
    pub hidden_damping: f32,
}

impl Default for ValueReplayConfig {
    fn default() -> Self {
        Self {
            hidden: 8,
            learning_rate: 1.0e-3,
            gamma: 0.95,
            init_scale: 0.25,
            epsilon_start: 1.0,
            epsilon_decay: 0.995,
            epsilon_min: 0.01,
            buffer_capacity: 2000,
            batch_size: 32,
            hidden_damping: 0.1,
        }
    }
}

/// Learning strategy used by the trainer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearnerConfig {
    PolicyGradient(PolicyGradientConfig),
    ValueReplay(ValueReplayConfig),
}

impl Default for LearnerConfig {
    fn default() -> Self {
        LearnerConfig::PolicyGradient(PolicyGradientConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Step cap per episode.
    pub max_steps: usize,
    /// Number of episode rewards kept for the moving average.
    pub history_capacity: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            history_capacity: 100,
        }
    }
}

/// Timing of the background training loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub stop_timeout_ms: u64,
    pub pause_slices: u32,
    pub pause_slice_ms: u64,
}

impl SessionConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn pause_slice(&self) -> Duration {
        Duration::from_millis(self.pause_slice_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 5_000,
            pause_slices: 5,
            pause_slice_ms: 100,
        }
    }
}

/// Default locations of the model checkpoint and the training snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub model_path: PathBuf,
    pub data_path: PathBuf,
}

impl StoreConfig {
    /// Places both files inside `dir` using the default file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let defaults = Self::default();
        Self {
            model_path: dir.as_ref().join(defaults.model_path),
            data_path: dir.as_ref().join(defaults.data_path),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model.bin"),
            data_path: PathBuf::from("training_data.json"),
        }
    }
}

/// Full engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub env: EnvConfig,
    pub learner: LearnerConfig,
    pub trainer: TrainerConfig,
    pub session: SessionConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Pairs the dodge arena with the replay learner.
    pub fn dodge() -> Self {
        Self {
            env: EnvConfig::Dodge(DodgeConfig::default()),
            learner: LearnerConfig::ValueReplay(ValueReplayConfig::default()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.trainer.max_steps == 0 {
            return Err(EngineError::InvalidConfiguration(
                "max steps must be positive",
            ));
        }
        if self.trainer.history_capacity == 0 {
            return Err(EngineError::InvalidConfiguration(
                "history capacity must be positive",
            ));
        }
        match &self.learner {
            LearnerConfig::PolicyGradient(config) => {
                if config.hidden == 0 {
                    return Err(EngineError::InvalidConfiguration(
                        "hidden size must be positive",
                    ));
                }
                if config.learning_rate <= 0.0 {
                    return Err(EngineError::InvalidConfiguration(
                        "learning rate must be positive",
                    ));
                }
            }
            LearnerConfig::ValueReplay(config) => {
                if config.hidden == 0 {
                    return Err(EngineError::InvalidConfiguration(
                        "hidden size must be positive",
                    ));
                }
                if config.batch_size == 0 || config.buffer_capacity < config.batch_size {
                    return Err(EngineError::InvalidConfiguration(
                        "replay buffer must hold at least one batch",
                    ));
                }
                if !(0.0..=1.0).contains(&config.epsilon_min)
                    || !(0.0..=1.0).contains(&config.epsilon_start)
                {
                    return Err(EngineError::InvalidConfiguration(
                        "epsilon must lie in [0, 1]",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "env": { "kind": "combat", "drift_chance": 0.0 },
            "learner": { "kind": "value_replay", "batch_size": 4 }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).expect("config");
        match &config.env {
            EnvConfig::Combat(combat) => {
                assert_eq!(combat.drift_chance, 0.0);
                assert_eq!(combat.attack_chance, 0.05);
            }
            other => panic!("unexpected env {other:?}"),
        }
        match &config.learner {
            LearnerConfig::ValueReplay(value) => {
                assert_eq!(value.batch_size, 4);
                assert_eq!(value.buffer_capacity, 2000);
            }
            other => panic!("unexpected learner {other:?}"),
        }
        assert_eq!(config.trainer.max_steps, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_undersized_buffer() {
        let mut config = EngineConfig::dodge();
        if let LearnerConfig::ValueReplay(value) = &mut config.learner {
            value.buffer_capacity = 8;
        }
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }
}
