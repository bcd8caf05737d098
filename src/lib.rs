//! Online reinforcement learning engine for a small 2D combat/evasion arena.

pub mod action;
pub mod api;
pub mod config;
pub mod env;
pub mod error;
pub mod ml;
pub mod observer;
pub mod persist;
pub mod session;
pub mod state;
pub mod trainer;

pub use crate::action::{ACTION_COUNT, Action, CombatAction, DodgeAction};
pub use crate::api::{Command, Engine, Reply};
pub use crate::config::{EngineConfig, EnvConfig, LearnerConfig};
pub use crate::env::{CombatArena, DodgeArena, Environment};
pub use crate::error::{EngineError, Mismatch};
pub use crate::ml::{EpisodeMode, Learner, LearnerKind};
pub use crate::observer::{ChannelObserver, NoopObserver, ProgressEvent, ProgressObserver};
pub use crate::persist::{ModelStore, PolicyCheckpoint};
pub use crate::session::{SessionStatus, TrainingSession};
pub use crate::state::{EpisodeOutcome, Observation, Point, StepOutcome, Transition};
pub use crate::trainer::{EpisodeSummary, OutcomeTally, RewardHistory, Trainer};
