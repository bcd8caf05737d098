//! Arena simulators.
//!
//! An [`Environment`] knows nothing about learning: it turns an [`Action`] into
//! the next tick of the arena and reports the reward it earned.

pub mod combat;
pub mod dodge;

pub use combat::{Agent, CombatArena};
pub use dodge::DodgeArena;

use crate::action::Action;
use crate::config::EnvConfig;
use crate::state::{EpisodeOutcome, Observation, StepOutcome};

/// Single-agent view of an arena.
pub trait Environment: Send {
    /// Restores the starting layout and returns the first observation.
    fn reset(&mut self) -> Observation;

    /// Advances the arena by one tick. Once the episode is over this returns
    /// `(0, true, current observation)` and leaves the state untouched.
    fn step(&mut self, action: Action) -> StepOutcome;

    /// Observation of the current state, recomputed on every call.
    fn observation(&self) -> Observation;

    fn observation_len(&self) -> usize;

    fn is_done(&self) -> bool;

    /// Remaining health of the controlled agent.
    fn controlled_health(&self) -> f32;

    /// Terminal outcome so far; `Truncated` while the episode is running.
    fn outcome(&self) -> EpisodeOutcome;
}

/// Builds the arena selected by `config`.
pub fn build_env(config: &EnvConfig) -> Box<dyn Environment> {
    match config {
        EnvConfig::Combat(combat) => Box::new(CombatArena::new(combat.clone())),
        EnvConfig::Dodge(dodge) => Box::new(DodgeArena::new(dodge.clone())),
    }
}
