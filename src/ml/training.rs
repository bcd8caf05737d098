use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use serde::{Deserialize, Serialize};

use super::reinforce::PolicyGradientLearner;
use super::value::ValueLearner;
use crate::action::Action;
use crate::config::LearnerConfig;
use crate::error::EngineError;
use crate::state::Transition;

pub type InferenceBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<InferenceBackend>;

/// Added to the standard deviation when normalizing returns.
pub const RETURN_EPSILON: f32 = 1.0e-8;

/// Learning strategy behind a [`Learner`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    PolicyGradient,
    ValueReplay,
}

/// Whether an episode contributes to learning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EpisodeMode {
    Train,
    /// Acts without recording, updating or decaying exploration.
    Evaluate,
}

/// Summary of the parameter updates performed for one episode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateReport {
    /// Number of parameter updates applied.
    pub updates: usize,
    /// Mean loss over those updates, `None` when nothing was updated.
    pub loss: Option<f32>,
}

/// A policy together with the rule that improves it from experience.
///
/// The trainer calls `select_action` and `record` once per environment step and
/// `finish_episode` once per episode; each strategy decides whether it learns
/// per step or per episode.
pub trait Learner: Send {
    fn kind(&self) -> LearnerKind;

    fn observation_len(&self) -> usize;

    fn hidden_size(&self) -> usize;

    /// Raw network outputs (logits or action values).
    fn predict(&self, observation: &[f32]) -> Vec<f32>;

    fn select_action(&mut self, observation: &[f32], mode: EpisodeMode) -> Action;

    fn record(&mut self, transition: Transition, mode: EpisodeMode);

    fn finish_episode(&mut self, mode: EpisodeMode) -> UpdateReport;

    /// Current exploration rate for strategies that use one.
    fn epsilon(&self) -> Option<f32> {
        None
    }

    fn export_weights(&self) -> Result<Vec<u8>, EngineError>;

    fn import_weights(&mut self, bytes: Vec<u8>) -> Result<(), EngineError>;
}

/// Builds the learner selected by `config` for observations of `observation_len`.
pub fn build_learner(config: &LearnerConfig, observation_len: usize) -> Box<dyn Learner> {
    match config {
        LearnerConfig::PolicyGradient(config) => Box::new(
            PolicyGradientLearner::<TrainBackend>::new(config.clone(), observation_len),
        ),
        LearnerConfig::ValueReplay(config) => Box::new(ValueLearner::<InferenceBackend>::new(
            config.clone(),
            observation_len,
        )),
    }
}

/// Discounted return of every step: `R_t = r_t + gamma * R_{t+1}`.
pub fn discounted_returns(rewards: &[f32], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0; rewards.len()];
    let mut running = 0.0;
    for (index, reward) in rewards.iter().enumerate().rev() {
        running = reward + gamma * running;
        returns[index] = running;
    }
    returns
}

/// Shifts `returns` to zero mean and unit (population) standard deviation.
///
/// Returns `None` for an empty sequence or one without variance, in which
/// case there is no learning signal.
pub fn normalize_returns(returns: &[f32]) -> Option<Vec<f32>> {
    if returns.is_empty() {
        return None;
    }
    let count = returns.len() as f32;
    let mean = returns.iter().sum::<f32>() / count;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / count;
    let std = variance.sqrt();
    if !std.is_finite() || std <= f32::EPSILON * mean.abs().max(1.0) {
        return None;
    }
    Some(
        returns
            .iter()
            .map(|r| (r - mean) / (std + RETURN_EPSILON))
            .collect(),
    )
}
