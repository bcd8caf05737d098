use burn::tensor::backend::Backend;
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::policy::{PolicyNetwork, TdRule};
use super::replay::ReplayBuffer;
use super::training::{EpisodeMode, Learner, LearnerKind, UpdateReport};
use crate::action::{ACTION_COUNT, Action};
use crate::config::ValueReplayConfig;
use crate::error::EngineError;
use crate::state::Transition;

/// ε-greedy Q-learning over a replay buffer.
///
/// Every training step stores its transition and, once the buffer holds a
/// full batch, replays a random batch through the TD update.
pub struct ValueLearner<B: Backend> {
    network: PolicyNetwork<B>,
    buffer: ReplayBuffer,
    config: ValueReplayConfig,
    observation_len: usize,
    epsilon: f32,
    loss_sum: f32,
    updates: usize,
    rng: StdRng,
}

impl<B> ValueLearner<B>
where
    B: Backend,
    B::Device: Default,
{
    pub fn new(config: ValueReplayConfig, observation_len: usize) -> Self {
        Self::with_rng(config, observation_len, StdRng::from_entropy())
    }

    pub fn with_seed(config: ValueReplayConfig, observation_len: usize, seed: u64) -> Self {
        Self::with_rng(config, observation_len, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ValueReplayConfig, observation_len: usize, rng: StdRng) -> Self {
        Self {
            network: PolicyNetwork::new(observation_len, config.hidden, config.init_scale),
            buffer: ReplayBuffer::new(config.buffer_capacity),
            epsilon: config.epsilon_start,
            config,
            observation_len,
            loss_sum: 0.0,
            updates: 0,
            rng,
        }
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    fn rule(&self) -> TdRule {
        TdRule {
            learning_rate: self.config.learning_rate,
            hidden_damping: self.config.hidden_damping,
        }
    }

    /// `r` for terminal transitions, `r + γ·max_a Q(s', a)` otherwise.
    fn target(&self, transition: &Transition) -> f32 {
        if transition.done {
            return transition.reward;
        }
        let next = self
            .network
            .predict(&transition.next_observation)
            .into_iter()
            .fold(f32::NEG_INFINITY, f32::max);
        let next = if next.is_finite() { next } else { 0.0 };
        transition.reward + self.config.gamma * next
    }

    /// Replays one batch. Returns the mean squared TD error, or `None` while
    /// the buffer is smaller than a batch.
    fn replay(&mut self) -> Option<f32> {
        let batch: Vec<Transition> = self
            .buffer
            .sample(self.config.batch_size, &mut self.rng)
            .into_iter()
            .cloned()
            .collect();
        if batch.is_empty() {
            return None;
        }
        let rule = self.rule();
        let mut squared = 0.0;
        for transition in &batch {
            let target = self.target(transition);
            let current = self
                .network
                .predict(&transition.observation)
                .get(transition.action.index())
                .copied()
                .unwrap_or_default();
            let error = target - current;
            squared += error * error;
            self.network = self.network.clone().apply_td_error(
                &transition.observation,
                transition.action,
                error,
                rule,
            );
        }
        Some(squared / batch.len() as f32)
    }
}

impl<B> Learner for ValueLearner<B>
where
    B: Backend,
    B::Device: Default,
{
    fn kind(&self) -> LearnerKind {
        LearnerKind::ValueReplay
    }

    fn observation_len(&self) -> usize {
        self.observation_len
    }

    fn hidden_size(&self) -> usize {
        self.config.hidden
    }

    fn predict(&self, observation: &[f32]) -> Vec<f32> {
        self.network.predict(observation)
    }

    fn select_action(&mut self, observation: &[f32], mode: EpisodeMode) -> Action {
        if mode == EpisodeMode::Train && self.rng.gen_range(0.0f32..1.0) < self.epsilon {
            if let Some(action) = Action::new(self.rng.gen_range(0..ACTION_COUNT)) {
                return action;
            }
        }
        Action::argmax(&self.network.predict(observation))
    }

    fn record(&mut self, transition: Transition, mode: EpisodeMode) {
        if mode == EpisodeMode::Evaluate {
            return;
        }
        self.buffer.push(transition);
        if let Some(loss) = self.replay() {
            self.loss_sum += loss;
            self.updates += 1;
        }
    }

    fn finish_episode(&mut self, mode: EpisodeMode) -> UpdateReport {
        let report = UpdateReport {
            updates: self.updates,
            loss: (self.updates > 0).then(|| self.loss_sum / self.updates as f32),
        };
        self.loss_sum = 0.0;
        self.updates = 0;
        if mode == EpisodeMode::Train {
            self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
            trace!("epsilon decayed to {:.4}", self.epsilon);
        }
        report
    }

    fn epsilon(&self) -> Option<f32> {
        Some(self.epsilon)
    }

    fn export_weights(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self.network.to_bytes()?)
    }

    fn import_weights(&mut self, bytes: Vec<u8>) -> Result<(), EngineError> {
        self.network = self.network.clone().load_bytes(bytes)?;
        Ok(())
    }
}
