//! Episode rollout on top of an [`Environment`] and a [`Learner`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, TrainerConfig};
use crate::env::{Environment, build_env};
use crate::ml::{EpisodeMode, Learner, UpdateReport, build_learner};
use crate::state::{EpisodeOutcome, Transition};

/// Bounded FIFO of per-episode total rewards.
#[derive(Clone, Debug)]
pub struct RewardHistory {
    capacity: usize,
    rewards: VecDeque<f32>,
}

impl RewardHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rewards: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, reward: f32) {
        if self.capacity == 0 {
            return;
        }
        if self.rewards.len() == self.capacity {
            self.rewards.pop_front();
        }
        self.rewards.push_back(reward);
    }

    /// Mean of the retained rewards, `0.0` when empty.
    pub fn average(&self) -> f32 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        self.rewards.iter().sum::<f32>() / self.rewards.len() as f32
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.rewards.iter().copied()
    }
}

/// Count of finished training episodes that ended well or badly.
///
/// A hit or a defeat is a failure. Any other finished episode is a success.
/// Episodes cut short by a stop request are not tallied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub successes: u64,
    pub failures: u64,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: EpisodeOutcome) {
        match outcome {
            EpisodeOutcome::Hit | EpisodeOutcome::Defeat => self.failures += 1,
            EpisodeOutcome::Victory | EpisodeOutcome::Truncated => self.successes += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Share of successes, `0.0` before anything was tallied.
    pub fn success_rate(&self) -> f32 {
        match self.total() {
            0 => 0.0,
            total => self.successes as f32 / total as f32,
        }
    }
}

/// What happened during one episode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// 1-based count of training episodes completed so far.
    pub episode: u64,
    pub reward: f32,
    pub steps: usize,
    pub outcome: EpisodeOutcome,
    /// The stop flag cut the episode short.
    pub interrupted: bool,
    pub epsilon: Option<f32>,
    pub loss: Option<f32>,
}

/// Drives episodes of one environment with one learner.
pub struct Trainer {
    env: Box<dyn Environment>,
    learner: Box<dyn Learner>,
    config: TrainerConfig,
    history: RewardHistory,
    tally: OutcomeTally,
    episodes: u64,
}

impl Trainer {
    pub fn new(env: Box<dyn Environment>, learner: Box<dyn Learner>, config: TrainerConfig) -> Self {
        let history = RewardHistory::new(config.history_capacity);
        Self {
            env,
            learner,
            config,
            history,
            tally: OutcomeTally::default(),
            episodes: 0,
        }
    }

    /// Builds the environment and a matching learner from `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        let env = build_env(&config.env);
        let learner = build_learner(&config.learner, env.observation_len());
        Self::new(env, learner, config.trainer.clone())
    }

    pub fn env(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    pub fn learner(&self) -> &dyn Learner {
        self.learner.as_ref()
    }

    pub fn learner_mut(&mut self) -> &mut dyn Learner {
        self.learner.as_mut()
    }

    pub fn history(&self) -> &RewardHistory {
        &self.history
    }

    pub fn tally(&self) -> OutcomeTally {
        self.tally
    }

    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn set_episodes(&mut self, episodes: u64) {
        self.episodes = episodes;
    }

    /// Rolls out one episode and lets the learner update from it.
    ///
    /// The step loop ends on a terminal state, at `max_steps`, or as soon as
    /// `stop` is raised. Training episodes count toward the episode total and
    /// the reward history; evaluation episodes leave both untouched, as does a
    /// training episode stopped before its first step.
    pub fn run_episode(&mut self, mode: EpisodeMode, stop: &AtomicBool) -> EpisodeSummary {
        let mut observation = self.env.reset();
        let mut total = 0.0;
        let mut steps = 0;
        let mut interrupted = false;

        while steps < self.config.max_steps {
            if stop.load(Ordering::Relaxed) {
                interrupted = true;
                break;
            }
            let action = self.learner.select_action(&observation, mode);
            let outcome = self.env.step(action);
            total += outcome.reward;
            steps += 1;
            let done = outcome.done;
            self.learner.record(
                Transition {
                    observation,
                    action,
                    reward: outcome.reward,
                    next_observation: outcome.observation.clone(),
                    done,
                },
                mode,
            );
            observation = outcome.observation;
            if done {
                break;
            }
        }

        let empty = interrupted && steps == 0;
        let report = if empty {
            UpdateReport::default()
        } else {
            self.learner.finish_episode(mode)
        };
        let outcome = self.env.outcome();
        if mode == EpisodeMode::Train && !empty {
            self.episodes += 1;
            self.history.push(total);
            if !interrupted {
                self.tally.record(outcome);
            }
        }
        trace!(
            "episode {} finished after {steps} steps with reward {total:.3} ({} updates)",
            self.episodes, report.updates
        );
        if interrupted {
            debug!("episode interrupted by stop request after {steps} steps");
        }

        EpisodeSummary {
            episode: self.episodes,
            reward: total,
            steps,
            outcome,
            interrupted,
            epsilon: self.learner.epsilon(),
            loss: report.loss,
        }
    }

    /// Runs `count` training episodes back to back.
    pub fn train(&mut self, count: usize, stop: &AtomicBool) -> Vec<EpisodeSummary> {
        let mut summaries = Vec::with_capacity(count);
        for _ in 0..count {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            summaries.push(self.run_episode(EpisodeMode::Train, stop));
        }
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DodgeConfig, EnvConfig, ValueReplayConfig};
    use crate::env::DodgeArena;
    use crate::ml::{InferenceBackend, ValueLearner};

    fn dodge_trainer(max_steps: usize) -> Trainer {
        let env = DodgeArena::builder(DodgeConfig::default()).with_seed(3).build();
        let learner = ValueLearner::<InferenceBackend>::with_seed(ValueReplayConfig::default(), 4, 3);
        Trainer::new(
            Box::new(env),
            Box::new(learner),
            TrainerConfig {
                max_steps,
                ..TrainerConfig::default()
            },
        )
    }

    #[test]
    fn history_keeps_the_latest_hundred() {
        let mut history = RewardHistory::new(100);
        for episode in 0..150 {
            history.push(episode as f32);
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.iter().next(), Some(50.0));
        assert!((history.average() - 99.5).abs() < 1e-4);
    }

    #[test]
    fn empty_history_averages_to_zero() {
        assert_eq!(RewardHistory::new(100).average(), 0.0);
    }

    #[test]
    fn episode_respects_step_cap() {
        let mut trainer = dodge_trainer(25);
        let stop = AtomicBool::new(false);
        let summary = trainer.run_episode(EpisodeMode::Train, &stop);
        assert!(summary.steps <= 25);
        assert_eq!(summary.episode, 1);
        assert_eq!(trainer.history().len(), 1);
        assert!(summary.epsilon.is_some());
    }

    #[test]
    fn raised_stop_interrupts_immediately() {
        let mut trainer = dodge_trainer(1000);
        let stop = AtomicBool::new(true);
        let summary = trainer.run_episode(EpisodeMode::Train, &stop);
        assert!(summary.interrupted);
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.outcome, EpisodeOutcome::Truncated);
    }

    #[test]
    fn stop_before_the_first_step_is_not_counted() {
        let mut trainer = dodge_trainer(1000);
        let stop = AtomicBool::new(true);
        let summary = trainer.run_episode(EpisodeMode::Train, &stop);
        assert_eq!(summary.episode, 0);
        assert_eq!(trainer.episodes(), 0);
        assert!(trainer.history().is_empty());
        assert_eq!(trainer.tally().total(), 0);
        assert_eq!(summary.epsilon, Some(1.0));
    }

    #[test]
    fn tally_counts_hits_as_failures() {
        let mut tally = OutcomeTally::default();
        assert_eq!(tally.success_rate(), 0.0);
        for outcome in [
            EpisodeOutcome::Hit,
            EpisodeOutcome::Truncated,
            EpisodeOutcome::Victory,
            EpisodeOutcome::Defeat,
        ] {
            tally.record(outcome);
        }
        assert_eq!(tally, OutcomeTally { successes: 2, failures: 2 });
        assert_eq!(tally.success_rate(), 0.5);
    }

    #[test]
    fn finished_episodes_are_tallied() {
        let mut trainer = dodge_trainer(15);
        let stop = AtomicBool::new(false);
        trainer.train(4, &stop);
        assert_eq!(trainer.tally().total(), 4);
        assert!((0.0..=1.0).contains(&trainer.tally().success_rate()));
    }

    #[test]
    fn evaluation_leaves_counters_alone() {
        let mut trainer = dodge_trainer(10);
        let stop = AtomicBool::new(false);
        let summary = trainer.run_episode(EpisodeMode::Evaluate, &stop);
        assert_eq!(summary.episode, 0);
        assert!(trainer.history().is_empty());
        assert_eq!(summary.epsilon, Some(1.0));
    }

    #[test]
    fn builds_from_config() {
        let trainer = Trainer::from_config(&EngineConfig::dodge());
        assert_eq!(trainer.env().observation_len(), 4);
        assert_eq!(trainer.learner().observation_len(), 4);
        let trainer = Trainer::from_config(&EngineConfig {
            env: EnvConfig::default(),
            ..EngineConfig::default()
        });
        assert_eq!(trainer.learner().observation_len(), 8);
    }
}
