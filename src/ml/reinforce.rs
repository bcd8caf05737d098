use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};
use log::{debug, trace};
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

use super::policy::PolicyNetwork;
use super::training::{
    EpisodeMode, Learner, LearnerKind, UpdateReport, discounted_returns, normalize_returns,
};
use crate::action::{ACTION_COUNT, Action};
use crate::config::PolicyGradientConfig;
use crate::error::EngineError;
use crate::state::{Observation, Transition};

/// Adam's denominator term.
const ADAM_EPSILON: f32 = 1.0e-8;

/// One step of the current trajectory.
#[derive(Clone, Debug)]
pub struct PolicyStep {
    pub observation: Observation,
    pub action: Action,
    pub reward: f32,
}

/// Monte-Carlo policy gradient (REINFORCE) with normalized returns.
///
/// Actions are always sampled from the softmax policy; one Adam step is taken
/// per finished training episode.
pub struct PolicyGradientLearner<B: AutodiffBackend> {
    model: PolicyNetwork<B>,
    inference: PolicyNetwork<B::InnerBackend>,
    optimizer: OptimizerAdaptor<Adam, PolicyNetwork<B>, B>,
    config: PolicyGradientConfig,
    observation_len: usize,
    trajectory: Vec<PolicyStep>,
    rng: StdRng,
}

impl<B> PolicyGradientLearner<B>
where
    B: AutodiffBackend,
    B::Device: Default,
    <B::InnerBackend as Backend>::Device: Default,
{
    pub fn new(config: PolicyGradientConfig, observation_len: usize) -> Self {
        Self::with_rng(config, observation_len, StdRng::from_entropy())
    }

    pub fn with_seed(config: PolicyGradientConfig, observation_len: usize, seed: u64) -> Self {
        Self::with_rng(config, observation_len, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PolicyGradientConfig, observation_len: usize, rng: StdRng) -> Self {
        let model = PolicyNetwork::<B>::new(observation_len, config.hidden, config.init_scale);
        let inference = model.valid();
        Self {
            model,
            inference,
            optimizer: adam(),
            config,
            observation_len,
            trajectory: Vec::new(),
            rng,
        }
    }

    pub fn trajectory(&self) -> &[PolicyStep] {
        &self.trajectory
    }

    pub fn action_probabilities(&self, observation: &[f32]) -> Vec<f32> {
        self.inference.action_probabilities(observation)
    }

    fn sample(&mut self, probabilities: &[f32]) -> Action {
        match WeightedIndex::new(probabilities) {
            Ok(distribution) => {
                Action::new(distribution.sample(&mut self.rng)).unwrap_or_else(|| Action::argmax(probabilities))
            }
            Err(err) => {
                debug!("falling back to greedy action: {err}");
                Action::argmax(probabilities)
            }
        }
    }

    /// One gradient step on `-Σ log π(a_t|s_t) · G_t` over the trajectory.
    fn update(&mut self, steps: Vec<PolicyStep>) -> UpdateReport {
        let rewards: Vec<f32> = steps.iter().map(|step| step.reward).collect();
        let returns = discounted_returns(&rewards, self.config.gamma);
        let Some(normalized) = normalize_returns(&returns) else {
            trace!("skipping update for {} steps without return variance", steps.len());
            return UpdateReport::default();
        };

        let count = steps.len();
        let device = B::Device::default();
        let mut states = Vec::with_capacity(count * self.observation_len);
        let mut mask = vec![0.0f32; count * ACTION_COUNT];
        for (row, step) in steps.iter().enumerate() {
            states.extend_from_slice(&step.observation);
            mask[row * ACTION_COUNT + step.action.index()] = 1.0;
        }
        let states = Tensor::<B, 2>::from_data(
            TensorData::new(states, [count, self.observation_len]),
            &device,
        );
        let mask = Tensor::<B, 2>::from_data(TensorData::new(mask, [count, ACTION_COUNT]), &device);
        let returns = Tensor::<B, 2>::from_data(TensorData::new(normalized, [count, 1]), &device);

        let log_probs = log_softmax(self.model.forward(states), 1);
        let chosen = (log_probs * mask).sum_dim(1);
        let loss = -(chosen * returns).sum();
        let loss_value = tensor_to_f32(loss.clone());

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        let model = self.model.clone();
        self.model = self.optimizer.step(self.config.learning_rate, model, grads);
        self.inference = self.model.valid();

        UpdateReport {
            updates: 1,
            loss: Some(loss_value),
        }
    }
}

impl<B> Learner for PolicyGradientLearner<B>
where
    B: AutodiffBackend,
    B::Device: Default,
    <B::InnerBackend as Backend>::Device: Default,
{
    fn kind(&self) -> LearnerKind {
        LearnerKind::PolicyGradient
    }

    fn observation_len(&self) -> usize {
        self.observation_len
    }

    fn hidden_size(&self) -> usize {
        self.config.hidden
    }

    fn predict(&self, observation: &[f32]) -> Vec<f32> {
        self.inference.predict(observation)
    }

    fn select_action(&mut self, observation: &[f32], _mode: EpisodeMode) -> Action {
        let probabilities = self.inference.action_probabilities(observation);
        self.sample(&probabilities)
    }

    fn record(&mut self, transition: Transition, mode: EpisodeMode) {
        if mode == EpisodeMode::Evaluate {
            return;
        }
        self.trajectory.push(PolicyStep {
            observation: transition.observation,
            action: transition.action,
            reward: transition.reward,
        });
    }

    fn finish_episode(&mut self, mode: EpisodeMode) -> UpdateReport {
        let steps = std::mem::take(&mut self.trajectory);
        if mode == EpisodeMode::Evaluate || steps.is_empty() {
            return UpdateReport::default();
        }
        self.update(steps)
    }

    fn export_weights(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self.model.to_bytes()?)
    }

    fn import_weights(&mut self, bytes: Vec<u8>) -> Result<(), EngineError> {
        self.model = self.model.clone().load_bytes(bytes)?;
        self.inference = self.model.valid();
        self.optimizer = adam();
        self.trajectory.clear();
        Ok(())
    }
}

fn adam_config() -> AdamConfig {
    AdamConfig::new().with_epsilon(ADAM_EPSILON)
}

fn adam<B: AutodiffBackend>() -> OptimizerAdaptor<Adam, PolicyNetwork<B>, B> {
    adam_config().init()
}

fn tensor_to_f32<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map(|mut values| values.pop().unwrap_or_default())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::training::TrainBackend;

    fn transition(observation: Vec<f32>, action: usize, reward: f32) -> Transition {
        Transition {
            next_observation: observation.clone(),
            observation,
            action: Action::new(action).expect("action"),
            reward,
            done: false,
        }
    }

    #[test]
    fn sampled_actions_are_valid() {
        let mut learner =
            PolicyGradientLearner::<TrainBackend>::with_seed(PolicyGradientConfig::default(), 8, 7);
        for _ in 0..50 {
            let action = learner.select_action(&[0.1; 8], EpisodeMode::Train);
            assert!(action.index() < ACTION_COUNT);
        }
    }

    #[test]
    fn adam_uses_a_small_denominator_term() {
        let config = serde_json::to_value(adam_config()).expect("json");
        let epsilon = config["epsilon"].as_f64().map(|value| value as f32);
        assert_eq!(epsilon, Some(ADAM_EPSILON));
    }

    #[test]
    fn evaluation_records_nothing() {
        let mut learner =
            PolicyGradientLearner::<TrainBackend>::with_seed(PolicyGradientConfig::default(), 4, 1);
        learner.select_action(&[0.0; 4], EpisodeMode::Evaluate);
        learner.record(transition(vec![0.0; 4], 0, 1.0), EpisodeMode::Evaluate);
        assert!(learner.trajectory().is_empty());
        assert_eq!(learner.finish_episode(EpisodeMode::Evaluate), UpdateReport::default());
    }

    #[test]
    fn constant_returns_leave_weights_untouched() {
        let mut learner =
            PolicyGradientLearner::<TrainBackend>::with_seed(PolicyGradientConfig::default(), 4, 3);
        let observation = vec![0.5, -0.5, 0.25, 1.0];
        let before = learner.predict(&observation);
        learner.select_action(&observation, EpisodeMode::Train);
        learner.record(transition(observation.clone(), 1, 2.0), EpisodeMode::Train);
        let report = learner.finish_episode(EpisodeMode::Train);
        assert_eq!(report.updates, 0);
        assert_eq!(learner.predict(&observation), before);
    }

    #[test]
    fn rewarded_action_gains_probability() {
        let config = PolicyGradientConfig {
            learning_rate: 0.05,
            ..PolicyGradientConfig::default()
        };
        let mut learner = PolicyGradientLearner::<TrainBackend>::with_seed(config, 4, 5);
        let observation = vec![1.0, 0.5, -0.5, 0.25];
        let before = learner.action_probabilities(&observation)[3];
        for _ in 0..20 {
            for (action, reward) in [(3, 1.0), (0, 0.0), (1, 0.0), (3, 1.0)] {
                learner.select_action(&observation, EpisodeMode::Train);
                learner.record(transition(observation.clone(), action, reward), EpisodeMode::Train);
            }
            let report = learner.finish_episode(EpisodeMode::Train);
            assert_eq!(report.updates, 1);
            assert!(report.loss.is_some_and(f32::is_finite));
        }
        let after = learner.action_probabilities(&observation)[3];
        assert!(after > before, "expected {after} > {before}");
    }

    #[test]
    fn weights_round_trip_between_learners() {
        let source =
            PolicyGradientLearner::<TrainBackend>::with_seed(PolicyGradientConfig::default(), 8, 11);
        let mut target =
            PolicyGradientLearner::<TrainBackend>::with_seed(PolicyGradientConfig::default(), 8, 12);
        let bytes = source.export_weights().expect("export");
        target.import_weights(bytes).expect("import");
        let observation = [0.3; 8];
        assert_eq!(source.predict(&observation), target.predict(&observation));
    }
}
