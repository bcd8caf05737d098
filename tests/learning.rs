use std::sync::atomic::AtomicBool;

use tempdir::TempDir;

use arenabot::config::{
    EngineConfig, LearnerConfig, PolicyGradientConfig, StoreConfig, TrainerConfig,
    ValueReplayConfig,
};
use arenabot::ml::{ReplayBuffer, build_learner, discounted_returns};
use arenabot::persist::ModelStore;
use arenabot::{Action, EngineError, EpisodeMode, LearnerKind, Trainer, Transition};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn short_episodes(mut config: EngineConfig, max_steps: usize) -> EngineConfig {
    config.trainer = TrainerConfig {
        max_steps,
        ..TrainerConfig::default()
    };
    config
}

#[test]
fn returns_for_constant_rewards() {
    let returns = discounted_returns(&[1.0, 1.0, 1.0], 0.99);
    assert!((returns[0] - 2.9701).abs() < 1e-5);
    assert!((returns[1] - 1.99).abs() < 1e-6);
    assert!((returns[2] - 1.0).abs() < 1e-6);
}

#[test]
fn replay_buffer_is_bounded_fifo() {
    let mut buffer = ReplayBuffer::new(2000);
    for step in 0..2001 {
        buffer.push(Transition {
            observation: vec![step as f32],
            action: Action::new(step % 4).expect("action"),
            reward: 0.0,
            next_observation: vec![step as f32 + 1.0],
            done: false,
        });
        assert!(buffer.len() <= 2000);
    }
    assert_eq!(buffer.iter().next().map(|t| t.observation[0]), Some(1.0));
}

#[test]
fn epsilon_schedule_follows_training_episodes() {
    let mut learner = build_learner(&LearnerConfig::ValueReplay(ValueReplayConfig::default()), 4);
    assert_eq!(learner.kind(), LearnerKind::ValueReplay);
    let mut expected = 1.0f32;
    for _ in 0..10 {
        learner.finish_episode(EpisodeMode::Train);
        expected *= 0.995;
        learner.finish_episode(EpisodeMode::Evaluate);
    }
    assert!((learner.epsilon().expect("epsilon") - expected).abs() < 1e-5);

    for _ in 0..2000 {
        learner.finish_episode(EpisodeMode::Train);
    }
    assert_eq!(learner.epsilon(), Some(0.01));
}

#[test]
fn policy_gradient_has_no_epsilon() {
    let learner = build_learner(&LearnerConfig::PolicyGradient(PolicyGradientConfig::default()), 8);
    assert_eq!(learner.kind(), LearnerKind::PolicyGradient);
    assert_eq!(learner.epsilon(), None);
}

#[test]
fn both_variants_train_for_a_few_episodes() {
    init();
    let stop = AtomicBool::new(false);
    for config in [EngineConfig::default(), EngineConfig::dodge()] {
        let mut trainer = Trainer::from_config(&short_episodes(config, 60));
        let summaries = trainer.train(5, &stop);
        assert_eq!(summaries.len(), 5);
        assert_eq!(trainer.episodes(), 5);
        assert_eq!(trainer.history().len(), 5);
        for summary in &summaries {
            assert!(summary.steps <= 60);
            assert!(summary.reward.is_finite());
            assert!(!summary.interrupted);
        }
    }
}

#[test]
fn checkpoint_restores_weights_and_episode_count() {
    init();
    let dir = TempDir::new("arenabot-learning").expect("tempdir");
    let store = ModelStore::new(StoreConfig::in_dir(dir.path()));
    let config = short_episodes(EngineConfig::dodge(), 40);
    let stop = AtomicBool::new(false);

    let mut source = Trainer::from_config(&config);
    source.train(3, &stop);
    let path = store.save_model(&source, None).expect("save");
    assert!(path.exists());

    let mut target = Trainer::from_config(&config);
    store.load_model(&mut target, None).expect("load");
    assert_eq!(target.episodes(), 3);
    let observation = [0.1, -0.2, 0.3, 0.4];
    assert_eq!(
        source.learner().predict(&observation),
        target.learner().predict(&observation)
    );
}

#[test]
fn loading_a_missing_checkpoint_is_not_found() {
    let dir = TempDir::new("arenabot-missing").expect("tempdir");
    let store = ModelStore::new(StoreConfig::in_dir(dir.path()));
    let mut trainer = Trainer::from_config(&EngineConfig::default());
    let err = store.load_model(&mut trainer, None).expect_err("missing");
    assert!(matches!(err, EngineError::NotFound(_)));
}
