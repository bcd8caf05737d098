pub mod policy;
pub mod reinforce;
pub mod replay;
pub mod training;
pub mod value;

pub use policy::{DEFAULT_INIT_SCALE, PolicyNetwork, TdRule};
pub use reinforce::{PolicyGradientLearner, PolicyStep};
pub use replay::ReplayBuffer;
pub use training::{
    EpisodeMode, InferenceBackend, Learner, LearnerKind, TrainBackend, UpdateReport,
    build_learner, discounted_returns, normalize_returns,
};
pub use value::ValueLearner;
