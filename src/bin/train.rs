use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::{Parser, ValueEnum};
use log::info;

use arenabot::config::{EngineConfig, EnvConfig};
use arenabot::ml::EpisodeMode;
use arenabot::persist::ModelStore;
use arenabot::trainer::{RewardHistory, Trainer};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Variant {
    /// Two-agent arena with a heuristic opponent, REINFORCE learner.
    Combat,
    /// Hazard dodging arena, replay learner.
    Dodge,
}

#[derive(Parser, Debug)]
#[command(
    about = "Train an arena policy headlessly and write a checkpoint",
    version,
    author
)]
struct TrainArgs {
    /// JSON engine configuration; overrides --variant when given.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Arena and learner pairing used when no config file is given.
    #[arg(long, value_enum, default_value_t = Variant::Combat)]
    variant: Variant,
    /// Number of training episodes.
    #[arg(long, default_value_t = 500)]
    episodes: usize,
    /// Optional override for the per-episode step cap.
    #[arg(long)]
    max_steps: Option<usize>,
    /// Greedy evaluation episodes run after training.
    #[arg(long, default_value_t = 0)]
    evaluate: usize,
    /// Log a progress line every this many episodes.
    #[arg(long, default_value_t = 25)]
    report_every: usize,
    /// Checkpoint destination (defaults to the configured model path).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Resume from a checkpoint created by this program.
    #[arg(long)]
    resume: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = TrainArgs::parse();
    validate_args(&args)?;
    let config = resolve_config(&args)?;
    let store = ModelStore::new(config.store.clone());
    let mut trainer = Trainer::from_config(&config);
    if let Some(path) = args.resume.as_deref() {
        store.load_model(&mut trainer, Some(path))?;
        info!("resuming at episode {}", trainer.episodes());
    }

    let variant = match config.env {
        EnvConfig::Combat(_) => "combat",
        EnvConfig::Dodge(_) => "dodge",
    };
    info!(
        "training {:?} learner in the {variant} arena for {} episodes",
        trainer.learner().kind(),
        args.episodes
    );

    let stop = AtomicBool::new(false);
    for _ in 0..args.episodes {
        let summary = trainer.run_episode(EpisodeMode::Train, &stop);
        if summary.episode % args.report_every as u64 == 0 {
            let epsilon = summary
                .epsilon
                .map(|epsilon| format!(", epsilon {epsilon:.3}"))
                .unwrap_or_default();
            info!(
                "episode {} reward {:.2} avg {:.2} steps {} {:?}{epsilon}",
                summary.episode,
                summary.reward,
                trainer.history().average(),
                summary.steps,
                summary.outcome,
            );
        }
    }

    if args.evaluate > 0 {
        let mut rewards = RewardHistory::new(args.evaluate);
        for _ in 0..args.evaluate {
            rewards.push(trainer.run_episode(EpisodeMode::Evaluate, &stop).reward);
        }
        info!(
            "evaluation over {} episodes: mean reward {:.2}",
            args.evaluate,
            rewards.average()
        );
    }

    let path = store.save_model(&trainer, args.output.as_deref())?;
    println!("checkpoint saved -> {}", path.display());
    Ok(())
}

fn resolve_config(args: &TrainArgs) -> Result<EngineConfig, Box<dyn Error>> {
    let mut config = match (&args.config, args.variant) {
        (Some(path), _) => EngineConfig::from_json_file(path)?,
        (None, Variant::Combat) => EngineConfig::default(),
        (None, Variant::Dodge) => EngineConfig::dodge(),
    };
    if let Some(max_steps) = args.max_steps {
        config.trainer.max_steps = max_steps;
    }
    config.validate()?;
    Ok(config)
}

fn validate_args(args: &TrainArgs) -> Result<(), Box<dyn Error>> {
    if args.episodes == 0 {
        return Err("episodes must be positive".into());
    }
    if args.report_every == 0 {
        return Err("report-every must be positive".into());
    }
    if args.max_steps == Some(0) {
        return Err("max-steps must be positive".into());
    }
    Ok(())
}
