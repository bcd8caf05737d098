use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{debug, info};

use arenabot::api::{Command, Engine};
use arenabot::config::EngineConfig;
use arenabot::observer::JsonLinesObserver;

/// Hosts the engine over stdin/stdout: one JSON command per input line, one
/// JSON reply per output line, with progress events interleaved on stdout.
#[derive(Parser, Debug)]
#[command(about = "Drive the training engine with JSON lines", version, author)]
struct BridgeArgs {
    /// JSON engine configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Use the dodge arena with the replay learner instead of combat.
    #[arg(long)]
    dodge: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = BridgeArgs::parse();
    let config = match (&args.config, args.dodge) {
        (Some(path), _) => EngineConfig::from_json_file(path)?,
        (None, true) => EngineConfig::dodge(),
        (None, false) => EngineConfig::default(),
    };
    let mut engine = Engine::new(config, Arc::new(JsonLinesObserver::new(io::stdout())))?;
    info!("bridge ready");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        let reply = engine.dispatch_json(request);
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }

    debug!("input closed");
    if engine.session().is_running() {
        let reply = engine.dispatch(Command::StopTraining);
        debug!("stopped on shutdown: {}", reply.ok);
    }
    Ok(())
}
