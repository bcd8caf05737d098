//! Start/stop/status lifecycle around a [`Trainer`] running on a background thread.
//!
//! While running, the trainer (and its policy) lives on the loop thread. It is
//! handed back through a bounded channel when the loop exits, so save and load
//! only ever touch a trainer nobody else is using.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::ml::EpisodeMode;
use crate::observer::{ProgressEvent, ProgressObserver};
use crate::trainer::{EpisodeSummary, Trainer};

/// `f32` stored as its bit pattern.
#[derive(Debug, Default)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Values published by the loop and read by callers without locking.
#[derive(Debug, Default)]
pub struct SessionStats {
    running: AtomicBool,
    stop_requested: AtomicBool,
    episode: AtomicU64,
    last_reward: AtomicF32,
    avg_reward: AtomicF32,
    success_rate: AtomicF32,
}

impl SessionStats {
    fn publish(&self, summary: &EpisodeSummary, trainer: &Trainer) {
        self.last_reward.store(summary.reward);
        self.avg_reward.store(trainer.history().average());
        self.success_rate.store(trainer.tally().success_rate());
        self.episode.store(summary.episode, Ordering::Release);
    }

    fn clear(&self, trainer: &Trainer) {
        self.last_reward.store(0.0);
        self.avg_reward.store(trainer.history().average());
        self.success_rate.store(trainer.tally().success_rate());
        self.episode.store(trainer.episodes(), Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// Snapshot returned by [`TrainingSession::status`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub running: bool,
    pub episode: u64,
    pub last_reward: f32,
    pub avg_reward: f32,
    pub success_rate: f32,
}

pub struct TrainingSession {
    trainer: Option<Trainer>,
    stats: Arc<SessionStats>,
    observer: Arc<dyn ProgressObserver>,
    config: SessionConfig,
    handback: Option<Receiver<Trainer>>,
    worker: Option<JoinHandle<()>>,
}

impl TrainingSession {
    pub fn new(trainer: Trainer, config: SessionConfig, observer: Arc<dyn ProgressObserver>) -> Self {
        let stats = Arc::new(SessionStats::default());
        stats.clear(&trainer);
        Self {
            trainer: Some(trainer),
            stats,
            observer,
            config,
            handback: None,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.stats.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            running: self.is_running(),
            episode: self.stats.episode.load(Ordering::Acquire),
            last_reward: self.stats.last_reward.load(),
            avg_reward: self.stats.avg_reward.load(),
            success_rate: self.stats.success_rate.load(),
        }
    }

    /// Moves the trainer onto a new loop thread.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        self.reclaim(true)?;
        let trainer = self.trainer.take().ok_or(EngineError::TrainerLost)?;

        self.stats.stop_requested.store(false, Ordering::Release);
        self.stats.running.store(true, Ordering::Release);
        self.stats.episode.store(trainer.episodes(), Ordering::Release);

        let (sender, receiver) = bounded(1);
        let stats = Arc::clone(&self.stats);
        let observer = Arc::clone(&self.observer);
        let config = self.config.clone();
        self.worker = Some(thread::spawn(move || {
            training_loop(trainer, stats, observer, config, sender);
        }));
        self.handback = Some(receiver);
        info!("training started");
        Ok(())
    }

    /// Raises the stop flag and waits up to the configured timeout for the
    /// loop to exit. The session is idle afterwards either way.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        self.stats.stop_requested.store(true, Ordering::Release);
        if let Err(err) = self.reclaim(true) {
            warn!("stop did not complete within {:?}: {err}", self.config.stop_timeout());
        }
        self.stats.running.store(false, Ordering::Release);
        info!("training stopped at episode {}", self.status().episode);
        Ok(())
    }

    /// The idle trainer, or `TrainingActive` while the loop owns it.
    pub fn trainer(&mut self) -> Result<&Trainer, EngineError> {
        self.trainer_mut().map(|trainer| &*trainer)
    }

    pub fn trainer_mut(&mut self) -> Result<&mut Trainer, EngineError> {
        if self.is_running() {
            return Err(EngineError::TrainingActive);
        }
        match self.reclaim(false) {
            Err(EngineError::LoopStillActive) => return Err(EngineError::TrainingActive),
            Err(err) => return Err(err),
            Ok(()) => {}
        }
        self.trainer.as_mut().ok_or(EngineError::TrainerLost)
    }

    /// Runs `action` against the idle trainer and republishes its episode
    /// count afterwards.
    pub fn with_trainer<T>(
        &mut self,
        action: impl FnOnce(&mut Trainer) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let trainer = self.trainer_mut()?;
        let result = action(trainer);
        let episodes = trainer.episodes();
        self.stats.episode.store(episodes, Ordering::Release);
        result
    }

    /// Swaps in `trainer` while idle and republishes its stats.
    ///
    /// A trainer lost to a dead loop thread is replaced as well.
    pub fn replace_trainer(&mut self, trainer: Trainer) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::TrainingActive);
        }
        match self.reclaim(false) {
            Err(EngineError::LoopStillActive) => return Err(EngineError::TrainingActive),
            Err(EngineError::TrainerLost) | Ok(()) => {}
            Err(err) => return Err(err),
        }
        self.stats.clear(&trainer);
        self.trainer = Some(trainer);
        info!("trainer replaced");
        Ok(())
    }

    /// Collects the trainer from a finished loop, optionally waiting for it.
    fn reclaim(&mut self, wait: bool) -> Result<(), EngineError> {
        let Some(receiver) = self.handback.as_ref() else {
            return Ok(());
        };
        let received = if wait {
            receiver
                .recv_timeout(self.config.stop_timeout())
                .map_err(|err| match err {
                    RecvTimeoutError::Timeout => EngineError::LoopStillActive,
                    RecvTimeoutError::Disconnected => EngineError::TrainerLost,
                })
        } else {
            receiver.try_recv().map_err(|err| match err {
                TryRecvError::Empty => EngineError::LoopStillActive,
                TryRecvError::Disconnected => EngineError::TrainerLost,
            })
        };
        match received {
            Ok(trainer) => {
                self.trainer = Some(trainer);
                self.handback = None;
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        warn!("training thread panicked after handing back its trainer");
                    }
                }
                Ok(())
            }
            Err(EngineError::TrainerLost) => {
                self.handback = None;
                self.worker = None;
                Err(EngineError::TrainerLost)
            }
            Err(err) => Err(err),
        }
    }
}

impl Drop for TrainingSession {
    fn drop(&mut self) {
        if self.handback.is_some() {
            self.stats.stop_requested.store(true, Ordering::Release);
            let _ = self.reclaim(true);
        }
    }
}

fn training_loop(
    mut trainer: Trainer,
    stats: Arc<SessionStats>,
    observer: Arc<dyn ProgressObserver>,
    config: SessionConfig,
    handback: Sender<Trainer>,
) {
    debug!("training loop entered at episode {}", trainer.episodes());
    while !stats.stop_requested() {
        let summary = trainer.run_episode(EpisodeMode::Train, &stats.stop_requested);
        if summary.interrupted && summary.steps == 0 {
            break;
        }
        stats.publish(&summary, &trainer);
        emit(
            observer.as_ref(),
            &ProgressEvent::TrainingUpdate {
                episode: summary.episode,
                last_reward: summary.reward,
                avg_reward: trainer.history().average(),
                epsilon: summary.epsilon,
            },
        );
        if summary.interrupted {
            break;
        }
        pause(&stats, &config);
    }

    let episode = trainer.episodes();
    stats.running.store(false, Ordering::Release);
    emit(observer.as_ref(), &ProgressEvent::TrainingStopped { episode });
    debug!("training loop exiting at episode {episode}");
    if handback.send(trainer).is_err() {
        warn!("session dropped before the trainer was handed back");
    }
}

fn pause(stats: &SessionStats, config: &SessionConfig) {
    for _ in 0..config.pause_slices {
        if stats.stop_requested() {
            return;
        }
        thread::sleep(config.pause_slice());
    }
}

fn emit(observer: &dyn ProgressObserver, event: &ProgressEvent) {
    if let Err(err) = observer.notify(event) {
        debug!("dropping progress event: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_f32_round_trips() {
        let value = AtomicF32::default();
        assert_eq!(value.load(), 0.0);
        value.store(-3.25);
        assert_eq!(value.load(), -3.25);
    }
}
