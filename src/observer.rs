//! One-way progress push to whoever hosts the engine.

use std::io::Write;
use std::sync::Mutex;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Event emitted by the training loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    TrainingUpdate {
        episode: u64,
        last_reward: f32,
        avg_reward: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        epsilon: Option<f32>,
    },
    TrainingStopped {
        episode: u64,
    },
}

/// Receives progress events. Errors are reported back to the caller, which
/// logs and drops them.
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, event: &ProgressEvent) -> Result<(), EngineError>;
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn notify(&self, _event: &ProgressEvent) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Forwards events into a crossbeam channel without blocking.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    sender: Sender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelObserver {
    fn notify(&self, event: &ProgressEvent) -> Result<(), EngineError> {
        self.sender.try_send(event.clone()).map_err(|err| {
            EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                err.to_string(),
            ))
        })
    }
}

/// Writes each event as one line of JSON.
pub struct JsonLinesObserver<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ProgressObserver for JsonLinesObserver<W> {
    fn notify(&self, event: &ProgressEvent) -> Result<(), EngineError> {
        let line = serde_json::to_string(event)?;
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let update = ProgressEvent::TrainingUpdate {
            episode: 3,
            last_reward: 1.5,
            avg_reward: 0.5,
            epsilon: None,
        };
        let value = serde_json::to_value(&update).expect("json");
        assert_eq!(value["type"], "training_update");
        assert_eq!(value["episode"], 3);
        assert!(value.get("epsilon").is_none());

        let stopped = serde_json::to_value(ProgressEvent::TrainingStopped { episode: 7 })
            .expect("json");
        assert_eq!(stopped, serde_json::json!({"type": "training_stopped", "episode": 7}));
    }

    #[test]
    fn json_lines_writes_one_event_per_line() {
        let observer = JsonLinesObserver::new(Vec::new());
        observer
            .notify(&ProgressEvent::TrainingStopped { episode: 1 })
            .expect("notify");
        observer
            .notify(&ProgressEvent::TrainingStopped { episode: 2 })
            .expect("notify");
        let text = String::from_utf8(observer.into_inner()).expect("utf8");
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with("\"episode\":2}\n"));
    }

    #[test]
    fn closed_channel_reports_an_error() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let observer = ChannelObserver::new(sender);
        drop(receiver);
        assert!(
            observer
                .notify(&ProgressEvent::TrainingStopped { episode: 0 })
                .is_err()
        );
    }
}
