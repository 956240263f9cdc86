use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::telemetry::VoiceTelemetry;

/// Fire-and-forget speech output as seen by the pipeline.
///
/// `speak` must return without waiting for audio.
pub trait SpeechSink: Send + Sync {
    /// Queues `text` for playback.
    fn speak(&self, text: &str);
}

/// Something that actually renders speech; may be slow.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Plays `text`, returning once done.
    async fn say(&self, text: &str) -> Result<()>;
}

/// Prints utterances to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSpeech;

#[async_trait]
impl SpeechBackend for ConsoleSpeech {
    async fn say(&self, text: &str) -> Result<()> {
        println!("[speak] {text}");
        Ok(())
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSpeech;

#[async_trait]
impl SpeechBackend for SilentSpeech {
    async fn say(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Shells out to the platform `say` binary.
#[derive(Debug, Clone)]
pub struct SayCommandSpeech {
    program: String,
}

impl SayCommandSpeech {
    /// Uses `say` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("say")
    }

    /// Uses a custom binary taking the text as its only argument.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SayCommandSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechBackend for SayCommandSpeech {
    async fn say(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            bail!("refusing to speak empty text");
        }
        let status = tokio::process::Command::new(&self.program)
            .arg(text)
            .status()
            .await
            .with_context(|| format!("spawning {}", self.program))?;
        if !status.success() {
            bail!("{} exited with {status}", self.program);
        }
        Ok(())
    }
}

/// [`SpeechSink`] backed by an unbounded queue drained by one worker task.
///
/// Backend failures are logged and dropped; the worker stops once every
/// clone of the speaker is gone.
#[derive(Debug, Clone)]
pub struct QueuedSpeaker {
    sender: mpsc::UnboundedSender<String>,
    telemetry: Option<VoiceTelemetry>,
}

impl QueuedSpeaker {
    /// Starts the worker on the current tokio runtime.
    #[must_use]
    pub fn start(
        backend: Arc<dyn SpeechBackend>,
        telemetry: Option<VoiceTelemetry>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        let worker_tel = telemetry.clone();
        let worker = tokio::spawn(async move {
            while let Some(text) = receiver.recv().await {
                if let Err(err) = backend.say(&text).await {
                    if let Some(tel) = &worker_tel {
                        let _ = tel.log(
                            shared_logging::LogLevel::Warn,
                            "voice.speech.failed",
                            json!({ "error": err.to_string() }),
                        );
                    }
                }
            }
        });
        (Self { sender, telemetry }, worker)
    }
}

impl SpeechSink for QueuedSpeaker {
    fn speak(&self, text: &str) {
        if self.sender.send(text.to_string()).is_err() {
            if let Some(tel) = &self.telemetry {
                let _ = tel.log(
                    shared_logging::LogLevel::Warn,
                    "voice.speech.worker_closed",
                    json!({ "text": text }),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use shared_logging::MemoryLogger;

    #[derive(Default)]
    struct RecordingBackend {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechBackend for RecordingBackend {
        async fn say(&self, text: &str) -> Result<()> {
            if text == "boom" {
                bail!("backend exploded");
            }
            self.spoken.lock().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn queued_speaker_plays_in_order() {
        let backend = Arc::new(RecordingBackend::default());
        let (speaker, worker) = QueuedSpeaker::start(backend.clone(), None);
        speaker.speak("one");
        speaker.speak("two");
        drop(speaker);
        worker.await.unwrap();
        assert_eq!(*backend.spoken.lock(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn backend_failures_are_logged_not_raised() {
        let logger = Arc::new(MemoryLogger::new());
        let telemetry = VoiceTelemetry::builder("voice")
            .log_sink(logger.clone())
            .build()
            .unwrap();
        let backend = Arc::new(RecordingBackend::default());
        let (speaker, worker) = QueuedSpeaker::start(backend.clone(), Some(telemetry));
        speaker.speak("boom");
        speaker.speak("after");
        drop(speaker);
        worker.await.unwrap();
        assert_eq!(*backend.spoken.lock(), vec!["after"]);
        assert_eq!(logger.messages(), vec!["voice.speech.failed"]);
    }

    #[tokio::test]
    async fn say_command_rejects_empty_text() {
        assert!(SayCommandSpeech::new().say("   ").await.is_err());
    }
}
