//! JSON-lines command ingestion from stdin.

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc::UnboundedSender,
};
use uuid::Uuid;

use crate::{
    command::{HandlerOutcome, ScreenContext, UtteranceSource},
    telemetry::VoiceTelemetry,
};

/// Commands accepted on the console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleCommand {
    /// Handle an utterance.
    Utterance {
        /// Utterance text.
        text: String,
        /// Entry point; voice when omitted.
        #[serde(default)]
        source: UtteranceSource,
    },
    /// Report what happened after a dispatch.
    Outcome {
        /// Ticket id printed when the utterance was handled.
        ticket: Uuid,
        /// Observed outcome.
        outcome: HandlerOutcome,
        /// Screen hints.
        #[serde(flatten)]
        context: ScreenContext,
    },
    /// Exit the loop; forwarded so the consumer stops too.
    Quit,
}

/// Reads JSON-line commands and forwards them to the runtime.
pub struct ConsoleCommandReceiver {
    sender: UnboundedSender<ConsoleCommand>,
    telemetry: Option<VoiceTelemetry>,
}

impl ConsoleCommandReceiver {
    /// Creates a new receiver.
    #[must_use]
    pub fn new(sender: UnboundedSender<ConsoleCommand>, telemetry: Option<VoiceTelemetry>) -> Self {
        Self { sender, telemetry }
    }

    /// Runs against stdin until `quit` or end of input.
    pub async fn run(&self) -> Result<()> {
        self.run_with(BufReader::new(tokio::io::stdin())).await
    }

    /// Runs against any buffered reader until `quit` or end of input.
    ///
    /// Malformed lines are logged and skipped.
    pub async fn run_with<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let cmd = match serde_json::from_str::<ConsoleCommand>(&line)
                .with_context(|| "invalid console command JSON")
            {
                Ok(cmd) => cmd,
                Err(err) => {
                    self.log(
                        shared_logging::LogLevel::Warn,
                        "voice.console.invalid_line",
                        serde_json::json!({ "error": format!("{err:#}") }),
                    );
                    continue;
                }
            };
            let quit = matches!(cmd, ConsoleCommand::Quit);
            self.sender.send(cmd)?;
            if quit {
                break;
            }
        }
        self.log(
            shared_logging::LogLevel::Info,
            "voice.console.receiver_shutdown",
            serde_json::json!({}),
        );
        Ok(())
    }

    fn log(&self, level: shared_logging::LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}
