use std::{collections::HashMap, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use reelcue_voice::{
    console::{ConsoleCommand, ConsoleCommandReceiver},
    CommandExtractor, PipelineConfig, RecommenderNormalizer, RouterOutcome,
    SearchIntentClassifier, UtteranceSource, UtteranceTicket, VoiceRuntime,
};
use serde_json::json;
use shared_logging::LogLevel;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "cue", version, about = "Reelcue voice command pipeline")]
struct Cli {
    /// Pipeline configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Routes one utterance and prints the outcome.
    Handle {
        utterance: String,
        #[arg(long, value_enum, default_value_t = SourceArg::Voice)]
        source: SourceArg,
    },
    /// Classifies a search query as direct or semantic.
    Classify { query: String },
    /// Resolves a recommender name to its display form.
    Normalize { name: String },
    /// Shows what the extractor reads out of an utterance.
    Extract { utterance: String },
    /// Reads JSON-line commands from stdin until `quit` or end of input.
    Listen,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceArg {
    Voice,
    Typed,
}

impl From<SourceArg> for UtteranceSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Voice => Self::Voice,
            SourceArg::Typed => Self::Typed,
        }
    }
}

/// Dispatched tickets still waiting for an `outcome` line.
///
/// Outcomes may never arrive, so entries expire after `ttl` and the oldest
/// entry is dropped once `capacity` is reached.
struct TicketLedger {
    tickets: HashMap<Uuid, UtteranceTicket>,
    capacity: usize,
    ttl: Duration,
}

impl TicketLedger {
    const CAPACITY: usize = 256;
    const TTL_MINUTES: i64 = 15;

    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            tickets: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn insert(&mut self, ticket: UtteranceTicket, now: DateTime<Utc>) {
        self.expire(now);
        while self.tickets.len() >= self.capacity {
            let Some(oldest) = self
                .tickets
                .values()
                .min_by_key(|ticket| ticket.received_at)
                .map(|ticket| ticket.id)
            else {
                break;
            };
            self.tickets.remove(&oldest);
        }
        self.tickets.insert(ticket.id, ticket);
    }

    fn take(&mut self, id: &Uuid, now: DateTime<Utc>) -> Option<UtteranceTicket> {
        self.expire(now);
        self.tickets.remove(id)
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.tickets.retain(|_, ticket| now - ticket.received_at < ttl);
    }

    fn len(&self) -> usize {
        self.tickets.len()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PipelineConfig::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Commands::Handle { utterance, source } => {
            handle_once(&config, &utterance, source.into()).await
        }
        Commands::Classify { query } => {
            let classifier =
                SearchIntentClassifier::with_word_limit(config.classifier.direct_word_limit);
            println!("{}", classifier.classify(&query).label());
            Ok(())
        }
        Commands::Normalize { name } => {
            let normalizer = RecommenderNormalizer::with_aliases(&config.aliases);
            println!("{}", normalizer.normalize(&name));
            if !normalizer.is_known(&name) {
                eprintln!("no alias for {name:?}; title-cased");
            }
            Ok(())
        }
        Commands::Extract { utterance } => {
            let (command, path) = CommandExtractor::new().extract_traced(&utterance);
            let report = json!({
                "rule": path.label(),
                "valid": command.is_valid(),
                "command": command,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Listen => listen(&config).await,
    }
}

async fn handle_once(
    config: &PipelineConfig,
    utterance: &str,
    source: UtteranceSource,
) -> Result<()> {
    let runtime = VoiceRuntime::from_config(config)?;
    let (outcome, decision) = runtime.handle(utterance, source).await?;
    let report = json!({ "outcome": outcome, "decision": decision });
    println!("{}", serde_json::to_string_pretty(&report)?);
    runtime.shutdown().await;
    Ok(())
}

async fn listen(config: &PipelineConfig) -> Result<()> {
    let runtime = VoiceRuntime::from_config(config)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let receiver = ConsoleCommandReceiver::new(tx, Some(runtime.telemetry().clone()));
    let reader = tokio::spawn(async move { receiver.run().await });

    let mut tickets = TicketLedger::new(
        TicketLedger::CAPACITY,
        Duration::minutes(TicketLedger::TTL_MINUTES),
    );
    while let Some(cmd) = rx.recv().await {
        match cmd {
            ConsoleCommand::Utterance { text, source } => {
                let (outcome, decision) = match runtime.handle(&text, source).await {
                    Ok(handled) => handled,
                    Err(err) => {
                        let _ = runtime.telemetry().log(
                            LogLevel::Error,
                            "cue.listen.handle_failed",
                            json!({ "utterance": text, "error": err.to_string() }),
                        );
                        eprintln!("failed to handle utterance: {err}");
                        continue;
                    }
                };
                if let RouterOutcome::Dispatched { ticket, .. } = &outcome {
                    tickets.insert(ticket.clone(), Utc::now());
                }
                println!("{}", json!({ "outcome": outcome, "decision": decision }));
            }
            ConsoleCommand::Outcome {
                ticket,
                outcome,
                context,
            } => match tickets.take(&ticket, Utc::now()) {
                Some(issued) => {
                    let decision = runtime.observe(&issued, outcome, context);
                    println!("{}", json!({ "decision": decision }));
                }
                None => {
                    let _ = runtime.telemetry().log(
                        LogLevel::Warn,
                        "cue.listen.unknown_ticket",
                        json!({ "ticket": ticket, "pending": tickets.len() }),
                    );
                    eprintln!("unknown or expired ticket {ticket}");
                }
            },
            ConsoleCommand::Quit => break,
        }
    }

    reader.await.context("console reader task")??;
    runtime.shutdown().await;
    Ok(())
}
