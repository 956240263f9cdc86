#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Voice command interpretation for the watchlist: extraction, alias
//! normalization, search routing and self-healing recovery.

/// Telemetry builder/hook for voice components.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// TOML pipeline configuration.
#[path = "../config.rs"]
pub mod config;

/// Wired pipeline used by the CLI.
#[path = "../runtime.rs"]
pub mod runtime;

/// Per-outcome analytics records and sinks.
pub mod analytics;
/// Direct vs semantic search classification.
pub mod classifier;
/// Commands, tickets and observed outcomes.
pub mod command;
/// JSON-lines console receiver.
pub mod console;
/// Typed pipeline errors.
pub mod error;
/// Utterance to command extraction.
pub mod extractor;
/// Self-healing escalation predicate.
pub mod healing;
/// Recommender alias normalization.
pub mod normalizer;
/// Escalation follow-up coordinator.
pub mod recovery;
/// Secondary interpreter contract and backends.
pub mod remediation;
/// Intent routing and search dispatch.
pub mod router;
/// Attribution prefill slot.
pub mod slot;
/// Queued speech output.
pub mod speech;

pub use classifier::{SearchClassification, SearchIntentClassifier};
pub use command::{Command, HandlerOutcome, ScreenContext, UtteranceSource, UtteranceTicket};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use extractor::{CommandExtractor, ExtractionPath};
pub use healing::{evaluate, should_escalate, SelfHealingDecision};
pub use normalizer::RecommenderNormalizer;
pub use recovery::SelfHealingCoordinator;
pub use router::{IntentRouter, RouterOutcome, SearchRequest};
pub use runtime::VoiceRuntime;
pub use slot::{AttributionPrefill, AttributionSlot};
pub use telemetry::{VoiceTelemetry, VoiceTelemetryBuilder};
