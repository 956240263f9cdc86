use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_event_bus::{Envelope, EventPublisher};
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    classifier::{SearchClassification, SearchIntentClassifier},
    command::{Command, UtteranceSource, UtteranceTicket},
    config::PipelineConfig,
    error::PipelineError,
    extractor::{CommandExtractor, ExtractionPath},
    normalizer::RecommenderNormalizer,
    slot::{AttributionPrefill, AttributionSlot},
    speech::SpeechSink,
    telemetry::VoiceTelemetry,
};

/// Topic used for outbound search requests.
pub const SEARCH_TOPIC: &str = "search.requested";

/// Default spoken acknowledgment before dispatch.
pub const DEFAULT_ACKNOWLEDGMENT: &str = "Let me check on that for you.";

/// Default spoken apology when nothing could be extracted.
pub const DEFAULT_APOLOGY: &str = "Sorry, I didn't catch that. Could you try again?";

/// Outbound event consumed by the search subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Ticket the request belongs to.
    pub ticket_id: Uuid,
    /// Phrase to search for.
    pub target_phrase: String,
    /// How the phrase should be searched.
    pub classification: SearchClassification,
    /// Normalized attribution, if any.
    pub attribution: Option<String>,
    /// Entry point.
    pub source: UtteranceSource,
}

/// Result of handling one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RouterOutcome {
    /// One search request was published.
    Dispatched {
        /// Handle for later outcome observation.
        ticket: UtteranceTicket,
        /// The published request.
        request: SearchRequest,
    },
    /// Nothing usable was extracted; the user got an apology on voice input.
    Rejected {
        /// Handle for later outcome observation.
        ticket: UtteranceTicket,
    },
}

impl RouterOutcome {
    /// Ticket for either variant.
    #[must_use]
    pub const fn ticket(&self) -> &UtteranceTicket {
        match self {
            Self::Dispatched { ticket, .. } | Self::Rejected { ticket } => ticket,
        }
    }

    /// Whether a search was published.
    #[must_use]
    pub const fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Turns utterances into exactly one search request or a rejection.
///
/// Holds no per-utterance state; the only shared write is the attribution slot.
pub struct IntentRouter {
    extractor: CommandExtractor,
    normalizer: RecommenderNormalizer,
    classifier: SearchIntentClassifier,
    speech: Arc<dyn SpeechSink>,
    dispatch: Arc<dyn EventPublisher<SearchRequest>>,
    slot: AttributionSlot,
    acknowledgment: String,
    apology: String,
    telemetry: Option<VoiceTelemetry>,
}

impl IntentRouter {
    /// Router with default phrases, alias table and word limit.
    #[must_use]
    pub fn new(
        speech: Arc<dyn SpeechSink>,
        dispatch: Arc<dyn EventPublisher<SearchRequest>>,
        slot: AttributionSlot,
    ) -> Self {
        Self {
            extractor: CommandExtractor::new(),
            normalizer: RecommenderNormalizer::new(),
            classifier: SearchIntentClassifier::new(),
            speech,
            dispatch,
            slot,
            acknowledgment: DEFAULT_ACKNOWLEDGMENT.into(),
            apology: DEFAULT_APOLOGY.into(),
            telemetry: None,
        }
    }

    /// Router configured from a loaded [`PipelineConfig`].
    #[must_use]
    pub fn from_config(
        config: &PipelineConfig,
        speech: Arc<dyn SpeechSink>,
        dispatch: Arc<dyn EventPublisher<SearchRequest>>,
        slot: AttributionSlot,
    ) -> Self {
        Self {
            normalizer: RecommenderNormalizer::with_aliases(&config.aliases),
            classifier: SearchIntentClassifier::with_word_limit(config.classifier.direct_word_limit),
            acknowledgment: config.speech.acknowledgment.clone(),
            apology: config.speech.apology.clone(),
            ..Self::new(speech, dispatch, slot)
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<VoiceTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Handles one utterance from `source`.
    pub async fn handle(
        &self,
        utterance: &str,
        source: UtteranceSource,
    ) -> Result<RouterOutcome, PipelineError> {
        match source {
            UtteranceSource::Voice => self.handle_voice(utterance).await,
            UtteranceSource::Typed => self.handle_typed(utterance).await,
        }
    }

    async fn handle_voice(&self, utterance: &str) -> Result<RouterOutcome, PipelineError> {
        let (command, path) = self.extractor.extract_traced(utterance);
        let ticket = UtteranceTicket::issue(UtteranceSource::Voice, utterance, command);
        let target = match ticket.command.target_phrase.clone() {
            Some(target) if ticket.command.is_valid() => target,
            _ => {
                self.speech.speak(&self.apology);
                return Ok(self.reject(ticket, path));
            }
        };

        let attribution = ticket
            .command
            .attribution
            .as_deref()
            .map(|raw| self.normalizer.normalize(raw));
        if let Some(name) = &attribution {
            self.slot.publish(AttributionPrefill {
                name: name.clone(),
                target_phrase: target.clone(),
                ticket_id: ticket.id,
                written_at: Utc::now(),
            });
        }

        self.speech.speak(&self.acknowledgment);
        let request = SearchRequest {
            ticket_id: ticket.id,
            classification: self.classifier.classify(&target),
            target_phrase: target,
            attribution,
            source: UtteranceSource::Voice,
        };
        self.dispatch(ticket, request, path).await
    }

    async fn handle_typed(&self, query: &str) -> Result<RouterOutcome, PipelineError> {
        let trimmed = query.trim();
        let command = Command::new(query, None, (!trimmed.is_empty()).then(|| trimmed.to_string()));
        let ticket = UtteranceTicket::issue(UtteranceSource::Typed, query, command);
        if !ticket.command.is_valid() {
            return Ok(self.reject(ticket, ExtractionPath::Unmatched));
        }
        let request = SearchRequest {
            ticket_id: ticket.id,
            target_phrase: trimmed.to_string(),
            classification: self.classifier.classify(trimmed),
            attribution: None,
            source: UtteranceSource::Typed,
        };
        self.dispatch(ticket, request, ExtractionPath::Unmatched).await
    }

    async fn dispatch(
        &self,
        ticket: UtteranceTicket,
        request: SearchRequest,
        path: ExtractionPath,
    ) -> Result<RouterOutcome, PipelineError> {
        self.dispatch
            .publish(Envelope::new("voice.router", SEARCH_TOPIC, request.clone()))
            .await
            .map_err(PipelineError::Dispatch)?;
        self.log(
            LogLevel::Info,
            "voice.router.dispatched",
            &ticket,
            json!({
                "source": ticket.source.label(),
                "rule": path.label(),
                "target": request.target_phrase,
                "classification": request.classification.label(),
                "attribution": request.attribution,
            }),
        );
        if let Some(tel) = &self.telemetry {
            let _ = tel.event(
                "voice.router.dispatched",
                json!({ "ticket": ticket.id, "request": request }),
            );
        }
        Ok(RouterOutcome::Dispatched { ticket, request })
    }

    fn reject(&self, ticket: UtteranceTicket, path: ExtractionPath) -> RouterOutcome {
        self.log(
            LogLevel::Info,
            "voice.router.rejected",
            &ticket,
            json!({ "source": ticket.source.label(), "rule": path.label() }),
        );
        RouterOutcome::Rejected { ticket }
    }

    fn log(&self, level: LogLevel, message: &str, ticket: &UtteranceTicket, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log_correlated(level, message, &ticket.id.to_string(), metadata);
        }
    }
}
