use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured result of reading one utterance.
///
/// Built once by the extractor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Utterance exactly as received.
    pub raw_text: String,
    /// Person or publication credited with the recommendation, pre-normalization.
    pub attribution: Option<String>,
    /// Cleaned search target.
    pub target_phrase: Option<String>,
}

impl Command {
    /// Creates a command from its parts.
    #[must_use]
    pub fn new(
        raw_text: impl Into<String>,
        attribution: Option<String>,
        target_phrase: Option<String>,
    ) -> Self {
        Self {
            raw_text: raw_text.into(),
            attribution,
            target_phrase,
        }
    }

    /// A command nothing could be extracted from.
    #[must_use]
    pub fn unparsed(raw_text: impl Into<String>) -> Self {
        Self::new(raw_text, None, None)
    }

    /// True when a non-empty target phrase was extracted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.target_phrase
            .as_deref()
            .is_some_and(|target| !target.trim().is_empty())
    }

    /// Valid command without attribution, i.e. a bare title search.
    #[must_use]
    pub fn is_plain_search(&self) -> bool {
        self.is_valid() && self.attribution.is_none()
    }
}

/// Entry point an utterance arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceSource {
    /// Transcribed speech; runs the full extraction and self-healing path.
    #[default]
    Voice,
    /// Free text typed into the search box; classified only.
    Typed,
}

impl UtteranceSource {
    /// Whether outcomes from this source may trigger escalation.
    #[must_use]
    pub const fn escalation_eligible(self) -> bool {
        matches!(self, Self::Voice)
    }

    /// Stable label used in logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Typed => "typed",
        }
    }
}

/// What happened after a command was dispatched, as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandlerOutcome {
    /// Search returned results.
    Success,
    /// Search completed with zero results.
    NoResults,
    /// Nothing could be extracted from the utterance.
    ParseError,
    /// Outcome unknown.
    #[default]
    Unset,
}

/// Hints about what the user was looking at, forwarded to remediation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenContext {
    /// Name of the active screen.
    #[serde(default)]
    pub screen: Option<String>,
    /// Title of the movie currently shown, if any.
    #[serde(default)]
    pub movie_in_view: Option<String>,
}

impl ScreenContext {
    /// Context for the given screen.
    #[must_use]
    pub fn on_screen(screen: impl Into<String>) -> Self {
        Self {
            screen: Some(screen.into()),
            movie_in_view: None,
        }
    }

    /// Adds the movie currently in view.
    #[must_use]
    pub fn with_movie(mut self, title: impl Into<String>) -> Self {
        self.movie_in_view = Some(title.into());
        self
    }
}

/// Self-contained handle for one handled utterance.
///
/// Outcome observation happens later through this value alone, so no state is
/// shared between utterances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtteranceTicket {
    /// Ticket id, also used as log correlation id.
    pub id: Uuid,
    /// Entry point.
    pub source: UtteranceSource,
    /// Original utterance.
    pub utterance: String,
    /// Extracted command.
    pub command: Command,
    /// When the router received the utterance.
    pub received_at: DateTime<Utc>,
}

impl UtteranceTicket {
    /// Issues a ticket for a freshly extracted command.
    #[must_use]
    pub fn issue(source: UtteranceSource, utterance: impl Into<String>, command: Command) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            utterance: utterance.into(),
            command,
            received_at: Utc::now(),
        }
    }
}
