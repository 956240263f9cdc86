use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_logging::JsonLogger;
use uuid::Uuid;

use crate::{
    command::{Command, HandlerOutcome},
    healing::{EscalationReason, SelfHealingDecision},
    remediation::RemediationResult,
};

/// Offline-analysis record for one observed utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    /// Ticket id.
    pub ticket_id: Uuid,
    /// Original utterance.
    pub utterance: String,
    /// Command as first extracted.
    pub extracted: Command,
    /// Observed outcome.
    pub outcome: HandlerOutcome,
    /// Whether escalation fired.
    pub escalated: bool,
    /// Rules behind the escalation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<EscalationReason>,
    /// Command after remediation; equals `extracted` when nothing changed.
    pub final_command: Command,
    /// Secondary interpreter answer, if it ran and succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationResult>,
    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}

impl AnalyticsRecord {
    /// Builds the record for a decision and an optional remediation answer.
    #[must_use]
    pub fn from_decision(
        decision: &SelfHealingDecision,
        remediation: Option<RemediationResult>,
    ) -> Self {
        let extracted = decision.ticket.command.clone();
        let final_command = remediation
            .as_ref()
            .and_then(|result| result.corrected_command(&decision.ticket.utterance))
            .unwrap_or_else(|| extracted.clone());
        Self {
            ticket_id: decision.ticket.id,
            utterance: decision.ticket.utterance.clone(),
            extracted,
            outcome: decision.outcome,
            escalated: decision.escalate,
            reasons: decision.reasons.clone(),
            final_command,
            remediation,
            recorded_at: Utc::now(),
        }
    }
}

/// Destination for analytics records. Callers swallow failures.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Persists a record.
    async fn record(&self, record: &AnalyticsRecord) -> Result<()>;
}

/// Appends records as JSON lines.
#[derive(Debug)]
pub struct JsonAnalyticsSink {
    logger: JsonLogger,
}

impl JsonAnalyticsSink {
    /// Opens or creates the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            logger: JsonLogger::new(path)?,
        })
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.logger.path()
    }
}

#[async_trait]
impl AnalyticsSink for JsonAnalyticsSink {
    async fn record(&self, record: &AnalyticsRecord) -> Result<()> {
        self.logger.append(record)
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAnalyticsSink {
    records: Mutex<Vec<AnalyticsRecord>>,
}

impl MemoryAnalyticsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records collected so far.
    #[must_use]
    pub fn records(&self) -> Vec<AnalyticsRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AnalyticsSink for MemoryAnalyticsSink {
    async fn record(&self, record: &AnalyticsRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::{ScreenContext, UtteranceSource, UtteranceTicket},
        healing::evaluate,
    };
    use tempfile::tempdir;

    fn decision() -> SelfHealingDecision {
        let ticket = UtteranceTicket::issue(
            UtteranceSource::Voice,
            "remove Heat",
            Command::unparsed("remove Heat"),
        );
        evaluate(&ticket, HandlerOutcome::ParseError, ScreenContext::default())
    }

    #[test]
    fn final_command_defaults_to_extracted() {
        let record = AnalyticsRecord::from_decision(&decision(), None);
        assert!(record.escalated);
        assert_eq!(record.final_command, record.extracted);
    }

    #[test]
    fn final_command_uses_remediation_target() {
        let result = RemediationResult {
            action: "remove_from_watchlist".into(),
            target_phrase: Some("Heat".into()),
            attribution: None,
            message: None,
        };
        let record = AnalyticsRecord::from_decision(&decision(), Some(result));
        assert_eq!(record.final_command.target_phrase.as_deref(), Some("Heat"));
        assert_eq!(record.final_command.raw_text, "remove Heat");
    }

    #[tokio::test]
    async fn json_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let sink = JsonAnalyticsSink::new(dir.path().join("analytics.jsonl")).unwrap();
        let record = AnalyticsRecord::from_decision(&decision(), None);
        sink.record(&record).await.unwrap();
        sink.record(&record).await.unwrap();
        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        let parsed: AnalyticsRecord = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.ticket_id, record.ticket_id);
        assert_eq!(parsed.reasons, vec![EscalationReason::ParseErrorWithActionWords]);
    }
}
