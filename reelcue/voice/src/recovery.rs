//! Acts on self-healing decisions off the caller's path.
//!
//! `observe` answers synchronously; remediation, read-back and analytics run on
//! spawned tasks whose failures are logged and dropped. A newer utterance does
//! not cancel an escalation already in flight.

use std::sync::Arc;

use serde_json::json;
use shared_logging::LogLevel;
use tokio::task::JoinHandle;

use crate::{
    analytics::{AnalyticsRecord, AnalyticsSink},
    command::{HandlerOutcome, ScreenContext, UtteranceTicket},
    healing::{evaluate, SelfHealingDecision},
    remediation::{EscalationRequest, Remediator},
    speech::SpeechSink,
    telemetry::VoiceTelemetry,
};

/// Evaluates outcomes and hands escalations to the secondary interpreter.
#[derive(Clone)]
pub struct SelfHealingCoordinator {
    remediator: Arc<dyn Remediator>,
    analytics: Arc<dyn AnalyticsSink>,
    speech: Arc<dyn SpeechSink>,
    telemetry: Option<VoiceTelemetry>,
}

impl SelfHealingCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        remediator: Arc<dyn Remediator>,
        analytics: Arc<dyn AnalyticsSink>,
        speech: Arc<dyn SpeechSink>,
        telemetry: Option<VoiceTelemetry>,
    ) -> Self {
        Self {
            remediator,
            analytics,
            speech,
            telemetry,
        }
    }

    /// Records the outcome for `ticket` and escalates when the trigger fires.
    ///
    /// Must be called from within a tokio runtime. The returned handle can be
    /// awaited by tests; production callers drop it.
    pub fn observe(
        &self,
        ticket: &UtteranceTicket,
        outcome: HandlerOutcome,
        context: ScreenContext,
    ) -> (SelfHealingDecision, JoinHandle<()>) {
        let decision = evaluate(ticket, outcome, context);
        let correlation = ticket.id.to_string();
        self.log(
            LogLevel::Info,
            if decision.escalate {
                "voice.healing.escalated"
            } else {
                "voice.healing.evaluated"
            },
            &correlation,
            json!({
                "outcome": decision.outcome,
                "reasons": decision.reasons,
                "action_words": decision.action_words,
            }),
        );

        if decision.escalate {
            if let Some(tel) = &self.telemetry {
                let _ = tel.event(
                    "voice.healing.escalated",
                    json!({
                        "ticket": ticket.id,
                        "utterance": ticket.utterance,
                        "reasons": decision.reasons,
                    }),
                );
            }
        }

        let worker = self.clone();
        let task_decision = decision.clone();
        let handle = tokio::spawn(async move {
            worker.follow_up(task_decision).await;
        });
        (decision, handle)
    }

    async fn follow_up(&self, decision: SelfHealingDecision) {
        let correlation = decision.ticket.id.to_string();
        let remediation = if decision.escalate {
            let request = EscalationRequest::from(&decision);
            match self.remediator.reinterpret(&request).await {
                Ok(result) => {
                    if let Some(message) = &result.message {
                        self.speech.speak(message);
                    }
                    self.log(
                        LogLevel::Info,
                        "voice.healing.remediated",
                        &correlation,
                        json!({ "action": result.action, "target": result.target_phrase }),
                    );
                    Some(result)
                }
                Err(err) => {
                    self.log(
                        LogLevel::Warn,
                        "voice.healing.remediation_failed",
                        &correlation,
                        json!({ "error": err.to_string() }),
                    );
                    None
                }
            }
        } else {
            None
        };

        let record = AnalyticsRecord::from_decision(&decision, remediation);
        if let Err(err) = self.analytics.record(&record).await {
            self.log(
                LogLevel::Warn,
                "voice.analytics.record_failed",
                &correlation,
                json!({ "error": err.to_string() }),
            );
        }
    }

    fn log(&self, level: LogLevel, message: &str, correlation: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log_correlated(level, message, correlation, metadata);
        }
    }
}
