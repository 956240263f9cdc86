//! Contract for the secondary, model-based interpreter that handles escalations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    command::{Command, HandlerOutcome, ScreenContext},
    error::PipelineError,
    healing::{EscalationReason, SelfHealingDecision},
};

/// Everything the secondary interpreter gets to look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRequest {
    /// Ticket being escalated.
    pub ticket_id: Uuid,
    /// Original utterance.
    pub utterance: String,
    /// Command the extractor produced.
    pub command: Command,
    /// Observed outcome.
    pub outcome: HandlerOutcome,
    /// Rules that fired.
    pub reasons: Vec<EscalationReason>,
    /// Action words found in the utterance.
    pub action_words: Vec<String>,
    /// Screen hints.
    pub context: ScreenContext,
}

impl From<&SelfHealingDecision> for EscalationRequest {
    fn from(decision: &SelfHealingDecision) -> Self {
        Self {
            ticket_id: decision.ticket.id,
            utterance: decision.ticket.utterance.clone(),
            command: decision.ticket.command.clone(),
            outcome: decision.outcome,
            reasons: decision.reasons.clone(),
            action_words: decision.action_words.clone(),
            context: decision.context.clone(),
        }
    }
}

/// Answer from the secondary interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationResult {
    /// Action label, e.g. `mark_watched` or `add_to_watchlist`.
    pub action: String,
    /// Corrected target, if the interpreter found one.
    #[serde(default)]
    pub target_phrase: Option<String>,
    /// Corrected attribution.
    #[serde(default)]
    pub attribution: Option<String>,
    /// Sentence to read back to the user.
    #[serde(default)]
    pub message: Option<String>,
}

impl RemediationResult {
    /// The corrected command, when the result names a target.
    #[must_use]
    pub fn corrected_command(&self, utterance: &str) -> Option<Command> {
        let target = self
            .target_phrase
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())?;
        Some(Command::new(
            utterance,
            self.attribution.clone(),
            Some(target.to_string()),
        ))
    }
}

/// Secondary interpreter invoked when the trigger fires.
#[async_trait]
pub trait Remediator: Send + Sync {
    /// Re-reads an escalated utterance.
    async fn reinterpret(
        &self,
        request: &EscalationRequest,
    ) -> Result<RemediationResult, PipelineError>;
}

/// Offline interpreter mapping action words onto watchlist actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackRemediator;

const ACTION_RULES: &[(&[&str], &str)] = &[
    (&["unwatched", "didn't", "haven't"], "mark_unwatched"),
    (&["remove", "delete"], "remove_from_watchlist"),
    (&["rate"], "rate"),
    (&["move"], "move"),
    (&["add", "save", "watch"], "add_to_watchlist"),
    (&["watched", "seen", "mark", "actually"], "mark_watched"),
];

#[async_trait]
impl Remediator for LoopbackRemediator {
    async fn reinterpret(
        &self,
        request: &EscalationRequest,
    ) -> Result<RemediationResult, PipelineError> {
        let action = ACTION_RULES
            .iter()
            .find(|(words, _)| {
                request
                    .action_words
                    .iter()
                    .any(|found| words.contains(&found.as_str()))
            })
            .map_or("search", |(_, action)| *action);
        let target_phrase = request
            .context
            .movie_in_view
            .clone()
            .or_else(|| request.command.target_phrase.clone());
        let message = target_phrase
            .as_ref()
            .map(|target| format!("Okay, {} for {target}.", action.replace('_', " ")));
        Ok(RemediationResult {
            action: action.to_string(),
            target_phrase,
            attribution: request.command.attribution.clone(),
            message,
        })
    }
}

/// Posts the request as JSON to a remote interpreter.
#[derive(Debug, Clone)]
pub struct HttpRemediator {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRemediator {
    /// Creates a client for `endpoint`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent("reelcue-voice/0.1")
            .build()
            .map_err(|err| PipelineError::Remediation(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

impl HttpRemediator {
    fn failure(&self, stage: &str, err: &reqwest::Error) -> PipelineError {
        PipelineError::Remediation(format!("{} {stage}: {err}", self.endpoint))
    }
}

#[async_trait]
impl Remediator for HttpRemediator {
    async fn reinterpret(
        &self,
        request: &EscalationRequest,
    ) -> Result<RemediationResult, PipelineError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|err| self.failure("request failed", &err))?;
        response
            .error_for_status()
            .map_err(|err| self.failure("bad status", &err))?
            .json::<RemediationResult>()
            .await
            .map_err(|err| self.failure("invalid json", &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::{UtteranceSource, UtteranceTicket},
        extractor::CommandExtractor,
        healing::evaluate,
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// Answers exactly one HTTP request with `status` and `body`; yields the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/reinterpret", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0_u8; 1024];
            loop {
                let read = socket.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..read]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (url, handle)
    }

    fn escalated_add() -> EscalationRequest {
        request("add Heat", HandlerOutcome::NoResults, ScreenContext::on_screen("search"))
    }

    fn request(utterance: &str, outcome: HandlerOutcome, context: ScreenContext) -> EscalationRequest {
        let ticket = UtteranceTicket::issue(
            UtteranceSource::Voice,
            utterance,
            CommandExtractor::new().extract(utterance),
        );
        EscalationRequest::from(&evaluate(&ticket, outcome, context))
    }

    #[tokio::test]
    async fn loopback_uses_movie_in_view() {
        let req = request(
            "actually I watched this already",
            HandlerOutcome::ParseError,
            ScreenContext::on_screen("details").with_movie("Heat"),
        );
        let result = LoopbackRemediator.reinterpret(&req).await.unwrap();
        assert_eq!(result.action, "mark_watched");
        assert_eq!(result.target_phrase.as_deref(), Some("Heat"));
        assert_eq!(result.message.as_deref(), Some("Okay, mark watched for Heat."));
    }

    #[tokio::test]
    async fn negations_win_over_plain_watch_words() {
        let req = request(
            "I haven't seen Alien",
            HandlerOutcome::NoResults,
            ScreenContext::default(),
        );
        let result = LoopbackRemediator.reinterpret(&req).await.unwrap();
        assert_eq!(result.action, "mark_unwatched");
        assert!(result.target_phrase.is_none());
        assert!(result.corrected_command(&req.utterance).is_none());
    }

    #[tokio::test]
    async fn falls_back_to_extracted_target() {
        let req = request("add Heat", HandlerOutcome::Success, ScreenContext::default());
        let result = LoopbackRemediator.reinterpret(&req).await.unwrap();
        assert_eq!(result.action, "add_to_watchlist");
        let corrected = result.corrected_command("add Heat").unwrap();
        assert_eq!(corrected.target_phrase.as_deref(), Some("Heat"));
    }

    #[test]
    fn result_parses_with_missing_optionals() {
        let parsed: RemediationResult = serde_json::from_str(r#"{ "action": "rate" }"#).unwrap();
        assert_eq!(parsed.action, "rate");
        assert!(parsed.message.is_none());
    }

    #[tokio::test]
    async fn http_remediator_posts_request_and_parses_result() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"action":"add_to_watchlist","target_phrase":"Heat","message":"Added Heat."}"#,
        )
        .await;
        let remediator = HttpRemediator::new(url, Duration::from_secs(5)).unwrap();
        let result = remediator.reinterpret(&escalated_add()).await.unwrap();
        assert_eq!(result.action, "add_to_watchlist");
        assert_eq!(result.target_phrase.as_deref(), Some("Heat"));
        assert_eq!(result.message.as_deref(), Some("Added Heat."));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /reinterpret"));
        assert!(raw.contains("reelcue-voice/0.1"));
        assert!(raw.contains("\"utterance\":\"add Heat\""));
    }

    #[tokio::test]
    async fn http_remediator_maps_error_status() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let remediator = HttpRemediator::new(url, Duration::from_secs(5)).unwrap();
        let err = remediator.reinterpret(&escalated_add()).await.unwrap_err();
        assert!(matches!(&err, PipelineError::Remediation(msg) if msg.contains("bad status")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn http_remediator_maps_garbage_body() {
        let (url, server) = serve_once("200 OK", "not json at all").await;
        let remediator = HttpRemediator::new(url, Duration::from_secs(5)).unwrap();
        let err = remediator.reinterpret(&escalated_add()).await.unwrap_err();
        assert!(matches!(&err, PipelineError::Remediation(msg) if msg.contains("invalid json")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn http_remediator_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/reinterpret", listener.local_addr().unwrap());
        let remediator = HttpRemediator::new(url, Duration::from_millis(100)).unwrap();
        let err = remediator.reinterpret(&escalated_add()).await.unwrap_err();
        assert!(matches!(&err, PipelineError::Remediation(msg) if msg.contains("request failed")));
        drop(listener);
    }
}
