use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, FileEventPublisher, MemoryEventBus};
use tokio::task::JoinHandle;

use crate::{
    analytics::{AnalyticsSink, JsonAnalyticsSink, MemoryAnalyticsSink},
    command::{HandlerOutcome, ScreenContext, UtteranceSource, UtteranceTicket},
    config::{PipelineConfig, SpeechBackendKind},
    error::PipelineError,
    healing::SelfHealingDecision,
    recovery::SelfHealingCoordinator,
    remediation::{HttpRemediator, LoopbackRemediator, Remediator},
    router::{IntentRouter, RouterOutcome, SearchRequest},
    slot::AttributionSlot,
    speech::{ConsoleSpeech, QueuedSpeaker, SayCommandSpeech, SilentSpeech, SpeechBackend},
    telemetry::VoiceTelemetry,
};

/// Fully wired pipeline: router, self-healing coordinator and their collaborators.
pub struct VoiceRuntime {
    router: IntentRouter,
    coordinator: SelfHealingCoordinator,
    slot: AttributionSlot,
    bus: MemoryEventBus<SearchRequest>,
    events: MemoryEventBus<Value>,
    telemetry: VoiceTelemetry,
    speech_worker: JoinHandle<()>,
}

impl VoiceRuntime {
    /// Wires every component from `config`. Must run inside a tokio runtime.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let events = MemoryEventBus::new(config.telemetry.bus_capacity);
        let mut builder =
            VoiceTelemetry::builder("voice").event_publisher(Arc::new(events.clone()));
        if let Some(path) = &config.telemetry.log_path {
            builder = builder.log_path(path);
        }
        let telemetry = builder.build()?;

        let backend: Arc<dyn SpeechBackend> = match config.speech.backend {
            SpeechBackendKind::Console => Arc::new(ConsoleSpeech),
            SpeechBackendKind::Say => Arc::new(SayCommandSpeech::new()),
            SpeechBackendKind::Silent => Arc::new(SilentSpeech),
        };
        let (speaker, speech_worker) = QueuedSpeaker::start(backend, Some(telemetry.clone()));
        let speaker = Arc::new(speaker);

        let bus = MemoryEventBus::new(config.telemetry.bus_capacity);
        let dispatch: Arc<dyn EventPublisher<SearchRequest>> = match &config.telemetry.event_log {
            Some(path) => Arc::new(FileEventPublisher::new(path)?),
            None => Arc::new(bus.clone()),
        };

        let remediator: Arc<dyn Remediator> = match &config.remediation.endpoint {
            Some(endpoint) => Arc::new(HttpRemediator::new(
                endpoint.clone(),
                config.remediation.timeout(),
            )?),
            None => Arc::new(LoopbackRemediator),
        };
        let analytics: Arc<dyn AnalyticsSink> = match &config.analytics.path {
            Some(path) => Arc::new(JsonAnalyticsSink::new(path)?),
            None => Arc::new(MemoryAnalyticsSink::new()),
        };

        let slot = AttributionSlot::new();
        let router = IntentRouter::from_config(config, speaker.clone(), dispatch, slot.clone())
            .with_telemetry(Some(telemetry.clone()));
        let coordinator =
            SelfHealingCoordinator::new(remediator, analytics, speaker, Some(telemetry.clone()));
        Ok(Self {
            router,
            coordinator,
            slot,
            bus,
            events,
            telemetry,
            speech_worker,
        })
    }

    /// Handles an utterance; rejected voice input is observed as a parse error right away.
    pub async fn handle(
        &self,
        utterance: &str,
        source: UtteranceSource,
    ) -> Result<(RouterOutcome, Option<SelfHealingDecision>), PipelineError> {
        let outcome = self.router.handle(utterance, source).await?;
        let decision = match &outcome {
            RouterOutcome::Rejected { ticket } if source == UtteranceSource::Voice => Some(
                self.coordinator
                    .observe(ticket, HandlerOutcome::ParseError, ScreenContext::default())
                    .0,
            ),
            _ => None,
        };
        Ok((outcome, decision))
    }

    /// Feeds a later search outcome back for self-healing.
    pub fn observe(
        &self,
        ticket: &UtteranceTicket,
        outcome: HandlerOutcome,
        context: ScreenContext,
    ) -> SelfHealingDecision {
        self.coordinator.observe(ticket, outcome, context).0
    }

    /// Attribution prefill slot read by the "add to list" flow.
    #[must_use]
    pub const fn slot(&self) -> &AttributionSlot {
        &self.slot
    }

    /// In-memory dispatch bus (unused when an event log file is configured).
    #[must_use]
    pub const fn bus(&self) -> &MemoryEventBus<SearchRequest> {
        &self.bus
    }

    /// Pipeline events (`voice.router.dispatched`, `voice.healing.escalated`).
    #[must_use]
    pub const fn events(&self) -> &MemoryEventBus<Value> {
        &self.events
    }

    /// Telemetry shared by every component.
    #[must_use]
    pub const fn telemetry(&self) -> &VoiceTelemetry {
        &self.telemetry
    }

    /// Drops the router and coordinator and waits for queued speech to finish.
    pub async fn shutdown(self) {
        let Self {
            router,
            coordinator,
            speech_worker,
            ..
        } = self;
        drop(router);
        drop(coordinator);
        let _ = speech_worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_event_bus::EventSubscriber;
    use tempfile::tempdir;

    fn silent_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.speech.backend = SpeechBackendKind::Silent;
        config
    }

    #[tokio::test]
    async fn end_to_end_recommendation() {
        let runtime = VoiceRuntime::from_config(&silent_config()).unwrap();
        let mut rx = runtime.bus().subscribe().await.unwrap();
        let (outcome, decision) = runtime
            .handle("Sally recommends The Matrix", UtteranceSource::Voice)
            .await
            .unwrap();
        assert!(outcome.is_dispatched());
        assert!(decision.is_none());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.payload.target_phrase, "The Matrix");
        assert_eq!(runtime.slot().peek().unwrap().name, "Sally");

        let decision = runtime.observe(
            outcome.ticket(),
            HandlerOutcome::Success,
            ScreenContext::default(),
        );
        assert!(!decision.escalate);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_voice_input_is_observed_immediately() {
        let runtime = VoiceRuntime::from_config(&silent_config()).unwrap();
        let (outcome, decision) = runtime
            .handle("actually I watched this already", UtteranceSource::Voice)
            .await
            .unwrap();
        assert!(!outcome.is_dispatched());
        assert!(decision.unwrap().escalate);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn dispatches_and_escalations_reach_the_event_bus() {
        let runtime = VoiceRuntime::from_config(&silent_config()).unwrap();
        let mut events = runtime.events().subscribe().await.unwrap();
        let (outcome, _) = runtime.handle("add Heat", UtteranceSource::Voice).await.unwrap();
        let dispatched = events.recv().await.unwrap();
        assert_eq!(dispatched.topic, "voice.router.dispatched");
        assert_eq!(dispatched.payload["request"]["target_phrase"], "Heat");

        let decision = runtime.observe(
            outcome.ticket(),
            HandlerOutcome::NoResults,
            ScreenContext::default(),
        );
        assert!(decision.escalate);
        let escalated = events.recv().await.unwrap();
        assert_eq!(escalated.topic, "voice.healing.escalated");
        assert_eq!(escalated.payload["utterance"], "add Heat");
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn event_log_and_analytics_files_are_used() {
        let dir = tempdir().unwrap();
        let mut config = silent_config();
        config.telemetry.event_log = Some(dir.path().join("search.jsonl"));
        config.telemetry.log_path = Some(dir.path().join("voice.log"));
        config.analytics.path = Some(dir.path().join("analytics.jsonl"));
        let runtime = VoiceRuntime::from_config(&config).unwrap();
        runtime.handle("add Heat", UtteranceSource::Voice).await.unwrap();
        let events = std::fs::read_to_string(dir.path().join("search.jsonl")).unwrap();
        assert!(events.contains("\"target_phrase\":\"Heat\""));
        let log = std::fs::read_to_string(dir.path().join("voice.log")).unwrap();
        assert!(log.contains("voice.router.dispatched"));
        runtime.shutdown().await;
    }
}
