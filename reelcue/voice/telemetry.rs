use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{Envelope, EventPublisher};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::{Builder, Handle};

/// Builder for voice pipeline telemetry sinks.
pub struct VoiceTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    log_sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher<Value>>>,
}

impl VoiceTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            log_sink: None,
            event_publisher: None,
        }
    }

    /// Logs to a JSON-lines file.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Logs to an existing sink; takes precedence over `log_path`.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher<Value>>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<VoiceTelemetry> {
        let sink = match (self.log_sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?) as Arc<dyn LogSink>),
            (None, None) => None,
        };
        Ok(VoiceTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                sink,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared across pipeline components.
#[derive(Clone)]
pub struct VoiceTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for VoiceTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceTelemetry")
            .field("module", &self.inner.module)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    sink: Option<Arc<dyn LogSink>>,
    publisher: Option<Arc<dyn EventPublisher<Value>>>,
}

impl VoiceTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> VoiceTelemetryBuilder {
        VoiceTelemetryBuilder::new(module)
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        self.write(LogRecord::new(&self.inner.module, level, message).with_metadata(&metadata))
    }

    /// Logs structured metadata tagged with a ticket id.
    pub fn log_correlated(
        &self,
        level: LogLevel,
        message: &str,
        correlation_id: &str,
        metadata: Value,
    ) -> Result<()> {
        self.write(
            LogRecord::new(&self.inner.module, level, message)
                .correlated(correlation_id)
                .with_metadata(&metadata),
        )
    }

    fn write(&self, record: LogRecord) -> Result<()> {
        if let Some(sink) = &self.inner.sink {
            sink.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus. Inside a runtime the publish is spawned.
    pub fn event(&self, topic: &str, payload: Value) -> Result<()> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };
        let envelope = Envelope::new(self.inner.module.clone(), topic, payload);
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(envelope).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(publisher.publish(envelope))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("voice.log");
        let bus = Arc::new(MemoryEventBus::<Value>::new(16));
        let telemetry = VoiceTelemetry::builder("voice")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "voice.router.dispatched", json!({ "target": "Heat" }))
            .unwrap();
        telemetry
            .log_correlated(LogLevel::Info, "voice.healing.evaluated", "t-1", json!({}))
            .unwrap();
        telemetry
            .event("voice.healing.escalated", json!({ "reasons": 1 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("voice.router.dispatched"));
        assert!(content.contains("\"correlation_id\":\"t-1\""));
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn unconfigured_telemetry_is_a_no_op() {
        let telemetry = VoiceTelemetry::builder("voice").build().unwrap();
        telemetry.log(LogLevel::Error, "x", json!({})).unwrap();
        telemetry.event("x", json!({})).unwrap();
    }
}
