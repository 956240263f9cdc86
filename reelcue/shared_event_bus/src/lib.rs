#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Typed event bus used to hand work across decoupled components.
//!
//! Every event travels inside an [`Envelope`]; the payload type is chosen by
//! the producer (a search request, a telemetry blob, ...).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use uuid::Uuid;

/// Event wrapper carrying routing metadata around a typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<E> {
    /// Unique identifier.
    pub id: String,
    /// Component producing the event.
    pub source: String,
    /// Dotted topic, e.g. `search.requested`.
    pub topic: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Event body.
    pub payload: E,
}

impl<E> Envelope<E> {
    /// Wraps a payload with a fresh id and the current time.
    pub fn new(source: impl Into<String>, topic: impl Into<String>, payload: E) -> Self {
        Self {
            id: format!("evt-{}", Uuid::new_v4()),
            source: source.into(),
            topic: topic.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Event publisher interface.
#[async_trait]
pub trait EventPublisher<E>: Send + Sync
where
    E: Send + 'static,
{
    /// Publishes an event to the bus.
    async fn publish(&self, event: Envelope<E>) -> Result<()>;
}

/// Event subscriber interface.
#[async_trait]
pub trait EventSubscriber<E>: Send + Sync
where
    E: Send + 'static,
{
    /// Returns a receiver yielding every event published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<Envelope<E>>>;
}

/// In-memory broadcast bus with a bounded backlog of recent events.
#[derive(Debug, Clone)]
pub struct MemoryEventBus<E> {
    sender: broadcast::Sender<Envelope<E>>,
    backlog: Arc<Mutex<VecDeque<Envelope<E>>>>,
    capacity: usize,
}

impl<E: Clone> MemoryEventBus<E> {
    /// Creates a new bus; a zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Snapshot of recent events retained in memory, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Envelope<E>> {
        self.backlog.lock().iter().cloned().collect()
    }
}

/// File-backed publisher appending one JSON envelope per line.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates a publisher that appends JSON lines to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl<E> EventPublisher<E> for MemoryEventBus<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn publish(&self, event: Envelope<E>) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            backlog.push_back(event.clone());
            while backlog.len() > self.capacity {
                backlog.pop_front();
            }
        }
        // No receivers is not an error: the backlog still records the event.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[async_trait]
impl<E> EventSubscriber<E> for MemoryEventBus<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn subscribe(&self) -> Result<broadcast::Receiver<Envelope<E>>> {
        Ok(self.sender.subscribe())
    }
}

#[async_trait]
impl<E> EventPublisher<E> for FileEventPublisher
where
    E: Serialize + Send + Sync + 'static,
{
    async fn publish(&self, event: Envelope<E>) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut data = serde_json::to_vec(&event)?;
        data.push(b'\n');
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn sample_event() -> Envelope<Value> {
        Envelope::new("tester", "search.requested", json!({ "target": "Jaws" }))
    }

    #[tokio::test]
    async fn publishes_and_receives() {
        let bus: MemoryEventBus<Value> = MemoryEventBus::new(16);
        let mut rx = bus.subscribe().await.unwrap();
        bus.publish(sample_event()).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "search.requested");
        assert_eq!(event.payload["target"], "Jaws");
        assert!(event.id.starts_with("evt-"));
    }

    #[tokio::test]
    async fn backlog_is_bounded() {
        let bus: MemoryEventBus<u32> = MemoryEventBus::new(2);
        for n in 0..5 {
            bus.publish(Envelope::new("tester", "n", n)).await.unwrap();
        }
        let kept: Vec<u32> = bus.snapshot().into_iter().map(|e| e.payload).collect();
        assert_eq!(kept, vec![3, 4]);
    }

    #[tokio::test]
    async fn file_publisher_writes_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events/search.log");
        let publisher = FileEventPublisher::new(&path).unwrap();
        publisher.publish(sample_event()).await.unwrap();
        publisher.publish(sample_event()).await.unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let parsed: Envelope<Value> = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.source, "tester");
    }
}
