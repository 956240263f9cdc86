use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
    classifier::DEFAULT_DIRECT_WORD_LIMIT,
    router::{DEFAULT_ACKNOWLEDGMENT, DEFAULT_APOLOGY},
};

/// Pipeline configuration, usually read from `reelcue.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    /// Spoken phrases and backend.
    #[serde(default)]
    pub speech: SpeechSettings,
    /// Search-intent classifier tuning.
    #[serde(default)]
    pub classifier: ClassifierSettings,
    /// Extra recommender aliases (variant -> display name).
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
    /// Log and event sinks.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    /// Secondary interpreter.
    #[serde(default)]
    pub remediation: RemediationSettings,
    /// Analytics output.
    #[serde(default)]
    pub analytics: AnalyticsSettings,
}

impl PipelineConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// Relative paths are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_paths(&base);
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Checks invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.classifier.direct_word_limit == 0 {
            bail!("classifier.direct_word_limit must be at least 1");
        }
        if self.telemetry.bus_capacity == 0 {
            bail!("telemetry.bus_capacity must be at least 1");
        }
        if self.speech.acknowledgment.trim().is_empty() || self.speech.apology.trim().is_empty() {
            bail!("speech phrases must not be empty");
        }
        if let Some((alias, _)) = self
            .aliases
            .iter()
            .find(|(alias, canonical)| alias.trim().is_empty() || canonical.trim().is_empty())
        {
            bail!("alias entry {alias:?} has an empty side");
        }
        if let Some(endpoint) = &self.remediation.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                bail!("remediation.endpoint must be an http(s) URL, got {endpoint}");
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            self.telemetry.log_path.as_mut(),
            self.telemetry.event_log.as_mut(),
            self.analytics.path.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Which speech backend drains the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackendKind {
    /// Print to stdout.
    #[default]
    Console,
    /// Platform `say` binary.
    Say,
    /// Discard.
    Silent,
}

/// Spoken phrases.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechSettings {
    /// Said before dispatching a search.
    #[serde(default = "default_acknowledgment")]
    pub acknowledgment: String,
    /// Said when nothing could be extracted.
    #[serde(default = "default_apology")]
    pub apology: String,
    /// Backend.
    #[serde(default)]
    pub backend: SpeechBackendKind,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            acknowledgment: default_acknowledgment(),
            apology: default_apology(),
            backend: SpeechBackendKind::default(),
        }
    }
}

/// Classifier tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    /// Unmarked queries up to this many words are direct.
    #[serde(default = "default_direct_word_limit")]
    pub direct_word_limit: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            direct_word_limit: default_direct_word_limit(),
        }
    }
}

/// Log and event sinks.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    /// JSON-lines log file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// JSON-lines file receiving dispatched search requests.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    /// In-memory bus capacity.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_path: None,
            event_log: None,
            bus_capacity: default_bus_capacity(),
        }
    }
}

/// Secondary interpreter settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RemediationSettings {
    /// Remote interpreter; the offline loopback is used when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RemediationSettings {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Analytics output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyticsSettings {
    /// JSON-lines file; records are kept in memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_acknowledgment() -> String {
    DEFAULT_ACKNOWLEDGMENT.into()
}

fn default_apology() -> String {
    DEFAULT_APOLOGY.into()
}

const fn default_direct_word_limit() -> usize {
    DEFAULT_DIRECT_WORD_LIMIT
}

const fn default_bus_capacity() -> usize {
    64
}

const fn default_timeout_ms() -> u64 {
    4_000
}
