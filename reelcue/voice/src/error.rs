use thiserror::Error;

/// Errors surfaced by the voice pipeline.
///
/// Parse failures are not errors: they come back as invalid commands.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The search request could not be handed to the dispatch bus.
    #[error("dispatch failed: {0}")]
    Dispatch(#[source] anyhow::Error),
    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {0}")]
    Config(String),
    /// The secondary interpreter failed or returned garbage.
    #[error("remediation failed: {0}")]
    Remediation(String),
    /// An analytics record could not be written.
    #[error("analytics error: {0}")]
    Analytics(#[source] anyhow::Error),
}
