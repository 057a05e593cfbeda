//! Service-level error type.

use crate::config::ConfigError;
use scribe_ingest::IngestError;
use scribe_log::LogError;
use thiserror::Error;

/// Errors that abort service initialization, startup, or ingestion.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("history log failure: {0}")]
    Log(#[from] LogError),

    #[error("block ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state history loop panicked")]
    LoopPanicked,
}
