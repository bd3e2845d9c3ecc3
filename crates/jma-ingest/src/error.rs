//! Error type for `jma-ingest`.

use thiserror::Error;

/// Failures that abort an ingestion run. Per-area fetch failures are not
/// errors at this level; they end up in the run summary.
#[derive(Debug, Error)]
pub enum Error {
  /// The store rejected a read or write.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// An ingestion task panicked or was cancelled.
  #[error("ingestion task failed: {0}")]
  Task(#[from] tokio::task::JoinError),

  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),
}

impl Error {
  pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
