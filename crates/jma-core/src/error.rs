//! Error types for `jma-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The upstream returned `null` or an empty array.
  #[error("forecast document is empty")]
  EmptyDocument,

  #[error("malformed forecast document: {0}")]
  MalformedDocument(String),

  #[error("unknown forecast category: {0:?}")]
  UnknownCategory(String),

  #[error("unknown area level: {0:?}")]
  UnknownLevel(String),

  #[error("invalid datetime: {0:?}")]
  InvalidDatetime(String),

  #[error("serialization error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
