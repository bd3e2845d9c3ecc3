//! Error type for `jma-feed`.

use thiserror::Error;

/// Why a document could not be retrieved. Always scoped to one area code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// Unreachable host, refused connection, timeout or a broken body stream.
  #[error("network error: {0}")]
  Network(String),

  #[error("upstream returned HTTP {status_code}")]
  Http { status_code: u16 },

  /// A 2xx response whose body is empty, `null` or `[]`.
  #[error("upstream returned an empty document")]
  EmptyResponse,

  /// A 2xx response whose body is not a JSON array of reports.
  #[error("malformed document: {0}")]
  Malformed(String),
}

impl From<jma_core::Error> for FetchError {
  fn from(err: jma_core::Error) -> Self {
    match err {
      jma_core::Error::EmptyDocument => Self::EmptyResponse,
      other => Self::Malformed(other.to_string()),
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    match err.status() {
      Some(status) => Self::Http { status_code: status.as_u16() },
      None => Self::Network(err.to_string()),
    }
  }
}
