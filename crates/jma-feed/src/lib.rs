//! Client for the upstream JMA forecast feed.
//!
//! [`FeedSource`] is the seam the ingestion pipeline depends on; [`HttpFeed`]
//! is the production implementation. A source retrieves exactly one document
//! per area code and never interprets its forecast content. Retries are left
//! to the caller.

use std::future::Future;

use jma_core::document::ForecastDocument;

mod error;
mod http;

pub use error::FetchError;
pub use http::{DEFAULT_BASE_URL, FeedConfig, HttpFeed};

/// Anything that can produce the forecast document for an area code.
pub trait FeedSource: Send + Sync {
  fn fetch<'a>(
    &'a self,
    area_code: &'a str,
  ) -> impl Future<Output = Result<ForecastDocument, FetchError>> + Send + 'a;
}
