//! [`HttpFeed`]: fetches `{base_url}/{area_code}.json` over HTTPS.

use std::time::Duration;

use jma_core::document::ForecastDocument;
use reqwest::Client;

use crate::{FeedSource, FetchError};

pub const DEFAULT_BASE_URL: &str = "https://www.jma.go.jp/bosai/forecast/data/forecast";

/// Connection settings for the forecast feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
  pub base_url: String,
  /// Whole-request timeout; the only cancellation the feed applies.
  pub timeout:  Duration,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_owned(),
      timeout:  Duration::from_secs(30),
    }
  }
}

/// HTTP implementation of [`FeedSource`].
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct HttpFeed {
  client: Client,
  config: FeedConfig,
}

impl HttpFeed {
  pub fn new(config: FeedConfig) -> Result<Self, FetchError> {
    let client = Client::builder()
      .timeout(config.timeout)
      .user_agent(concat!("jma-ingest/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;
    Ok(Self { client, config })
  }

  /// The document URL for `area_code`.
  pub fn url(&self, area_code: &str) -> String {
    format!("{}/{area_code}.json", self.config.base_url.trim_end_matches('/'))
  }
}

impl FeedSource for HttpFeed {
  async fn fetch(&self, area_code: &str) -> Result<ForecastDocument, FetchError> {
    let url = self.url(area_code);
    tracing::debug!(%url, "fetching forecast document");

    let resp = self.client.get(&url).send().await?;

    let status = resp.status();
    if !status.is_success() {
      return Err(FetchError::Http { status_code: status.as_u16() });
    }

    let body = resp.text().await?;
    Ok(ForecastDocument::from_json_str(&body)?)
  }
}

#[cfg(test)]
mod tests {
  use axum::{Router, http::StatusCode, routing::get};
  use tokio::net::TcpListener;

  use super::*;

  const FORECAST: &str = include_str!("../../jma-core/fixtures/forecast_130000.json");

  async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
  }

  async fn upstream() -> HttpFeed {
    let router = Router::new()
      .route("/130000.json", get(|| async { FORECAST }))
      .route("/503.json", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
      .route("/empty.json", get(|| async { "" }))
      .route("/null.json", get(|| async { "null" }))
      .route("/brackets.json", get(|| async { "[]" }))
      .route("/garbage.json", get(|| async { "<html>maintenance</html>" }))
      .route("/object.json", get(|| async { r#"{"reportDatetime":"x"}"# }));
    let base_url = serve(router).await;
    HttpFeed::new(FeedConfig { base_url, timeout: Duration::from_secs(5) }).unwrap()
  }

  #[test]
  fn url_joins_base_and_code() {
    let feed = HttpFeed::new(FeedConfig {
      base_url: "https://example.test/forecast/".into(),
      ..FeedConfig::default()
    })
    .unwrap();
    assert_eq!(feed.url("130000"), "https://example.test/forecast/130000.json");
  }

  #[tokio::test]
  async fn fetches_a_document() {
    let doc = upstream().await.fetch("130000").await.unwrap();
    assert_eq!(doc.len(), 2);
  }

  #[tokio::test]
  async fn non_success_status_is_http_error() {
    let feed = upstream().await;
    assert_eq!(
      feed.fetch("503").await.unwrap_err(),
      FetchError::Http { status_code: 503 }
    );
    assert_eq!(
      feed.fetch("404").await.unwrap_err(),
      FetchError::Http { status_code: 404 }
    );
  }

  #[tokio::test]
  async fn empty_bodies_are_empty_responses() {
    let feed = upstream().await;
    for code in ["empty", "null", "brackets"] {
      assert_eq!(feed.fetch(code).await.unwrap_err(), FetchError::EmptyResponse, "{code}");
    }
  }

  #[tokio::test]
  async fn non_array_bodies_are_malformed() {
    let feed = upstream().await;
    for code in ["garbage", "object"] {
      assert!(
        matches!(feed.fetch(code).await, Err(FetchError::Malformed(_))),
        "{code}"
      );
    }
  }

  #[tokio::test]
  async fn unreachable_host_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let feed = HttpFeed::new(FeedConfig {
      base_url: format!("http://{addr}"),
      timeout:  Duration::from_secs(5),
    })
    .unwrap();
    assert!(matches!(feed.fetch("130000").await, Err(FetchError::Network(_))));
  }
}
