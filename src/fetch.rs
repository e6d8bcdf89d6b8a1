//! Network client for upstream fetches.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;

use crate::error::WorkerError;
use crate::http::{HttpRequest, HttpResponse};

/// The network seam. The worker and strategies only ever see this trait, so
/// tests can substitute canned responses for the real client.
pub trait Fetch: Send + Sync + 'static {
  /// Perform the request and resolve to an owned response snapshot.
  fn fetch(&self, req: HttpRequest) -> BoxFuture<'static, Result<HttpResponse>>;
}

/// Thin wrapper over reqwest that collapses a live response into an owned
/// [`HttpResponse`] snapshot. Transport failures are reported as
/// [`WorkerError::NetworkUnavailable`].
#[derive(Clone)]
pub struct NetworkClient {
  client: reqwest::Client,
}

impl NetworkClient {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }

  /// Perform the request and buffer the full response.
  ///
  /// Non-200 statuses are not errors here; the caller decides whether the
  /// response is cacheable.
  pub async fn fetch(&self, req: &HttpRequest) -> Result<HttpResponse> {
    let method = reqwest::Method::from_bytes(req.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", req.method, e))?;

    let response = self
      .client
      .request(method, req.url.clone())
      .send()
      .await
      .map_err(|e| WorkerError::NetworkUnavailable {
        url: req.url.to_string(),
        reason: e.to_string(),
      })?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| WorkerError::NetworkUnavailable {
        url: req.url.to_string(),
        reason: e.to_string(),
      })?
      .to_vec();

    Ok(HttpResponse {
      status,
      headers,
      body,
    })
  }
}

impl Fetch for NetworkClient {
  fn fetch(&self, req: HttpRequest) -> BoxFuture<'static, Result<HttpResponse>> {
    let client = self.clone();
    Box::pin(async move { client.fetch(&req).await })
  }
}
