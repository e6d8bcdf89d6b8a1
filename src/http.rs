//! Request and response model for intercepted traffic.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Declared resource type of a request, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  /// Top-level or iframe navigation
  Document,
  Script,
  /// Stylesheets
  Style,
  Image,
  Font,
  /// Anything else (XHR/fetch, media, workers, ...)
  Other,
}

/// An inbound request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: String,
  pub url: Url,
  pub destination: Destination,
}

impl HttpRequest {
  /// Build a GET request for `url` with the given destination.
  pub fn get(url: &str, destination: Destination) -> Result<Self> {
    Ok(Self {
      method: "GET".to_string(),
      url: Url::parse(url).map_err(|e| eyre!("invalid request URL {}: {}", url, e))?,
      destination,
    })
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  /// True for http/https targets; everything else (chrome-extension:,
  /// data:, blob:) is outside our cache policy.
  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }
}

/// An immutable snapshot of a network response.
///
/// The body is owned bytes, so a clone written to the cache and the value
/// returned to the caller are fully independent copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl HttpResponse {
  /// A 200 response with the given body and no headers.
  pub fn ok(body: impl Into<Vec<u8>>) -> Self {
    Self {
      status: 200,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// Only 200 responses are ever written to a cache partition.
  pub fn is_success(&self) -> bool {
    self.status == 200
  }

  /// First header value matching `name`, case-insensitive.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
