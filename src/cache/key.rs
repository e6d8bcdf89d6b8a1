//! Request identity used as the cache lookup key.

use sha2::{Digest, Sha256};

use crate::http::HttpRequest;

/// Identity of a cacheable request: URL plus method.
///
/// Only GET requests ever reach a cache partition, but the method is part of
/// the key so the store itself stays policy-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_uppercase(),
      url: url.to_string(),
    }
  }

  /// SHA256 hash for stable, fixed-length storage keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl From<&HttpRequest> for RequestKey {
  fn from(req: &HttpRequest) -> Self {
    Self::new(&req.method, req.url.as_str())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}
