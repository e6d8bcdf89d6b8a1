//! Request routing: which caching strategy (if any) handles a request.

use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::http::{Destination, HttpRequest};

/// Outcome of routing an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
  /// No interception; the request passes through untouched.
  Bypass,
  /// Static assets: serve from cache, fetch only on miss.
  CacheFirst,
  /// API traffic: always prefer live data, cache as fallback.
  NetworkFirst,
  /// Navigations and the rest: cached copy now, refresh in background.
  StaleWhileRevalidate,
}

/// Pure classifier from request shape to strategy. No side effects.
#[derive(Clone)]
pub struct Router {
  config: Arc<WorkerConfig>,
}

impl Router {
  pub fn new(config: Arc<WorkerConfig>) -> Self {
    Self { config }
  }

  pub fn route(&self, req: &HttpRequest) -> RouteDecision {
    // Only GETs over http(s) are ever cached
    if !req.is_get() || !req.is_http() {
      return RouteDecision::Bypass;
    }

    // Third-party hosts (analytics, maps, CDNs) are not ours to cache
    if let Some(host) = req.url.host_str() {
      if self.config.is_excluded_host(host) {
        return RouteDecision::Bypass;
      }
    }

    if self.config.is_api_path(req.url.path()) {
      return RouteDecision::NetworkFirst;
    }

    match req.destination {
      Destination::Image | Destination::Style | Destination::Script | Destination::Font => {
        RouteDecision::CacheFirst
      }
      Destination::Document | Destination::Other => RouteDecision::StaleWhileRevalidate,
    }
  }
}
