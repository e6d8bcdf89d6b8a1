//! The three caching strategies.
//!
//! Every strategy reads and writes the runtime partition only; the precache
//! partition is write-once at install time and is consulted directly by the
//! worker, not through here (except for the offline fallback page lookup).
//!
//! The network is always supplied as a fetcher closure returning a future, so
//! strategies stay independent of the concrete HTTP client and tests can hand
//! in canned responses.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{CacheStore, RequestKey};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::http::{HttpRequest, HttpResponse};

/// Outcome of a stale-while-revalidate background refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
  /// Fetch succeeded with 200 and the cache was updated
  Updated,
  /// Fetch succeeded with a non-200 status; cache left untouched
  Skipped { status: u16 },
  /// Fetch or cache write failed; cache left untouched, failure swallowed
  Failed { reason: String },
}

/// Emitted to the refresh observer after each background refresh completes.
/// Background failures never reach the original caller; this channel is how
/// tests (and diagnostics) see them.
#[derive(Debug, Clone)]
pub struct RefreshEvent {
  pub key: RequestKey,
  pub outcome: RefreshOutcome,
}

pub struct StrategyEngine<S: CacheStore> {
  store: Arc<S>,
  runtime: String,
  precache: String,
  /// Full URL of the offline fallback page, resolved against the app origin.
  /// None when the origin does not parse, in which case no fallback exists.
  offline_fallback: Option<String>,
  refresh_observer: Option<mpsc::UnboundedSender<RefreshEvent>>,
}

impl<S: CacheStore> StrategyEngine<S> {
  pub fn new(store: Arc<S>, config: &WorkerConfig) -> Self {
    Self {
      store,
      runtime: config.runtime_name(),
      precache: config.precache_name(),
      offline_fallback: config
        .resolve(&config.offline_fallback)
        .map(|u| u.to_string())
        .ok(),
      refresh_observer: None,
    }
  }

  /// Observe background refresh outcomes (stale-while-revalidate only).
  pub fn with_refresh_observer(mut self, tx: mpsc::UnboundedSender<RefreshEvent>) -> Self {
    self.refresh_observer = Some(tx);
    self
  }

  /// Cache-first: serve static assets from the runtime partition, hitting the
  /// network only on a miss. Never blocks on network when a cached entry
  /// exists; staleness is accepted (assets are content-hashed by the app).
  pub async fn cache_first<F, Fut>(&self, req: &HttpRequest, fetch: F) -> Result<HttpResponse>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<HttpResponse>>,
  {
    let key = RequestKey::from(req);

    if let Some(cached) = self.store.get(&self.runtime, &key)? {
      return Ok(cached.response);
    }

    match fetch().await {
      Ok(response) => {
        self.store_if_cacheable(&key, &response)?;
        Ok(response)
      }
      Err(err) => match self.offline_page()? {
        Some(page) => {
          warn!(key = %key, "network unavailable, serving offline fallback");
          Ok(page)
        }
        None => Err(err),
      },
    }
  }

  /// Network-first: always prefer live data; the cache is purely a resilience
  /// fallback for connectivity loss.
  pub async fn network_first<F, Fut>(&self, req: &HttpRequest, fetch: F) -> Result<HttpResponse>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<HttpResponse>>,
  {
    let key = RequestKey::from(req);

    match fetch().await {
      Ok(response) => {
        self.store_if_cacheable(&key, &response)?;
        Ok(response)
      }
      Err(err) => match self.store.get(&self.runtime, &key)? {
        Some(cached) => {
          warn!(key = %key, "network unavailable, serving cached entry");
          Ok(cached.response)
        }
        None => Err(err),
      },
    }
  }

  /// Stale-while-revalidate: return the cached copy immediately if present
  /// and refresh the cache in the background. The background refresh either
  /// updates the cache or fails silently; its failure must never surface to
  /// the caller, who already has a response.
  ///
  /// On a miss the network result is awaited inline, and only on that path
  /// may an error propagate.
  pub async fn stale_while_revalidate<F, Fut>(
    &self,
    req: &HttpRequest,
    fetch: F,
  ) -> Result<HttpResponse>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
  {
    let key = RequestKey::from(req);

    match self.store.get(&self.runtime, &key)? {
      Some(cached) => {
        self.spawn_refresh(key, fetch());
        Ok(cached.response)
      }
      None => {
        let response = fetch().await?;
        self.store_if_cacheable(&key, &response)?;
        Ok(response)
      }
    }
  }

  /// Direct lookup in the runtime partition.
  pub fn cached_runtime(&self, key: &RequestKey) -> Result<HttpResponse> {
    self.lookup(&self.runtime, key)
  }

  /// Direct lookup in the precache partition. Entries are keyed by the full
  /// resolved URL of each install-list asset, so a cross-origin request whose
  /// path happens to match an asset never gets our copy.
  pub fn precached(&self, url: &str) -> Result<HttpResponse> {
    self.lookup(&self.precache, &RequestKey::new("GET", url))
  }

  fn lookup(&self, partition: &str, key: &RequestKey) -> Result<HttpResponse> {
    self
      .store
      .get(partition, key)?
      .map(|cached| cached.response)
      .ok_or_else(|| {
        WorkerError::CacheMiss {
          key: key.to_string(),
        }
        .into()
      })
  }

  /// Write a response to the runtime partition if its status permits caching.
  /// Returns whether the entry was stored.
  pub fn store_if_cacheable(&self, key: &RequestKey, response: &HttpResponse) -> Result<bool> {
    if !response.is_success() {
      let skipped = WorkerError::BadUpstreamStatus {
        status: response.status,
        url: key.url.clone(),
      };
      debug!(%skipped, "skipping cache write");
      return Ok(false);
    }

    // The stored copy is a clone; the caller keeps its own response
    self.store.put(&self.runtime, key, response)?;
    Ok(true)
  }

  /// The designated offline page, looked up in precache first (where install
  /// puts it), then runtime.
  fn offline_page(&self) -> Result<Option<HttpResponse>> {
    let url = match &self.offline_fallback {
      Some(url) => url,
      None => return Ok(None),
    };

    let key = RequestKey::new("GET", url);
    if let Some(cached) = self.store.get(&self.precache, &key)? {
      return Ok(Some(cached.response));
    }
    Ok(self.store.get(&self.runtime, &key)?.map(|c| c.response))
  }

  fn spawn_refresh(
    &self,
    key: RequestKey,
    fut: impl Future<Output = Result<HttpResponse>> + Send + 'static,
  ) {
    let store = Arc::clone(&self.store);
    let runtime = self.runtime.clone();
    let observer = self.refresh_observer.clone();

    tokio::spawn(async move {
      let outcome = match fut.await {
        Ok(response) if response.is_success() => match store.put(&runtime, &key, &response) {
          Ok(()) => RefreshOutcome::Updated,
          Err(e) => RefreshOutcome::Failed {
            reason: e.to_string(),
          },
        },
        Ok(response) => RefreshOutcome::Skipped {
          status: response.status,
        },
        Err(e) => RefreshOutcome::Failed {
          reason: e.to_string(),
        },
      };

      if let RefreshOutcome::Failed { reason } = &outcome {
        warn!(key = %key, %reason, "background refresh failed");
      }

      if let Some(tx) = observer {
        // Ignore send errors - receiver may have been dropped
        let _ = tx.send(RefreshEvent { key, outcome });
      }
    });
  }
}

impl<S: CacheStore> Clone for StrategyEngine<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      runtime: self.runtime.clone(),
      precache: self.precache.clone(),
      offline_fallback: self.offline_fallback.clone(),
      refresh_observer: self.refresh_observer.clone(),
    }
  }
}
