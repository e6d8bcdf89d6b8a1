//! The worker: one method per platform event.
//!
//! A thin platform adapter (outside this crate) registers for fetch/install/
//! activate/push/message events and forwards them here. The adapter must keep
//! the event context alive until the returned future resolves, including the
//! background work kicked off by stale-while-revalidate.

use chrono::Utc;
use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{CacheStore, RequestKey};
use crate::config::WorkerConfig;
use crate::fetch::Fetch;
use crate::http::{Destination, HttpRequest, HttpResponse};
use crate::lifecycle::LifecycleManager;
use crate::notify::{self, ClickOutcome, ControlMessage, Notification, SYNC_POSTS_TAG};
use crate::router::{RouteDecision, Router};
use crate::strategy::{RefreshEvent, StrategyEngine};

/// Platform operations the worker can request. Implemented by the adapter
/// shim that owns the actual platform handles.
pub trait WorkerHost: Send + Sync {
  /// Supersede any waiting previous worker instance without delay
  fn skip_waiting(&self);
  /// Take control of all currently open application instances
  fn claim_clients(&self);
  fn show_notification(&self, notification: &Notification);
  /// Open or focus the application at the given URL
  fn open_window(&self, url: &str);
}

pub struct Worker<S: CacheStore, N: Fetch, H: WorkerHost> {
  config: Arc<WorkerConfig>,
  router: Router,
  strategies: StrategyEngine<S>,
  lifecycle: LifecycleManager<S>,
  net: Arc<N>,
  host: Arc<H>,
}

impl<S: CacheStore, N: Fetch, H: WorkerHost> Worker<S, N, H> {
  pub fn new(config: Arc<WorkerConfig>, store: Arc<S>, net: Arc<N>, host: Arc<H>) -> Self {
    Self {
      router: Router::new(Arc::clone(&config)),
      strategies: StrategyEngine::new(Arc::clone(&store), &config),
      lifecycle: LifecycleManager::new(store, &config),
      config,
      net,
      host,
    }
  }

  /// Observe stale-while-revalidate background refresh outcomes.
  pub fn with_refresh_observer(mut self, tx: mpsc::UnboundedSender<RefreshEvent>) -> Self {
    self.strategies = self.strategies.with_refresh_observer(tx);
    self
  }

  /// Handle an intercepted request. `Ok(None)` means the request bypasses
  /// interception and must pass through to the network untouched.
  pub async fn on_fetch(&self, req: &HttpRequest) -> Result<Option<HttpResponse>> {
    let decision = self.router.route(req);
    if decision == RouteDecision::Bypass {
      return Ok(None);
    }

    // The precache is queried directly by full URL, not through the
    // strategies; API routes skip it so live data always wins there.
    if decision != RouteDecision::NetworkFirst {
      if let Ok(response) = self.strategies.precached(req.url.as_str()) {
        return Ok(Some(response));
      }
    }

    let net = Arc::clone(&self.net);
    let owned = req.clone();
    let fetch = move || net.fetch(owned);

    let response = match decision {
      RouteDecision::CacheFirst => self.strategies.cache_first(req, fetch).await?,
      RouteDecision::NetworkFirst => self.strategies.network_first(req, fetch).await?,
      _ => self.strategies.stale_while_revalidate(req, fetch).await?,
    };

    Ok(Some(response))
  }

  /// Install: precache the declared asset list atomically, then signal
  /// readiness to supersede the previous worker immediately.
  pub async fn on_install(&self) -> Result<()> {
    let net = Arc::clone(&self.net);

    self
      .lifecycle
      .install(move |url: String| {
        let net = Arc::clone(&net);
        async move {
          let req = HttpRequest::get(&url, Destination::Other)?;
          net.fetch(req).await
        }
      })
      .await?;

    self.host.skip_waiting();
    Ok(())
  }

  /// Activate: evict stale cache partitions and take control of open
  /// application instances. Returns the evicted partition names.
  pub fn on_activate(&self) -> Result<Vec<String>> {
    let evicted = self.lifecycle.activate()?;
    self.host.claim_clients();
    Ok(evicted)
  }

  /// Push: build and display a notification from the payload.
  pub fn on_push(&self, payload: Option<&str>) -> Notification {
    let notification = Notification::from_push(payload, Utc::now());
    self.host.show_notification(&notification);
    notification
  }

  /// Notification interaction. The notification is closed by the adapter in
  /// all cases; `explore` additionally opens the app.
  pub fn on_notification_click(&self, action: &str) -> ClickOutcome {
    let outcome = notify::on_click(action);
    if let ClickOutcome::OpenApp { url } = &outcome {
      self.host.open_window(url);
    }
    outcome
  }

  /// Control message from an application instance.
  pub async fn on_message(&self, message: &serde_json::Value) -> Result<()> {
    match ControlMessage::parse(message) {
      Some(ControlMessage::SkipWaiting) => {
        self.host.skip_waiting();
      }
      Some(ControlMessage::CacheUrls { payload }) => {
        self.cache_urls(&payload).await;
      }
      None => {
        debug!(%message, "ignoring unrecognized message");
      }
    }
    Ok(())
  }

  /// Background sync. `sync-posts` is acknowledged only; offline-write
  /// replay is not implemented.
  pub fn on_sync(&self, tag: &str) {
    if tag == SYNC_POSTS_TAG {
      debug!(tag, "background sync acknowledged");
    } else {
      debug!(tag, "ignoring unknown sync tag");
    }
  }

  /// Pre-populate the runtime partition. Best effort per URL: failures are
  /// logged and skipped, unlike the atomic install batch.
  async fn cache_urls(&self, urls: &[String]) {
    for raw in urls {
      let url = match self.config.resolve(raw) {
        Ok(url) => url,
        Err(e) => {
          warn!(url = %raw, error = %e, "pre-population URL rejected");
          continue;
        }
      };

      let req = HttpRequest {
        method: "GET".to_string(),
        url: url.clone(),
        destination: Destination::Other,
      };

      match self.net.fetch(req).await {
        Ok(response) => {
          let key = RequestKey::new("GET", url.as_str());
          match self.strategies.store_if_cacheable(&key, &response) {
            Ok(true) => debug!(%url, "pre-populated runtime cache"),
            Ok(false) => debug!(%url, status = response.status, "pre-population skipped"),
            Err(e) => warn!(%url, error = %e, "pre-population write failed"),
          }
        }
        Err(e) => warn!(%url, error = %e, "pre-population fetch failed"),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::error::WorkerError;
  use futures::future::BoxFuture;
  use serde_json::json;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;

  const ORIGIN: &str = "https://marketplace.example";

  /// Canned-response network. Unknown URLs answer 404; `offline` makes every
  /// fetch fail.
  #[derive(Default)]
  struct FakeNet {
    responses: Mutex<HashMap<String, HttpResponse>>,
    offline: AtomicBool,
    hits: Mutex<Vec<String>>,
  }

  impl FakeNet {
    fn serve(&self, url: &str, response: HttpResponse) {
      self
        .responses
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    fn go_offline(&self) {
      self.offline.store(true, Ordering::SeqCst);
    }

    fn hits(&self) -> usize {
      self.hits.lock().unwrap().len()
    }
  }

  impl Fetch for FakeNet {
    fn fetch(&self, req: HttpRequest) -> BoxFuture<'static, Result<HttpResponse>> {
      self.hits.lock().unwrap().push(req.url.to_string());

      let result = if self.offline.load(Ordering::SeqCst) {
        Err(
          WorkerError::NetworkUnavailable {
            url: req.url.to_string(),
            reason: "offline".to_string(),
          }
          .into(),
        )
      } else {
        Ok(
          self
            .responses
            .lock()
            .unwrap()
            .get(req.url.as_str())
            .cloned()
            .unwrap_or(HttpResponse {
              status: 404,
              headers: Vec::new(),
              body: Vec::new(),
            }),
        )
      };

      Box::pin(async move { result })
    }
  }

  #[derive(Default)]
  struct RecordingHost {
    skip_waiting: AtomicUsize,
    claims: AtomicUsize,
    notifications: Mutex<Vec<Notification>>,
    windows: Mutex<Vec<String>>,
  }

  impl WorkerHost for RecordingHost {
    fn skip_waiting(&self) {
      self.skip_waiting.fetch_add(1, Ordering::SeqCst);
    }

    fn claim_clients(&self) {
      self.claims.fetch_add(1, Ordering::SeqCst);
    }

    fn show_notification(&self, notification: &Notification) {
      self.notifications.lock().unwrap().push(notification.clone());
    }

    fn open_window(&self, url: &str) {
      self.windows.lock().unwrap().push(url.to_string());
    }
  }

  struct Fixture {
    store: Arc<MemoryStore>,
    net: Arc<FakeNet>,
    host: Arc<RecordingHost>,
    worker: Worker<MemoryStore, FakeNet, RecordingHost>,
  }

  fn fixture(extra_yaml: &str) -> Fixture {
    let yaml = format!(
      "cache_prefix: mm-marketplace\nversion: v1.0.0\norigin: {}\n{}",
      ORIGIN, extra_yaml
    );
    let config: Arc<WorkerConfig> = Arc::new(serde_yaml::from_str(&yaml).unwrap());
    let store = Arc::new(MemoryStore::new());
    let net = Arc::new(FakeNet::default());
    let host = Arc::new(RecordingHost::default());
    let worker = Worker::new(
      config,
      Arc::clone(&store),
      Arc::clone(&net),
      Arc::clone(&host),
    );
    Fixture {
      store,
      net,
      host,
      worker,
    }
  }

  fn get(url: &str, destination: Destination) -> HttpRequest {
    HttpRequest::get(url, destination).unwrap()
  }

  #[tokio::test]
  async fn bypassed_requests_touch_nothing() {
    let fx = fixture("excluded_hosts:\n  - google-analytics.com\n");

    let mut post = get(&format!("{}/api/items", ORIGIN), Destination::Other);
    post.method = "POST".to_string();
    assert!(fx.worker.on_fetch(&post).await.unwrap().is_none());

    let analytics = get("https://www.google-analytics.com/collect", Destination::Other);
    assert!(fx.worker.on_fetch(&analytics).await.unwrap().is_none());

    assert_eq!(fx.net.hits(), 0);
    assert!(fx.store.list_partitions().unwrap().is_empty());
  }

  #[tokio::test]
  async fn install_precaches_and_serves_directly() {
    let fx = fixture("precache_assets:\n  - /index.html\n  - /offline.html\n");
    fx.net
      .serve(&format!("{}/index.html", ORIGIN), HttpResponse::ok("<html>"));
    fx.net.serve(
      &format!("{}/offline.html", ORIGIN),
      HttpResponse::ok("offline"),
    );

    fx.worker.on_install().await.unwrap();
    assert_eq!(fx.host.skip_waiting.load(Ordering::SeqCst), 1);

    // Navigation to a precached path is answered from the precache partition
    // without a network hit
    let installed_hits = fx.net.hits();
    let req = get(&format!("{}/index.html", ORIGIN), Destination::Document);
    let response = fx.worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"<html>");
    assert_eq!(fx.net.hits(), installed_hits);
  }

  #[tokio::test]
  async fn precache_never_answers_for_a_foreign_origin() {
    let fx = fixture("precache_assets:\n  - /index.html\n");
    fx.net
      .serve(&format!("{}/index.html", ORIGIN), HttpResponse::ok("<html>"));
    fx.worker.on_install().await.unwrap();
    fx.net.go_offline();

    // Same path on another origin must not get our app shell
    let foreign = get("https://other-site.example/index.html", Destination::Document);
    let err = fx.worker.on_fetch(&foreign).await.unwrap_err();
    assert!(matches!(
      err.downcast_ref::<WorkerError>(),
      Some(WorkerError::NetworkUnavailable { .. })
    ));

    // while the same request on our origin still does
    let own = get(&format!("{}/index.html", ORIGIN), Destination::Document);
    let response = fx.worker.on_fetch(&own).await.unwrap().unwrap();
    assert_eq!(response.body, b"<html>");
  }

  #[tokio::test]
  async fn query_string_variants_miss_the_precache() {
    let fx = fixture("precache_assets:\n  - /index.html\n");
    fx.net
      .serve(&format!("{}/index.html", ORIGIN), HttpResponse::ok("<html>"));
    fx.worker.on_install().await.unwrap();

    let url = format!("{}/index.html?utm=1", ORIGIN);
    fx.net.serve(&url, HttpResponse::ok("fresh"));

    let req = get(&url, Destination::Document);
    let response = fx.worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"fresh");
  }

  #[tokio::test]
  async fn failed_install_leaves_no_precache_and_does_not_skip_waiting() {
    let fx = fixture("precache_assets:\n  - /index.html\n  - /missing.js\n");
    fx.net
      .serve(&format!("{}/index.html", ORIGIN), HttpResponse::ok("<html>"));
    // /missing.js answers 404

    let err = fx.worker.on_install().await.unwrap_err();
    assert!(matches!(
      err.downcast_ref::<WorkerError>(),
      Some(WorkerError::PartialInstall { .. })
    ));
    assert!(fx.store.list_partitions().unwrap().is_empty());
    assert_eq!(fx.host.skip_waiting.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn activate_evicts_previous_version_and_claims_clients() {
    let fx = fixture("");
    let key = RequestKey::new("GET", "https://marketplace.example/index.html");
    for name in [
      "mm-marketplace-v1.0.0",
      "mm-marketplace-v0.9.0",
      "mm-marketplace-runtime",
    ] {
      fx.store.put(name, &key, &HttpResponse::ok("x")).unwrap();
    }

    let evicted = fx.worker.on_activate().unwrap();

    assert_eq!(evicted, vec!["mm-marketplace-v0.9.0"]);
    assert_eq!(
      fx.store.list_partitions().unwrap(),
      vec!["mm-marketplace-v1.0.0", "mm-marketplace-runtime"]
    );
    assert_eq!(fx.host.claims.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn script_fetch_then_offline_replay() {
    let fx = fixture("");
    let url = format!("{}/app.js", ORIGIN);
    fx.net.serve(&url, HttpResponse::ok("X"));

    let req = get(&url, Destination::Script);
    let response = fx.worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"X");

    fx.net.go_offline();
    let response = fx.worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"X");
  }

  #[tokio::test]
  async fn api_requests_always_reflect_the_network() {
    let fx = fixture("");
    let url = format!("{}/api/items", ORIGIN);
    let req = get(&url, Destination::Other);

    fx.net.serve(&url, HttpResponse::ok("[1]"));
    let response = fx.worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"[1]");

    fx.net.serve(&url, HttpResponse::ok("[1,2]"));
    let response = fx.worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"[1,2]");

    // Connectivity loss falls back to the last cached copy
    fx.net.go_offline();
    let response = fx.worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"[1,2]");
  }

  #[tokio::test]
  async fn navigations_serve_stale_and_refresh() {
    let Fixture {
      net, worker, ..
    } = fixture("");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = worker.with_refresh_observer(tx);

    let url = format!("{}/listings/42", ORIGIN);
    let req = get(&url, Destination::Document);

    net.serve(&url, HttpResponse::ok("v1"));
    let response = worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"v1");

    // Second request: cached copy wins even though the network has v2
    net.serve(&url, HttpResponse::ok("v2"));
    let response = worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"v1");

    // Background refresh lands v2 for the next request
    rx.recv().await.unwrap();
    let response = worker.on_fetch(&req).await.unwrap().unwrap();
    assert_eq!(response.body, b"v2");
  }

  #[tokio::test]
  async fn skip_waiting_message_supersedes_immediately() {
    let fx = fixture("");
    fx.worker
      .on_message(&json!({ "type": "SKIP_WAITING" }))
      .await
      .unwrap();
    assert_eq!(fx.host.skip_waiting.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn cache_urls_message_populates_runtime_best_effort() {
    let fx = fixture("");
    fx.net.serve(
      &format!("{}/style.css", ORIGIN),
      HttpResponse::ok("body {}"),
    );
    // /gone.js answers 404 and must be skipped, not fail the batch

    fx.worker
      .on_message(&json!({
        "type": "CACHE_URLS",
        "payload": ["/style.css", "/gone.js"]
      }))
      .await
      .unwrap();

    let key = RequestKey::new("GET", &format!("{}/style.css", ORIGIN));
    let cached = fx
      .store
      .get("mm-marketplace-runtime", &key)
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"body {}");

    let gone = RequestKey::new("GET", &format!("{}/gone.js", ORIGIN));
    assert!(fx
      .store
      .get("mm-marketplace-runtime", &gone)
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn unknown_messages_are_ignored() {
    let fx = fixture("");
    fx.worker
      .on_message(&json!({ "type": "PING" }))
      .await
      .unwrap();
    assert_eq!(fx.host.skip_waiting.load(Ordering::SeqCst), 0);
    assert!(fx.store.list_partitions().unwrap().is_empty());
  }

  #[tokio::test]
  async fn push_and_click_flow() {
    let fx = fixture("");

    let notification = fx.worker.on_push(Some("Your listing sold!"));
    assert_eq!(notification.body, "Your listing sold!");
    assert_eq!(fx.host.notifications.lock().unwrap().len(), 1);

    let outcome = fx.worker.on_notification_click("explore");
    assert_eq!(
      outcome,
      ClickOutcome::OpenApp {
        url: "/".to_string()
      }
    );
    assert_eq!(*fx.host.windows.lock().unwrap(), vec!["/".to_string()]);

    let outcome = fx.worker.on_notification_click("close");
    assert_eq!(outcome, ClickOutcome::Dismiss);
    assert_eq!(fx.host.windows.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn sync_stub_does_nothing() {
    let fx = fixture("");
    fx.worker.on_sync("sync-posts");
    fx.worker.on_sync("other-tag");
    assert!(fx.store.list_partitions().unwrap().is_empty());
    assert_eq!(fx.net.hits(), 0);
  }
}
