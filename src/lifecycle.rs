//! Install/activate lifecycle for a worker instance.
//!
//! Install populates the versioned precache partition in one atomic batch;
//! activate evicts every partition from previous versions and hands the
//! instance over to steady-state request interception. Each step runs at most
//! once per instance; a fresh deployment (new version tag) means a fresh
//! instance.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::cache::{CacheStore, RequestKey};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::http::HttpResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Freshly constructed; install has not run
  New,
  /// Precache committed; waiting to activate
  Installed,
  /// Steady state; this instance serves requests
  Active,
}

pub struct LifecycleManager<S: CacheStore> {
  store: Arc<S>,
  precache: String,
  runtime: String,
  origin: String,
  assets: Vec<String>,
  phase: Mutex<Phase>,
}

impl<S: CacheStore> LifecycleManager<S> {
  pub fn new(store: Arc<S>, config: &WorkerConfig) -> Self {
    Self {
      store,
      precache: config.precache_name(),
      runtime: config.runtime_name(),
      origin: config.origin.clone(),
      assets: config.precache_assets.clone(),
      phase: Mutex::new(Phase::New),
    }
  }

  pub fn phase(&self) -> Phase {
    *self.phase.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Install: resolve every declared asset path against the app origin,
  /// fetch them all, and commit them to the precache partition as one batch,
  /// keyed by full URL. If any single asset fails (unresolvable path, network
  /// error or non-200), nothing is written and the error propagates — the
  /// previous worker version stays active.
  ///
  /// The fetch closure receives the resolved absolute URL.
  pub async fn install<F, Fut>(&self, fetch: F) -> Result<()>
  where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<HttpResponse>>,
  {
    if self.phase() != Phase::New {
      return Err(eyre!("install already ran for this worker instance"));
    }

    let base = url::Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))?;
    let mut targets = Vec::with_capacity(self.assets.len());
    for path in &self.assets {
      let url = base.join(path).map_err(|e| {
        color_eyre::Report::from(WorkerError::PartialInstall {
          url: path.clone(),
          reason: format!("unresolvable path: {}", e),
        })
      })?;
      targets.push(url.to_string());
    }

    let fetches = targets.iter().map(|url| {
      let url = url.clone();
      let fut = fetch(url.clone());
      async move {
        match fut.await {
          Ok(response) if response.is_success() => Ok((RequestKey::new("GET", &url), response)),
          Ok(response) => Err(color_eyre::Report::from(WorkerError::PartialInstall {
            url,
            reason: format!("status {}", response.status),
          })),
          Err(e) => Err(color_eyre::Report::from(WorkerError::PartialInstall {
            url,
            reason: e.to_string(),
          })),
        }
      }
    });

    let entries = try_join_all(fetches).await?;
    self.store.put_batch(&self.precache, &entries)?;

    info!(
      partition = %self.precache,
      assets = entries.len(),
      "precache installed"
    );

    let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
    *phase = Phase::Installed;
    Ok(())
  }

  /// Activate: delete every cache partition that is neither the current
  /// precache nor the runtime partition, evicting precaches from all
  /// previous versions. Returns the names that were evicted.
  pub fn activate(&self) -> Result<Vec<String>> {
    if self.phase() == Phase::Active {
      return Err(eyre!("activate already ran for this worker instance"));
    }

    let mut evicted = Vec::new();
    for name in self.store.list_partitions()? {
      if name != self.precache && name != self.runtime {
        self.store.delete_partition(&name)?;
        info!(partition = %name, "evicted stale cache partition");
        evicted.push(name);
      }
    }

    let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
    *phase = Phase::Active;
    Ok(evicted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::error::WorkerError;

  fn config(assets: &[&str]) -> WorkerConfig {
    let yaml = format!(
      "cache_prefix: mm-marketplace\nversion: v1.0.0\n\
       origin: https://marketplace.example\nprecache_assets:\n{}",
      assets
        .iter()
        .map(|a| format!("  - {}\n", a))
        .collect::<String>()
    );
    serde_yaml::from_str(&yaml).unwrap()
  }

  fn manager(assets: &[&str]) -> (Arc<MemoryStore>, LifecycleManager<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let manager = LifecycleManager::new(Arc::clone(&store), &config(assets));
    (store, manager)
  }

  #[tokio::test]
  async fn install_commits_the_whole_batch() {
    let (store, manager) = manager(&["/index.html", "/app.js", "/offline.html"]);

    manager
      .install(|url| async move { Ok(HttpResponse::ok(format!("content of {}", url))) })
      .await
      .unwrap();

    assert_eq!(manager.phase(), Phase::Installed);
    assert_eq!(store.len("mm-marketplace-v1.0.0"), Some(3));
    let key = RequestKey::new("GET", "https://marketplace.example/offline.html");
    let cached = store.get("mm-marketplace-v1.0.0", &key).unwrap().unwrap();
    assert_eq!(
      cached.response.body,
      b"content of https://marketplace.example/offline.html"
    );
  }

  #[tokio::test]
  async fn install_is_atomic_on_fetch_failure() {
    let (store, manager) = manager(&["/index.html", "/broken.js", "/app.js"]);

    let err = manager
      .install(|url| async move {
        if url.ends_with("/broken.js") {
          Err(WorkerError::NetworkUnavailable {
            url,
            reason: "timeout".to_string(),
          }
          .into())
        } else {
          Ok(HttpResponse::ok("ok"))
        }
      })
      .await
      .unwrap_err();

    assert!(matches!(
      err.downcast_ref::<WorkerError>(),
      Some(WorkerError::PartialInstall { .. })
    ));
    // Nothing from the batch was committed
    assert_eq!(store.len("mm-marketplace-v1.0.0"), None);
    assert_eq!(manager.phase(), Phase::New);
  }

  #[tokio::test]
  async fn install_treats_non_200_as_failure() {
    let (store, manager) = manager(&["/index.html"]);

    let err = manager
      .install(|_path| async move {
        Ok(HttpResponse {
          status: 404,
          headers: Vec::new(),
          body: Vec::new(),
        })
      })
      .await
      .unwrap_err();

    assert!(matches!(
      err.downcast_ref::<WorkerError>(),
      Some(WorkerError::PartialInstall { .. })
    ));
    assert_eq!(store.len("mm-marketplace-v1.0.0"), None);
  }

  #[tokio::test]
  async fn install_runs_once() {
    let (_store, manager) = manager(&[]);

    manager
      .install(|_| async { Ok(HttpResponse::ok("")) })
      .await
      .unwrap();
    let err = manager
      .install(|_| async { Ok(HttpResponse::ok("")) })
      .await
      .unwrap_err();

    assert!(err.to_string().contains("already ran"));
  }

  #[tokio::test]
  async fn activate_evicts_only_stale_partitions() {
    let (store, manager) = manager(&[]);
    let key = RequestKey::new("GET", "https://marketplace.example/index.html");
    for name in [
      "mm-marketplace-v1.0.0",
      "mm-marketplace-v0.9.0",
      "mm-marketplace-runtime",
    ] {
      store.put(name, &key, &HttpResponse::ok("x")).unwrap();
    }

    let evicted = manager.activate().unwrap();

    assert_eq!(evicted, vec!["mm-marketplace-v0.9.0"]);
    assert_eq!(
      store.list_partitions().unwrap(),
      vec!["mm-marketplace-v1.0.0", "mm-marketplace-runtime"]
    );
    assert_eq!(manager.phase(), Phase::Active);
  }

  #[tokio::test]
  async fn activate_runs_once() {
    let (_store, manager) = manager(&[]);

    manager.activate().unwrap();
    assert!(manager.activate().is_err());
  }
}
