//! Offline caching and request interception for the MM marketplace web app.
//!
//! The worker intercepts application requests and applies one of three
//! caching strategies against a named cache partition:
//! - cache-first for static assets (scripts, styles, images, fonts)
//! - network-first for API traffic
//! - stale-while-revalidate for navigations and everything else
//!
//! A versioned precache partition is populated once at install; stale
//! partitions from previous versions are evicted at activation. Push
//! notifications and cross-context control messages are handled as thin
//! event plumbing on the side.
//!
//! The platform adapter feeds events into [`worker::Worker`], one method per
//! event kind, and implements [`worker::WorkerHost`] for the calls that go
//! the other way.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod notify;
pub mod router;
pub mod strategy;
pub mod worker;

pub use cache::{CacheStore, MemoryStore, RequestKey, SqliteStore};
pub use config::WorkerConfig;
pub use error::WorkerError;
pub use fetch::{Fetch, NetworkClient};
pub use http::{Destination, HttpRequest, HttpResponse};
pub use notify::{ClickOutcome, ControlMessage, Notification};
pub use router::{RouteDecision, Router};
pub use strategy::{RefreshEvent, RefreshOutcome, StrategyEngine};
pub use worker::{Worker, WorkerHost};

/// Install a global tracing subscriber filtered by `RUST_LOG`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
  use tracing_subscriber::EnvFilter;

  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .try_init();
}
