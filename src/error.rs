//! Typed failure values for the fetch/cache path.
//!
//! Strategy and lifecycle code returns `color_eyre::Result`; these variants
//! are attached as the concrete error so callers (and tests) can recover the
//! failure kind with `report.downcast_ref::<WorkerError>()`.

use thiserror::Error;

/// Failure taxonomy for request interception and cache lifecycle.
#[derive(Debug, Error)]
pub enum WorkerError {
  /// The network fetch itself failed (transport error, DNS, connection reset).
  #[error("network unavailable for {url}: {reason}")]
  NetworkUnavailable { url: String, reason: String },

  /// A direct cache lookup found no entry for the key.
  /// Always handled locally; never surfaces from the event interface.
  #[error("cache miss for {key}")]
  CacheMiss { key: String },

  /// Upstream answered with a non-200 status. The response is still returned
  /// to the caller; this value only marks that the cache write was skipped.
  #[error("upstream returned status {status} for {url}")]
  BadUpstreamStatus { status: u16, url: String },

  /// One or more precache assets failed during install; the batch was not
  /// committed and the previous worker version stays active.
  #[error("precache install failed at {url}: {reason}")]
  PartialInstall { url: String, reason: String },
}
