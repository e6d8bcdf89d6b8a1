//! Cache store trait and in-memory implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::sync::Mutex;

use super::key::RequestKey;
use crate::http::HttpResponse;

/// A response snapshot as read back from a cache partition.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: HttpResponse,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Storage backend for named cache partitions.
///
/// A partition is a persistent, insertion-ordered mapping from request
/// identity to response snapshot. Partitions are created implicitly on first
/// write. Concurrent writes to the same key are last-write-wins; the cache is
/// a performance hint, not a correctness-critical store.
pub trait CacheStore: Send + Sync + 'static {
  /// Look up an entry. A missing partition reads as a miss.
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Write (or replace) an entry, creating the partition if needed.
  fn put(&self, partition: &str, key: &RequestKey, response: &HttpResponse) -> Result<()>;

  /// Write a batch of entries into one partition. All or nothing.
  fn put_batch(&self, partition: &str, entries: &[(RequestKey, HttpResponse)]) -> Result<()>;

  /// Names of all existing partitions, in creation order.
  fn list_partitions(&self) -> Result<Vec<String>>;

  /// Delete a partition and all of its entries. Deleting a partition that
  /// does not exist is a no-op.
  fn delete_partition(&self, name: &str) -> Result<()>;
}

/// In-memory store. Backs tests and short-lived worker instances where
/// persistence across restarts is not needed.
#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<Vec<Partition>>,
}

struct Partition {
  name: String,
  // (key hash, key, entry) in insertion order
  entries: Vec<(String, RequestKey, CachedResponse)>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of entries in a partition; None if the partition does not exist.
  pub fn len(&self, partition: &str) -> Option<usize> {
    let partitions = self.partitions.lock().ok()?;
    partitions
      .iter()
      .find(|p| p.name == partition)
      .map(|p| p.entries.len())
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let hash = key.cache_hash();
    Ok(
      partitions
        .iter()
        .find(|p| p.name == partition)
        .and_then(|p| p.entries.iter().find(|(h, _, _)| *h == hash))
        .map(|(_, _, entry)| entry.clone()),
    )
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &HttpResponse) -> Result<()> {
    self.put_batch(partition, &[(key.clone(), response.clone())])
  }

  fn put_batch(&self, partition: &str, entries: &[(RequestKey, HttpResponse)]) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !partitions.iter().any(|p| p.name == partition) {
      partitions.push(Partition {
        name: partition.to_string(),
        entries: Vec::new(),
      });
    }
    let part = partitions
      .iter_mut()
      .find(|p| p.name == partition)
      .ok_or_else(|| eyre!("partition vanished: {}", partition))?;

    for (key, response) in entries {
      let hash = key.cache_hash();
      let entry = CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      };
      if let Some(existing) = part.entries.iter_mut().find(|(h, _, _)| *h == hash) {
        existing.2 = entry;
      } else {
        part.entries.push((hash, key.clone(), entry));
      }
    }

    Ok(())
  }

  fn list_partitions(&self) -> Result<Vec<String>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.iter().map(|p| p.name.clone()).collect())
  }

  fn delete_partition(&self, name: &str) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partitions.retain(|p| p.name != name);
    Ok(())
  }
}
