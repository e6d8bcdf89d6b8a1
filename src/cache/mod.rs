//! Cache partition access.
//!
//! Two logical partitions exist at runtime: the versioned precache (written
//! once at install) and the unversioned runtime cache (written as requests
//! are served). The store trait only knows named partitions; naming policy
//! lives in [`crate::config::WorkerConfig`].

mod key;
mod sqlite;
mod store;

pub use key::RequestKey;
pub use sqlite::SqliteStore;
pub use store::{CacheStore, CachedResponse, MemoryStore};
