//! The pluggable ordered-KV-store capability: the contract every backend
//! must satisfy, plus a registry mapping backend names to constructors.
//!
//! The registry is an ordinary value owned by whoever builds an
//! [`crate::engine::Engine`], not a `lazy_static` global — though
//! [`BackendRegistry::with_builtins`] gives you the initialize-once
//! default set if you don't need anything custom.

mod log_store;
mod sled_store;

pub use log_store::LogStore;
pub use sled_store::SledStore;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{NeoSearchError, Result};

/// A reader safe for concurrent reads, bound to a fixed point-in-time view
/// of the store.
pub trait KvReader {
    /// Returns the value at `key`, or `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Returns a fresh iterator bound to this reader's view.
    fn iter(&self) -> Box<dyn KvIterator + '_>;
}

/// A cursor over a store's ascending byte-wise key order.
pub trait KvIterator {
    /// Positions the cursor at the first key >= `key`.
    fn seek(&mut self, key: &[u8]);
    fn seek_first(&mut self);
    fn seek_last(&mut self);
    fn next(&mut self);
    fn prev(&mut self);
    fn valid(&self) -> bool;
    /// Current key, or `None` if the cursor is not [`valid`](Self::valid).
    fn key(&self) -> Option<Vec<u8>>;
    /// Current value, or `None` if the cursor is not [`valid`](Self::valid).
    fn value(&self) -> Option<Vec<u8>>;
}

/// The ordered byte-key KV store contract a backend must satisfy: point
/// get (via a reader), put, delete, an ordered-set merge, range iteration,
/// and an atomic write batch. Exactly one writer exists per store
/// (enforced by construction: a `KvStore` handle is exclusively owned by
/// the engine's LRU cache); many readers may coexist.
pub trait KvStore: Send + Sync {
    fn is_open(&self) -> bool;

    /// Releases all resources, including any active batch (which is
    /// discarded — see DESIGN.md's decision on close-while-batching).
    fn close(&self) -> Result<()>;

    /// Returns a fresh snapshot reader.
    fn reader(&self) -> Result<Box<dyn KvReader + '_>>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Read-modify-write: inserts `value` into the ordered, duplicate-free
    /// posting list at `key`. The read is observed through the writer's
    /// own view (not a snapshot reader), so that concurrent merges in the
    /// same batch see each other's staged writes.
    fn merge_set(&self, key: &[u8], value: u64) -> Result<()>;

    /// Starts batching: subsequent `set`/`delete`/`merge_set` calls stage
    /// into the batch instead of writing through.
    fn start_batch(&self) -> Result<()>;

    /// Applies the staged batch atomically and returns to non-batching.
    fn flush_batch(&self) -> Result<()>;

    fn is_batching(&self) -> bool;
}

/// Validates a database name: `segment(.segment)+`, each segment in
/// `[A-Za-z0-9_-]+`, and the final segment at least 2 characters. Shared
/// by every backend's `open()`.
pub fn validate_database_name(name: &str) -> bool {
    if name.len() < 3 {
        return false;
    }
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return false;
    }
    if parts.last().unwrap().len() < 2 {
        return false;
    }
    parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'))
}

/// Constructs a backend, opening (or creating) its on-disk container at
/// `<data_dir>/<index>/<database>`.
pub type KvStoreFactory = Arc<dyn Fn(&Path, &str, &str) -> Result<Arc<dyn KvStore>> + Send + Sync>;

/// An explicitly-owned mapping from backend name to constructor. Immutable
/// once built — registering a duplicate name is a construction-time error.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, KvStoreFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        BackendRegistry {
            backends: HashMap::new(),
        }
    }

    /// The default registry: the two backends this crate ships, `"log"`
    /// ([`LogStore`]) and `"sled"` ([`SledStore`]).
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("log", Arc::new(|dir: &Path, index: &str, db: &str| {
            LogStore::open(dir, index, db).map(|s| Arc::new(s) as Arc<dyn KvStore>)
        }))
        .expect("builtin backend names are unique");
        reg.register("sled", Arc::new(|dir: &Path, index: &str, db: &str| {
            SledStore::open(dir, index, db).map(|s| Arc::new(s) as Arc<dyn KvStore>)
        }))
        .expect("builtin backend names are unique");
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, factory: KvStoreFactory) -> Result<()> {
        let name = name.into();
        if self.backends.contains_key(&name) {
            return Err(NeoSearchError::Fatal(format!(
                "duplicate store backend name: {name}"
            )));
        }
        self.backends.insert(name, factory);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&KvStoreFactory> {
        self.backends.get(name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_validation() {
        assert!(validate_database_name("document.db"));
        assert!(validate_database_name("name_string.idx"));
        assert!(!validate_database_name("ab"));
        assert!(!validate_database_name("noext"));
        assert!(!validate_database_name("name.d"));
        assert!(!validate_database_name("bad name.db"));
    }

    #[test]
    fn builtin_registry_has_log_and_sled() {
        let reg = BackendRegistry::with_builtins();
        assert!(reg.get("log").is_some());
        assert!(reg.get("sled").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn duplicate_registration_errors() {
        let mut reg = BackendRegistry::new();
        let factory: KvStoreFactory = Arc::new(|dir, index, db| {
            LogStore::open(dir, index, db).map(|s| Arc::new(s) as Arc<dyn KvStore>)
        });
        reg.register("log", factory.clone()).unwrap();
        assert!(reg.register("log", factory).is_err());
    }
}
