//! The engine: the LRU-bounded pool of open store handles and the single
//! dispatch point that turns a [`crate::command::Command`] into a call on
//! the right backend.
//!
//! One `Engine` per data directory, a cache keyed by `index.database`,
//! opened lazily on first use and evicted under an LRU policy that closes
//! the underlying store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::command::{Command, Op};
use crate::error::{NeoSearchError, Result};
use crate::kv::{BackendRegistry, KvStore};
use crate::lru::LruCache;

/// Default number of open store handles the engine keeps resident before
/// evicting the least-recently-used one.
pub const DEFAULT_CACHE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoreKey {
    index: String,
    database: String,
}

/// Owns every open store handle for one data directory, bounded to at
/// most `cache_size` resident handles.
pub struct Engine {
    data_dir: PathBuf,
    registry: BackendRegistry,
    default_backend: String,
    cache: Mutex<LruCache<StoreKey, Arc<dyn KvStore>>>,
}

impl Engine {
    /// Opens an engine rooted at `data_dir`, using `registry` to construct
    /// backends and `default_backend` (e.g. `"log"`) for databases that
    /// don't name one explicitly.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        registry: BackendRegistry,
        default_backend: impl Into<String>,
        cache_size: usize,
    ) -> Self {
        let mut cache = LruCache::new(cache_size.max(1));
        cache.on_evict(|key: StoreKey, store: Arc<dyn KvStore>| {
            debug!("evicting store handle {}.{}", key.index, key.database);
            if let Err(err) = store.close() {
                warn!("error closing evicted store {}.{}: {err}", key.index, key.database);
            }
        });

        Engine {
            data_dir: data_dir.into(),
            registry,
            default_backend: default_backend.into(),
            cache: Mutex::new(cache),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns (opening if necessary) the store handle for `index.database`,
    /// promoting it to most-recently-used.
    pub fn get_store(&self, index: &str, database: &str) -> Result<Arc<dyn KvStore>> {
        let key = StoreKey {
            index: index.to_string(),
            database: database.to_string(),
        };

        let mut cache = self.cache.lock().unwrap();
        if let Some(store) = cache.get(&key) {
            return Ok(store.clone());
        }

        let factory = self
            .registry
            .get(&self.default_backend)
            .ok_or_else(|| NeoSearchError::Unsupported(format!("unknown backend: {}", self.default_backend)))?;
        let store = factory(&self.data_dir, index, database)?;
        cache.add(key, store.clone());
        Ok(store)
    }

    /// Explicitly closes and evicts the handle for `index.database`, if
    /// resident. A no-op if it isn't currently open.
    pub fn close_store(&self, index: &str, database: &str) {
        let key = StoreKey {
            index: index.to_string(),
            database: database.to_string(),
        };
        self.cache.lock().unwrap().remove(&key);
    }

    /// Closes and evicts every resident handle.
    pub fn close_all(&self) {
        self.cache.lock().unwrap().clean();
    }

    /// Dispatches a single command against its target store, returning the
    /// read value for `Get` (`None` for mutating ops and `Get` misses).
    pub fn execute(&self, cmd: &Command) -> Result<Option<Vec<u8>>> {
        let store = self.get_store(&cmd.index, &cmd.database)?;

        match cmd.op {
            Op::Batch => {
                store.start_batch()?;
                Ok(None)
            }
            Op::FlushBatch => {
                store.flush_batch()?;
                Ok(None)
            }
            Op::Set => {
                let key = cmd
                    .key
                    .as_ref()
                    .ok_or_else(|| NeoSearchError::Protocol("SET missing key".to_string()))?;
                let value = cmd
                    .value
                    .as_ref()
                    .ok_or_else(|| NeoSearchError::Protocol("SET missing value".to_string()))?;
                store.set(key, value)?;
                Ok(None)
            }
            Op::Delete => {
                let key = cmd
                    .key
                    .as_ref()
                    .ok_or_else(|| NeoSearchError::Protocol("DELETE missing key".to_string()))?;
                store.delete(key)?;
                Ok(None)
            }
            Op::MergeSet => {
                let key = cmd
                    .key
                    .as_ref()
                    .ok_or_else(|| NeoSearchError::Protocol("MERGESET missing key".to_string()))?;
                let value = cmd
                    .value
                    .as_ref()
                    .ok_or_else(|| NeoSearchError::Protocol("MERGESET missing value".to_string()))?;
                let id = crate::codec::decode_u64(value)?;
                store.merge_set(key, id)?;
                Ok(None)
            }
            Op::Get => {
                let key = cmd
                    .key
                    .as_ref()
                    .ok_or_else(|| NeoSearchError::Protocol("GET missing key".to_string()))?;
                let reader = store.reader()?;
                reader.get(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::TypeTag;
    use tempfile::TempDir;

    fn engine(dir: &TempDir, cache_size: usize) -> Engine {
        Engine::new(dir.path(), BackendRegistry::with_builtins(), "log", cache_size)
    }

    #[test]
    fn execute_set_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir, 8);
        let set = Command::set(
            "t1",
            "document.db",
            b"k".to_vec(),
            TypeTag::String,
            b"v".to_vec(),
            TypeTag::String,
        );
        e.execute(&set).unwrap();
        let get = Command::get("t1", "document.db", b"k".to_vec(), TypeTag::String);
        assert_eq!(e.execute(&get).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn lru_eviction_closes_overflowed_handle() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir, 1);
        e.get_store("t1", "a.db").unwrap();
        let second = e.get_store("t1", "b.db").unwrap();
        // capacity 1: opening b.db must have evicted (and closed) a.db.
        assert!(second.is_open());
    }

    #[test]
    fn batch_then_flush_through_engine() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir, 8);
        e.execute(&Command::batch("t1", "document.db")).unwrap();
        e.execute(&Command::set(
            "t1",
            "document.db",
            b"k".to_vec(),
            TypeTag::String,
            b"v".to_vec(),
            TypeTag::String,
        ))
        .unwrap();
        let miss = e.execute(&Command::get("t1", "document.db", b"k".to_vec(), TypeTag::String)).unwrap();
        assert_eq!(miss, None);
        e.execute(&Command::flush_batch("t1", "document.db")).unwrap();
        let hit = e.execute(&Command::get("t1", "document.db", b"k".to_vec(), TypeTag::String)).unwrap();
        assert_eq!(hit, Some(b"v".to_vec()));
    }
}
