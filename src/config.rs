//! Plain configuration values. Deliberately not a file loader — config
//! *parsing*/file formats are out of scope here; this is just the shape
//! a caller fills in.

use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_CACHE_SIZE;

/// Default backend name used for databases that don't name one
/// explicitly.
pub const DEFAULT_BACKEND: &str = "log";

/// Top-level configuration for one NeoSearch instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory holding every index's on-disk data.
    pub data_dir: String,

    /// Backend used for newly opened databases unless the index's
    /// manifest names a different one.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Maximum number of store handles the engine keeps open
    /// concurrently before evicting the least-recently-used one.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Enables debug-level logging of engine/index operations.
    #[serde(default)]
    pub debug: bool,

    /// Hint consulted only by the (out-of-scope) bulk importer for how
    /// many documents to batch per `Add`/`FlushBatch` round trip; the core
    /// never reads or enforces this itself.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Opaque, backend-specific knobs (cache size, bloom filter bits,
    /// block size, etc.) that this crate's core never inspects; a
    /// `KvStoreFactory` closure may read them if its backend needs them.
    #[serde(default)]
    pub backend_options: serde_json::Value,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_batch_size() -> usize {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: "./data".to_string(),
            backend: default_backend(),
            cache_size: default_cache_size(),
            debug: false,
            batch_size: default_batch_size(),
            backend_options: serde_json::Value::Null,
        }
    }
}
