#![warn(missing_docs)]

//! An embeddable full-text search engine over ordered per-field key-value
//! stores.
//!
//! A [`NeoSearch`] instance owns a shared [`Engine`], which lazily opens
//! and LRU-caches the KV store handle for each `index.database` pair.
//! Indexing a JSON document fans out into one `mergeset` command per
//! indexed field/token (see [`index`]); searching reduces to sorted-merge
//! intersection/union over the resulting posting lists (see [`query`]).

pub mod codec;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod kv;
pub mod lru;
pub mod metadata;
pub mod query;

use std::sync::Arc;

pub use command::{Command, Op, TypeTag};
pub use config::Config;
pub use engine::Engine;
pub use error::{NeoSearchError, Result};
pub use index::{Index, IndexConfig, IndexInfo};
pub use kv::{BackendRegistry, KvStore};
pub use metadata::{FieldInfo, FieldType, Metadata};
pub use query::{Clause, Query};

/// The top-level facade: one engine plus whichever indices a caller has
/// opened through it. Mirrors `neosearch.go`'s `NeoSearch` struct, which
/// bundles a `*engine.Engine` with the indices created against it.
pub struct NeoSearch {
    engine: Arc<Engine>,
    config: Config,
}

impl NeoSearch {
    /// Opens a NeoSearch instance rooted at `config.data_dir`, using
    /// `config.backend` as the default store backend and
    /// `config.cache_size` as the engine's LRU bound.
    pub fn open(config: Config) -> Self {
        let engine = Engine::new(
            config.data_dir.clone(),
            BackendRegistry::with_builtins(),
            config.backend.clone(),
            config.cache_size,
        );
        NeoSearch {
            engine: Arc::new(engine),
            config,
        }
    }

    /// Creates a new index named `name`, or opens it if it already exists
    /// and `create` is false (see [`Index::new`] for the exact
    /// create-on-existing-directory contract).
    pub fn index(&self, name: impl Into<String>, create: bool) -> Result<Index> {
        Index::new(
            name,
            IndexConfig {
                data_dir: std::path::PathBuf::from(&self.config.data_dir),
                debug: self.config.debug,
            },
            create,
        )
    }

    /// The shared engine backing every index opened through this
    /// instance.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Executes `query` against `index`, returning at most `limit`
    /// hydrated documents (0 = unlimited) plus the total match count.
    pub fn search(&self, index: &Index, query: &Query, limit: usize) -> Result<(Vec<String>, u64)> {
        query::search(index, &self.engine, query, limit)
    }

    /// Closes every store handle the engine currently has open.
    pub fn close(&self) {
        self.engine.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn end_to_end_index_and_search() {
        let dir = TempDir::new().unwrap();
        let ns = NeoSearch::open(Config {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        });

        let index = ns.index("products", true).unwrap();
        index
            .add(ns.engine(), 1, br#"{"name": "Red Shoes"}"#, &Metadata::new())
            .unwrap();
        index
            .add(ns.engine(), 2, br#"{"name": "Blue Shoes"}"#, &Metadata::new())
            .unwrap();

        let query = Query::Or(vec![Clause {
            field: "name".to_string(),
            value: "shoes".to_string(),
        }]);
        let (docs, total) = ns.search(&index, &query, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(docs.len(), 2);

        ns.close();
    }
}
