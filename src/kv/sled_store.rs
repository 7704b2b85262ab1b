//! A `sled`-backed ordered KV backend.
//!
//! Wraps a `sled::Db` behind the same `KvStore` contract as
//! [`super::LogStore`] in the [`super::BackendRegistry`]: same contract,
//! different storage engine, so callers can pick per database.
//!
//! Snapshot caveat: unlike `LogStore`'s reader (a true point-in-time clone
//! of the index), this backend's reader observes `sled`'s own iterator
//! consistency, which is read-committed rather than snapshot-isolated.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Arc;

use sled::{Db, IVec};

use crate::codec;
use crate::error::Result;

use super::{validate_database_name, KvIterator, KvReader, KvStore};

/// Batch state: the staged `sled::Batch` plus an overlay of not-yet-applied
/// writes, consulted by `merge_set` so repeated merges within the same
/// batch observe each other instead of `sled`'s own committed view — the
/// same duplicate-posting-read hazard [`super::LogStore`] guards against.
#[derive(Default)]
struct BatchState {
    batch: sled::Batch,
    overlay: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

pub struct SledStore {
    db: Db,
    batch: std::sync::Mutex<Option<BatchState>>,
    open: AtomicBool,
}

impl SledStore {
    pub fn open(data_dir: &Path, index: &str, database: &str) -> Result<Self> {
        if !validate_database_name(database) {
            return Err(crate::error::NeoSearchError::InvalidName(database.to_string()));
        }
        let path = data_dir.join(index).join(database);
        let db = sled::open(path)?;
        Ok(SledStore {
            db,
            batch: std::sync::Mutex::new(None),
            open: AtomicBool::new(true),
        })
    }
}

impl KvStore for SledStore {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> Result<()> {
        *self.batch.lock().unwrap() = None;
        self.db.flush()?;
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn reader(&self) -> Result<Box<dyn KvReader + '_>> {
        Ok(Box::new(SledReader { db: &self.db }))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut guard = self.batch.lock().unwrap();
        if let Some(state) = guard.as_mut() {
            state.batch.insert(key, value);
            state.overlay.insert(key.to_vec(), Some(value.to_vec()));
        } else {
            self.db.insert(key, value)?;
        }
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut guard = self.batch.lock().unwrap();
        if let Some(state) = guard.as_mut() {
            state.batch.remove(key);
            state.overlay.insert(key.to_vec(), None);
        } else {
            self.db.remove(key)?;
        }
        Ok(())
    }

    fn merge_set(&self, key: &[u8], value: u64) -> Result<()> {
        let mut guard = self.batch.lock().unwrap();

        let current = match guard.as_ref().and_then(|state| state.overlay.get(key)) {
            Some(Some(v)) => v.clone(),
            Some(None) => Vec::new(),
            None => self.db.get(key)?.map(|v| v.to_vec()).unwrap_or_default(),
        };

        let mut ids = codec::unpack_posting(&current)?;
        let insert_at = match ids.binary_search(&value) {
            Ok(_) => return Ok(()),
            Err(pos) => pos,
        };
        ids.insert(insert_at, value);
        let packed = codec::pack_posting(&ids);

        if let Some(state) = guard.as_mut() {
            state.batch.insert(key, packed.clone());
            state.overlay.insert(key.to_vec(), Some(packed));
        } else {
            self.db.insert(key, packed)?;
        }
        Ok(())
    }

    fn start_batch(&self) -> Result<()> {
        *self.batch.lock().unwrap() = Some(BatchState::default());
        Ok(())
    }

    fn flush_batch(&self) -> Result<()> {
        let state = self.batch.lock().unwrap().take();
        if let Some(state) = state {
            self.db.apply_batch(state.batch)?;
        }
        Ok(())
    }

    fn is_batching(&self) -> bool {
        self.batch.lock().unwrap().is_some()
    }
}

struct SledReader<'a> {
    db: &'a Db,
}

impl<'a> KvReader for SledReader<'a> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn iter(&self) -> Box<dyn KvIterator + '_> {
        Box::new(SledIterator {
            db: self.db,
            cursor: None,
            done: false,
        })
    }
}

struct SledIterator<'a> {
    db: &'a Db,
    cursor: Option<(IVec, IVec)>,
    done: bool,
}

impl<'a> SledIterator<'a> {
    fn load_first_from(&mut self, key: &[u8]) {
        self.cursor = self.db.range(key.to_vec()..).next().and_then(|r| r.ok());
        self.done = self.cursor.is_none();
    }
}

impl<'a> KvIterator for SledIterator<'a> {
    fn seek(&mut self, key: &[u8]) {
        self.load_first_from(key);
    }

    fn seek_first(&mut self) {
        self.cursor = self.db.iter().next().and_then(|r| r.ok());
        self.done = self.cursor.is_none();
    }

    fn seek_last(&mut self) {
        self.cursor = self.db.iter().next_back().and_then(|r| r.ok());
        self.done = self.cursor.is_none();
    }

    fn next(&mut self) {
        let Some((k, _)) = self.cursor.take() else {
            self.done = true;
            return;
        };
        let mut next_key = k.to_vec();
        next_key.push(0);
        self.cursor = self.db.range(next_key..).next().and_then(|r| r.ok());
        self.done = self.cursor.is_none();
    }

    fn prev(&mut self) {
        let Some((k, _)) = self.cursor.take() else {
            self.done = true;
            return;
        };
        self.cursor = self.db.range(..k).next_back().and_then(|r| r.ok());
        self.done = self.cursor.is_none();
    }

    fn valid(&self) -> bool {
        !self.done && self.cursor.is_some()
    }

    fn key(&self) -> Option<Vec<u8>> {
        self.cursor.as_ref().map(|(k, _)| k.to_vec())
    }

    fn value(&self) -> Option<Vec<u8>> {
        self.cursor.as_ref().map(|(_, v)| v.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SledStore {
        SledStore::open(dir.path(), "idx", "field_string.idx").unwrap()
    }

    #[test]
    fn set_get_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.set(b"a", b"1").unwrap();
        assert_eq!(store.reader().unwrap().get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert_eq!(store.reader().unwrap().get(b"a").unwrap(), None);
    }

    #[test]
    fn mergeset_builds_sorted_deduped_posting_list() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for v in [5u64, 5, 2, 5, 7] {
            store.merge_set(b"k", v).unwrap();
        }
        let got = store.reader().unwrap().get(b"k").unwrap().unwrap();
        assert_eq!(got, codec::pack_posting(&[2, 5, 7]));
    }

    #[test]
    fn batching_hides_writes_until_flush() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.start_batch().unwrap();
        store.set(b"a", b"1").unwrap();
        assert_eq!(store.reader().unwrap().get(b"a").unwrap(), None);
        store.flush_batch().unwrap();
        assert_eq!(store.reader().unwrap().get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn batched_mergesets_on_same_key_observe_each_other() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.start_batch().unwrap();
        store.merge_set(b"k", 3).unwrap();
        store.merge_set(b"k", 1).unwrap();
        store.merge_set(b"k", 2).unwrap();
        store.flush_batch().unwrap();
        let got = store.reader().unwrap().get(b"k").unwrap().unwrap();
        assert_eq!(got, codec::pack_posting(&[1, 2, 3]));
    }

    #[test]
    fn iterator_walks_in_byte_order_and_supports_prefix_scan() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for k in [b"b".as_slice(), b"ba", b"a", b"c"] {
            store.set(k, b"v").unwrap();
        }
        let reader = store.reader().unwrap();
        let mut it = reader.iter();
        it.seek(b"b");
        let mut hits = Vec::new();
        while it.valid() {
            let k = it.key().unwrap();
            if !k.starts_with(b"b") {
                break;
            }
            hits.push(k);
            it.next();
        }
        assert_eq!(hits, vec![b"b".to_vec(), b"ba".to_vec()]);
    }

    #[test]
    fn concurrent_mergesets_on_the_same_key_serialize_into_one_sorted_union() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir));

        std::thread::scope(|scope| {
            for base in 0..8u64 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for offset in 0..25u64 {
                        store.merge_set(b"k", base * 25 + offset).unwrap();
                    }
                });
            }
        });

        let got = codec::unpack_posting(&store.reader().unwrap().get(b"k").unwrap().unwrap()).unwrap();
        let expected: Vec<u64> = (0..200).collect();
        assert_eq!(got, expected);
    }
}
