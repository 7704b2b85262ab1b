//! A log-structured, ordered-index KV backend (bitcask-style): append-
//! only generation files, an in-memory index of log positions, background
//! compaction past a threshold, per-thread/per-reader file handles opened
//! lazily.
//!
//! The index is a `BTreeMap<Vec<u8>, CommandPos>` rather than a hash map,
//! so range iteration (prefix scans) is possible and walks keys in
//! byte-wise order. Log records are framed as raw length-prefixed bytes
//! rather than a structured encoding, since posting-list keys/values are
//! arbitrary bytes, not UTF-8 strings.
//!
//! `reader()` clones the committed index, giving real point-in-time
//! snapshot isolation: writes after a reader is taken are invisible to it.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::codec;
use crate::error::{NeoSearchError, Result};

use super::{validate_database_name, KvIterator, KvReader, KvStore};

/// Compaction threshold in bytes of stale (overwritten/removed) data.
const COMPACTION_THRESHOLD: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
struct CommandPos {
    gen: u64,
    pos: u64,
    len: u64,
}

enum StagedOp {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A log-structured, ordered key-value store.
pub struct LogStore {
    path: Arc<PathBuf>,
    index: Arc<RwLock<BTreeMap<Vec<u8>, CommandPos>>>,
    writer: Arc<Mutex<LogStoreWriter>>,
    safe_point: Arc<AtomicU64>,
}

struct LogStoreWriter {
    current_gen: u64,
    writer: BufWriterWithPos<File>,
    readers: HashMap<u64, BufReaderWithPos<File>>,
    uncompacted: u64,
    batching: bool,
    staged: Vec<StagedOp>,
    /// Overlay of not-yet-flushed writes, consulted by `merge_set` so
    /// repeated merges in the same batch observe each other instead of a
    /// stale snapshot, which would produce duplicate entries across
    /// batched merges on the same key.
    overlay: HashMap<Vec<u8>, Option<Vec<u8>>>,
    open: bool,
}

impl LogStore {
    /// Opens (creating if missing) a log-structured store rooted at
    /// `<data_dir>/<index>/<database>/`.
    pub fn open(data_dir: &Path, index: &str, database: &str) -> Result<Self> {
        if !validate_database_name(database) {
            return Err(NeoSearchError::InvalidName(database.to_string()));
        }

        let path = data_dir.join(index).join(database);
        fs::create_dir_all(&path)?;

        let mut readers = HashMap::new();
        let mut btree_index = BTreeMap::new();
        let mut uncompacted = 0u64;

        let gen_list = sorted_gen_list(&path)?;
        for &gen in &gen_list {
            let mut reader = BufReaderWithPos::new(File::open(log_path(&path, gen))?)?;
            uncompacted += load(gen, &mut reader, &mut btree_index)?;
            readers.insert(gen, reader);
        }

        let current_gen = gen_list.last().unwrap_or(&0) + 1;
        let writer = new_log_file(&path, current_gen, &mut readers)?;

        Ok(LogStore {
            path: Arc::new(path),
            index: Arc::new(RwLock::new(btree_index)),
            writer: Arc::new(Mutex::new(LogStoreWriter {
                current_gen,
                writer,
                readers,
                uncompacted,
                batching: false,
                staged: Vec::new(),
                overlay: HashMap::new(),
                open: true,
            })),
            safe_point: Arc::new(AtomicU64::new(0)),
        })
    }

    fn read_committed(&self, key: &[u8], writer: &mut LogStoreWriter) -> Result<Vec<u8>> {
        let cmd_pos = { self.index.read().unwrap().get(key).copied() };
        match cmd_pos {
            None => Ok(Vec::new()),
            Some(pos) => read_at(writer, &self.path, pos),
        }
    }
}

fn compact(
    writer: &mut LogStoreWriter,
    index: &RwLock<BTreeMap<Vec<u8>, CommandPos>>,
    safe_point: &AtomicU64,
    path: &Path,
) -> Result<()> {
    let compaction_gen = writer.current_gen + 1;
    writer.current_gen += 2;
    writer.writer = new_log_file(path, writer.current_gen, &mut writer.readers)?;

    let mut compaction_writer = new_log_file(path, compaction_gen, &mut writer.readers)?;

    let mut index = index.write().unwrap();
    let mut new_pos = 0u64;
    for cmd_pos in index.values_mut() {
        let reader = writer
            .readers
            .get_mut(&cmd_pos.gen)
            .ok_or_else(|| NeoSearchError::Fatal(format!("log file not found: gen {}", cmd_pos.gen)))?;
        reader.seek(SeekFrom::Start(cmd_pos.pos))?;
        let mut entry_reader = reader.take(cmd_pos.len);
        let len = io::copy(&mut entry_reader, &mut compaction_writer)?;
        *cmd_pos = CommandPos {
            gen: compaction_gen,
            pos: new_pos,
            len,
        };
        new_pos += len;
    }
    compaction_writer.flush()?;
    drop(index);

    let stale_gens: Vec<u64> = writer
        .readers
        .keys()
        .filter(|&&gen| gen < compaction_gen)
        .copied()
        .collect();
    for stale_gen in stale_gens {
        writer.readers.remove(&stale_gen);
        fs::remove_file(log_path(path, stale_gen))?;
    }
    writer.uncompacted = 0;
    safe_point.store(compaction_gen, Ordering::Release);

    Ok(())
}

fn write_record(writer: &mut BufWriterWithPos<File>, key: &[u8], value: Option<&[u8]>) -> Result<(u64, u64)> {
    let start = writer.pos;
    match value {
        Some(v) => {
            writer.write_all(&[0u8])?;
            writer.write_all(&(key.len() as u32).to_be_bytes())?;
            writer.write_all(key)?;
            writer.write_all(&(v.len() as u32).to_be_bytes())?;
            writer.write_all(v)?;
        }
        None => {
            writer.write_all(&[1u8])?;
            writer.write_all(&(key.len() as u32).to_be_bytes())?;
            writer.write_all(key)?;
        }
    }
    writer.flush()?;
    Ok((start, writer.pos - start))
}

fn read_record_at<R: Read + Seek>(reader: &mut BufReaderWithPos<R>, pos: u64, len: u64) -> Result<(Vec<u8>, bool)> {
    reader.seek(SeekFrom::Start(pos))?;
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;

    let tag = buf[0];
    let klen = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
    let key_end = 5 + klen;
    match tag {
        0 => {
            let vlen = u32::from_be_bytes(buf[key_end..key_end + 4].try_into().unwrap()) as usize;
            let value = buf[key_end + 4..key_end + 4 + vlen].to_vec();
            Ok((value, true))
        }
        1 => Ok((Vec::new(), false)),
        other => Err(NeoSearchError::Codec(format!("bad log record tag {other}"))),
    }
}

fn read_at(writer: &mut LogStoreWriter, path: &Path, cmd_pos: CommandPos) -> Result<Vec<u8>> {
    let reader = match writer.readers.entry(cmd_pos.gen) {
        std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
        std::collections::hash_map::Entry::Vacant(e) => {
            let r = BufReaderWithPos::new(File::open(log_path(path, cmd_pos.gen))?)?;
            e.insert(r)
        }
    };
    let (value, present) = read_record_at(reader, cmd_pos.pos, cmd_pos.len)?;
    if present {
        Ok(value)
    } else {
        Ok(Vec::new())
    }
}

impl KvStore for LogStore {
    fn is_open(&self) -> bool {
        self.writer.lock().unwrap().open
    }

    fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        // Close-while-batching discards the pending batch rather than
        // flushing or leaking it (see DESIGN.md).
        writer.batching = false;
        writer.staged.clear();
        writer.overlay.clear();
        writer.open = false;
        Ok(())
    }

    fn reader(&self) -> Result<Box<dyn KvReader + '_>> {
        let snapshot = self.index.read().unwrap().clone();
        Ok(Box::new(LogStoreReader {
            entries: snapshot.into_iter().collect(),
            safe_point: self.safe_point.clone(),
            path: self.path.clone(),
            readers: std::cell::RefCell::new(HashMap::new()),
        }))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        if writer.batching {
            writer.overlay.insert(key.to_vec(), Some(value.to_vec()));
            writer.staged.push(StagedOp::Set(key.to_vec(), value.to_vec()));
            return Ok(());
        }
        self.apply_set(&mut writer, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        if writer.batching {
            writer.overlay.insert(key.to_vec(), None);
            writer.staged.push(StagedOp::Delete(key.to_vec()));
            return Ok(());
        }
        self.apply_delete(&mut writer, key)
    }

    fn merge_set(&self, key: &[u8], value: u64) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();

        let base = if writer.batching {
            match writer.overlay.get(key) {
                Some(Some(v)) => v.clone(),
                Some(None) => Vec::new(),
                None => self.read_committed(key, &mut writer)?,
            }
        } else {
            self.read_committed(key, &mut writer)?
        };

        let mut ids = codec::unpack_posting(&base)?;
        let insert_at = match ids.binary_search(&value) {
            Ok(_) => return Ok(()), // already present, skip write
            Err(pos) => pos,
        };
        ids.insert(insert_at, value);
        let packed = codec::pack_posting(&ids);

        if writer.batching {
            writer.overlay.insert(key.to_vec(), Some(packed.clone()));
            writer.staged.push(StagedOp::Set(key.to_vec(), packed));
            Ok(())
        } else {
            self.apply_set(&mut writer, key, &packed)
        }
    }

    fn start_batch(&self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.batching = true;
        writer.staged.clear();
        writer.overlay.clear();
        Ok(())
    }

    fn flush_batch(&self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        if !writer.batching {
            return Ok(());
        }

        let staged = std::mem::take(&mut writer.staged);
        writer.overlay.clear();
        writer.batching = false;

        for op in staged {
            match op {
                StagedOp::Set(k, v) => self.apply_set(&mut writer, &k, &v)?,
                StagedOp::Delete(k) => self.apply_delete(&mut writer, &k)?,
            }
        }
        Ok(())
    }

    fn is_batching(&self) -> bool {
        self.writer.lock().unwrap().batching
    }
}

impl LogStore {
    fn apply_set(&self, writer: &mut LogStoreWriter, key: &[u8], value: &[u8]) -> Result<()> {
        let (pos, len) = write_record(&mut writer.writer, key, Some(value))?;
        let current_gen = writer.current_gen;

        let mut index = self.index.write().unwrap();
        if let Some(old) = index.insert(key.to_vec(), CommandPos { gen: current_gen, pos, len }) {
            writer.uncompacted += old.len;
        }
        drop(index);

        if writer.uncompacted > COMPACTION_THRESHOLD {
            compact(writer, &self.index, &self.safe_point, &self.path)?;
        }
        Ok(())
    }

    fn apply_delete(&self, writer: &mut LogStoreWriter, key: &[u8]) -> Result<()> {
        let (_pos, len) = write_record(&mut writer.writer, key, None)?;
        writer.uncompacted += len;

        let mut index = self.index.write().unwrap();
        if let Some(old) = index.remove(key) {
            writer.uncompacted += old.len;
        }
        Ok(())
    }
}

struct LogStoreReader {
    entries: Vec<(Vec<u8>, CommandPos)>,
    safe_point: Arc<AtomicU64>,
    path: Arc<PathBuf>,
    readers: std::cell::RefCell<HashMap<u64, BufReaderWithPos<File>>>,
}

impl LogStoreReader {
    fn close_stale_readers(&self) {
        let safe_point = self.safe_point.load(Ordering::Acquire);
        if safe_point > 0 {
            self.readers.borrow_mut().retain(|&gen, _| gen >= safe_point);
        }
    }

    fn read(&self, cmd_pos: CommandPos) -> Result<Vec<u8>> {
        self.close_stale_readers();
        let mut readers = self.readers.borrow_mut();
        let reader = match readers.entry(cmd_pos.gen) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let r = BufReaderWithPos::new(File::open(log_path(&self.path, cmd_pos.gen))?)?;
                e.insert(r)
            }
        };
        let (value, present) = read_record_at(reader, cmd_pos.pos, cmd_pos.len)?;
        if present {
            Ok(value)
        } else {
            Ok(Vec::new())
        }
    }
}

impl KvReader for LogStoreReader {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.entries.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
            Ok(idx) => Ok(Some(self.read(self.entries[idx].1)?)),
            Err(_) => Ok(None),
        }
    }

    fn iter(&self) -> Box<dyn KvIterator + '_> {
        Box::new(LogIterator { reader: self, pos: None })
    }
}

struct LogIterator<'a> {
    reader: &'a LogStoreReader,
    pos: Option<usize>,
}

impl<'a> KvIterator for LogIterator<'a> {
    fn seek(&mut self, key: &[u8]) {
        let idx = self
            .reader
            .entries
            .partition_point(|(k, _)| k.as_slice() < key);
        self.pos = (idx < self.reader.entries.len()).then_some(idx);
    }

    fn seek_first(&mut self) {
        self.pos = (!self.reader.entries.is_empty()).then_some(0);
    }

    fn seek_last(&mut self) {
        self.pos = self.reader.entries.len().checked_sub(1);
    }

    fn next(&mut self) {
        self.pos = self.pos.and_then(|p| {
            let n = p + 1;
            (n < self.reader.entries.len()).then_some(n)
        });
    }

    fn prev(&mut self) {
        self.pos = self.pos.and_then(|p| p.checked_sub(1));
    }

    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn key(&self) -> Option<Vec<u8>> {
        self.pos.map(|p| self.reader.entries[p].0.clone())
    }

    fn value(&self) -> Option<Vec<u8>> {
        let p = self.pos?;
        self.reader.read(self.reader.entries[p].1).ok()
    }
}

fn sorted_gen_list(path: &Path) -> Result<Vec<u64>> {
    let mut gen_list: Vec<u64> = fs::read_dir(path)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension() == Some("log".as_ref()))
        .filter_map(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
        })
        .collect();
    gen_list.sort_unstable();
    Ok(gen_list)
}

fn load(gen: u64, reader: &mut BufReaderWithPos<File>, index: &mut BTreeMap<Vec<u8>, CommandPos>) -> Result<u64> {
    let mut pos = reader.seek(SeekFrom::Start(0))?;
    let mut uncompacted = 0u64;
    let file_len = reader.get_ref().metadata()?.len();

    while pos < file_len {
        let mut tag = [0u8; 1];
        reader.read_exact(&mut tag)?;
        let mut klen_buf = [0u8; 4];
        reader.read_exact(&mut klen_buf)?;
        let klen = u32::from_be_bytes(klen_buf) as u64;
        let mut key = vec![0u8; klen as usize];
        reader.read_exact(&mut key)?;

        let (new_pos, is_set) = match tag[0] {
            0 => {
                let mut vlen_buf = [0u8; 4];
                reader.read_exact(&mut vlen_buf)?;
                let vlen = u32::from_be_bytes(vlen_buf) as u64;
                let mut value = vec![0u8; vlen as usize];
                reader.read_exact(&mut value)?;
                (pos + 1 + 4 + klen + 4 + vlen, true)
            }
            1 => (pos + 1 + 4 + klen, false),
            other => return Err(NeoSearchError::Codec(format!("bad log record tag {other}"))),
        };

        if is_set {
            if let Some(old) = index.insert(
                key,
                CommandPos {
                    gen,
                    pos,
                    len: new_pos - pos,
                },
            ) {
                uncompacted += old.len;
            }
        } else if let Some(old) = index.remove(&key) {
            uncompacted += old.len;
            uncompacted += new_pos - pos;
        }
        pos = new_pos;
    }

    Ok(uncompacted)
}

fn new_log_file(path: &Path, gen: u64, readers: &mut HashMap<u64, BufReaderWithPos<File>>) -> Result<BufWriterWithPos<File>> {
    let file_path = log_path(path, gen);
    let writer = BufWriterWithPos::new(OpenOptions::new().create(true).append(true).open(&file_path)?)?;
    readers.insert(gen, BufReaderWithPos::new(File::open(&file_path)?)?);
    Ok(writer)
}

fn log_path(dir: &Path, gen: u64) -> PathBuf {
    dir.join(format!("{gen}.log"))
}

/// A `BufReader` that tracks its current read position.
struct BufReaderWithPos<R: Read + Seek> {
    reader: BufReader<R>,
    pos: u64,
}

impl<R: Read + Seek> BufReaderWithPos<R> {
    fn new(mut inner: R) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self {
            reader: BufReader::new(inner),
            pos,
        })
    }

    fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }
}

impl<R: Read + Seek> Read for BufReaderWithPos<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.reader.read(buf)?;
        self.pos += len as u64;
        Ok(len)
    }
}

impl<R: Read + Seek> Seek for BufReaderWithPos<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.reader.seek(pos)?;
        Ok(self.pos)
    }
}

/// A `BufWriter` that tracks its current write position.
struct BufWriterWithPos<W: Write + Seek> {
    writer: BufWriter<W>,
    pos: u64,
}

impl<W: Write + Seek> BufWriterWithPos<W> {
    fn new(mut inner: W) -> Result<Self> {
        let pos = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            writer: BufWriter::new(inner),
            pos,
        })
    }
}

impl<W: Write + Seek> Write for BufWriterWithPos<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.writer.write(buf)?;
        self.pos += len as u64;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
