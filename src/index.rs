//! The `Index` abstraction: one named, self-contained document index,
//! translating `Add`/`Get`/`Search` calls into [`crate::command::Command`]
//! sequences executed against an [`crate::engine::Engine`].
//!
//! Fields are walked depth-first in sorted key order, emitting one
//! `mergeset` per indexed scalar; `document.db` holds the raw JSON blob
//! keyed by document id. Batch-mode gating emits one `batch` command per
//! database the first time it's touched during an `Add` call.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use walkdir::WalkDir;

use crate::codec;
use crate::command::{Command, TypeTag};
use crate::engine::Engine;
use crate::error::{NeoSearchError, Result};
use crate::metadata::{FieldType, Metadata};

const DOCUMENT_DB: &str = "document.db";

/// Per-index configuration, distinct from the process-wide [`crate::config::Config`]:
/// a `DataDir`/`Debug` pair plus the engine it will share.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub data_dir: PathBuf,
    pub debug: bool,
}

/// Validates an index name: `[A-Za-z][A-Za-z0-9_-]+`, at least 3 chars.
pub fn validate_index_name(name: &str) -> bool {
    if name.len() < 3 {
        return false;
    }
    let mut chars = name.chars();
    let first_ok = chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);
    first_ok
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Batch-mode bookkeeping: which databases already have a pending `batch`
/// command during the current `Add` call, reset once flushed.
#[derive(Default)]
struct BatchState {
    enabled: bool,
    flush_storages: Vec<String>,
}

/// One named index: a directory of per-field KV databases plus the
/// document blob store, all reached through a shared [`Engine`].
pub struct Index {
    name: String,
    config: IndexConfig,
    full_dir: PathBuf,
    batch: Mutex<BatchState>,
}

impl Index {
    /// Opens an existing index directory, or creates one if `create` is
    /// true. `create` requires the directory be absent or empty, else
    /// returns [`NeoSearchError::AlreadyExists`].
    pub fn new(name: impl Into<String>, config: IndexConfig, create: bool) -> Result<Self> {
        let name = name.into();
        if !validate_index_name(&name) {
            return Err(NeoSearchError::InvalidName(name));
        }

        let full_dir = config.data_dir.join(&name);

        if create {
            match fs::read_dir(&full_dir) {
                Ok(mut entries) => {
                    if entries.next().is_some() {
                        return Err(NeoSearchError::AlreadyExists(name));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    fs::create_dir_all(&full_dir)?;
                }
                Err(e) => return Err(e.into()),
            }
        } else if !full_dir.exists() {
            return Err(NeoSearchError::NotFound);
        }

        Ok(Index {
            name,
            config,
            full_dir,
            batch: Mutex::new(BatchState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enables write batching for the next `Add` call: the first command
    /// touching each database emits a `batch` command before it.
    pub fn batch(&self) {
        self.batch.lock().unwrap().enabled = true;
    }

    /// Flushes every database that entered batch mode since the last
    /// flush.
    pub fn flush_batch(&self, engine: &Engine) -> Result<()> {
        let storages = {
            let mut state = self.batch.lock().unwrap();
            std::mem::take(&mut state.flush_storages)
        };

        for storage in &storages {
            engine.execute(&Command::flush_batch(&self.name, storage.clone()))?;
            if self.config.debug {
                debug!("flushing batch storage '{storage}' of index '{}'", self.name);
            }
        }
        Ok(())
    }

    fn build_batch_on(&self, storage: &str) -> Option<Command> {
        let mut state = self.batch.lock().unwrap();
        if !state.enabled {
            return None;
        }
        if state.flush_storages.iter().any(|s| s == storage) {
            return None;
        }
        state.flush_storages.push(storage.to_string());
        Some(Command::batch(&self.name, storage.to_string()))
    }

    /// Indexes `doc` (a JSON document) under `id`, executing the resulting
    /// command sequence against `engine`.
    pub fn add(&self, engine: &Engine, id: u64, doc: &[u8], metadata: &Metadata) -> Result<()> {
        let commands = self.build_add(id, doc, metadata)?;
        for cmd in &commands {
            engine.execute(cmd)?;
        }
        if self.batch.lock().unwrap().enabled {
            self.batch.lock().unwrap().enabled = false;
        }
        Ok(())
    }

    /// Builds (without executing) the full command sequence for indexing
    /// `doc` under `id`. Exposed separately so callers can inspect or
    /// replay the plan.
    pub fn build_add(&self, id: u64, doc: &[u8], metadata: &Metadata) -> Result<Vec<Command>> {
        let mut commands = Vec::new();

        let mut doc_commands = Vec::new();
        if let Some(batch_cmd) = self.build_batch_on(DOCUMENT_DB) {
            doc_commands.push(batch_cmd);
        }
        doc_commands.push(Command::set(
            &self.name,
            DOCUMENT_DB,
            codec::encode_u64(id).to_vec(),
            TypeTag::Uint,
            doc.to_vec(),
            TypeTag::String,
        ));

        let parsed: Value = serde_json::from_slice(doc)?;
        let object = parsed
            .as_object()
            .ok_or_else(|| NeoSearchError::Protocol("document root must be a JSON object".to_string()))?;
        if object.is_empty() {
            return Err(NeoSearchError::Protocol("empty document".to_string()));
        }

        let field_commands = self.build_index_fields(id, "", object, metadata)?;

        commands.extend(doc_commands);
        commands.extend(field_commands);
        Ok(commands)
    }

    /// Walks an object's fields in sorted key order, recursing into
    /// nested objects/arrays and emitting the leaf-level index commands.
    fn build_index_fields(
        &self,
        id: u64,
        base_field: &str,
        object: &serde_json::Map<String, Value>,
        metadata: &Metadata,
    ) -> Result<Vec<Command>> {
        let mut commands = Vec::new();
        let mut keys: Vec<&String> = object.keys().collect();
        keys.sort();

        for key in keys {
            let value = &object[key];
            let field_key = if base_field.is_empty() {
                key.clone()
            } else {
                format!("{base_field}.{key}")
            };

            if metadata.lookup(&field_key).is_none() && self.config.debug {
                warn!("metadata not supplied for field '{field_key}'");
            }

            commands.extend(self.build_index_field(id, &field_key, value, metadata)?);
        }

        Ok(commands)
    }

    fn build_index_field(&self, id: u64, key: &str, value: &Value, metadata: &Metadata) -> Result<Vec<Command>> {
        let hint = metadata.lookup(key);
        let declared = hint.and_then(|f| f.field_type);

        let resolved = match declared {
            Some(t) => t,
            None => infer_field_type(value)?,
        };

        match resolved {
            FieldType::String => {
                let s = value
                    .as_str()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("field '{key}' isn't a string")))?;
                Ok(self.build_index_string(id, key, s))
            }
            FieldType::Uint => {
                let v = value
                    .as_u64()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("field '{key}' isn't a uint")))?;
                Ok(self.build_index_commands(key, &codec::encode_u64(v), id, TypeTag::Uint))
            }
            FieldType::Int => {
                let v = value
                    .as_i64()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("field '{key}' isn't an int")))?;
                Ok(self.build_index_commands(key, &codec::encode_i64(v), id, TypeTag::Int))
            }
            FieldType::Float => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("field '{key}' isn't a float")))?;
                Ok(self.build_index_commands(key, &codec::encode_f64(v), id, TypeTag::Float))
            }
            FieldType::Bool => {
                let v = value
                    .as_bool()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("field '{key}' isn't a bool")))?;
                Ok(self.build_index_commands(key, &codec::encode_bool(v), id, TypeTag::Bool))
            }
            FieldType::Date => {
                let s = value
                    .as_str()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("field '{key}' isn't a date string")))?;
                let timestamp = match hint.and_then(|f| f.format.as_deref()) {
                    Some(fmt) => NaiveDateTime::parse_from_str(s, fmt)
                        .map(|naive| naive.and_utc())
                        .or_else(|_| {
                            chrono::NaiveDate::parse_from_str(s, fmt)
                                .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
                        })
                        .map_err(|e| {
                            NeoSearchError::Protocol(format!("field '{key}' doesn't match format '{fmt}': {e}"))
                        })?
                        .timestamp(),
                    None => DateTime::parse_from_rfc3339(s)
                        .map_err(|e| NeoSearchError::Protocol(format!("field '{key}' isn't RFC3339: {e}")))?
                        .with_timezone(&Utc)
                        .timestamp(),
                };
                Ok(self.build_index_commands(key, &codec::encode_i64(timestamp), id, TypeTag::Date))
            }
            FieldType::Slice => {
                let items = value
                    .as_array()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("field '{key}' isn't a slice")))?;
                self.build_index_slice(id, key, items, metadata)
            }
            FieldType::Object => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("field '{key}' isn't an object")))?;
                self.build_index_fields(id, key, obj, metadata)
            }
        }
    }

    fn build_index_slice(&self, id: u64, key: &str, values: &[Value], metadata: &Metadata) -> Result<Vec<Command>> {
        // Batch bookkeeping only: the slice as a whole shares one gate key
        // even though each element's own commands land in its own typed
        // database.
        let gate = format!("{key}_slice.idx");
        let mut commands = Vec::new();
        if let Some(cmd) = self.build_batch_on(&gate) {
            commands.push(cmd);
        }
        for value in values {
            commands.extend(self.build_index_field(id, key, value, metadata)?);
        }
        Ok(commands)
    }

    /// Tokenizes `value` (trim, lowercase, split on whitespace), emitting
    /// one `mergeset` per token plus, for multi-token strings, one more
    /// for the full phrase.
    fn build_index_string(&self, id: u64, key: &str, value: &str) -> Vec<Command> {
        let storage = field_database(key, TypeTag::String);
        let normalized = value.trim().to_lowercase();
        let tokens: Vec<&str> = normalized.split_whitespace().collect();

        let mut commands = Vec::new();
        if let Some(cmd) = self.build_batch_on(&storage) {
            commands.push(cmd);
        }

        let mut seen = std::collections::HashSet::new();
        for token in &tokens {
            if !seen.insert(*token) {
                continue;
            }
            commands.push(Command::merge_set(
                &self.name,
                storage.clone(),
                token.as_bytes().to_vec(),
                TypeTag::String,
                codec::encode_u64(id).to_vec(),
            ));
        }

        if tokens.len() > 1 {
            commands.push(Command::merge_set(
                &self.name,
                storage,
                normalized.into_bytes(),
                TypeTag::String,
                codec::encode_u64(id).to_vec(),
            ));
        }

        commands
    }

    fn build_index_commands(&self, key: &str, encoded_key: &[u8], id: u64, key_type: TypeTag) -> Vec<Command> {
        let storage = field_database(key, key_type);
        let mut commands = Vec::new();
        if let Some(cmd) = self.build_batch_on(&storage) {
            commands.push(cmd);
        }
        commands.push(Command::merge_set(
            &self.name,
            storage,
            encoded_key.to_vec(),
            key_type,
            codec::encode_u64(id).to_vec(),
        ));
        commands
    }

    /// Retrieves the raw JSON document stored under `id`.
    pub fn get(&self, engine: &Engine, id: u64) -> Result<Vec<u8>> {
        let cmd = Command::get(&self.name, DOCUMENT_DB, codec::encode_u64(id).to_vec(), TypeTag::Uint);
        engine.execute(&cmd)?.ok_or(NeoSearchError::NotFound)
    }

    /// Retrieves up to `limit` documents by id, in `doc_ids` order.
    pub fn get_docs(&self, engine: &Engine, doc_ids: &[u64], limit: usize) -> Result<Vec<String>> {
        let capped = doc_ids.len().min(limit);
        let mut docs = Vec::with_capacity(capped);
        for &id in &doc_ids[..capped] {
            let bytes = self.get(engine, id)?;
            docs.push(String::from_utf8(bytes)?);
        }
        Ok(docs)
    }

    /// Exact-term lookup: returns document ids posted under `value` in
    /// `field`'s string-typed database, plus the *total* match count
    /// (before `limit` truncation). Targets the tokenized-text database —
    /// this is the database the boolean query layer's `$and`/`$or`
    /// clauses always search. For the other declared field types (numeric,
    /// date, bool), use [`Index::filter_term_id_typed`].
    pub fn filter_term_id(&self, engine: &Engine, field: &str, value: &[u8], limit: u64) -> Result<(Vec<u64>, u64)> {
        self.filter_term_id_typed(engine, field, value, limit, TypeTag::String)
    }

    /// Like [`Index::filter_term_id`], but against the field's database for
    /// `type_tag` instead of assuming string-tokenized text. `value` must
    /// already be encoded the way [`crate::codec`] encodes that type (e.g.
    /// `codec::encode_i64` for a `Date`/`Int` field).
    pub fn filter_term_id_typed(
        &self,
        engine: &Engine,
        field: &str,
        value: &[u8],
        limit: u64,
        type_tag: TypeTag,
    ) -> Result<(Vec<u64>, u64)> {
        let storage = field_database(field, type_tag);
        let cmd = Command::get(&self.name, storage, value.to_vec(), type_tag);
        let data = engine.execute(&cmd)?.unwrap_or_default();
        let all = codec::unpack_posting(&data)?;
        let total = all.len() as u64;

        let capped = if limit > 0 && limit < total {
            limit as usize
        } else {
            all.len()
        };
        Ok((all[..capped].to_vec(), total))
    }

    /// Exact-term lookup returning the hydrated documents.
    pub fn filter_term(&self, engine: &Engine, field: &str, value: &[u8], limit: u64) -> Result<(Vec<String>, u64)> {
        let (doc_ids, total) = self.filter_term_id(engine, field, value, limit)?;
        let docs = self.get_docs(engine, &doc_ids, doc_ids.len())?;
        Ok((docs, total))
    }

    /// Like [`Index::filter_term`], but against `type_tag`'s database.
    pub fn filter_term_typed(
        &self,
        engine: &Engine,
        field: &str,
        value: &[u8],
        limit: u64,
        type_tag: TypeTag,
    ) -> Result<(Vec<String>, u64)> {
        let (doc_ids, total) = self.filter_term_id_typed(engine, field, value, limit, type_tag)?;
        let docs = self.get_docs(engine, &doc_ids, doc_ids.len())?;
        Ok((docs, total))
    }

    /// Returns the union of document ids whose `field` posting-list key
    /// starts with `prefix` (a range scan over the field's string-typed
    /// database), in the order each id is first encountered across the
    /// scanned keys.
    pub fn match_prefix_ids(&self, engine: &Engine, field: &str, prefix: &[u8]) -> Result<Vec<u64>> {
        let storage = field_database(field, TypeTag::String);
        let store = engine.get_store(&self.name, &storage)?;
        let reader = store.reader()?;
        let mut it = reader.iter();
        it.seek(prefix);

        let mut seen: std::collections::HashSet<u64> = std::collections::HashSet::new();
        let mut ids = Vec::new();
        while it.valid() {
            let key = it.key().expect("valid cursor has a key");
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(value) = it.value() {
                if !value.is_empty() {
                    for id in codec::unpack_posting(&value)? {
                        if seen.insert(id) {
                            ids.push(id);
                        }
                    }
                }
            }
            it.next();
        }
        Ok(ids)
    }

    /// Returns the hydrated documents whose `field` starts with `prefix`.
    pub fn match_prefix(&self, engine: &Engine, field: &str, prefix: &[u8]) -> Result<Vec<String>> {
        let ids = self.match_prefix_ids(engine, field, prefix)?;
        self.get_docs(engine, &ids, ids.len())
    }

    /// Computes this index's on-disk manifest: per-database byte sizes,
    /// useful for `info()`-style introspection into storage footprint.
    pub fn info(&self) -> Result<IndexInfo> {
        let mut total_bytes = 0u64;
        let mut databases = Vec::new();

        for entry in WalkDir::new(&self.full_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| NeoSearchError::BackendIo(e.to_string()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let size: u64 = WalkDir::new(entry.path())
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum();
            total_bytes += size;
            databases.push(DatabaseInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                bytes: size,
            });
        }

        Ok(IndexInfo {
            name: self.name.clone(),
            databases,
            total_bytes,
        })
    }

    /// Closes every store handle this index has opened on `engine`.
    /// `Index` itself holds no handles directly (those live in the
    /// engine's LRU cache); this walks the index's on-disk databases and
    /// asks the engine to evict each one it may have cached, without
    /// tearing down the whole shared engine just because one index is
    /// done with it.
    pub fn close(&self, engine: &Engine) {
        engine.close_store(&self.name, DOCUMENT_DB);
        let Ok(entries) = fs::read_dir(&self.full_dir) else {
            return;
        };
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    engine.close_store(&self.name, name);
                }
            }
        }
    }
}

/// Slugifies a dotted field path to ASCII, segment by segment: split on
/// `.`, transliterate each segment to `[a-z0-9-]`, rejoin with `.`.
/// Collapses runs of non-alphanumeric characters into a single `-` and
/// trims them from each segment's ends, so the result always satisfies
/// the database name grammar's `[A-Za-z0-9_-]+` segment rule.
fn slugify_field(field: &str) -> String {
    field
        .split('.')
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            let mut last_was_dash = false;
            for c in segment.chars() {
                if c.is_ascii_alphanumeric() {
                    out.push(c.to_ascii_lowercase());
                    last_was_dash = false;
                } else if !last_was_dash && !out.is_empty() {
                    out.push('-');
                    last_was_dash = true;
                }
            }
            while out.ends_with('-') {
                out.pop();
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// The on-disk suffix distinguishing a field's per-type posting database,
/// e.g. `name` indexed as a string becomes `name_string.idx`: one
/// `<slugged-field-path>_<typetag>.idx` per indexed field/type pair.
fn type_tag_suffix(ty: TypeTag) -> &'static str {
    match ty {
        TypeTag::String => "string",
        TypeTag::Uint => "uint",
        TypeTag::Int => "int",
        TypeTag::Float => "float",
        TypeTag::Bool => "bool",
        TypeTag::Date => "date",
        TypeTag::Binary => "binary",
        TypeTag::Nil => "nil",
    }
}

/// Computes the per-(field,type) database name an indexed field's postings
/// live in.
fn field_database(field: &str, type_tag: TypeTag) -> String {
    format!("{}_{}.idx", slugify_field(field), type_tag_suffix(type_tag))
}

fn infer_field_type(value: &Value) -> Result<FieldType> {
    match value {
        Value::String(_) => Ok(FieldType::String),
        Value::Bool(_) => Ok(FieldType::Bool),
        Value::Number(n) if n.is_u64() => Ok(FieldType::Uint),
        Value::Number(n) if n.is_i64() => Ok(FieldType::Int),
        Value::Number(_) => Ok(FieldType::Float),
        Value::Array(_) => Ok(FieldType::Slice),
        Value::Object(_) => Ok(FieldType::Object),
        Value::Null => Err(NeoSearchError::Unsupported("null field value".to_string())),
    }
}

/// Per-database size, reported by [`Index::info`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub bytes: u64,
}

/// The manifest returned by [`Index::info`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub databases: Vec<DatabaseInfo>,
    pub total_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::kv::BackendRegistry;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Engine, Index) {
        let dir = TempDir::new().unwrap();
        let engine = Engine::new(dir.path(), BackendRegistry::with_builtins(), "log", 32);
        let index = Index::new(
            "products",
            IndexConfig {
                data_dir: dir.path().to_path_buf(),
                debug: false,
            },
            true,
        )
        .unwrap();
        (dir, engine, index)
    }

    #[test]
    fn field_database_names_satisfy_the_database_grammar() {
        assert_eq!(field_database("name", TypeTag::String), "name_string.idx");
        assert_eq!(field_database("address.city", TypeTag::String), "address.city_string.idx");
        assert_eq!(field_database("Preço!!", TypeTag::Uint), "pre-o_uint.idx");
        for db in [
            field_database("name", TypeTag::String),
            field_database("address.city", TypeTag::Date),
        ] {
            assert!(crate::kv::validate_database_name(&db), "{db} should be valid");
        }
    }

    #[test]
    fn index_name_validation() {
        assert!(validate_index_name("products"));
        assert!(!validate_index_name("1products"));
        assert!(!validate_index_name("ab"));
    }

    #[test]
    fn create_on_existing_nonempty_dir_errors() {
        let (dir, _engine, _index) = setup();
        let err = Index::new(
            "products",
            IndexConfig {
                data_dir: dir.path().to_path_buf(),
                debug: false,
            },
            true,
        )
        .unwrap_err();
        assert!(matches!(err, NeoSearchError::AlreadyExists(_)));
    }

    #[test]
    fn add_then_get_round_trips_document() {
        let (_dir, engine, index) = setup();
        let doc = br#"{"name": "Red Shoes", "price": 42}"#;
        index.add(&engine, 1, doc, &Metadata::new()).unwrap();
        let got = index.get(&engine, 1).unwrap();
        assert_eq!(got, doc);
    }

    #[test]
    fn single_doc_term_hit() {
        let (_dir, engine, index) = setup();
        let doc = br#"{"name": "shoes"}"#;
        index.add(&engine, 7, doc, &Metadata::new()).unwrap();
        let (docs, total) = index.filter_term(&engine, "name", b"shoes", 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(docs, vec![String::from_utf8(doc.to_vec()).unwrap()]);
    }

    #[test]
    fn tokenization_indexes_each_word_and_full_phrase() {
        let (_dir, engine, index) = setup();
        let doc = br#"{"name": "Red Running Shoes"}"#;
        index.add(&engine, 3, doc, &Metadata::new()).unwrap();

        let (red_docs, _) = index.filter_term(&engine, "name", b"red", 0).unwrap();
        assert_eq!(red_docs.len(), 1);

        let (phrase_docs, _) = index
            .filter_term(&engine, "name", b"red running shoes", 0)
            .unwrap();
        assert_eq!(phrase_docs.len(), 1);
    }

    #[test]
    fn prefix_search_matches_across_distinct_keys() {
        let (_dir, engine, index) = setup();
        index
            .add(&engine, 1, br#"{"sku": "ab-100"}"#, &Metadata::new())
            .unwrap();
        index
            .add(&engine, 2, br#"{"sku": "ab-200"}"#, &Metadata::new())
            .unwrap();
        index
            .add(&engine, 3, br#"{"sku": "cd-100"}"#, &Metadata::new())
            .unwrap();

        let ids = index.match_prefix_ids(&engine, "sku", b"ab-").unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn batch_mode_hides_writes_until_flushed() {
        let (_dir, engine, index) = setup();
        index.batch();
        index.add(&engine, 1, br#"{"name": "shoes"}"#, &Metadata::new()).unwrap();

        // document.db is still batching: a direct get (bypassing the batch)
        // should find nothing committed yet.
        assert!(index.get(&engine, 1).is_err());

        index.flush_batch(&engine).unwrap();
        assert_eq!(index.get(&engine, 1).unwrap(), br#"{"name": "shoes"}"#);
    }

    #[test]
    fn nested_object_fields_are_indexed_with_dotted_keys() {
        let (_dir, engine, index) = setup();
        let doc = br#"{"address": {"city": "recife"}}"#;
        index.add(&engine, 1, doc, &Metadata::new()).unwrap();
        let (docs, _) = index.filter_term(&engine, "address.city", b"recife", 0).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn date_field_indexes_by_metadata_hint() {
        let (_dir, engine, index) = setup();
        let mut metadata = Metadata::new();
        metadata.set("created_at", FieldType::Date);
        let doc = br#"{"created_at": "2024-01-15T00:00:00Z"}"#;
        index.add(&engine, 1, doc, &metadata).unwrap();

        let ts = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z").unwrap().timestamp();
        let (docs, _) = index
            .filter_term_typed(&engine, "created_at", &codec::encode_i64(ts), 0, TypeTag::Date)
            .unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn date_field_honors_custom_format_hint() {
        let (_dir, engine, index) = setup();
        let mut metadata = Metadata::new();
        metadata.set_with_format("born", FieldType::Date, Some("%d/%m/%Y".to_string()));
        let doc = br#"{"born": "15/01/2024"}"#;
        index.add(&engine, 1, doc, &metadata).unwrap();

        let expected = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        let (docs, _) = index
            .filter_term_typed(&engine, "born", &codec::encode_i64(expected), 0, TypeTag::Date)
            .unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn info_reports_database_sizes() {
        let (_dir, engine, index) = setup();
        index.add(&engine, 1, br#"{"name": "shoes"}"#, &Metadata::new()).unwrap();
        let info = index.info().unwrap();
        assert!(info.total_bytes > 0);
        assert!(info.databases.iter().any(|d| d.name == DOCUMENT_DB));
    }
}
