//! Per-field indexing hints, letting callers override how a JSON field
//! is indexed instead of relying purely on JSON-inferred type dispatch.
//!
//! A recursive map keyed by field name, each node carrying an optional
//! type override and nested child hints for object/array fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The declared type a field should be indexed as, overriding whatever
/// the JSON document's own value shape would infer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Uint,
    Int,
    Float,
    Bool,
    Date,
    Slice,
    Object,
}

/// A hint for a single field: its declared type plus, for `Object`/`Slice`
/// fields, hints for its children. A `Date` field may also carry a
/// `format` string (a `chrono` strftime pattern); absent, date parsing
/// falls back to RFC3339.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, FieldInfo>,
}

/// The metadata tree for one index: a hint per top-level field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub fields: HashMap<String, FieldInfo>,
}

impl Metadata {
    pub fn new() -> Self {
        Metadata::default()
    }

    /// Looks up the hint for a dotted field path (`"address.city"`),
    /// descending through `properties` at each segment. Returns `None` if
    /// no hint was registered at that path — callers fall back to
    /// JSON-inferred typing in that case.
    pub fn lookup(&self, path: &str) -> Option<&FieldInfo> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut node = self.fields.get(first)?;
        for seg in segments {
            node = node.properties.get(seg)?;
        }
        Some(node)
    }

    pub fn set(&mut self, path: &str, field_type: FieldType) {
        self.set_with_format(path, field_type, None);
    }

    /// Like [`Metadata::set`], additionally recording a `chrono` strftime
    /// pattern to parse a `Date` field with (ignored for other types).
    pub fn set_with_format(&mut self, path: &str, field_type: FieldType, format: Option<String>) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().expect("path must be non-empty");

        let mut map = &mut self.fields;
        for seg in &segments {
            map = &mut map
                .entry(seg.to_string())
                .or_insert_with(FieldInfo::default)
                .properties;
        }
        let info = map.entry(last.to_string()).or_insert_with(FieldInfo::default);
        info.field_type = Some(field_type);
        info.format = format;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_lookup_nested_path() {
        let mut meta = Metadata::new();
        meta.set("address.zip", FieldType::String);
        assert_eq!(
            meta.lookup("address.zip").and_then(|f| f.field_type),
            Some(FieldType::String)
        );
        assert!(meta.lookup("address.missing").is_none());
        assert!(meta.lookup("unrelated").is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let mut meta = Metadata::new();
        meta.set("created_at", FieldType::Date);
        let json = serde_json::to_string(&meta).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.lookup("created_at").and_then(|f| f.field_type),
            Some(FieldType::Date)
        );
    }
}
