//! The boolean query layer: `$and`/`$or` over field-term clauses, built on
//! top of [`crate::index::Index::filter_term_id`]/`match_prefix_ids`.
//!
//! `$and` intersects, `$or` unions, both via a sorted merge walk over each
//! clause's posting ids. Clause evaluation runs in parallel via `rayon`,
//! since each clause only needs read access to its own field database.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{NeoSearchError, Result};
use crate::index::Index;

/// A single term clause: `{"field": "value"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    pub field: String,
    pub value: String,
}

/// The boolean query DSL: exactly one of `$and`/`$or`, each a list of
/// term clauses.
#[derive(Debug, Clone)]
pub enum Query {
    And(Vec<Clause>),
    Or(Vec<Clause>),
}

impl Query {
    /// Parses a DSL value shaped like `{"$and": [{"field": "value"}, ...]}`
    /// or the `$or` equivalent.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| NeoSearchError::Protocol("query DSL must be an object".to_string()))?;

        let (key, clauses_json) = if let Some(v) = obj.get("$and") {
            ("$and", v)
        } else if let Some(v) = obj.get("$or") {
            ("$or", v)
        } else {
            return Err(NeoSearchError::Protocol(
                "invalid search DSL: no $and or $or clause found".to_string(),
            ));
        };

        let list = clauses_json
            .as_array()
            .ok_or_else(|| NeoSearchError::Protocol(format!("{key} must be an array")))?;

        let mut clauses = Vec::with_capacity(list.len());
        for item in list {
            let filter = item
                .as_object()
                .ok_or_else(|| NeoSearchError::Protocol(format!("invalid clause: {item}")))?;
            let (field, value) = filter
                .iter()
                .next()
                .ok_or_else(|| NeoSearchError::Protocol(format!("invalid clause: {item}")))?;
            let value = value
                .as_str()
                .ok_or_else(|| NeoSearchError::Protocol(format!("invalid field value: {value}")))?;
            clauses.push(Clause {
                field: field.clone(),
                value: value.to_string(),
            });
        }

        if clauses.is_empty() {
            return Err(NeoSearchError::Protocol(format!("{key} must be non-empty")));
        }

        Ok(match key {
            "$and" => Query::And(clauses),
            _ => Query::Or(clauses),
        })
    }
}

/// Merges two strictly ascending `u64` slices, keeping only values present
/// in both (sorted-merge intersection).
fn intersect(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut result = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    result
}

/// Merges two strictly ascending `u64` slices, keeping every value present
/// in either (sorted-merge union, deduplicated).
fn union(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                result.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                result.push(b[j]);
                j += 1;
            }
        }
    }
    result.extend_from_slice(&a[i..]);
    result.extend_from_slice(&b[j..]);
    result
}

/// Executes `query` against `index`, returning at most `limit` hydrated
/// documents (0 means unlimited) plus the total number of matching ids.
pub fn search(index: &Index, engine: &Engine, query: &Query, limit: usize) -> Result<(Vec<String>, u64)> {
    let (clauses, is_and): (&[Clause], bool) = match query {
        Query::And(c) => (c, true),
        Query::Or(c) => (c, false),
    };

    let per_clause: Vec<Vec<u64>> = clauses
        .par_iter()
        .map(|clause| index.filter_term_id(engine, &clause.field, clause.value.as_bytes(), 0).map(|(ids, _)| ids))
        .collect::<Result<Vec<_>>>()?;

    let mut merged = per_clause[0].clone();
    for ids in &per_clause[1..] {
        merged = if is_and { intersect(&merged, ids) } else { union(&merged, ids) };
    }

    let total = merged.len() as u64;
    let cap = if limit == 0 { merged.len() } else { limit };
    let docs = index.get_docs(engine, &merged, cap)?;
    Ok((docs, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::index::{Index, IndexConfig};
    use crate::kv::BackendRegistry;
    use crate::metadata::Metadata;
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
    fn and_distributes_as_set_intersection() {
        let (_dir, engine, index) = setup();
        index
            .add(&engine, 1, br#"{"color": "red", "size": "m"}"#, &Metadata::new())
            .unwrap();
        index
            .add(&engine, 2, br#"{"color": "red", "size": "l"}"#, &Metadata::new())
            .unwrap();
        index
            .add(&engine, 3, br#"{"color": "blue", "size": "m"}"#, &Metadata::new())
            .unwrap();

        let query = Query::And(vec![
            Clause { field: "color".to_string(), value: "red".to_string() },
            Clause { field: "size".to_string(), value: "m".to_string() },
        ]);
        let (docs, total) = search(&index, &engine, &query, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(docs.len(), 1);
        assert!(docs[0].contains("\"color\": \"red\""));
    }

    #[test]
    fn or_unions_matches_across_clauses() {
        let (_dir, engine, index) = setup();
        index.add(&engine, 1, br#"{"color": "red"}"#, &Metadata::new()).unwrap();
        index.add(&engine, 2, br#"{"color": "blue"}"#, &Metadata::new()).unwrap();
        index.add(&engine, 3, br#"{"color": "green"}"#, &Metadata::new()).unwrap();

        let query = Query::Or(vec![
            Clause { field: "color".to_string(), value: "red".to_string() },
            Clause { field: "color".to_string(), value: "blue".to_string() },
        ]);
        let (docs, total) = search(&index, &engine, &query, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn parses_and_clause_from_json() {
        let dsl: serde_json::Value = serde_json::from_str(r#"{"$and": [{"color": "red"}, {"size": "m"}]}"#).unwrap();
        let query = Query::from_json(&dsl).unwrap();
        assert!(matches!(query, Query::And(ref c) if c.len() == 2));
    }

    #[test]
    fn rejects_dsl_without_and_or_or() {
        let dsl: serde_json::Value = serde_json::from_str(r#"{"$not": []}"#).unwrap();
        assert!(Query::from_json(&dsl).is_err());
    }

    #[test]
    fn intersection_and_union_are_distributive_over_shared_elements() {
        let a = vec![1u64, 2, 3, 5];
        let b = vec![2u64, 3, 4];
        assert_eq!(intersect(&a, &b), vec![2, 3]);
        assert_eq!(union(&a, &b), vec![1, 2, 3, 4, 5]);
    }
}
