//! The typed command record that describes a single KV operation against
//! one `(index, database)` target, plus its round-trippable textual form.
//!
//! A `Command` is a flat struct of index/database/op/key/value plus type
//! tags, printed back via its `Display` impl. A full statement lexer/REPL
//! for programs made of many of these lives outside this crate; only the
//! single-command textual form (`Display`/`FromStr`) lives here.

use std::fmt;
use std::str::FromStr;

use crate::codec;
use crate::error::{NeoSearchError, Result};

/// Type tag attached to a command's key or value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Nil,
    Uint,
    Int,
    Float,
    String,
    Date,
    Bool,
    Binary,
}

/// The KV operation a [`Command`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set,
    Get,
    Delete,
    MergeSet,
    Batch,
    FlushBatch,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Set => "SET",
            Op::Get => "GET",
            Op::Delete => "DELETE",
            Op::MergeSet => "MERGESET",
            Op::Batch => "BATCH",
            Op::FlushBatch => "FLUSHBATCH",
        }
    }
}

impl FromStr for Op {
    type Err = NeoSearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SET" => Ok(Op::Set),
            "GET" => Ok(Op::Get),
            "DELETE" => Ok(Op::Delete),
            "MERGESET" => Ok(Op::MergeSet),
            "BATCH" => Ok(Op::Batch),
            "FLUSHBATCH" => Ok(Op::FlushBatch),
            _ => Err(NeoSearchError::Protocol(format!("unknown op: {s}"))),
        }
    }
}

/// A single typed KV command targeting `index.database`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub index: String,
    pub database: String,
    pub op: Op,
    pub key: Option<Vec<u8>>,
    pub key_type: TypeTag,
    pub value: Option<Vec<u8>>,
    pub value_type: TypeTag,
}

impl Command {
    /// Builds a `batch` command for `(index, database)`.
    pub fn batch(index: impl Into<String>, database: impl Into<String>) -> Self {
        Command {
            index: index.into(),
            database: database.into(),
            op: Op::Batch,
            key: None,
            key_type: TypeTag::Nil,
            value: None,
            value_type: TypeTag::Nil,
        }
    }

    /// Builds a `flushbatch` command for `(index, database)`.
    pub fn flush_batch(index: impl Into<String>, database: impl Into<String>) -> Self {
        Command {
            index: index.into(),
            database: database.into(),
            op: Op::FlushBatch,
            key: None,
            key_type: TypeTag::Nil,
            value: None,
            value_type: TypeTag::Nil,
        }
    }

    /// Builds a `set` command.
    pub fn set(
        index: impl Into<String>,
        database: impl Into<String>,
        key: Vec<u8>,
        key_type: TypeTag,
        value: Vec<u8>,
        value_type: TypeTag,
    ) -> Self {
        Command {
            index: index.into(),
            database: database.into(),
            op: Op::Set,
            key: Some(key),
            key_type,
            value: Some(value),
            value_type,
        }
    }

    /// Builds a `mergeset` command. `value` is the 8-byte big-endian u64
    /// to merge into the posting list at `key`.
    pub fn merge_set(
        index: impl Into<String>,
        database: impl Into<String>,
        key: Vec<u8>,
        key_type: TypeTag,
        value: Vec<u8>,
    ) -> Self {
        Command {
            index: index.into(),
            database: database.into(),
            op: Op::MergeSet,
            key: Some(key),
            key_type,
            value: Some(value),
            value_type: TypeTag::Uint,
        }
    }

    /// Builds a `get` command.
    pub fn get(index: impl Into<String>, database: impl Into<String>, key: Vec<u8>, key_type: TypeTag) -> Self {
        Command {
            index: index.into(),
            database: database.into(),
            op: Op::Get,
            key: Some(key),
            key_type,
            value: None,
            value_type: TypeTag::Nil,
        }
    }

    /// Builds a `delete` command.
    pub fn delete(index: impl Into<String>, database: impl Into<String>, key: Vec<u8>, key_type: TypeTag) -> Self {
        Command {
            index: index.into(),
            database: database.into(),
            op: Op::Delete,
            key: Some(key),
            key_type,
            value: None,
            value_type: TypeTag::Nil,
        }
    }
}

fn literal(bytes: &[u8], ty: TypeTag) -> Result<String> {
    Ok(match ty {
        TypeTag::String => format!("'{}'", escape_quotes(bytes)),
        TypeTag::Uint => format!("uint({})", codec::decode_u64(bytes)?),
        TypeTag::Int => format!("int({})", codec::decode_i64(bytes)?),
        TypeTag::Float => format!("float({})", codec::decode_f64(bytes)?),
        TypeTag::Bool => format!("{}", codec::decode_bool(bytes)?),
        TypeTag::Date => format!("date({})", codec::decode_i64(bytes)?),
        TypeTag::Binary => format!("'{}'", escape_quotes(bytes)),
        TypeTag::Nil => String::new(),
    })
}

fn escape_quotes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\'', "\\'")
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key_str = match (&self.key, self.key_type) {
            (Some(k), ty) => literal(k, ty).map_err(|_| fmt::Error)?,
            (None, _) => String::new(),
        };
        let val_str = match (&self.value, self.value_type) {
            (Some(v), ty) => literal(v, ty).map_err(|_| fmt::Error)?,
            (None, _) => String::new(),
        };

        match self.op {
            Op::Set | Op::MergeSet => write!(
                f,
                "USING {}.{} {} {} {};",
                self.index,
                self.database,
                self.op.as_str(),
                key_str,
                val_str
            ),
            Op::Batch | Op::FlushBatch => {
                write!(f, "USING {}.{} {};", self.index, self.database, self.op.as_str())
            }
            Op::Get | Op::Delete => write!(
                f,
                "USING {}.{} {} {};",
                self.index,
                self.database,
                self.op.as_str(),
                key_str
            ),
        }
    }
}

/// Parses a typed literal (`'str'`, `uint(N)`, `int(N)`, `float(N)`, a bare
/// integer, or a bare float) into its bytes and type tag.
fn parse_literal(tok: &str) -> Result<(Vec<u8>, TypeTag)> {
    let tok = tok.trim();
    if let Some(inner) = tok.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok((inner.replace("\\'", "'").into_bytes(), TypeTag::String));
    }
    if tok == "true" || tok == "false" {
        return Ok((codec::encode_bool(tok == "true").to_vec(), TypeTag::Bool));
    }
    if let Some(inner) = tok.strip_prefix("uint(").and_then(|s| s.strip_suffix(')')) {
        let v: u64 = inner
            .parse()
            .map_err(|_| NeoSearchError::Protocol(format!("invalid uint literal: {tok}")))?;
        return Ok((codec::encode_u64(v).to_vec(), TypeTag::Uint));
    }
    if let Some(inner) = tok.strip_prefix("int(").and_then(|s| s.strip_suffix(')')) {
        let v: i64 = inner
            .parse()
            .map_err(|_| NeoSearchError::Protocol(format!("invalid int literal: {tok}")))?;
        return Ok((codec::encode_i64(v).to_vec(), TypeTag::Int));
    }
    if let Some(inner) = tok.strip_prefix("date(").and_then(|s| s.strip_suffix(')')) {
        let v: i64 = inner
            .parse()
            .map_err(|_| NeoSearchError::Protocol(format!("invalid date literal: {tok}")))?;
        return Ok((codec::encode_i64(v).to_vec(), TypeTag::Date));
    }
    if let Some(inner) = tok.strip_prefix("float(").and_then(|s| s.strip_suffix(')')) {
        let v: f64 = inner
            .parse()
            .map_err(|_| NeoSearchError::Protocol(format!("invalid float literal: {tok}")))?;
        return Ok((codec::encode_f64(v).to_vec(), TypeTag::Float));
    }
    if let Ok(v) = tok.parse::<i64>() {
        return Ok((codec::encode_i64(v).to_vec(), TypeTag::Int));
    }
    if let Ok(v) = tok.parse::<f64>() {
        return Ok((codec::encode_f64(v).to_vec(), TypeTag::Float));
    }

    Err(NeoSearchError::Protocol(format!("invalid literal: {tok}")))
}

/// Splits a statement's argument tail into whitespace-separated tokens,
/// keeping single-quoted strings (with `\'` escaping) intact.
fn tokenize_args(s: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = s.trim().chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' {
            let mut tok = String::from("'");
            chars.next();
            loop {
                match chars.next() {
                    Some('\\') if chars.peek() == Some(&'\'') => {
                        tok.push('\\');
                        tok.push('\'');
                        chars.next();
                    }
                    Some('\'') => {
                        tok.push('\'');
                        break;
                    }
                    Some(ch) => tok.push(ch),
                    None => {
                        return Err(NeoSearchError::Protocol(
                            "unterminated string literal".to_string(),
                        ))
                    }
                }
            }
            tokens.push(tok);
        } else {
            let mut tok = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                tok.push(ch);
                chars.next();
            }
            tokens.push(tok);
        }
    }

    Ok(tokens)
}

impl FromStr for Command {
    type Err = NeoSearchError;

    /// Parses the canonical textual form of a single command:
    /// `USING <index>.<database> <OP> [<typed-key>] [<typed-value>];`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_end_matches(';').trim();
        let rest = s
            .strip_prefix("USING ")
            .ok_or_else(|| NeoSearchError::Protocol(format!("expected USING: {s}")))?;

        let (target, rest) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| NeoSearchError::Protocol(format!("malformed statement: {s}")))?;

        let (index, database) = target
            .split_once('.')
            .ok_or_else(|| NeoSearchError::Protocol(format!("malformed target: {target}")))?;

        let rest = rest.trim();
        let (op_tok, args) = match rest.split_once(char::is_whitespace) {
            Some((op, args)) => (op, args),
            None => (rest, ""),
        };
        let op = Op::from_str(op_tok)?;
        let tokens = tokenize_args(args)?;

        let (key, key_type, value, value_type) = match op {
            Op::Batch | Op::FlushBatch => (None, TypeTag::Nil, None, TypeTag::Nil),
            Op::Get | Op::Delete => {
                let tok = tokens
                    .first()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("missing key: {s}")))?;
                let (bytes, ty) = parse_literal(tok)?;
                (Some(bytes), ty, None, TypeTag::Nil)
            }
            Op::Set | Op::MergeSet => {
                let key_tok = tokens
                    .first()
                    .ok_or_else(|| NeoSearchError::Protocol(format!("missing key: {s}")))?;
                let val_tok = tokens
                    .get(1)
                    .ok_or_else(|| NeoSearchError::Protocol(format!("missing value: {s}")))?;
                let (kbytes, kty) = parse_literal(key_tok)?;
                let (vbytes, vty) = parse_literal(val_tok)?;
                (Some(kbytes), kty, Some(vbytes), vty)
            }
        };

        Ok(Command {
            index: index.to_string(),
            database: database.to_string(),
            op,
            key,
            key_type,
            value,
            value_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_set() {
        let cmd = Command::set(
            "t1",
            "document.db",
            codec::encode_u64(42).to_vec(),
            TypeTag::Uint,
            b"hello".to_vec(),
            TypeTag::String,
        );
        let text = cmd.to_string();
        assert_eq!(text, "USING t1.document.db SET uint(42) 'hello';");
        let parsed: Command = text.parse().unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn round_trips_mergeset_and_batch() {
        let cmd = Command::merge_set(
            "t1",
            "name_string.idx",
            b"neoway".to_vec(),
            TypeTag::String,
            codec::encode_u64(7).to_vec(),
        );
        let parsed: Command = cmd.to_string().parse().unwrap();
        assert_eq!(parsed, cmd);

        let batch = Command::batch("t1", "document.db");
        assert_eq!(batch.to_string(), "USING t1.document.db BATCH;");
        let parsed_batch: Command = batch.to_string().parse().unwrap();
        assert_eq!(parsed_batch, batch);
    }

    #[test]
    fn escapes_single_quotes_in_strings() {
        let cmd = Command::set(
            "t1",
            "document.db",
            codec::encode_u64(1).to_vec(),
            TypeTag::Uint,
            b"it's".to_vec(),
            TypeTag::String,
        );
        let text = cmd.to_string();
        assert!(text.contains("it\\'s"));
        let parsed: Command = text.parse().unwrap();
        assert_eq!(parsed.value.unwrap(), b"it's");
    }

    #[test]
    fn round_trips_bool_and_date_typed_values() {
        let bool_cmd = Command::set(
            "t1",
            "active_bool.idx",
            codec::encode_bool(true).to_vec(),
            TypeTag::Bool,
            codec::encode_bool(false).to_vec(),
            TypeTag::Bool,
        );
        let parsed: Command = bool_cmd.to_string().parse().unwrap();
        assert_eq!(parsed, bool_cmd);

        let date_cmd = Command::merge_set(
            "t1",
            "created_at_date.idx",
            codec::encode_i64(1_700_000_000).to_vec(),
            TypeTag::Date,
            codec::encode_u64(3).to_vec(),
        );
        let parsed: Command = date_cmd.to_string().parse().unwrap();
        assert_eq!(parsed, date_cmd);
    }

    #[test]
    fn rejects_malformed_program() {
        assert!("NOT A COMMAND".parse::<Command>().is_err());
        assert!("USING t1.db BOGUSOP;".parse::<Command>().is_err());
    }
}
