//! Big-endian fixed-width encoding for the scalar types the indexing
//! pipeline stores, plus packing/unpacking of posting lists.
//!
//! Byte order equals numeric order for `u64` keys, which is the property
//! the iterator-based range scans in [`crate::query`] rely on. For
//! `i64`/`f64` this only holds for non-negative values — see the caveat on
//! [`encode_i64`]/[`encode_f64`].

use crate::error::{NeoSearchError, Result};

/// Encodes `x` as 8 big-endian bytes. `decode_u64` is its inverse, and for
/// every `a < b`, `encode_u64(a) < encode_u64(b)` bytewise.
pub fn encode_u64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

/// Decodes 8 big-endian bytes produced by [`encode_u64`].
pub fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| NeoSearchError::Codec(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

/// Encodes `x` as 8 big-endian bytes (two's complement).
///
/// Caveat: byte order equals signed numeric order only when callers
/// restrict the domain to non-negative values. Negative `i64`s have their
/// sign bit set, which sorts them *after* all non-negative values under
/// plain bytewise comparison; see DESIGN.md for the rationale behind
/// leaving this undoctored rather than flipping the sign bit.
pub fn encode_i64(x: i64) -> [u8; 8] {
    x.to_be_bytes()
}

/// Decodes 8 big-endian bytes produced by [`encode_i64`].
pub fn decode_i64(bytes: &[u8]) -> Result<i64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| NeoSearchError::Codec(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(i64::from_be_bytes(arr))
}

/// Encodes `x` as 8 big-endian IEEE-754 bytes.
///
/// Same caveat as [`encode_i64`]: byte order equals numeric order only
/// for non-negative values.
pub fn encode_f64(x: f64) -> [u8; 8] {
    x.to_bits().to_be_bytes()
}

/// Decodes 8 big-endian IEEE-754 bytes produced by [`encode_f64`].
pub fn decode_f64(bytes: &[u8]) -> Result<f64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| NeoSearchError::Codec(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(f64::from_bits(u64::from_be_bytes(arr)))
}

/// Encodes a bool as a single byte, `{0x00, 0x01}`.
pub fn encode_bool(x: bool) -> [u8; 1] {
    [x as u8]
}

/// Decodes a single byte produced by [`encode_bool`].
pub fn decode_bool(bytes: &[u8]) -> Result<bool> {
    match bytes {
        [0x00] => Ok(false),
        [0x01] => Ok(true),
        _ => Err(NeoSearchError::Codec(format!(
            "invalid bool encoding: {bytes:?}"
        ))),
    }
}

/// Packs a strictly ascending, duplicate-free slice of `u64`s into the
/// posting-list wire format: concatenated 8-byte big-endian values.
///
/// Does not itself sort or dedup — callers (the `merge_set` read-modify-
/// write path) are responsible for the ordering invariant.
pub fn pack_posting(ids: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ids.len() * 8);
    for id in ids {
        buf.extend_from_slice(&encode_u64(*id));
    }
    buf
}

/// Unpacks a posting-list value into its `u64` ids.
///
/// Returns [`NeoSearchError::Codec`] if `bytes.len()` isn't a multiple of
/// 8.
pub fn unpack_posting(bytes: &[u8]) -> Result<Vec<u64>> {
    if bytes.len() % 8 != 0 {
        return Err(NeoSearchError::Codec(format!(
            "posting list length {} is not a multiple of 8",
            bytes.len()
        )));
    }

    bytes.chunks_exact(8).map(decode_u64).collect()
}
