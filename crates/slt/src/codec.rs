//! Wire message shapes and the compression framing layered over an
//! [`crate::expression::Expression`]'s raw element/data arrays.
//!
//! `ExpressionMessage` is the serializable form exchanged between
//! processes; [`encode`]/[`decode`] apply the string-mode and generic
//! deflate options from [`crate::config`] on top of the typed arrays
//! [`crate::expression::Expression`] itself produces.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{Result, SltError};
use crate::expression::Expression;

/// Compression/framing tag carried on an [`ExpressionMessage`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None = 0,
    Zlib = 1,
    Str = 2,
    StrZlib = 3,
}

impl Compression {
    const fn is_zlib(self) -> bool {
        matches!(self, Self::Zlib | Self::StrZlib)
    }

    const fn is_string(self) -> bool {
        matches!(self, Self::Str | Self::StrZlib)
    }

    const fn with_zlib(self) -> Self {
        match self {
            Self::None => Self::Zlib,
            Self::Str => Self::StrZlib,
            other => other,
        }
    }
}

/// The wire form of an [`Expression`]: `{elements, data, compression,
/// elements_size, data_size}`. `elements_size`/`data_size` record the
/// pre-compression lengths so a decoder can size its deflate output
/// buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionMessage {
    pub elements: Vec<u8>,
    pub data: Vec<u8>,
    pub compression: Compression,
    pub elements_size: u32,
    pub data_size: u32,
}

/// Serializes `expr` to its wire form under the process-wide [`config::Config`].
#[must_use]
pub fn encode(expr: &mut Expression) -> ExpressionMessage {
    let cfg = config::config();

    let (mut elements, mut data, mut compression) = if cfg.msg_str {
        (Vec::new(), expr.to_string_form().into_bytes(), Compression::Str)
    } else {
        let (elements, data) = expr.to_raw_arrays();
        (elements, data, Compression::None)
    };

    let elements_size = elements.len() as u32;
    let data_size = data.len() as u32;

    if cfg.zlib_enable && elements.len().max(data.len()) > cfg.zlib_threshold {
        elements = zlib_compress(&elements, cfg.zlib_level);
        data = zlib_compress(&data, cfg.zlib_level);
        compression = compression.with_zlib();
    }

    ExpressionMessage { elements, data, compression, elements_size, data_size }
}

/// Reconstructs a (still-packed) [`Expression`] from its wire form.
///
/// # Errors
/// Returns [`SltError::Schema`] if zlib decompression fails or the decoded
/// bytes are not valid UTF-8 in string mode.
pub fn decode(msg: &ExpressionMessage) -> Result<Expression> {
    let (elements, data) = if msg.compression.is_zlib() {
        (
            zlib_decompress(&msg.elements, msg.elements_size as usize)?,
            zlib_decompress(&msg.data, msg.data_size as usize)?,
        )
    } else {
        (msg.elements.clone(), msg.data.clone())
    };

    if msg.compression.is_string() {
        let text = String::from_utf8(data).map_err(|e| SltError::Schema(e.to_string()))?;
        Ok(Expression::from_string(text))
    } else {
        Ok(Expression::from_raw_arrays(elements, data))
    }
}

fn zlib_compress(bytes: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level.clamp(1, 9)));
    encoder.write_all(bytes).expect("writing to an in-memory buffer cannot fail");
    encoder.finish().expect("finishing an in-memory buffer cannot fail")
}

fn zlib_decompress(bytes: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::with_capacity(expected_size);
    decoder.read_to_end(&mut out).map_err(|e| SltError::Schema(e.to_string()))?;
    Ok(out)
}

/// A single node in the provenance tree's linearized wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationMessage {
    pub id: i32,
    /// Index into the owning `LocationHeaderMessage.nodes` table.
    pub node: u32,
    pub name: String,
    pub expr: ExpressionMessage,
}

/// Flat encoding of a provenance tree: a deduplicated node-name table, a
/// flat location list (index 0 is the root), and an edge list of
/// interleaved `(parent_index, child_index)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationHeaderMessage {
    pub nodes: Vec<String>,
    pub locations: Vec<LocationMessage>,
    pub graph: Vec<u32>,
}

/// `{node_name, location_id, value}` — a peer's request to substitute a new
/// value at the next read of the named source location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetValueMessage {
    pub node: String,
    pub location: i32,
    pub value: String,
}

impl SetValueMessage {
    /// Serializes this record to the compact binary form a real pub/sub
    /// transport would put on the `/slt_set` topic (§6). The in-memory
    /// transport used by this crate's tests delivers the struct directly
    /// and has no use for these bytes; a production transport would call
    /// `dump`/`load` at its publish/subscribe boundary instead.
    ///
    /// # Errors
    /// Returns the underlying `postcard` error if serialization fails.
    pub fn dump(&self) -> std::result::Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes a record produced by [`SetValueMessage::dump`].
    ///
    /// # Errors
    /// Returns the underlying `postcard` error if `bytes` is malformed.
    pub fn load(bytes: &[u8]) -> std::result::Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// `GetValue` service request: the id of the location being queried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetValueRequest {
    pub location: i32,
}

impl GetValueRequest {
    /// # Errors
    /// Returns the underlying `postcard` error if serialization fails.
    pub fn dump(&self) -> std::result::Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// # Errors
    /// Returns the underlying `postcard` error if `bytes` is malformed.
    pub fn load(bytes: &[u8]) -> std::result::Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// `GetValue` service response: the current value (stringified) and
/// whether `location` was a registered id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetValueResponse {
    pub value: String,
    pub valid: bool,
}

impl GetValueResponse {
    /// # Errors
    /// Returns the underlying `postcard` error if serialization fails.
    pub fn dump(&self) -> std::result::Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// # Errors
    /// Returns the underlying `postcard` error if `bytes` is malformed.
    pub fn load(bytes: &[u8]) -> std::result::Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{with_config, Config};
    use crate::operator::Operator;
    use crate::value::Scalar;

    #[test]
    fn typed_round_trip_without_compression() {
        with_config(Config { zlib_enable: false, ..Config::default() }, || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(3), false, Operator::Add);
            let msg = encode(&mut expr);
            assert_eq!(msg.compression, Compression::None);
            let mut decoded = decode(&msg).unwrap();
            assert_eq!(decoded.apply(Scalar::Int32(1)).unwrap(), expr.apply(Scalar::Int32(1)).unwrap());
        });
    }

    #[test]
    fn large_expression_round_trips_through_zlib() {
        with_config(Config { zlib_enable: true, zlib_threshold: 0, zlib_level: 1, ..Config::default() }, || {
            let mut expr = Expression::new();
            for i in 0..10_000 {
                expr.append(Scalar::Int32(i % 7), false, Operator::Add);
            }
            let msg = encode(&mut expr);
            assert!(msg.compression.is_zlib());
            let mut decoded = decode(&msg).unwrap();
            assert_eq!(decoded.apply(Scalar::Int32(0)).unwrap(), expr.apply(Scalar::Int32(0)).unwrap());
        });
    }

    #[test]
    fn string_message_mode_round_trips() {
        with_config(Config { msg_str: true, zlib_enable: false, ..Config::default() }, || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(2), false, Operator::Mul);
            let msg = encode(&mut expr);
            assert_eq!(msg.compression, Compression::Str);
            let mut decoded = decode(&msg).unwrap();
            assert_eq!(decoded.apply(Scalar::Int32(5)).unwrap(), expr.apply(Scalar::Int32(5)).unwrap());
        });
    }

    #[test]
    fn set_value_message_round_trips_through_binary_bytes() {
        let msg = SetValueMessage { node: "proc".to_owned(), location: 4, value: "11".to_owned() };
        let bytes = msg.dump().unwrap();
        let decoded = SetValueMessage::load(&bytes).unwrap();
        assert_eq!(decoded.node, msg.node);
        assert_eq!(decoded.location, msg.location);
        assert_eq!(decoded.value, msg.value);
    }

    #[test]
    fn get_value_response_round_trips_through_binary_bytes() {
        let msg = GetValueResponse { value: "7".to_owned(), valid: true };
        let bytes = msg.dump().unwrap();
        let decoded = GetValueResponse::load(&bytes).unwrap();
        assert_eq!(decoded.value, msg.value);
        assert_eq!(decoded.valid, msg.valid);
    }
}
