//! Compressors and the process-wide registry that resolves them by name.
//!
//! A compressor is a pure pair of byte transforms with an options blob it
//! interprets itself. Chunk payloads are exactly the compressor output over
//! the raw chunk bytes: no framing, length prefix, or checksum is added.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock, RwLock},
};

use serde_json::Value;

#[cfg(feature = "blosc")]
pub mod blosc;
#[cfg(feature = "gzip")]
pub mod gzip;
#[cfg(feature = "zlib")]
pub mod zlib;

/// The reserved identity compressor name, spelled `null` in `.zarray` JSON.
pub const NONE_NAME: &str = "none";

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("unknown compressor `{0}`")]
    UnknownCompressor(String),
    #[error("invalid compressor options: {0}")]
    InvalidOpts(String),
    #[error("compression failed: {0}")]
    Encode(String),
    #[error("decompression failed: {0}")]
    Decode(String),
    #[error("decoded chunk has {actual} bytes, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("compressor name `{0}` is reserved")]
    ReservedName(String),
}

/// An opaque `bytes -> bytes` codec pair with a stable binary contract.
pub trait Compressor: Send + Sync {
    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decode `encoded`, checking the result against the raw chunk length
    /// known to the caller.
    fn decode(&self, encoded: &[u8], raw_len: usize) -> Result<Vec<u8>, CodecError>;
}

/// Validates an options blob and produces a configured compressor.
pub type CompressorBuilder = fn(&Value) -> Result<Arc<dyn Compressor>, CodecError>;

fn registry() -> &'static RwLock<HashMap<String, CompressorBuilder>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, CompressorBuilder>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, CompressorBuilder> = HashMap::new();
        #[cfg(feature = "zlib")]
        map.insert("zlib".to_owned(), zlib::build);
        #[cfg(feature = "gzip")]
        map.insert("gzip".to_owned(), gzip::build);
        #[cfg(feature = "blosc")]
        map.insert("blosc".to_owned(), blosc::build);
        RwLock::new(map)
    })
}

/// Register a compressor under `name`, replacing any previous registration.
///
/// The identity name is reserved; everything else is first come, last served.
pub fn register_compressor(name: &str, builder: CompressorBuilder) -> Result<(), CodecError> {
    if name == NONE_NAME {
        return Err(CodecError::ReservedName(name.to_owned()));
    }
    let mut map = registry().write().unwrap_or_else(|e| e.into_inner());
    map.insert(name.to_owned(), builder);
    Ok(())
}

/// Resolve `name` and validate `opts`, yielding a ready compressor.
pub fn build_compressor(name: &str, opts: &Value) -> Result<Arc<dyn Compressor>, CodecError> {
    let builder = {
        let map = registry().read().unwrap_or_else(|e| e.into_inner());
        map.get(name)
            .copied()
            .ok_or_else(|| CodecError::UnknownCompressor(name.to_owned()))?
    };
    builder(opts)
}

/// Shared opts convention for the deflate-family codecs: `null` for the
/// default level, or a bare integer level 0-9.
#[cfg(feature = "flate2")]
fn level_from_opts(opts: &Value, default: u32) -> Result<u32, CodecError> {
    match opts {
        Value::Null => Ok(default),
        Value::Number(n) => match n.as_u64() {
            Some(level) if level <= 9 => Ok(level as u32),
            _ => Err(CodecError::InvalidOpts(format!(
                "compression level must be an integer 0-9, got {n}"
            ))),
        },
        other => Err(CodecError::InvalidOpts(format!(
            "expected null or an integer level, got {other}"
        ))),
    }
}
