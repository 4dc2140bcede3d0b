use std::io::{Read, Write};
use std::sync::Arc;

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde_json::Value;

use super::{level_from_opts, CodecError, Compressor};

const DEFAULT_LEVEL: u32 = 1;

/// Gzip (RFC 1952) framed deflate over whole chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipCodec {
    level: u32,
}

impl GzipCodec {
    pub fn new(level: u32) -> Result<Self, CodecError> {
        if level > 9 {
            return Err(CodecError::InvalidOpts(format!(
                "gzip level must be 0-9, got {level}"
            )));
        }
        Ok(Self { level })
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
        }
    }
}

pub(super) fn build(opts: &Value) -> Result<Arc<dyn Compressor>, CodecError> {
    let level = level_from_opts(opts, DEFAULT_LEVEL)?;
    Ok(Arc::new(GzipCodec::new(level)?))
}

impl Compressor for GzipCodec {
    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(raw)
            .and_then(|()| encoder.finish())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, encoded: &[u8], raw_len: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(raw_len);
        GzDecoder::new(encoded)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        if out.len() != raw_len {
            return Err(CodecError::WrongLength {
                expected: raw_len,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}
