use std::sync::Arc;

use blosc::{decompress_bytes, Clevel, Compressor as Cname, Context, ShuffleMode};
use serde::Deserialize;
use serde_json::Value;

use super::{CodecError, Compressor};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct BloscOpts {
    cname: String,
    clevel: u8,
    shuffle: u8,
    #[serde(default)]
    blocksize: usize,
}

/// Blosc meta-compressor; the payload is the self-describing blosc frame.
pub struct BloscCodec {
    cname: Cname,
    clevel: Clevel,
    shuffle: ShuffleMode,
    blocksize: usize,
}

fn cname_from_str(s: &str) -> Result<Cname, CodecError> {
    match s {
        "blosclz" => Ok(Cname::BloscLZ),
        "lz4" => Ok(Cname::LZ4),
        "lz4hc" => Ok(Cname::LZ4HC),
        "snappy" => Ok(Cname::Snappy),
        "zlib" => Ok(Cname::Zlib),
        "zstd" => Ok(Cname::Zstd),
        other => Err(CodecError::InvalidOpts(format!("unknown cname `{other}`"))),
    }
}

fn clevel_from_int(level: u8) -> Result<Clevel, CodecError> {
    match level {
        0 => Ok(Clevel::None),
        1 => Ok(Clevel::L1),
        2 => Ok(Clevel::L2),
        3 => Ok(Clevel::L3),
        4 => Ok(Clevel::L4),
        5 => Ok(Clevel::L5),
        6 => Ok(Clevel::L6),
        7 => Ok(Clevel::L7),
        8 => Ok(Clevel::L8),
        9 => Ok(Clevel::L9),
        other => Err(CodecError::InvalidOpts(format!(
            "clevel must be 0-9, got {other}"
        ))),
    }
}

fn shuffle_from_int(shuffle: u8) -> Result<ShuffleMode, CodecError> {
    match shuffle {
        0 => Ok(ShuffleMode::None),
        1 => Ok(ShuffleMode::Byte),
        2 => Ok(ShuffleMode::Bit),
        other => Err(CodecError::InvalidOpts(format!(
            "shuffle must be 0, 1 or 2, got {other}"
        ))),
    }
}

pub(super) fn build(opts: &Value) -> Result<Arc<dyn Compressor>, CodecError> {
    let opts: BloscOpts = serde_json::from_value(opts.clone())
        .map_err(|e| CodecError::InvalidOpts(e.to_string()))?;
    let codec = BloscCodec {
        cname: cname_from_str(&opts.cname)?,
        clevel: clevel_from_int(opts.clevel)?,
        shuffle: shuffle_from_int(opts.shuffle)?,
        blocksize: opts.blocksize,
    };
    // fail at open time, not on the first chunk, if the cname is not
    // compiled into the linked blosc
    codec.context()?;
    Ok(Arc::new(codec))
}

impl BloscCodec {
    fn context(&self) -> Result<Context, CodecError> {
        let ctx = Context::new()
            .compressor(self.cname)
            .map_err(|_| {
                CodecError::InvalidOpts("cname not supported by the linked blosc".to_owned())
            })?
            .clevel(self.clevel)
            .shuffle(self.shuffle)
            .blocksize(if self.blocksize == 0 {
                None
            } else {
                Some(self.blocksize)
            });
        Ok(ctx)
    }
}

impl Compressor for BloscCodec {
    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        let compressed: Vec<u8> = self.context()?.compress(raw).into();
        Ok(compressed)
    }

    fn decode(&self, encoded: &[u8], raw_len: usize) -> Result<Vec<u8>, CodecError> {
        // Decoding bytes into bytes, so the type punning inside
        // decompress_bytes cannot misalign; the input is still untrusted.
        let out: Vec<u8> = unsafe { decompress_bytes(encoded) }
            .map_err(|_| CodecError::Decode("blosc frame is corrupt".to_owned()))?;
        if out.len() != raw_len {
            return Err(CodecError::WrongLength {
                expected: raw_len,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}
