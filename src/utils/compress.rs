//! Pluggable stream compression for wire messages

use std::io::{self, Read, Write};

use brotli::{CompressorWriter, Decompressor};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("compression failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(String),

    #[error("decompressed output exceeds {limit} bytes")]
    OutputTooLarge { limit: usize },
}

pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError>;

    /// Reverse `compress`, refusing to produce more than `limit` bytes
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, DecompressError>;

    fn name(&self) -> &'static str;
}

/// Compression algorithms available to the sender and receiver.
///
/// `Deflate` is raw RFC 1951 DEFLATE, the stream Apple's `COMPRESSION_ZLIB`
/// produces, and is the default so iOS senders interoperate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Compression {
    Deflate { level: u32 },
    Zlib { level: u32 },
    Brotli { quality: u32, window: u32 },
    Identity,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Deflate { level: 6 }
    }
}

impl Compressor for Compression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressError> {
        match *self {
            Compression::Deflate { level } => {
                let mut encoder =
                    DeflateEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Compression::Zlib { level } => {
                let mut encoder =
                    ZlibEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Compression::Brotli { quality, window } => {
                let mut compressed = Vec::new();
                {
                    let mut compressor =
                        CompressorWriter::new(&mut compressed, 4096, quality.min(11), window.clamp(10, 24));
                    compressor.write_all(data)?;
                }
                Ok(compressed)
            }
            Compression::Identity => Ok(data.to_vec()),
        }
    }

    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, DecompressError> {
        match *self {
            Compression::Deflate { .. } => read_bounded(DeflateDecoder::new(data), limit),
            Compression::Zlib { .. } => read_bounded(ZlibDecoder::new(data), limit),
            Compression::Brotli { .. } => read_bounded(Decompressor::new(data, 4096), limit),
            Compression::Identity => {
                if data.len() > limit {
                    return Err(DecompressError::OutputTooLarge { limit });
                }
                Ok(data.to_vec())
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Compression::Deflate { .. } => "deflate",
            Compression::Zlib { .. } => "zlib",
            Compression::Brotli { .. } => "brotli",
            Compression::Identity => "identity",
        }
    }
}

fn read_bounded<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, DecompressError> {
    let mut out = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| DecompressError::CorruptStream(e.to_string()))?;
    if out.len() > limit {
        return Err(DecompressError::OutputTooLarge { limit });
    }
    Ok(out)
}
