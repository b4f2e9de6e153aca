use crate::error::{PackError, Result, Stage};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

/// ZIP compression method id for deflate.
pub const METHOD_DEFLATE: u16 = 8;

/// Raw deflate (RFC 1951), no zlib or gzip framing.
pub fn deflate(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut enc = DeflateEncoder::new(Vec::with_capacity(bytes.len() / 2 + 16), Compression::default());
    enc.write_all(bytes).map_err(|e| PackError::io(Stage::Compression, "<memory>", e))?;
    enc.finish().map_err(|e| PackError::io(Stage::Compression, "<memory>", e))
}
