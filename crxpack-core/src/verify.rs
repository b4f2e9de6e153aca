use crate::archive::{read_central_directory, LocalFileHeader, END_RECORD_LEN};
use crate::container::Container;
use crate::error::{PackError, Result, Stage};
use crate::keys::{extension_id, verify_signature};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct VerifyEntry {
    pub name: String,
    pub offset: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub header_length: u32,
    pub public_key_len: usize,
    pub signature_len: usize,
    pub archive_len: usize,
    pub extension_id: String,
    pub signature_ok: bool,
    pub entries: Vec<VerifyEntry>,
    /// First structural problem found in the archive section, if any.
    pub structure_error: Option<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.signature_ok && self.structure_error.is_none()
    }
}

pub fn verify_container(path: &Path) -> Result<VerifyReport> {
    let bytes = std::fs::read(path).map_err(|e| PackError::io(Stage::Read, path, e))?;
    verify_bytes(&bytes)
}

/// Check header arithmetic, signature, and archive layout of a container.
///
/// A malformed header is an error; a bad signature or a broken archive is
/// reported, not raised.
pub fn verify_bytes(bytes: &[u8]) -> Result<VerifyReport> {
    let c = Container::parse(bytes)?;
    let signature_ok = verify_signature(c.public_key, c.archive, c.signature)?;
    let (entries, structure_error) = match check_structure(c.archive) {
        Ok(entries) => (entries, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };
    Ok(VerifyReport {
        header_length: c.header_length,
        public_key_len: c.public_key.len(),
        signature_len: c.signature.len(),
        archive_len: c.archive.len(),
        extension_id: extension_id(c.public_key),
        signature_ok,
        entries,
        structure_error,
    })
}

/// Walk the central directory and confirm every local header sits exactly
/// where the directory says, with no gaps before the directory.
fn check_structure(archive: &[u8]) -> Result<Vec<VerifyEntry>> {
    let cd = read_central_directory(archive)?;
    let mut expected_off = 0usize;
    let mut out = Vec::with_capacity(cd.records.len());
    for rec in &cd.records {
        let off = rec.local_header_offset.get() as usize;
        if off != expected_off {
            return Err(PackError::MalformedContainer(format!(
                "{}: local header at {off}, expected {expected_off}",
                rec.name
            )));
        }
        let local = LocalFileHeader::parse(archive, off)?;
        if local.name != rec.name
            || local.crc32 != rec.crc32
            || local.compressed_size != rec.compressed_size
            || local.uncompressed_size != rec.uncompressed_size
            || local.method != rec.method
        {
            return Err(PackError::MalformedContainer(format!(
                "{}: local header disagrees with central directory",
                rec.name
            )));
        }
        expected_off = off + local.encoded_len() + rec.compressed_size.get() as usize;
        out.push(VerifyEntry {
            name: rec.name.clone(),
            offset: rec.local_header_offset.get(),
            compressed_size: rec.compressed_size.get(),
            uncompressed_size: rec.uncompressed_size.get(),
            crc32: rec.crc32,
        });
    }
    let cd_off = cd.end.central_directory_offset.get() as usize;
    if cd_off != expected_off {
        return Err(PackError::MalformedContainer(format!(
            "central directory at {cd_off}, local entries end at {expected_off}"
        )));
    }
    debug_assert!(cd_off + cd.end.central_directory_size.get() as usize + END_RECORD_LEN == archive.len());
    Ok(out)
}
