//! Byte-exact ZIP writer for flat, deflate-only archives.
//!
//! Every record is a structured value whose size fields were checked against
//! the 16/32-bit widths of the format when it was built, so serialization can
//! never truncate. No ZIP64, no data descriptors, no directory entries, no
//! timestamps (all time/date fields are zero).

use crate::checksum::crc32;
use crate::compress::{self, METHOD_DEFLATE};
use crate::error::{PackError, Result};
use crate::path_safety::validate_entry_name;
use tracing::debug;

pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
pub const CENTRAL_DIRECTORY_SIG: u32 = 0x0201_4b50;
pub const END_OF_CENTRAL_DIRECTORY_SIG: u32 = 0x0605_4b50;

/// Fixed portion of a local file header (name follows).
pub const LOCAL_HEADER_LEN: usize = 30;
/// Fixed portion of a central-directory record (name follows).
pub const CENTRAL_RECORD_LEN: usize = 46;
/// End-of-central-directory record without comment.
pub const END_RECORD_LEN: usize = 22;

/// "Version made by" and "version needed to extract": 2.0, MS-DOS host.
pub const ZIP_VERSION: u16 = 20;

/// A length or offset proven to fit a 32-bit ZIP field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Len32(u32);

impl Len32 {
    pub fn new(field: &'static str, n: usize) -> Result<Self> {
        u32::try_from(n).map(Len32).map_err(|_| PackError::FormatOverflow {
            field,
            value: n as u64,
            max: u32::MAX as u64,
        })
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for Len32 {
    fn from(v: u32) -> Self {
        Len32(v)
    }
}

fn checked_u16(field: &'static str, n: usize) -> Result<u16> {
    u16::try_from(n).map_err(|_| PackError::FormatOverflow {
        field,
        value: n as u64,
        max: u16::MAX as u64,
    })
}

/// One input file: archive-relative name plus raw contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }
}

/// Metadata of an entry as written to the archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub crc32: u32,
    pub compressed_size: Len32,
    pub uncompressed_size: Len32,
    pub local_header_offset: Len32,
}

impl ArchiveEntry {
    /// Bytes occupied by the local header, name and payload.
    pub fn local_len(&self) -> usize {
        LOCAL_HEADER_LEN + self.name.len() + self.compressed_size.get() as usize
    }

    fn local_header(&self) -> LocalFileHeader {
        LocalFileHeader {
            method: METHOD_DEFLATE,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            name: self.name.clone(),
        }
    }

    fn central_record(&self) -> CentralDirectoryRecord {
        CentralDirectoryRecord {
            method: METHOD_DEFLATE,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            local_header_offset: self.local_header_offset,
            name: self.name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: Len32,
    pub uncompressed_size: Len32,
    pub name: String,
}

impl LocalFileHeader {
    pub fn encoded_len(&self) -> usize {
        LOCAL_HEADER_LEN + self.name.len()
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let name_len = checked_u16("file name length", self.name.len())?;
        out.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&ZIP_VERSION.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&self.method.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // mod date
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.get().to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.get().to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        out.extend_from_slice(self.name.as_bytes());
        Ok(())
    }

    /// Parse the local header starting at `offset` in `archive`.
    pub fn parse(archive: &[u8], offset: usize) -> Result<Self> {
        let fixed = slice(archive, offset, LOCAL_HEADER_LEN, "local header")?;
        if le_u32(fixed, 0) != LOCAL_FILE_HEADER_SIG {
            return Err(malformed(format!("no local header signature at offset {offset}")));
        }
        let name_len = le_u16(fixed, 26) as usize;
        let extra_len = le_u16(fixed, 28) as usize;
        if extra_len != 0 {
            return Err(malformed(format!("unexpected extra field at offset {offset}")));
        }
        let name = slice(archive, offset + LOCAL_HEADER_LEN, name_len, "local header name")?;
        Ok(Self {
            method: le_u16(fixed, 8),
            crc32: le_u32(fixed, 14),
            compressed_size: le_u32(fixed, 18).into(),
            uncompressed_size: le_u32(fixed, 22).into(),
            name: decode_name(name)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CentralDirectoryRecord {
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: Len32,
    pub uncompressed_size: Len32,
    pub local_header_offset: Len32,
    pub name: String,
}

impl CentralDirectoryRecord {
    pub fn encoded_len(&self) -> usize {
        CENTRAL_RECORD_LEN + self.name.len()
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let name_len = checked_u16("file name length", self.name.len())?;
        out.extend_from_slice(&CENTRAL_DIRECTORY_SIG.to_le_bytes());
        out.extend_from_slice(&ZIP_VERSION.to_le_bytes()); // made by
        out.extend_from_slice(&ZIP_VERSION.to_le_bytes()); // needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&self.method.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // mod date
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.get().to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.get().to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        out.extend_from_slice(&0u16.to_le_bytes()); // comment len
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&self.local_header_offset.get().to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        Ok(())
    }

    fn parse(archive: &[u8], offset: usize) -> Result<Self> {
        let fixed = slice(archive, offset, CENTRAL_RECORD_LEN, "central directory record")?;
        if le_u32(fixed, 0) != CENTRAL_DIRECTORY_SIG {
            return Err(malformed(format!("no central directory signature at offset {offset}")));
        }
        let name_len = le_u16(fixed, 28) as usize;
        if le_u16(fixed, 30) != 0 || le_u16(fixed, 32) != 0 {
            return Err(malformed(format!("unexpected extra/comment field at offset {offset}")));
        }
        let name = slice(archive, offset + CENTRAL_RECORD_LEN, name_len, "central directory name")?;
        Ok(Self {
            method: le_u16(fixed, 10),
            crc32: le_u32(fixed, 16),
            compressed_size: le_u32(fixed, 20).into(),
            uncompressed_size: le_u32(fixed, 24).into(),
            local_header_offset: le_u32(fixed, 42).into(),
            name: decode_name(name)?,
        })
    }
}

/// Single-volume end record: both entry counts are always equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub entries_on_disk: u16,
    pub entries_total: u16,
    pub central_directory_size: Len32,
    pub central_directory_offset: Len32,
}

impl EndOfCentralDirectory {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIG.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // this disk
        out.extend_from_slice(&0u16.to_le_bytes()); // disk with central directory
        out.extend_from_slice(&self.entries_on_disk.to_le_bytes());
        out.extend_from_slice(&self.entries_total.to_le_bytes());
        out.extend_from_slice(&self.central_directory_size.get().to_le_bytes());
        out.extend_from_slice(&self.central_directory_offset.get().to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment len
    }

    /// Parse the end record from the last 22 bytes of `archive`.
    pub fn parse(archive: &[u8]) -> Result<Self> {
        if archive.len() < END_RECORD_LEN {
            return Err(malformed(format!("archive too short ({} bytes)", archive.len())));
        }
        let at = archive.len() - END_RECORD_LEN;
        let rec = &archive[at..];
        if le_u32(rec, 0) != END_OF_CENTRAL_DIRECTORY_SIG {
            return Err(malformed("no end-of-central-directory record at end of archive".into()));
        }
        if le_u16(rec, 4) != 0 || le_u16(rec, 6) != 0 {
            return Err(malformed("multi-volume archives are not supported".into()));
        }
        if le_u16(rec, 20) != 0 {
            return Err(malformed("archive comment is not supported".into()));
        }
        Ok(Self {
            entries_on_disk: le_u16(rec, 8),
            entries_total: le_u16(rec, 10),
            central_directory_size: le_u32(rec, 12).into(),
            central_directory_offset: le_u32(rec, 16).into(),
        })
    }
}

/// A fully assembled archive: entry metadata, end record, and the bytes.
#[derive(Clone, Debug)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
    end: EndOfCentralDirectory,
    bytes: Vec<u8>,
}

impl Archive {
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn end_record(&self) -> &EndOfCentralDirectory {
        &self.end
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Build a deflate ZIP from `files`, in order.
///
/// Layout is local header + name + payload per file, then one central record
/// per file, then the end record. An empty list yields a bare end record.
pub fn build_archive(files: &[SourceFile]) -> Result<Archive> {
    let count = checked_u16("entry count", files.len())?;
    let mut out: Vec<u8> = Vec::new();
    let mut entries = Vec::with_capacity(files.len());

    for file in files {
        validate_entry_name(&file.name)?;
        let compressed = compress::deflate(&file.bytes)?;
        let entry = ArchiveEntry {
            name: file.name.clone(),
            crc32: crc32(&file.bytes),
            compressed_size: Len32::new("compressed size", compressed.len())?,
            uncompressed_size: Len32::new("uncompressed size", file.bytes.len())?,
            local_header_offset: Len32::new("local header offset", out.len())?,
        };
        entry.local_header().write_to(&mut out)?;
        out.extend_from_slice(&compressed);
        debug!(
            name = %entry.name,
            offset = entry.local_header_offset.get(),
            raw = file.bytes.len(),
            deflated = compressed.len(),
            "archived entry"
        );
        entries.push(entry);
    }

    let cd_start = out.len();
    let central_directory_offset = Len32::new("central directory offset", cd_start)?;
    for entry in &entries {
        entry.central_record().write_to(&mut out)?;
    }
    let central_directory_size = Len32::new("central directory size", out.len() - cd_start)?;

    let end = EndOfCentralDirectory {
        entries_on_disk: count,
        entries_total: count,
        central_directory_size,
        central_directory_offset,
    };
    end.write_to(&mut out);
    Len32::new("archive size", out.len())?;

    Ok(Archive { entries, end, bytes: out })
}

/// Parsed end record plus every central-directory record it points to.
#[derive(Clone, Debug)]
pub struct CentralDirectory {
    pub end: EndOfCentralDirectory,
    pub records: Vec<CentralDirectoryRecord>,
}

/// Read the central directory of an archive produced by [`build_archive`].
pub fn read_central_directory(archive: &[u8]) -> Result<CentralDirectory> {
    let end = EndOfCentralDirectory::parse(archive)?;
    if end.entries_on_disk != end.entries_total {
        return Err(malformed(format!(
            "entry counts disagree: {} on disk, {} total",
            end.entries_on_disk, end.entries_total
        )));
    }
    let cd_off = end.central_directory_offset.get() as usize;
    let cd_len = end.central_directory_size.get() as usize;
    if cd_off.checked_add(cd_len) != Some(archive.len() - END_RECORD_LEN) {
        return Err(malformed(format!(
            "central directory [{cd_off}, +{cd_len}) does not end at the end record"
        )));
    }

    let mut records = Vec::with_capacity(end.entries_total as usize);
    let mut at = cd_off;
    for _ in 0..end.entries_total {
        let rec = CentralDirectoryRecord::parse(archive, at)?;
        at += rec.encoded_len();
        records.push(rec);
    }
    if at != cd_off + cd_len {
        return Err(malformed(format!(
            "central directory size {cd_len} does not match its {} records",
            records.len()
        )));
    }
    Ok(CentralDirectory { end, records })
}

fn malformed(msg: String) -> PackError {
    PackError::MalformedContainer(msg)
}

fn slice<'a>(buf: &'a [u8], off: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    off.checked_add(len)
        .and_then(|end| buf.get(off..end))
        .ok_or_else(|| malformed(format!("{what} at offset {off} runs past end of archive")))
}

fn decode_name(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|_| malformed("entry name is not UTF-8".into()))
}

fn le_u16(buf: &[u8], at: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[at..at + 2]);
    u16::from_le_bytes(b)
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}
