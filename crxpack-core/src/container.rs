use crate::archive::Len32;
use crate::error::{PackError, Result};

/// Magic tag at the start of every container.
pub const CRX_MAGIC: &[u8; 4] = b"Cr24";
pub const CRX_VERSION: u32 = 3;
/// magic + version + header length
pub const PREFIX_LEN: usize = 12;

/// Declared header length for the given key and signature sizes.
///
/// The format counts a 16-byte fixed header and then subtracts the 12-byte
/// prefix, so the stored value is `len(key) + len(signature) + 4`.
pub fn header_length(public_key_len: usize, signature_len: usize) -> Result<u32> {
    let total = 16usize
        .checked_add(public_key_len)
        .and_then(|n| n.checked_add(signature_len))
        .ok_or(PackError::FormatOverflow {
            field: "container header length",
            value: u64::MAX,
            max: u32::MAX as u64,
        })?;
    Ok(Len32::new("container header length", total - PREFIX_LEN)?.get())
}

/// Prefix `archive` with the signed header.
pub fn wrap(public_key_der: &[u8], signature: &[u8], archive: &[u8]) -> Result<Vec<u8>> {
    let hlen = header_length(public_key_der.len(), signature.len())?;
    let mut out =
        Vec::with_capacity(PREFIX_LEN + public_key_der.len() + signature.len() + archive.len());
    out.extend_from_slice(CRX_MAGIC);
    out.extend_from_slice(&CRX_VERSION.to_le_bytes());
    out.extend_from_slice(&hlen.to_le_bytes());
    out.extend_from_slice(public_key_der);
    out.extend_from_slice(signature);
    out.extend_from_slice(archive);
    Ok(out)
}

/// A container split back into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container<'a> {
    pub version: u32,
    pub header_length: u32,
    pub public_key: &'a [u8],
    pub signature: &'a [u8],
    pub archive: &'a [u8],
}

impl<'a> Container<'a> {
    /// Parse a container produced by [`wrap`].
    ///
    /// The header does not store the key length on its own; it is taken from
    /// the outer DER SEQUENCE of the key, and the remainder of the declared
    /// header is the signature.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < PREFIX_LEN {
            return Err(malformed(format!("too short ({} bytes)", bytes.len())));
        }
        if &bytes[0..4] != CRX_MAGIC {
            return Err(malformed("bad magic".into()));
        }
        let mut v4 = [0u8; 4];
        v4.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(v4);
        if version != CRX_VERSION {
            return Err(malformed(format!("unsupported version {version}")));
        }
        let mut l4 = [0u8; 4];
        l4.copy_from_slice(&bytes[8..12]);
        let header_length = u32::from_le_bytes(l4);

        // Key and signature together span header_length - 4 bytes.
        let body_len = (header_length as usize)
            .checked_sub(16 - PREFIX_LEN)
            .ok_or_else(|| malformed(format!("header length {header_length} too small")))?;
        let archive_off = PREFIX_LEN + body_len;
        if archive_off > bytes.len() {
            return Err(malformed(format!(
                "header length {header_length} exceeds file size {}",
                bytes.len()
            )));
        }
        let body = &bytes[PREFIX_LEN..archive_off];
        let key_len = der_sequence_len(body)?;
        if key_len > body.len() {
            return Err(malformed("public key runs past header".into()));
        }
        Ok(Self {
            version,
            header_length,
            public_key: &body[..key_len],
            signature: &body[key_len..],
            archive: &bytes[archive_off..],
        })
    }
}

/// Total encoded length of the DER SEQUENCE at the start of `der`.
fn der_sequence_len(der: &[u8]) -> Result<usize> {
    if der.len() < 2 || der[0] != 0x30 {
        return Err(malformed("public key is not a DER SEQUENCE".into()));
    }
    let first = der[1];
    if first < 0x80 {
        return Ok(2 + first as usize);
    }
    let n = (first & 0x7F) as usize;
    if n == 0 || n > 4 || der.len() < 2 + n {
        return Err(malformed("unsupported DER length encoding".into()));
    }
    let len = der[2..2 + n].iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok(2 + n + len)
}

fn malformed(msg: String) -> PackError {
    PackError::MalformedContainer(msg)
}
