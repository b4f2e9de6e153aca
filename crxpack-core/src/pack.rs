use crate::archive::{build_archive, Archive};
use crate::container::wrap;
use crate::error::{PackError, Result, Stage};
use crate::keys::{extension_id, KeyPair};
use crate::manifest::{load_sources, MissingFilePolicy, PackManifest};
use crate::path_safety::PathPolicy;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Extension of the private-key sidecar written next to the container.
pub const KEY_EXTENSION: &str = "key";

/// Where the signing key comes from.
#[derive(Clone, Debug, Default)]
pub enum KeySource {
    /// New key every run, hence a new extension identity every run.
    #[default]
    Generate,
    /// Reuse a PKCS#8 PEM key to keep the extension ID stable.
    Pem(PathBuf),
    /// Caller-supplied key.
    Provided(KeyPair),
}

#[derive(Clone, Debug, Default)]
pub struct PackConfig {
    pub manifest: PackManifest,
    pub missing: MissingFilePolicy,
    pub paths: PathPolicy,
    pub key: KeySource,
}

#[derive(Serialize, Clone, Debug)]
pub struct EntryReport {
    pub name: String,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub crc32: String,
    pub offset: u32,
}

#[derive(Serialize, Clone, Debug)]
pub struct PackReport {
    pub created_utc: String,
    pub container_path: PathBuf,
    pub key_path: PathBuf,
    pub extension_id: String,
    pub archive_len: usize,
    pub container_len: usize,
    pub entries: Vec<EntryReport>,
    pub skipped: Vec<String>,
}

/// In-memory result of a pack run, before anything touches disk.
#[derive(Debug)]
pub struct Packed {
    pub archive: Archive,
    pub public_key_der: Vec<u8>,
    pub signature: Vec<u8>,
    pub container: Vec<u8>,
    pub key: KeyPair,
}

/// Sidecar path for a container: same path, extension replaced by `.key`.
pub fn key_path_for(output: &Path) -> PathBuf {
    output.with_extension(KEY_EXTENSION)
}

pub struct Packer;

impl Packer {
    /// Archive, sign and wrap already loaded files.
    pub fn assemble(files: &[crate::archive::SourceFile], key: KeyPair) -> Result<Packed> {
        let public_key_der = key.public_key_der()?;
        let archive = build_archive(files)?;
        let signature = key.sign(archive.bytes())?;
        let container = wrap(&public_key_der, &signature, archive.bytes())?;
        Ok(Packed { archive, public_key_der, signature, container, key })
    }

    /// Package `source_dir` into a signed container at `output`, and write the
    /// private key next to it.
    pub fn pack(source_dir: &Path, output: &Path, cfg: &PackConfig) -> Result<PackReport> {
        let key_path = key_path_for(output);
        if key_path == output {
            return Err(PackError::io(
                Stage::Write,
                output,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "output already has the key sidecar extension",
                ),
            ));
        }

        // 1) Sources
        let sources = load_sources(source_dir, &cfg.manifest, cfg.missing, cfg.paths)?;
        info!(
            included = sources.files.len(),
            skipped = sources.skipped.len(),
            "loaded sources from {}",
            source_dir.display()
        );

        // 2) Key
        let key = match &cfg.key {
            KeySource::Generate => {
                info!("generating RSA key pair");
                KeyPair::generate()?
            }
            KeySource::Pem(path) => {
                let pem = std::fs::read_to_string(path)
                    .map_err(|e| PackError::io(Stage::KeyGeneration, path, e))?;
                KeyPair::from_pkcs8_pem(&pem)?
            }
            KeySource::Provided(k) => k.clone(),
        };

        // 3) Archive, sign, wrap
        let packed = Self::assemble(&sources.files, key)?;
        let extension_id = extension_id(&packed.public_key_der);
        info!(
            archive_bytes = packed.archive.bytes().len(),
            signature_bytes = packed.signature.len(),
            extension_id = %extension_id,
            "signed archive"
        );

        // 4) Persist: key first, so a container never exists without its key
        let pem = packed.key.to_pkcs8_pem()?;
        write_atomic(&key_path, pem.as_bytes(), 0o600)?;
        write_atomic(output, &packed.container, 0o644)?;
        info!("wrote {} and {}", output.display(), key_path.display());

        let entries = packed
            .archive
            .entries()
            .iter()
            .map(|e| EntryReport {
                name: e.name.clone(),
                uncompressed_size: e.uncompressed_size.get(),
                compressed_size: e.compressed_size.get(),
                crc32: format!("{:08x}", e.crc32),
                offset: e.local_header_offset.get(),
            })
            .collect();

        Ok(PackReport {
            created_utc: chrono::Utc::now().to_rfc3339(),
            container_path: output.to_path_buf(),
            key_path,
            extension_id,
            archive_len: packed.archive.bytes().len(),
            container_len: packed.container.len(),
            entries,
            skipped: sources.skipped,
        })
    }
}

/// Write through a temp file in the destination directory and rename into
/// place, so `path` is either untouched or complete.
fn write_atomic(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let io_err = |e: std::io::Error| PackError::io(Stage::Write, path, e);
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(data).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    set_mode(tmp.as_file(), mode).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(f: &std::fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    f.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_f: &std::fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
