use crate::archive::SourceFile;
use crate::error::{PackError, Result, Stage};
use crate::path_safety::{validate_entry_name, validate_path, PathPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Files packaged when no manifest is given, in archive order.
pub const DEFAULT_FILES: &[&str] = &[
    "manifest.json",
    "background.js",
    "content-script.js",
    "popup.html",
    "popup.js",
    "README.md",
];

/// Ordered list of archive-relative file names to package.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PackManifest {
    pub files: Vec<String>,
}

impl Default for PackManifest {
    fn default() -> Self {
        Self { files: DEFAULT_FILES.iter().map(|s| s.to_string()).collect() }
    }
}

impl PackManifest {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { files: files.into_iter().map(Into::into).collect() }
    }

    /// Read a JSON manifest (`{"files": [...]}`) and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| PackError::io(Stage::Read, path, e))?;
        let mf: PackManifest = serde_json::from_reader(f)
            .map_err(|e| PackError::InvalidManifest(format!("{}: {e}", path.display())))?;
        mf.validate()?;
        Ok(mf)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in &self.files {
            validate_entry_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(PackError::InvalidManifest(format!("duplicate entry {name:?}")));
            }
        }
        Ok(())
    }
}

/// What to do when a manifest entry does not exist on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFilePolicy {
    /// Leave the entry out of the archive and keep going.
    #[default]
    Skip,
    /// Abort with [`PackError::MissingInputFile`].
    Fail,
}

#[derive(Clone, Debug, Default)]
pub struct LoadedSources {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<String>,
}

/// Read every manifest entry from `root`, in manifest order.
pub fn load_sources(
    root: &Path,
    manifest: &PackManifest,
    missing: MissingFilePolicy,
    policy: PathPolicy,
) -> Result<LoadedSources> {
    manifest.validate()?;
    let meta = std::fs::metadata(root).map_err(|e| PackError::io(Stage::Read, root, e))?;
    if !meta.is_dir() {
        return Err(PackError::io(
            Stage::Read,
            root,
            std::io::Error::new(ErrorKind::InvalidInput, "source is not a directory"),
        ));
    }
    let mut out = LoadedSources::default();
    for name in &manifest.files {
        let path = validate_path(root, name, policy)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!(name = %name, bytes = bytes.len(), "read source file");
                out.files.push(SourceFile::new(name.clone(), bytes));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => match missing {
                MissingFilePolicy::Skip => {
                    warn!(name = %name, "skipping missing file");
                    out.skipped.push(name.clone());
                }
                MissingFilePolicy::Fail => {
                    return Err(PackError::MissingInputFile { name: name.clone() });
                }
            },
            Err(e) => return Err(PackError::io(Stage::Read, path, e)),
        }
    }
    Ok(out)
}
