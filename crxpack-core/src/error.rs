use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Read,
    Compression,
    ArchiveAssembly,
    KeyGeneration,
    Signing,
    Write,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Read => "read",
            Stage::Compression => "compression",
            Stage::ArchiveAssembly => "archive assembly",
            Stage::KeyGeneration => "key generation",
            Stage::Signing => "signing",
            Stage::Write => "write",
            Stage::Verify => "verify",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum PackError {
    #[error("missing input file: {name}")]
    MissingInputFile { name: String },

    #[error("{stage} failed for {path:?}: {source}")]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} failed: {message}")]
    Crypto { stage: Stage, message: String },

    #[error("archive assembly failed: {field} is {value}, exceeds format limit {max}")]
    FormatOverflow { field: &'static str, value: u64, max: u64 },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("unsafe path {path:?}: {reason}")]
    UnsafePath { path: String, reason: String },

    #[error("malformed container: {0}")]
    MalformedContainer(String),
}

impl PackError {
    pub fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackError::Io { stage, path: path.into(), source }
    }

    pub fn crypto(stage: Stage, err: impl fmt::Display) -> Self {
        PackError::Crypto { stage, message: err.to_string() }
    }

    /// Stage the error belongs to, when it is tied to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PackError::Io { stage, .. } | PackError::Crypto { stage, .. } => Some(*stage),
            PackError::FormatOverflow { .. } => Some(Stage::ArchiveAssembly),
            PackError::MissingInputFile { .. } | PackError::UnsafePath { .. } => Some(Stage::Read),
            PackError::MalformedContainer(_) => Some(Stage::Verify),
            PackError::InvalidManifest(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
