use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt cache entry: {reason}")]
    CorruptEntry { reason: String },
    #[error("entry cannot be stored: {reason}")]
    InvalidEntry { reason: String },
    #[error("cache manifest {path} unreadable: {reason}")]
    ManifestUnreadable { path: PathBuf, reason: String },
}

impl CacheError {
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptEntry {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            reason: reason.into(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptEntry { .. })
    }

    /// True when the caller handed over an entry that could not be read back.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::InvalidEntry { .. })
    }

    /// True when the underlying I/O error says the file is simply not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
