use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

use super::CacheKey;
use crate::error::{CacheError, CacheResult};

pub(super) const MANIFEST_FILE_NAME: &str = "manifest.json";
const TEMP_PREFIX: &str = "tmp_";

/// Suffixes of the three files an entry occupies in the split layout.
pub const RESPONSE_SUFFIX: &str = "response";
pub const DATA_SUFFIX: &str = "data";
pub const USER_INFO_SUFFIX: &str = "userinfo";

/// File-level operations under one cache root.
#[derive(Debug, Clone)]
pub(super) struct CacheStore {
    root: PathBuf,
}

/// The three on-disk parts of a split entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPaths {
    pub response: PathBuf,
    pub data: PathBuf,
    pub user_info: PathBuf,
}

impl SplitPaths {
    pub fn all(&self) -> [&Path; 3] {
        [
            self.response.as_path(),
            self.data.as_path(),
            self.user_info.as_path(),
        ]
    }
}

impl CacheStore {
    pub(super) fn open(root: PathBuf) -> CacheResult<Self> {
        fs::create_dir_all(&root)
            .map_err(|err| CacheError::io("create cache root", &root, err))?;
        let store = Self { root };
        store.remove_temp_files();
        Ok(store)
    }

    pub(super) fn root(&self) -> &Path {
        &self.root
    }

    pub(super) fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    pub(super) fn split_paths(&self, key: &CacheKey) -> SplitPaths {
        let base = self.entry_path(key);
        SplitPaths {
            response: with_suffix(&base, RESPONSE_SUFFIX),
            data: with_suffix(&base, DATA_SUFFIX),
            user_info: with_suffix(&base, USER_INFO_SUFFIX),
        }
    }

    pub(super) fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    /// Writes `data` to a fresh temp file in the cache root and syncs it.
    /// The caller renames it into place with [`CacheStore::commit`].
    pub(super) fn write_temp(&self, data: &[u8]) -> CacheResult<PathBuf> {
        let temp_path = self.temp_path();
        let result = write_new_file(&temp_path, data);
        if let Err(err) = result {
            fs::remove_file(&temp_path).ok();
            return Err(CacheError::io("write", &temp_path, err));
        }
        Ok(temp_path)
    }

    pub(super) fn commit(&self, temp_path: &Path, final_path: &Path) -> CacheResult<()> {
        if let Err(err) = fs::rename(temp_path, final_path) {
            fs::remove_file(temp_path).ok();
            return Err(CacheError::io("rename into", final_path, err));
        }
        Ok(())
    }

    /// Temp-file-then-rename write of a single file.
    pub(super) fn write_atomic(&self, final_path: &Path, data: &[u8]) -> CacheResult<()> {
        let temp_path = self.write_temp(data)?;
        self.commit(&temp_path, final_path)
    }

    pub(super) fn discard_temp(&self, temp_path: &Path) {
        fs::remove_file(temp_path).ok();
    }

    pub(super) fn read(&self, path: &Path) -> CacheResult<Vec<u8>> {
        fs::read(path).map_err(|err| CacheError::io("read", path, err))
    }

    /// Removes a file, treating an already missing file as removed.
    /// Returns whether a file was actually deleted.
    pub(super) fn remove_file(&self, path: &Path) -> CacheResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CacheError::io("remove", path, err)),
        }
    }

    pub(super) fn file_len(&self, path: &Path) -> Option<u64> {
        fs::metadata(path).ok().map(|meta| meta.len())
    }

    pub(super) fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
    }

    /// Deletes temp files left behind by interrupted writes.
    fn remove_temp_files(&self) {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, path = %self.root.display(), "failed to scan cache root");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(TEMP_PREFIX))
                .unwrap_or(false);
            if is_temp && path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => trace!(path = %path.display(), "removed stale cache temp file"),
                    Err(err) => {
                        warn!(error = %err, path = %path.display(), "failed to remove temp file")
                    }
                }
            }
        }
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

fn write_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}
