use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::CacheKey;
use crate::error::CacheError;

const MANIFEST_VERSION: u32 = 1;

/// Persisted form of the cache index: running size plus keys oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    pub current_size: u64,
    pub keys: Vec<String>,
    #[serde(default)]
    pub sizes: BTreeMap<String, u64>,
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

/// A manifest that passed validation.
#[derive(Debug, Default)]
pub(super) struct LoadedManifest {
    pub current_size: u64,
    /// Keys oldest first with the size recorded for each, if any.
    pub entries: Vec<(CacheKey, Option<u64>)>,
}

impl Manifest {
    pub(super) fn from_entries(current_size: u64, entries: &[(CacheKey, u64)]) -> Self {
        Self {
            version: MANIFEST_VERSION,
            current_size,
            keys: entries.iter().map(|(key, _)| key.to_string()).collect(),
            sizes: entries
                .iter()
                .map(|(key, size)| (key.to_string(), *size))
                .collect(),
        }
    }

    pub(super) fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub(super) fn parse(data: &[u8]) -> Result<Self, String> {
        let manifest: Self = serde_json::from_slice(data).map_err(|err| err.to_string())?;
        if manifest.version != MANIFEST_VERSION {
            return Err(format!("unsupported manifest version {}", manifest.version));
        }
        Ok(manifest)
    }

    /// Drops keys that are malformed or repeated, keeping the first occurrence.
    pub(super) fn validate(self) -> LoadedManifest {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.keys.len());
        for raw in &self.keys {
            let Some(key) = CacheKey::parse(raw) else {
                warn!(key = %raw, "dropping malformed key from cache manifest");
                continue;
            };
            if !seen.insert(key.clone()) {
                warn!(key = %raw, "dropping duplicate key from cache manifest");
                continue;
            }
            let size = self.sizes.get(raw).copied();
            entries.push((key, size));
        }
        LoadedManifest {
            current_size: self.current_size,
            entries,
        }
    }
}

/// Reads the manifest at `path`. Missing or unreadable manifests load as empty.
pub(super) fn load(path: &Path) -> LoadedManifest {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return LoadedManifest::default(),
        Err(err) => {
            report_unreadable(path, err.to_string());
            return LoadedManifest::default();
        }
    };
    match Manifest::parse(&data) {
        Ok(manifest) => manifest.validate(),
        Err(reason) => {
            report_unreadable(path, reason);
            LoadedManifest::default()
        }
    }
}

fn report_unreadable(path: &Path, reason: String) {
    let err = CacheError::ManifestUnreadable {
        path: path.to_path_buf(),
        reason,
    };
    warn!(error = %err, "starting with an empty cache index");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_manifest_loads_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = load(&dir.path().join("manifest.json"));
        assert_eq!(loaded.current_size, 0);
        assert!(loaded.entries.is_empty());
    }

    #[test]
    fn garbage_manifest_loads_empty() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, b"{\"current_size\": \"lots\"")?;
        let loaded = load(&path);
        assert_eq!(loaded.current_size, 0);
        assert!(loaded.entries.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_version_loads_empty() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, br#"{"version": 9, "current_size": 5, "keys": []}"#)?;
        assert!(load(&path).entries.is_empty());
        Ok(())
    }

    #[test]
    fn manifest_round_trips_order_and_sizes() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("manifest.json");
        let a = CacheKey::for_url("foo://bar");
        let b = CacheKey::for_url("foo://baz");
        let manifest = Manifest::from_entries(30, &[(a.clone(), 10), (b.clone(), 20)]);
        std::fs::write(&path, manifest.to_bytes()?)?;

        let loaded = load(&path);
        assert_eq!(loaded.current_size, 30);
        assert_eq!(loaded.entries, vec![(a, Some(10)), (b, Some(20))]);
        Ok(())
    }

    #[test]
    fn validation_drops_bad_and_duplicate_keys() {
        let key = CacheKey::for_url("foo://bar");
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            current_size: 12,
            keys: vec![
                key.to_string(),
                "../../etc/passwd".to_string(),
                key.to_string(),
            ],
            sizes: BTreeMap::new(),
        };
        let loaded = manifest.validate();
        assert_eq!(loaded.entries, vec![(key, None)]);
    }

    #[test]
    fn plain_key_list_without_sizes_is_accepted() {
        let key = CacheKey::for_url("foo://bar");
        let json = format!(r#"{{"current_size": 7, "keys": ["{key}"]}}"#);
        let manifest = Manifest::parse(json.as_bytes()).unwrap();
        let loaded = manifest.validate();
        assert_eq!(loaded.current_size, 7);
        assert_eq!(loaded.entries, vec![(key, None)]);
    }
}
