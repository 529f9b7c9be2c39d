#![allow(dead_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

use pagestash::cache::{
    CacheConfig, CacheLayout, CacheRequest, DiskCache, ResponseMetadata, UserInfo, UserValue,
};

pub const ONE_MIB: u64 = 1024 * 1024;

pub const LAYOUTS: [CacheLayout; 2] = [CacheLayout::Combined, CacheLayout::Split];

pub struct TestDirs {
    _temp: TempDir,
    pub cache_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl TestDirs {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let cache_dir = temp.path().join("cache");
        let work_dir = temp.path().join("work");
        std::fs::create_dir_all(&work_dir)?;
        Ok(Self {
            _temp: temp,
            cache_dir,
            work_dir,
        })
    }

    pub fn config(&self, max_size: u64, layout: CacheLayout) -> CacheConfig {
        CacheConfig::new(&self.cache_dir)
            .max_size(max_size)
            .layout(layout)
    }

    pub fn open(&self, max_size: u64, layout: CacheLayout) -> Result<DiskCache> {
        Ok(DiskCache::open(self.config(max_size, layout))?)
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.work_dir.join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Writes a config file into the work dir whose `cache_dir` is relative to it.
    pub fn write_config(&self, extra: &str) -> Result<PathBuf> {
        let body = format!("cache_dir = \"../cache\"\n{extra}");
        self.write_file("pagestash.toml", body.as_bytes())
    }
}

pub fn request(url: &str) -> CacheRequest {
    CacheRequest::new(url.parse().expect("valid test url"))
}

pub fn html(url: &str) -> ResponseMetadata {
    ResponseMetadata::new(url, "text/html")
}

pub fn sample_user_info() -> UserInfo {
    [("foo".to_string(), UserValue::from("bar"))].into()
}

/// Sum of the on-disk sizes of every file belonging to the entry for `req`.
pub fn entry_bytes(cache: &DiskCache, req: &CacheRequest) -> u64 {
    cache
        .path_for_request(req)
        .files()
        .into_iter()
        .map(file_len)
        .sum()
}

pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}
