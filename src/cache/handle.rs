use std::sync::Arc;

use anyhow::{Result, anyhow};
use bytes::Bytes;
use tokio::task;

use super::{
    CacheConfig, CacheKey, CacheRequest, CachedEntry, DiskCache, ResponseMetadata, StoreReport,
    UserInfo,
};

/// Cloneable async handle over a [`DiskCache`].
///
/// Every call runs on the blocking pool; the errors add task failures on top of
/// the underlying [`crate::error::CacheError`], which stays reachable through
/// `downcast_ref`.
#[derive(Debug, Clone)]
pub struct AsyncDiskCache {
    inner: Arc<DiskCache>,
}

impl AsyncDiskCache {
    pub async fn open(config: CacheConfig) -> Result<Self> {
        let cache = task::spawn_blocking(move || DiskCache::open(config))
            .await
            .map_err(|err| anyhow!("cache open task failed: {err}"))??;
        Ok(Self {
            inner: Arc::new(cache),
        })
    }

    pub fn from_cache(cache: Arc<DiskCache>) -> Self {
        Self { inner: cache }
    }

    /// The synchronous cache, for callers that already run off the async runtime.
    pub fn blocking(&self) -> &Arc<DiskCache> {
        &self.inner
    }

    pub async fn store(
        &self,
        request: CacheRequest,
        metadata: ResponseMetadata,
        body: Bytes,
        user_info: Option<UserInfo>,
    ) -> Result<StoreReport> {
        self.run("store", move |cache| {
            cache.store(&request, &metadata, &body, user_info.as_ref())
        })
        .await?
        .map_err(Into::into)
    }

    pub async fn store_offline(
        &self,
        request: CacheRequest,
        metadata: ResponseMetadata,
        body: Bytes,
        user_info: Option<UserInfo>,
    ) -> Result<Option<StoreReport>> {
        self.run("store_offline", move |cache| {
            cache.store_offline(&request, &metadata, &body, user_info.as_ref())
        })
        .await?
        .map_err(Into::into)
    }

    pub async fn retrieve(&self, request: CacheRequest) -> Result<Option<CachedEntry>> {
        self.run("retrieve", move |cache| cache.retrieve(&request)).await
    }

    pub async fn has_entry(&self, request: CacheRequest) -> Result<bool> {
        self.run("has_entry", move |cache| cache.has_entry(&request)).await
    }

    pub async fn remove(&self, request: CacheRequest) -> Result<bool> {
        self.run("remove", move |cache| cache.remove(&request))
            .await?
            .map_err(Into::into)
    }

    pub async fn clear(&self) -> Result<()> {
        self.run("clear", |cache| cache.clear()).await?.map_err(Into::into)
    }

    pub fn current_size(&self) -> u64 {
        self.inner.current_size()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner.keys()
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DiskCache) -> T + Send + 'static,
    {
        let cache = self.inner.clone();
        task::spawn_blocking(move || f(&cache))
            .await
            .map_err(|err| anyhow!("cache {op} task failed: {err}"))
    }
}
