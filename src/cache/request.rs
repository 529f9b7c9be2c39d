use http::Uri;

use super::CacheKey;

/// The parts of an outgoing request the cache cares about.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub uri: Uri,
    /// Set by the page-caching collaborator on requests it issues for offline storage.
    pub offline: bool,
}

impl CacheRequest {
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            offline: false,
        }
    }

    pub fn offline(uri: Uri) -> Self {
        Self {
            offline: true,
            ..Self::new(uri)
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::from_uri(&self.uri)
    }
}
