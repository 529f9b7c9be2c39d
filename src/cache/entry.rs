use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Everything needed to rebuild a response without going back to the network.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMetadata {
    pub url: String,
    pub status: StatusCode,
    pub mime_type: String,
    pub text_encoding: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseMetadata {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: StatusCode::OK,
            mime_type: mime_type.into(),
            text_encoding: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_text_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.text_encoding = Some(encoding.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub(super) fn to_persisted(&self, body: &[u8]) -> PersistedResponse {
        PersistedResponse {
            url: self.url.clone(),
            status: self.status.as_u16(),
            mime_type: self.mime_type.clone(),
            text_encoding: self.text_encoding.clone(),
            headers: headermap_to_vec(&self.headers),
            content_length: body.len() as u64,
            content_hash: blake3::hash(body).to_hex().to_string(),
        }
    }

    pub(super) fn from_persisted(persisted: PersistedResponse) -> CacheResult<Self> {
        if persisted.url.is_empty() {
            return Err(CacheError::corrupt("response metadata has no url"));
        }
        if persisted.mime_type.is_empty() {
            return Err(CacheError::corrupt("response metadata has no mime type"));
        }
        let status = StatusCode::from_u16(persisted.status).map_err(|_| {
            CacheError::corrupt(format!("invalid status code {}", persisted.status))
        })?;
        Ok(Self {
            url: persisted.url,
            status,
            mime_type: persisted.mime_type,
            text_encoding: persisted.text_encoding,
            headers: to_headermap(&persisted.headers)?,
        })
    }
}

/// On-disk form of [`ResponseMetadata`]. Body length and hash travel with it so
/// the split layout can verify its separate data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct PersistedResponse {
    pub url: String,
    pub status: u16,
    pub mime_type: String,
    #[serde(default)]
    pub text_encoding: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, PersistedHeaderValue)>,
    pub content_length: u64,
    pub content_hash: String,
}

/// Header values are kept as text when they are UTF-8 and as raw bytes
/// otherwise, so obs-text values survive the trip through JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(super) enum PersistedHeaderValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl PersistedHeaderValue {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for UserValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for UserValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for UserValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for UserValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Caller-supplied metadata stored next to an entry and handed back untouched.
pub type UserInfo = BTreeMap<String, UserValue>;

/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub metadata: ResponseMetadata,
    pub body: Bytes,
    pub user_info: Option<UserInfo>,
}

fn to_headermap(items: &[(String, PersistedHeaderValue)]) -> CacheResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in items {
        let name = http::header::HeaderName::try_from(name.as_str())
            .map_err(|_| CacheError::corrupt(format!("invalid header name {name:?}")))?;
        let value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|_| CacheError::corrupt(format!("invalid value for header {name}")))?;
        map.append(name, value);
    }
    Ok(map)
}

fn headermap_to_vec(map: &HeaderMap) -> Vec<(String, PersistedHeaderValue)> {
    map.iter()
        .map(|(name, value)| {
            let value = match std::str::from_utf8(value.as_bytes()) {
                Ok(text) => PersistedHeaderValue::Text(text.to_string()),
                Err(_) => PersistedHeaderValue::Bytes(value.as_bytes().to_vec()),
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}
