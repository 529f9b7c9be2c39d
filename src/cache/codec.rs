//! Serialization of one cache entry.
//!
//! The combined layout frames the three parts in a single buffer:
//!
//! ```text
//! magic "PGS1" | version u8
//! u32 metadata length | metadata (JSON)
//! u64 body length     | body bytes
//! u8 user info flag   | [u32 user info length | user info (JSON)]
//! BLAKE3 digest of everything above (32 bytes)
//! ```
//!
//! The split layout keeps the parts in three buffers. The metadata part
//! carries the body length and digest so a damaged data file is detected.

use bytes::{Buf, BufMut, Bytes};

use super::entry::{CachedEntry, PersistedResponse, ResponseMetadata, UserInfo, UserValue};
use crate::error::{CacheError, CacheResult};

const MAGIC: &[u8; 4] = b"PGS1";
const FORMAT_VERSION: u8 = 1;
const DIGEST_LEN: usize = blake3::OUT_LEN;
const HEADER_LEN: usize = MAGIC.len() + 1;

/// Three independently written parts of an entry in the split layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitEntry {
    pub response: Vec<u8>,
    pub data: Vec<u8>,
    pub user_info: Vec<u8>,
}

impl SplitEntry {
    pub fn len(&self) -> u64 {
        (self.response.len() + self.data.len() + self.user_info.len()) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn encode(
    metadata: &ResponseMetadata,
    body: &[u8],
    user_info: Option<&UserInfo>,
) -> CacheResult<Vec<u8>> {
    let meta_json = serialize_metadata(metadata, body)?;
    let user_json = user_info.map(serialize_user_info).transpose()?;
    let meta_len = u32::try_from(meta_json.len())
        .map_err(|_| CacheError::invalid("response metadata too large to encode"))?;
    let user_len = user_json
        .as_ref()
        .map(|json| u32::try_from(json.len()))
        .transpose()
        .map_err(|_| CacheError::invalid("user info too large to encode"))?;

    let capacity = HEADER_LEN
        + 4
        + meta_json.len()
        + 8
        + body.len()
        + 1
        + user_json.as_ref().map_or(0, |json| 4 + json.len())
        + DIGEST_LEN;
    let mut out = Vec::with_capacity(capacity);
    out.put_slice(MAGIC);
    out.put_u8(FORMAT_VERSION);
    out.put_u32(meta_len);
    out.put_slice(&meta_json);
    out.put_u64(body.len() as u64);
    out.put_slice(body);
    match (user_json, user_len) {
        (Some(json), Some(len)) => {
            out.put_u8(1);
            out.put_u32(len);
            out.put_slice(&json);
        }
        _ => out.put_u8(0),
    }
    let digest = blake3::hash(&out);
    out.put_slice(digest.as_bytes());
    Ok(out)
}

/// Decodes a combined entry. The body is a zero-copy slice of `data`.
pub fn decode(data: Bytes) -> CacheResult<CachedEntry> {
    if data.len() < HEADER_LEN + DIGEST_LEN {
        return Err(CacheError::corrupt(format!(
            "entry truncated at {} bytes",
            data.len()
        )));
    }
    let framed_len = data.len() - DIGEST_LEN;
    let (framed, digest) = data.split_at(framed_len);
    if blake3::hash(framed).as_bytes() != digest {
        return Err(CacheError::corrupt("entry checksum mismatch"));
    }

    let mut buf = framed;
    if &buf[..MAGIC.len()] != MAGIC {
        return Err(CacheError::corrupt("bad entry magic"));
    }
    buf.advance(MAGIC.len());
    let version = buf.get_u8();
    if version != FORMAT_VERSION {
        return Err(CacheError::corrupt(format!(
            "unsupported entry version {version}"
        )));
    }

    let meta_len = read_u32(&mut buf, "metadata length")? as usize;
    let meta_json = take(&mut buf, meta_len, "metadata")?;
    let persisted: PersistedResponse = serde_json::from_slice(meta_json)
        .map_err(|err| CacheError::corrupt(format!("metadata is not valid: {err}")))?;

    let body_len = read_u64(&mut buf, "body length")?;
    let body_len = usize::try_from(body_len)
        .map_err(|_| CacheError::corrupt("body length exceeds address space"))?;
    let body_start = framed_len - buf.len();
    take(&mut buf, body_len, "body")?;
    let body = data.slice(body_start..body_start + body_len);

    if buf.remaining() < 1 {
        return Err(CacheError::corrupt("entry truncated before user info flag"));
    }
    let user_info = match buf.get_u8() {
        0 => None,
        1 => {
            let len = read_u32(&mut buf, "user info length")? as usize;
            let json = take(&mut buf, len, "user info")?;
            Some(deserialize_user_info(json)?)
        }
        flag => {
            return Err(CacheError::corrupt(format!("invalid user info flag {flag}")));
        }
    };
    if buf.has_remaining() {
        return Err(CacheError::corrupt(format!(
            "{} trailing bytes after entry",
            buf.remaining()
        )));
    }

    let metadata = verified_metadata(persisted, &body)?;
    Ok(CachedEntry {
        metadata,
        body,
        user_info,
    })
}

pub fn encode_split(
    metadata: &ResponseMetadata,
    body: &[u8],
    user_info: Option<&UserInfo>,
) -> CacheResult<SplitEntry> {
    let response = serialize_metadata(metadata, body)?;
    let user_info = match user_info {
        Some(info) => serialize_user_info(info)?,
        None => b"null".to_vec(),
    };
    Ok(SplitEntry {
        response,
        data: body.to_vec(),
        user_info,
    })
}

pub fn decode_split(response: &[u8], data: Bytes, user_info: &[u8]) -> CacheResult<CachedEntry> {
    let persisted: PersistedResponse = serde_json::from_slice(response)
        .map_err(|err| CacheError::corrupt(format!("response part is not valid: {err}")))?;
    let metadata = verified_metadata(persisted, &data)?;
    let user_info: Option<UserInfo> = serde_json::from_slice(user_info)
        .map_err(|err| CacheError::corrupt(format!("user info part is not valid: {err}")))?;
    Ok(CachedEntry {
        metadata,
        body: data,
        user_info,
    })
}

/// Refuses metadata that [`ResponseMetadata::from_persisted`] would reject.
fn serialize_metadata(metadata: &ResponseMetadata, body: &[u8]) -> CacheResult<Vec<u8>> {
    if metadata.url.is_empty() {
        return Err(CacheError::invalid("response metadata has no url"));
    }
    if metadata.mime_type.is_empty() {
        return Err(CacheError::invalid("response metadata has no mime type"));
    }
    serde_json::to_vec(&metadata.to_persisted(body))
        .map_err(|err| CacheError::invalid(format!("failed to serialize metadata: {err}")))
}

fn serialize_user_info(info: &UserInfo) -> CacheResult<Vec<u8>> {
    // JSON has no NaN or infinity; serde_json would write null and lose the value.
    for (name, value) in info {
        if let UserValue::Float(number) = value
            && !number.is_finite()
        {
            return Err(CacheError::invalid(format!(
                "user info {name:?} is not a finite number"
            )));
        }
    }
    serde_json::to_vec(info)
        .map_err(|err| CacheError::invalid(format!("failed to serialize user info: {err}")))
}

fn deserialize_user_info(json: &[u8]) -> CacheResult<UserInfo> {
    serde_json::from_slice(json)
        .map_err(|err| CacheError::corrupt(format!("user info is not valid: {err}")))
}

fn verified_metadata(persisted: PersistedResponse, body: &[u8]) -> CacheResult<ResponseMetadata> {
    if persisted.content_length != body.len() as u64 {
        return Err(CacheError::corrupt(format!(
            "body length {} does not match recorded {}",
            body.len(),
            persisted.content_length
        )));
    }
    if blake3::hash(body).to_hex().as_str() != persisted.content_hash {
        return Err(CacheError::corrupt("body hash does not match metadata"));
    }
    ResponseMetadata::from_persisted(persisted)
}

fn read_u32(buf: &mut &[u8], what: &str) -> CacheResult<u32> {
    if buf.remaining() < 4 {
        return Err(CacheError::corrupt(format!("entry truncated in {what}")));
    }
    Ok(buf.get_u32())
}

fn read_u64(buf: &mut &[u8], what: &str) -> CacheResult<u64> {
    if buf.remaining() < 8 {
        return Err(CacheError::corrupt(format!("entry truncated in {what}")));
    }
    Ok(buf.get_u64())
}

fn take<'a>(buf: &mut &'a [u8], len: usize, what: &str) -> CacheResult<&'a [u8]> {
    if buf.len() < len {
        return Err(CacheError::corrupt(format!(
            "entry truncated in {what}: need {len} bytes, have {}",
            buf.len()
        )));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}
