use std::fmt;

use http::Uri;

const KEY_HEX_LEN: usize = 64;

/// Identifies one cached resource. The value is the hex BLAKE3 digest of the
/// normalized request URL, so it doubles as a file name under the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_uri(uri: &Uri) -> Self {
        Self::from_normalized(&normalize_url(uri))
    }

    /// Derives a key from a URL string. Strings that do not parse as a URI are
    /// hashed verbatim.
    pub fn for_url(url: &str) -> Self {
        match url.parse::<Uri>() {
            Ok(uri) => Self::from_uri(&uri),
            Err(_) => Self::from_normalized(url),
        }
    }

    fn from_normalized(normalized: &str) -> Self {
        Self(blake3::hash(normalized.as_bytes()).to_hex().to_string())
    }

    /// Accepts only strings this module could have produced.
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == KEY_HEX_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical string form of a request URL used for key derivation.
///
/// Scheme and host are lowercased, default ports dropped, an empty path becomes
/// `/`. The query is kept verbatim. Relative URIs are used as given.
pub fn normalize_url(uri: &Uri) -> String {
    let (scheme, authority) = match (uri.scheme(), uri.authority()) {
        (Some(scheme), Some(authority)) => (scheme, authority),
        _ => return uri.to_string(),
    };

    let scheme_str = scheme.as_str().to_ascii_lowercase();
    let host = authority.host().to_ascii_lowercase();
    let port = authority
        .port_u16()
        .filter(|port| !is_default_port(&scheme_str, *port));

    let mut out = String::with_capacity(uri.to_string().len());
    out.push_str(&scheme_str);
    out.push_str("://");
    if let Some(userinfo) = authority.as_str().rsplit_once('@').map(|(info, _)| info) {
        out.push_str(userinfo);
        out.push('@');
    }
    out.push_str(&host);
    if let Some(port) = port {
        out.push(':');
        out.push_str(&port.to_string());
    }
    let path = uri.path();
    if path.is_empty() {
        out.push('/');
    } else {
        out.push_str(path);
    }
    if let Some(query) = uri.query() {
        out.push('?');
        out.push_str(query);
    }
    out
}

fn is_default_port(scheme: &str, port: u16) -> bool {
    matches!((scheme, port), ("http", 80) | ("https", 443))
}
