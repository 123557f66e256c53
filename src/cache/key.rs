//! Cache key derivation.
//!
//! A key is the forwarded path plus every query parameter, sorted, so that
//! parameter order never changes the key and any differing value always does.

use std::fmt;

use url::form_urlencoded;

/// Normalized request signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `path` and a raw (still encoded) query string.
    pub fn new(path: &str, query: Option<&str>) -> Self {
        let mut params: Vec<(String, String)> = form_urlencoded::parse(query.unwrap_or("").as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();

        Self(format!("cache:{}?{}", normalize_path(path), query))
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

/// Drop leading slashes and collapse repeated ones; a trailing slash is significant.
fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.trim_start_matches('/').chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    out
}
