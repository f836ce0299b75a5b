//! Cache key composition.
//!
//! Keys are `prefix:user_id:raw_key` (or `prefix:raw_key` without a user).
//! When the composed key exceeds the length bound, the raw part is replaced by
//! a sha256 digest so the namespace stays intact for pattern invalidation.

use sha2::{Digest, Sha256};
use std::fmt;

/// Marker separating a namespace from a digested raw key
const DIGEST_MARKER: char = '#';

/// A fully composed, length-bounded cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    composed: String,
    namespace_len: usize,
    digested: bool,
}

impl CacheKey {
    pub fn compose(prefix: &str, key: &str, user_id: Option<&str>, max_len: usize) -> Self {
        let namespace = namespace(prefix, user_id);
        let composed = format!("{namespace}:{key}");
        if composed.len() <= max_len {
            return Self {
                namespace_len: namespace.len(),
                composed,
                digested: false,
            };
        }

        let digested = format!("{namespace}:{DIGEST_MARKER}{}", digest(key));
        if digested.len() <= max_len {
            return Self {
                namespace_len: namespace.len(),
                composed: digested,
                digested: true,
            };
        }

        // Namespace alone is over the bound; the key can no longer be matched by
        // prefix invalidation
        Self {
            namespace_len: 0,
            composed: format!("{DIGEST_MARKER}{}", digest(&composed)),
            digested: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.composed
    }

    /// `prefix` or `prefix:user_id`, empty for fully digested keys
    pub fn namespace(&self) -> &str {
        &self.composed[..self.namespace_len]
    }

    pub fn is_digested(&self) -> bool {
        self.digested
    }

    pub fn into_string(self) -> String {
        self.composed
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composed)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.composed
    }
}

/// `prefix` or `prefix:user_id`
pub fn namespace(prefix: &str, user_id: Option<&str>) -> String {
    match user_id {
        Some(user) => format!("{prefix}:{user}"),
        None => prefix.to_string(),
    }
}

/// Prefix every key in `namespace` starts with
///
/// The trailing separator keeps `files:u1` from matching `files:u10:...`.
pub fn invalidation_prefix(prefix: &str, user_id: Option<&str>) -> String {
    format!("{}:", namespace(prefix, user_id))
}

/// Escape glob metacharacters for Redis `SCAN MATCH`
pub fn glob_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
