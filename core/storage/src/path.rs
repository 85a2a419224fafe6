//! Canonical key normalization.
//!
//! Backends accept three shapes of input for the same object:
//! - a bare key: `a/b.txt`
//! - a rooted key: `/a/b.txt`
//! - an absolute URL on the backend's endpoint: `https://bucket.host/a/b.txt`
//!   (scheme-relative `//bucket.host/a/b.txt` is accepted too)
//!
//! All three reduce to the same canonical key, which is what every vendor
//! call receives. Normalization is a pure function of the input and the
//! backend's [`Addressing`] mode and never touches the network.
//!
//! Canonical keys have no empty segments: they never start with `/` and never
//! contain `//`, so they cannot be mistaken for a URL and running the
//! normalizer over its own output is a no-op. A single trailing `/` is kept,
//! since it narrows a `list` prefix to one directory.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use url::Url;

use omnistore_common::{Error, Result};

/// Where a backend puts the bucket name in its object URLs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Addressing {
    /// Bucket is part of the host name (`bucket.host/key`).
    #[default]
    VirtualHosted,
    /// Bucket is the first path segment (`host/bucket/key`).
    PathStyle {
        /// Bucket name stripped from URL and rooted inputs.
        bucket: String,
    },
}

impl Addressing {
    /// Path-style addressing for the given bucket.
    pub fn path_style(bucket: impl Into<String>) -> Self {
        Addressing::PathStyle {
            bucket: bucket.into(),
        }
    }

    fn bucket(&self) -> Option<&str> {
        match self {
            Addressing::VirtualHosted => None,
            Addressing::PathStyle { bucket } => Some(bucket.as_str()),
        }
    }
}

/// Reduce `input` to the canonical backend-relative key.
///
/// Empty input yields an empty key, which `list` treats as "everything".
pub fn normalize_key(input: &str, addressing: &Addressing) -> String {
    if let Some(url) = parse_absolute(input) {
        let decoded = percent_decode_str(url.path()).decode_utf8_lossy();
        let path = collapse_slashes(&decoded);
        return strip_bucket(&path, addressing).to_string();
    }

    // A bare key is already relative to the bucket, so only rooted input is
    // checked for a bucket segment.
    let key = collapse_slashes(input);
    if input.starts_with('/') {
        strip_bucket(&key, addressing).to_string()
    } else {
        key
    }
}

/// Drop empty segments, keeping one trailing `/` on a non-empty result.
fn collapse_slashes(path: &str) -> String {
    let mut key = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if !key.is_empty() && path.ends_with('/') {
        key.push('/');
    }
    key
}

/// Whether `input` is an absolute (or scheme-relative) http(s) URL.
pub fn is_absolute_url(input: &str) -> bool {
    parse_absolute(input).is_some()
}

/// Reject keys that cannot name a single object: the empty key and
/// directory-like keys ending in `/`.
pub fn require_key<'a>(key: &'a str, operation: &str) -> Result<&'a str> {
    if key.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} requires a non-empty object key",
            operation
        )));
    }
    if key.ends_with('/') {
        return Err(Error::InvalidInput(format!(
            "{} requires an object key, not a directory: {}",
            operation, key
        )));
    }
    Ok(key)
}

/// Final segment of a canonical key.
pub fn object_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn parse_absolute(input: &str) -> Option<Url> {
    let candidate = if input.starts_with("//") {
        Cow::Owned(format!("https:{}", input))
    } else if has_http_scheme(input) {
        Cow::Borrowed(input)
    } else {
        return None;
    };

    let url = Url::parse(&candidate).ok()?;
    url.host_str()?;
    Some(url)
}

fn has_http_scheme(input: &str) -> bool {
    let head: String = input.chars().take(8).collect::<String>().to_ascii_lowercase();
    head.starts_with("http://") || head.starts_with("https://")
}

fn strip_bucket<'a>(key: &'a str, addressing: &Addressing) -> &'a str {
    let Some(bucket) = addressing.bucket() else {
        return key;
    };

    match key.strip_prefix(bucket) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => key,
    }
}
