//! WMS capability document rewriting.
//!
//! The engine advertises its own address, including the internal `MAP` file
//! path, in every `xlink:href` of a GetCapabilities document. Each such
//! reference is rebuilt on the public OWS path with `MAP` removed. Bytes outside
//! the matched attributes pass through untouched.

use crate::config::OwsError;
use quick_xml::escape::{escape, unescape};
use regex::bytes::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use url::Url;

const HREF_PATTERN: &str = r#"xlink:href="((?i:https?)://[^"]+MAP=[^"]+)""#;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("service reference is not valid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("invalid service reference {href:?}: {source}")]
    Url {
        href: String,
        #[source]
        source: url::ParseError,
    },

    #[error("cannot rewrite {0}-encoded document")]
    ContentEncoding(String),
}

impl From<RewriteError> for OwsError {
    fn from(err: RewriteError) -> Self {
        Self::Rewrite(err.to_string())
    }
}

/// Rewrites engine service references in capability documents.
#[derive(Debug, Clone)]
pub struct CapabilityRewriter {
    href: Regex,
}

impl Default for CapabilityRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRewriter {
    /// # Panics
    ///
    /// Panics if the built-in reference pattern fails to compile (compile-time invariant).
    #[must_use]
    pub fn new() -> Self {
        Self {
            href: Regex::new(HREF_PATTERN).expect("Failed to build capability href pattern"),
        }
    }

    /// Rewrites every engine reference in `body` onto `ows_path`.
    ///
    /// Returns the input unchanged (borrowed) when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `RewriteError` if a matched reference cannot be decoded as a URL.
    pub fn rewrite<'a>(&self, body: &'a [u8], ows_path: &str) -> Result<Cow<'a, [u8]>, RewriteError> {
        let mut rewritten: HashMap<&[u8], String> = HashMap::new();
        for caps in self.href.captures_iter(body) {
            let Some(value) = caps.get(1) else { continue };
            let value = value.as_bytes();
            if !rewritten.contains_key(value) {
                rewritten.insert(value, rewrite_href(value, ows_path)?);
            }
        }

        if rewritten.is_empty() {
            return Ok(Cow::Borrowed(body));
        }
        debug!(references = rewritten.len(), "Rewriting capability references");

        Ok(self.href.replace_all(body, |caps: &Captures<'_>| {
            let mut out = b"xlink:href=\"".to_vec();
            match caps.get(1).and_then(|v| rewritten.get(v.as_bytes())) {
                Some(href) => out.extend_from_slice(href.as_bytes()),
                None => out.extend_from_slice(&caps[1]),
            }
            out.push(b'"');
            out
        }))
    }
}

/// Rebuilds one escaped attribute value: same scheme and host, public path,
/// remaining parameters sorted by key, `MAP` removed.
fn rewrite_href(raw: &[u8], ows_path: &str) -> Result<String, RewriteError> {
    let raw = std::str::from_utf8(raw)?;
    // Values the XML unescaper rejects are taken literally.
    let unescaped = unescape(raw).unwrap_or(Cow::Borrowed(raw));
    let mut url = Url::parse(&unescaped).map_err(|source| RewriteError::Url {
        href: raw.to_string(),
        source,
    })?;

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.eq_ignore_ascii_case("MAP"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));

    url.set_path(ows_path);
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params);
    }

    Ok(escape(url.as_str()).into_owned())
}

/// Rejects bodies the rewriter cannot see into.
///
/// # Errors
///
/// Returns `RewriteError::ContentEncoding` for any encoding other than identity.
pub fn ensure_identity_encoding(content_encoding: Option<&str>) -> Result<(), RewriteError> {
    match content_encoding.map(str::trim) {
        None | Some("") => Ok(()),
        Some(enc) if enc.eq_ignore_ascii_case("identity") => Ok(()),
        Some(enc) => Err(RewriteError::ContentEncoding(enc.to_string())),
    }
}
