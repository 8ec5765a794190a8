//! Outbound request direction.
//!
//! Points a client request at the rendering engine: engine path, internal
//! `MAP` parameter, no cookies, no identity header.

use crate::core::proxy::engine::EngineTarget;
use http::header::{ACCEPT_ENCODING, COOKIE, HeaderName, USER_AGENT};
use http::Uri;
use pingora::http::RequestHeader;
use pingora::{Error, ErrorType, Result};
use url::form_urlencoded;

/// Marker header carrying the public OWS path of a capability fetch.
pub const OWS_URL_HEADER: &str = "X-Ows-Url";

/// Stateless request rewriter shared by all requests.
#[derive(Debug, Clone)]
pub struct Director {
    engine_path: String,
    publish_root: String,
    identity_header: Option<HeaderName>,
}

impl Director {
    #[must_use]
    pub fn new(engine: &EngineTarget, publish_root: &str, identity_header: Option<HeaderName>) -> Self {
        Self {
            engine_path: engine.path.clone(),
            publish_root: publish_root.trim_end_matches('/').to_string(),
            identity_header,
        }
    }

    /// Internal project file path: `<publish-root>/<user>/<project>/<file>`.
    #[must_use]
    pub fn map_path(&self, project: &str, qgis_file: &str) -> String {
        format!("{}/{project}/{qgis_file}", self.publish_root)
    }

    /// Rewrites `req` in place to target the engine with `MAP=map_path`.
    ///
    /// The query string is kept as sent, minus any client `MAP` parameter.
    /// The `Host` header is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting URI or a header value is invalid.
    pub fn direct(&self, req: &mut RequestHeader, map_path: &str) -> Result<()> {
        let query = directed_query(req.uri.query(), map_path);
        let uri: Uri = format!("{}?{query}", self.engine_path)
            .parse()
            .map_err(|e| Error::explain(ErrorType::InvalidHTTPHeader, format!("engine URI: {e}")))?;
        req.set_uri(uri);

        req.remove_header(&COOKIE);
        if let Some(name) = &self.identity_header {
            req.remove_header(name);
        }
        if req.headers.get(USER_AGENT).is_none() {
            req.insert_header(USER_AGENT, "")?;
        }
        Ok(())
    }

    /// Marks a capability fetch with the public OWS path and asks the engine
    /// for an unencoded body so it can be rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if `ows_path` is not a valid header value.
    pub fn mark_capabilities(req: &mut RequestHeader, ows_path: &str) -> Result<()> {
        req.insert_header(OWS_URL_HEADER, ows_path)?;
        req.remove_header(&ACCEPT_ENCODING);
        Ok(())
    }
}

/// Raw query segments without `MAP` (any case), followed by the internal `MAP`.
fn directed_query(query: Option<&str>, map_path: &str) -> String {
    let mut segments: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|segment| !segment.is_empty() && !is_map_segment(segment))
        .collect();

    let map = format!(
        "MAP={}",
        form_urlencoded::byte_serialize(map_path.as_bytes()).collect::<String>()
    );
    segments.push(&map);
    segments.join("&")
}

fn is_map_segment(segment: &str) -> bool {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .is_some_and(|(key, _)| key.trim().eq_ignore_ascii_case("MAP"))
}
