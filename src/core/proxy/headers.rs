//! Response header handling.
//!
//! Strips engine-identifying and hop-by-hop headers and builds the headers of
//! fully buffered responses.

use http::HeaderMap;
use http::header::CONTENT_LENGTH;
use pingora::Result;
use pingora::http::ResponseHeader;

/// Connection-scoped headers that never cross the proxy.
pub const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers that reveal the rendering engine.
const ENGINE_HEADERS: [&str; 3] = ["server", "x-powered-by", "via"];

/// Removes engine-identifying headers from a proxied response.
pub fn strip_engine_headers(upstream_response: &mut ResponseHeader) {
    for name in ENGINE_HEADERS {
        upstream_response.remove_header(name);
    }
}

/// Removes hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn is_dropped(name: &str) -> bool {
    HOP_BY_HOP.contains(&name) || ENGINE_HEADERS.contains(&name) || name == "content-length"
}

/// Builds the response header for a buffered body of `body_len` bytes.
///
/// Engine headers are copied except connection-scoped and engine-identifying
/// ones; `Content-Length` always matches the body actually sent.
///
/// # Errors
///
/// Returns an error if the status is invalid or a header cannot be inserted.
pub fn buffered_response_header(
    status: u16,
    headers: &HeaderMap,
    body_len: usize,
) -> Result<ResponseHeader> {
    let mut header = ResponseHeader::build(status, Some(headers.len() + 1))?;
    for (name, value) in headers {
        if is_dropped(name.as_str()) {
            continue;
        }
        header.append_header(name.clone(), value.clone())?;
    }
    header.insert_header(CONTENT_LENGTH, body_len.to_string())?;
    Ok(header)
}
