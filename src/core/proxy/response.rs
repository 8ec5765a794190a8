//! HTTP response utilities.
//!
//! Writes buffered engine responses, plain-text answers and JSON error bodies.

use crate::config::OwsError;
use crate::core::proxy::engine::EngineResponse;
use crate::core::proxy::headers::buffered_response_header;
use bytes::Bytes;
use pingora::Result;
use pingora::http::ResponseHeader;
use pingora::proxy::Session;

/// Writes a fully buffered engine response.
///
/// # Errors
///
/// Returns an error if headers cannot be built or response cannot be written.
pub async fn serve_response(session: &mut Session, response: EngineResponse) -> Result<bool> {
    let header = buffered_response_header(response.status, &response.headers, response.body.len())?;
    session
        .write_response_header(Box::new(header), false)
        .await?;
    session
        .write_response_body(Some(response.body), true)
        .await?;
    Ok(true)
}

/// Serves a short plain-text response.
///
/// # Errors
///
/// Returns an error if headers cannot be built or response cannot be written.
pub async fn serve_text(session: &mut Session, status: u16, body: &'static str) -> Result<bool> {
    let mut header = ResponseHeader::build(status, None)?;
    header.insert_header("Content-Type", "text/plain")?;
    header.insert_header("Content-Length", body.len().to_string())?;
    header.insert_header("Cache-Control", "no-store")?;
    session
        .write_response_header(Box::new(header), false)
        .await?;
    session
        .write_response_body(Some(Bytes::from_static(body.as_bytes())), true)
        .await?;
    Ok(true)
}

/// JSON body of an error response.
#[must_use]
pub fn error_body(err: &OwsError) -> String {
    serde_json::json!({
        "status": err.status(),
        "message": err.public_message(),
    })
    .to_string()
}

/// Builds the header of an error response. `realm` adds a Basic challenge to 401s.
///
/// # Errors
///
/// Returns an error if header insertion fails.
pub fn error_header(err: &OwsError, body_len: usize, realm: Option<&str>) -> Result<ResponseHeader> {
    let mut header = ResponseHeader::build(err.status(), None)?;
    header.insert_header("Content-Type", "application/json")?;
    header.insert_header("Content-Length", body_len.to_string())?;
    header.insert_header("Cache-Control", "no-store")?;
    if let (OwsError::Unauthorized, Some(realm)) = (err, realm) {
        header.insert_header("WWW-Authenticate", format!("Basic realm=\"{realm}\""))?;
    }
    Ok(header)
}

/// Serves `err` as a JSON error response.
///
/// # Errors
///
/// Returns an error if headers cannot be built or response cannot be written.
pub async fn serve_error(session: &mut Session, err: &OwsError, realm: Option<&str>) -> Result<bool> {
    let body = error_body(err);
    let header = error_header(err, body.len(), realm)?;
    session
        .write_response_header(Box::new(header), false)
        .await?;
    session
        .write_response_body(Some(Bytes::from(body)), true)
        .await?;
    Ok(true)
}
