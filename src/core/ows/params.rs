//! OWS request classification.
//!
//! Extracts `SERVICE` and `REQUEST` from the query string and decides which
//! gateway branch handles the request.

use crate::config::{OwsError, Result};
use url::form_urlencoded;

/// `SERVICE`/`REQUEST` pair of an OWS request. Keys match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwsRequestParams {
    pub service: String,
    pub request: String,
}

/// Gateway branch chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// WMS GetCapabilities: proxy, then rewrite the document.
    Capabilities,
    /// WFS transaction submission: buffer, parse and authorize before proxying.
    Transaction,
    /// Anything else: stream through unmodified.
    Passthrough,
}

impl OwsRequestParams {
    /// Parses the raw query string.
    ///
    /// # Errors
    ///
    /// Returns `OwsError::BadRequest` if `SERVICE` or `REQUEST` is given more
    /// than once with different values, since the engine might honour a
    /// different one than the gateway classified.
    pub fn from_query(query: Option<&str>) -> Result<Self> {
        let mut service: Option<String> = None;
        let mut request: Option<String> = None;

        for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            let slot = if key.eq_ignore_ascii_case("SERVICE") {
                &mut service
            } else if key.eq_ignore_ascii_case("REQUEST") {
                &mut request
            } else {
                continue;
            };

            let value = value.trim();
            if let Some(existing) = slot.as_deref() {
                if !existing.eq_ignore_ascii_case(value) {
                    return Err(OwsError::BadRequest("Invalid query parameters".to_string()));
                }
            } else {
                *slot = Some(value.to_string());
            }
        }

        Ok(Self {
            service: service.unwrap_or_default(),
            request: request.unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn dispatch(&self) -> Dispatch {
        let service = self.service.as_str();
        let request = self.request.as_str();

        if service.eq_ignore_ascii_case("WMS") && request.eq_ignore_ascii_case("GetCapabilities") {
            Dispatch::Capabilities
        } else if service.eq_ignore_ascii_case("WFS")
            && (request.is_empty() || request.eq_ignore_ascii_case("Transaction"))
        {
            Dispatch::Transaction
        } else {
            Dispatch::Passthrough
        }
    }
}
