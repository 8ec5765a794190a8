//! Error types and result aliases.
//!
//! Defines the core `OwsError` enumeration, its HTTP status mapping, and the
//! common `Result` type.

use thiserror::Error;

/// Gateway errors.
///
/// Every variant maps to exactly one HTTP status. The `Display` text is meant for
/// logs; clients only ever see [`OwsError::public_message`].
#[derive(Debug, Error)]
pub enum OwsError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown project or route.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed query parameters or undecipherable transaction body.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Anonymous caller denied by the project access gate.
    #[error("authentication required")]
    Unauthorized,

    /// Denied layer operation or project access.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Buffered request body exceeded the configured cap.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Rendering engine unreachable or the exchange failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Rendering engine did not answer in time.
    #[error("upstream timed out")]
    UpstreamTimeout,

    /// Capability document could not be read or rewritten.
    #[error("rewrite error: {0}")]
    Rewrite(String),

    /// Project metadata could not be loaded.
    #[error("project store error: {0}")]
    Store(String),
}

impl OwsError {
    /// HTTP status surfaced to the client.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::PayloadTooLarge { .. } => 413,
            Self::Upstream(_) => 502,
            Self::UpstreamTimeout => 504,
            Self::Config(_) | Self::Rewrite(_) | Self::Store(_) => 500,
        }
    }

    /// Client-facing message. Never includes filesystem paths or engine addresses.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Unauthorized => "Authentication required".to_string(),
            Self::Forbidden(_) => "Forbidden".to_string(),
            Self::NotFound(_) => "Not Found".to_string(),
            Self::PayloadTooLarge { .. } => "Request body too large".to_string(),
            Self::Upstream(_) => "Bad Gateway".to_string(),
            Self::UpstreamTimeout => "Gateway Timeout".to_string(),
            Self::Config(_) | Self::Rewrite(_) | Self::Store(_) => {
                "Internal Server Error".to_string()
            }
        }
    }
}

/// Result type alias for `OwsError`.
pub type Result<T> = std::result::Result<T, OwsError>;
