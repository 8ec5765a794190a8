//! Requesting identity.
//!
//! Authentication happens in front of the gateway; the authenticated username
//! arrives in a trusted header.

use crate::config::{OwsError, Result};
use http::HeaderMap;
use http::header::HeaderName;

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User { username: String },
}

impl Identity {
    #[must_use]
    pub fn user(username: impl Into<String>) -> Self {
        Self::User {
            username: username.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User { username } => Some(username),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

/// Resolves the identity behind a request.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Identity;

    /// Header that carries identity state and must not reach the engine.
    fn header_name(&self) -> Option<&HeaderName> {
        None
    }
}

/// Reads the username from a header set by the authenticating front end.
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    header: HeaderName,
}

impl HeaderIdentityResolver {
    /// # Errors
    ///
    /// Returns `OwsError::Config` if `header` is not a valid header name.
    pub fn new(header: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| OwsError::Config(format!("invalid identity header {header:?}: {e}")))?;
        Ok(Self { header })
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Identity {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or(Identity::Anonymous, Identity::user)
    }

    fn header_name(&self) -> Option<&HeaderName> {
        Some(&self.header)
    }
}
