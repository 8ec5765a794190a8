//! Library definitions.
//!
//! Exports the configuration, OWS gateway, proxy service and project store.

pub mod config;
pub mod core;
pub mod features;
pub mod security;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;
pub use config::{Config, LogFormat, OwsError, Result};
pub use core::ows::{CapabilityRewriter, OwsGateway, TransactionAuthorizer};
pub use core::proxy::{EngineClient, EngineTarget, OwsProxy, Upstream};
pub use features::projects::{FsProjectStore, MemoryProjectStore, ProjectStore};
pub use security::{HeaderIdentityResolver, IdentityResolver};
