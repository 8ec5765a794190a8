//! Security enforcement modules.
//!
//! Identity resolution, project access checks and per-layer permissions.

pub mod identity;
pub mod permissions;

pub use identity::{HeaderIdentityResolver, Identity, IdentityResolver};
pub use permissions::{AccessDecision, PermissionResolver, check_project_access};
