//! Layer permission resolution and project access checks.
//!
//! Both are pure functions of a loaded `ProjectSettings` snapshot.

use crate::features::projects::{AccessType, LayerPermission, ProjectRole, ProjectSettings, RoleType};
use crate::security::identity::Identity;

/// Resolves effective layer permissions from one settings snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PermissionResolver<'a> {
    settings: &'a ProjectSettings,
}

impl<'a> PermissionResolver<'a> {
    #[must_use]
    pub const fn new(settings: &'a ProjectSettings) -> Self {
        Self { settings }
    }

    /// Effective permission of `identity` on the layer `layer_id`.
    ///
    /// Unknown layer IDs (including the empty ID used for unresolvable names)
    /// resolve to [`LayerPermission::DENY`].
    #[must_use]
    pub fn resolve(&self, identity: &Identity, layer_id: &str) -> LayerPermission {
        let Some(layer) = self.settings.layers.get(layer_id) else {
            return LayerPermission::DENY;
        };

        let roles = &self.settings.auth.roles;
        if roles.is_empty() {
            return layer.flag_permission();
        }

        roles
            .iter()
            .filter(|role| role_applies(role, identity))
            .filter_map(|role| role.permissions.layers.get(layer_id).copied())
            .fold(LayerPermission::DENY, LayerPermission::union)
    }
}

fn role_applies(role: &ProjectRole, identity: &Identity) -> bool {
    match role.kind {
        RoleType::Anonymous => true,
        RoleType::Authenticated => identity.is_authenticated(),
        RoleType::Users => identity
            .username()
            .is_some_and(|name| role.users.iter().any(|u| u == name)),
    }
}

/// Outcome of the project-level access gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    /// Caller is anonymous; credentials may help.
    Unauthenticated,
    Denied,
}

/// Checks whether `identity` may use the project `owner/...` at all.
#[must_use]
pub fn check_project_access(
    settings: &ProjectSettings,
    owner: &str,
    identity: &Identity,
) -> AccessDecision {
    let username = identity.username();
    if username == Some(owner) {
        return AccessDecision::Granted;
    }

    let granted = match settings.auth.access {
        AccessType::Public => true,
        AccessType::Authenticated => identity.is_authenticated(),
        AccessType::Users => {
            username.is_some_and(|name| settings.auth.users.iter().any(|u| u == name))
        }
        AccessType::Private => false,
    };

    if granted {
        AccessDecision::Granted
    } else if identity.is_authenticated() {
        AccessDecision::Denied
    } else {
        AccessDecision::Unauthenticated
    }
}
