//! Project metadata types.
//!
//! Mirrors the JSON documents the publishing system keeps next to each project.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Basic project record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub state: String,
    /// Project definition file name, relative to the project directory.
    pub qgis_file: String,
}

/// Per (user, layer) write capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LayerPermission {
    #[serde(default)]
    pub insert: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
}

impl LayerPermission {
    /// Denies every operation.
    pub const DENY: Self = Self {
        insert: false,
        update: false,
        delete: false,
    };

    /// Grants every operation.
    pub const ALL: Self = Self {
        insert: true,
        update: true,
        delete: true,
    };

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            insert: self.insert || other.insert,
            update: self.update || other.update,
            delete: self.delete || other.delete,
        }
    }
}

/// Who may use the project's OWS endpoint at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Public,
    Authenticated,
    Users,
    #[default]
    Private,
}

/// Which identities a role applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    Anonymous,
    Authenticated,
    Users,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RolePermissions {
    #[serde(default)]
    pub layers: HashMap<String, LayerPermission>,
}

/// Named access-control role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProjectRole {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RoleType,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub permissions: RolePermissions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthSettings {
    #[serde(rename = "type", default)]
    pub access: AccessType,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub roles: Vec<ProjectRole>,
}

/// Layer-level settings. `flags` lists editing capabilities granted when no
/// roles are configured: `insert`, `update`, `delete`, or `edit` for all three.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LayerSettings {
    #[serde(default)]
    pub flags: Vec<String>,
}

impl LayerSettings {
    #[must_use]
    pub fn flag_permission(&self) -> LayerPermission {
        self.flags
            .iter()
            .fold(LayerPermission::DENY, |perm, flag| match flag.as_str() {
                "edit" => LayerPermission::ALL,
                "insert" => LayerPermission {
                    insert: true,
                    ..perm
                },
                "update" => LayerPermission {
                    update: true,
                    ..perm
                },
                "delete" => LayerPermission {
                    delete: true,
                    ..perm
                },
                _ => perm,
            })
    }
}

/// Access-control settings snapshot of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProjectSettings {
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub layers: HashMap<String, LayerSettings>,
}

/// Layer entry of the project's QGIS metadata.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LayerMeta {
    pub name: String,
    #[serde(default)]
    pub source_params: HashMap<String, serde_json::Value>,
}

impl LayerMeta {
    /// Remote source URL of the layer, if it has one.
    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        self.source_params
            .get("url")
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Layer metadata of one project, keyed by layer ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayersData {
    pub layers: HashMap<String, LayerMeta>,
    pub layer_name_to_id: HashMap<String, String>,
}

impl LayersData {
    /// Builds the name index. A name shared by several layers is left out of
    /// it, so lookups by that name find nothing.
    #[must_use]
    pub fn new(layers: HashMap<String, LayerMeta>) -> Self {
        let mut layer_name_to_id = HashMap::with_capacity(layers.len());
        let mut ambiguous = HashSet::new();
        for (id, meta) in &layers {
            if ambiguous.contains(&meta.name) {
                continue;
            }
            if layer_name_to_id
                .insert(meta.name.clone(), id.clone())
                .is_some()
            {
                layer_name_to_id.remove(&meta.name);
                ambiguous.insert(meta.name.clone());
            }
        }
        Self {
            layers,
            layer_name_to_id,
        }
    }

    #[must_use]
    pub fn layer_id(&self, name: &str) -> Option<&str> {
        self.layer_name_to_id.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&LayerMeta> {
        self.layer_id(name).and_then(|id| self.layers.get(id))
    }
}
