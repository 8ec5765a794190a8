//! Project metadata collaborator.
//!
//! Types describing published projects and the store they are loaded from.

pub mod model;
mod store;

pub use model::{
    AccessType, AuthSettings, LayerMeta, LayerPermission, LayerSettings, LayersData,
    ProjectInfo, ProjectRole, ProjectSettings, RolePermissions, RoleType,
};
pub use store::{FsProjectStore, MemoryProjectStore, ProjectRecord, ProjectStore, StoreError};
