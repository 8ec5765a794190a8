//! Test utilities and shared fixtures.
//!
//! Common configuration and a seeded project store for unit and integration
//! tests.

use crate::config::{Config, LogFormat};
use crate::features::projects::{
    AccessType, AuthSettings, LayerMeta, LayerPermission, LayerSettings, LayersData,
    MemoryProjectStore, ProjectInfo, ProjectRecord, ProjectRole, ProjectSettings,
    RolePermissions, RoleType,
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Layer ID of `Roads` in [`sample_project`].
pub const ROADS_ID: &str = "roads_8d2c";
/// Layer ID of `Parcels` in [`sample_project`].
pub const PARCELS_ID: &str = "parcels_41af";
/// Layer ID of the remote `Ortho` layer in [`sample_project`].
pub const ORTHO_ID: &str = "ortho_77b0";

/// Creates a standard configuration for testing purposes.
///
/// The engine points at `127.0.0.1:8080/ows/`, projects are published under
/// `/publish`, and the username arrives in `X-Forwarded-User`.
#[must_use]
pub fn create_test_config() -> Arc<Config> {
    Arc::new(Config {
        listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        engine_url: "http://127.0.0.1:8080/ows/".to_string(),
        publish_root: "/publish".to_string(),
        projects_root: PathBuf::from("/publish"),
        identity_header: "X-Forwarded-User".to_string(),
        engine_timeout: Duration::from_secs(5),
        max_transaction_body_size: 64 * 1024,
        auth_realm: "Restricted".to_string(),
        log_format: LogFormat::Pretty,
    })
}

/// Project with three layers:
/// - `Roads`: `bob` may insert only,
/// - `Parcels`: `bob` has full access, signed-in users may update,
/// - `Ortho`: read-only layer backed by the remote service `ortho_url`.
#[must_use]
pub fn sample_project(access: AccessType, ortho_url: &str) -> ProjectRecord {
    let editors = ProjectRole {
        name: "editors".into(),
        kind: RoleType::Users,
        users: vec!["bob".into()],
        permissions: RolePermissions {
            layers: HashMap::from([
                (
                    ROADS_ID.to_string(),
                    LayerPermission {
                        insert: true,
                        update: false,
                        delete: false,
                    },
                ),
                (PARCELS_ID.to_string(), LayerPermission::ALL),
            ]),
        },
    };
    let members = ProjectRole {
        name: "members".into(),
        kind: RoleType::Authenticated,
        users: vec![],
        permissions: RolePermissions {
            layers: HashMap::from([(
                PARCELS_ID.to_string(),
                LayerPermission {
                    insert: false,
                    update: true,
                    delete: false,
                },
            )]),
        },
    };

    let meta = |name: &str| LayerMeta {
        name: name.to_string(),
        source_params: HashMap::new(),
    };
    let mut ortho = meta("Ortho");
    ortho
        .source_params
        .insert("url".to_string(), serde_json::Value::from(ortho_url));

    ProjectRecord {
        info: ProjectInfo {
            state: "published".into(),
            qgis_file: "parks.qgs".into(),
        },
        settings: ProjectSettings {
            auth: AuthSettings {
                access,
                users: vec![],
                roles: vec![editors, members],
            },
            layers: HashMap::from([
                (ROADS_ID.to_string(), LayerSettings::default()),
                (PARCELS_ID.to_string(), LayerSettings::default()),
                (ORTHO_ID.to_string(), LayerSettings::default()),
            ]),
        },
        layers: LayersData::new(HashMap::from([
            (ROADS_ID.to_string(), meta("Roads")),
            (PARCELS_ID.to_string(), meta("Parcels")),
            (ORTHO_ID.to_string(), ortho),
        ])),
    }
}

/// Store holding `alice/parks` (public) and `alice/secret` (private).
#[must_use]
pub fn seeded_store() -> MemoryProjectStore {
    let store = MemoryProjectStore::new();
    store.insert(
        "alice/parks",
        sample_project(AccessType::Public, "http://tiles.example.org/wms"),
    );
    store.insert(
        "alice/secret",
        sample_project(AccessType::Private, "http://tiles.example.org/wms"),
    );
    store
}
