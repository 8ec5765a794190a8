//! WFS transaction authorization.
//!
//! Every layer referenced by a transaction must grant the matching capability
//! to the caller. Checks run updates (replaces included) first, then inserts,
//! then deletes, each in document order, and stop at the first denial.

use crate::config::{OwsError, Result};
use crate::core::ows::transaction::{WfsTransaction, layer_local_name};
use crate::features::projects::{LayerPermission, LayersData, ProjectSettings};
use crate::security::{Identity, PermissionResolver};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Update,
    Insert,
    Delete,
}

impl WriteOp {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Insert => "insert",
            Self::Delete => "delete",
        }
    }

    const fn allowed(self, perm: LayerPermission) -> bool {
        match self {
            Self::Update => perm.update,
            Self::Insert => perm.insert,
            Self::Delete => perm.delete,
        }
    }
}

/// Authorizes the operations of one request. The permission cache lives as
/// long as the authorizer, so build one per request.
pub struct TransactionAuthorizer<'a> {
    resolver: PermissionResolver<'a>,
    layers: &'a LayersData,
    identity: &'a Identity,
    cache: HashMap<String, LayerPermission>,
}

impl<'a> TransactionAuthorizer<'a> {
    #[must_use]
    pub fn new(settings: &'a ProjectSettings, layers: &'a LayersData, identity: &'a Identity) -> Self {
        Self {
            resolver: PermissionResolver::new(settings),
            layers,
            identity,
            cache: HashMap::new(),
        }
    }

    /// Effective permission on the layer named by `type_name`, which may carry
    /// a namespace prefix. Names without a layer resolve to a denial.
    pub fn permission(&mut self, type_name: &str) -> LayerPermission {
        let layers = self.layers;
        let layer_id = layers
            .layer_id(layer_local_name(type_name))
            .unwrap_or_default();
        if let Some(perm) = self.cache.get(layer_id) {
            return *perm;
        }
        let perm = self.resolver.resolve(self.identity, layer_id);
        self.cache.insert(layer_id.to_string(), perm);
        perm
    }

    /// Checks the whole transaction.
    ///
    /// # Errors
    ///
    /// Returns `OwsError::Forbidden` naming the first denied operation.
    pub fn authorize(&mut self, tx: &WfsTransaction) -> Result<()> {
        for name in tx.updates() {
            self.check(WriteOp::Update, name)?;
        }
        for name in tx.inserts() {
            self.check(WriteOp::Insert, name)?;
        }
        for name in tx.deletes() {
            self.check(WriteOp::Delete, name)?;
        }
        Ok(())
    }

    fn check(&mut self, op: WriteOp, type_name: &str) -> Result<()> {
        if op.allowed(self.permission(type_name)) {
            return Ok(());
        }
        let layer = layer_local_name(type_name);
        warn!(
            layer,
            operation = op.as_str(),
            user = self.identity.username().unwrap_or("anonymous"),
            "Transaction denied"
        );
        Err(OwsError::Forbidden(format!(
            "{} not permitted on layer {layer:?}",
            op.as_str()
        )))
    }
}
