use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use warden_core::error::{PermissionError, Result};
use warden_core::traits::{Permission, PermissionCollection};

use super::PermissionsHash;
use crate::model::UnresolvedPermission;
use crate::registry::{self, PermissionRegistry, PermissionType};

#[derive(Debug, Default)]
struct Buckets {
    by_kind: HashMap<String, Box<dyn PermissionCollection>>,
    order: Vec<String>,
    /// Placeholders waiting for their type, by type name
    unresolved: BTreeMap<String, Vec<UnresolvedPermission>>,
}

/// A heterogeneous set of permissions.
///
/// Members are routed to one collection per kind, created on first use from
/// the permission's own [`Permission::new_collection`] or a
/// [`PermissionsHash`] fallback. Placeholders are kept aside until their type
/// is registered in the set's [`PermissionRegistry`], and are materialized
/// when a bucket of their kind is created or queried.
#[derive(Debug)]
pub struct Permissions {
    buckets: RwLock<Buckets>,
    all_allowed: AtomicBool,
    read_only: AtomicBool,
    registry: Arc<PermissionRegistry>,
}

impl Default for Permissions {
    fn default() -> Self {
        Self::new()
    }
}

impl Permissions {
    /// Creates an empty set resolving placeholders against the global registry.
    pub fn new() -> Self {
        Self::with_registry(registry::global())
    }

    pub fn with_registry(registry: Arc<PermissionRegistry>) -> Self {
        Self {
            buckets: RwLock::new(Buckets::default()),
            all_allowed: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
            registry,
        }
    }

    /// Builds a set from a list of permissions.
    pub fn from_permissions<I>(permissions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Box<dyn Permission>>,
    {
        let set = Self::new();
        for permission in permissions {
            set.add(permission)?;
        }
        Ok(set)
    }

    /// Returns true once the universal permission has been added.
    pub fn grants_all(&self) -> bool {
        self.all_allowed.load(Ordering::Relaxed)
    }

    /// Kinds with a bucket, in creation order.
    pub fn kinds(&self) -> Vec<String> {
        self.buckets.read().order.clone()
    }

    /// Number of placeholders still waiting for their type.
    pub fn pending(&self) -> usize {
        self.buckets.read().unresolved.values().map(Vec::len).sum()
    }

    /// Takes the placeholders of `kind` out of the side-table.
    ///
    /// Placeholders of an unregistered kind stay pending.
    fn take_pending(&self, kind: &str) -> Option<(PermissionType, Vec<UnresolvedPermission>)> {
        let ty = self.registry.get(kind)?;
        let pending = self.buckets.write().unresolved.remove(kind)?;
        Some((ty, pending))
    }

    /// Resolves the pending placeholders of `kind` and places the results.
    ///
    /// Factories run with no lock held, so they may query this set. A
    /// placeholder that fails to resolve is dropped without affecting its
    /// siblings.
    fn flush_pending(&self, kind: &str) {
        let Some((ty, pending)) = self.take_pending(kind) else {
            return;
        };

        let resolved: Vec<Box<dyn Permission>> = pending
            .into_iter()
            .filter_map(|placeholder| match placeholder.resolve(&ty) {
                Ok(permission) => Some(permission),
                Err(e) => {
                    debug!("Discarding {}: {}", placeholder, e);
                    None
                }
            })
            .collect();

        let mut buckets = self.buckets.write();
        for permission in resolved {
            if let Err(e) = self.place(&mut buckets, permission) {
                debug!("Discarding resolved permission: {}", e);
            }
        }
    }

    /// Routes a concrete permission to its bucket, creating the bucket if needed.
    fn place(&self, buckets: &mut Buckets, permission: Box<dyn Permission>) -> Result<()> {
        let kind = permission.kind().to_string();
        let universal = permission.is_universal();

        if let Some(bucket) = buckets.by_kind.get(&kind) {
            bucket.add(permission)?;
        } else {
            let bucket = permission
                .new_collection()
                .unwrap_or_else(|| Box::new(PermissionsHash::new()));
            bucket.add(permission)?;
            buckets.order.push(kind.clone());
            buckets.by_kind.insert(kind, bucket);
        }

        if universal {
            self.all_allowed.store(true, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl PermissionCollection for Permissions {
    fn add(&self, permission: Box<dyn Permission>) -> Result<()> {
        if self.is_read_only() {
            return Err(PermissionError::ReadOnly(permission.to_string()).into());
        }

        if let Some(placeholder) = permission.as_any().downcast_ref::<UnresolvedPermission>() {
            self.buckets
                .write()
                .unresolved
                .entry(placeholder.type_name().to_string())
                .or_default()
                .push(placeholder.clone());
            return Ok(());
        }

        // Pending placeholders of a new kind go in first.
        if !self.buckets.read().by_kind.contains_key(permission.kind()) {
            self.flush_pending(permission.kind());
        }

        let mut buckets = self.buckets.write();
        self.place(&mut buckets, permission)
    }

    fn implies(&self, permission: &dyn Permission) -> bool {
        if self.grants_all() {
            return true;
        }

        let kind = permission.kind();
        let has_pending = self.buckets.read().unresolved.contains_key(kind);
        if has_pending {
            self.flush_pending(kind);
            if self.grants_all() {
                return true;
            }
        }

        self.buckets
            .read()
            .by_kind
            .get(kind)
            .map_or(false, |bucket| bucket.implies(permission))
    }

    fn elements(&self) -> Vec<Box<dyn Permission>> {
        let buckets = self.buckets.read();
        let mut elements: Vec<Box<dyn Permission>> = buckets
            .order
            .iter()
            .filter_map(|kind| buckets.by_kind.get(kind))
            .flat_map(|bucket| bucket.elements())
            .collect();
        elements.extend(
            buckets
                .unresolved
                .values()
                .flatten()
                .map(|placeholder| placeholder.clone_box()),
        );
        elements
    }

    fn set_read_only(&self) {
        self.read_only.store(true, Ordering::Release);
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        let buckets = self.buckets.read();
        buckets.by_kind.values().map(|b| b.len()).sum::<usize>()
            + buckets.unresolved.values().map(Vec::len).sum::<usize>()
    }
}
