use bitflags::bitflags;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use warden_core::error::{PermissionError, Result};
use warden_core::traits::{Permission, PermissionCollection};

use super::named::{wildcard_ancestors, HierarchicalName};

/// Kind of system property permissions
pub const PROPERTY_KIND: &str = "property";

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Property actions as a bit field
    pub struct PropertyActions: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

impl PropertyActions {
    /// Parses a comma separated action list such as `"read, write"`.
    pub fn parse(actions: &str) -> Result<Self> {
        let mut mask = PropertyActions::empty();
        for action in actions.split(',').map(str::trim) {
            match action.to_lowercase().as_str() {
                "read" => mask |= PropertyActions::READ,
                "write" => mask |= PropertyActions::WRITE,
                "" => {}
                other => {
                    return Err(PermissionError::InvalidArgument(format!(
                        "invalid property action '{}'",
                        other
                    ))
                    .into())
                }
            }
        }
        if mask.is_empty() {
            return Err(
                PermissionError::InvalidArgument("property actions can't be empty".into()).into(),
            );
        }
        Ok(mask)
    }

    /// Canonical action string.
    pub fn canonical(&self) -> String {
        let mut parts = Vec::new();
        if self.contains(PropertyActions::READ) {
            parts.push("read");
        }
        if self.contains(PropertyActions::WRITE) {
            parts.push("write");
        }
        parts.join(",")
    }
}

/// Access to a named system property, with `read` and/or `write` actions.
///
/// Names follow the hierarchical wildcard rules of
/// [`NamedPermission`](super::NamedPermission).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPermission {
    name: HierarchicalName,
    mask: PropertyActions,
    actions: String,
}

impl PropertyPermission {
    pub fn new(name: &str, actions: &str) -> Result<Self> {
        let mask = PropertyActions::parse(actions)?;
        Ok(Self::with_mask(HierarchicalName::parse(PROPERTY_KIND, name)?, mask))
    }

    pub fn read(name: &str) -> Result<Self> {
        Self::new(name, "read")
    }

    fn with_mask(name: HierarchicalName, mask: PropertyActions) -> Self {
        Self {
            name,
            mask,
            actions: mask.canonical(),
        }
    }

    pub fn mask(&self) -> PropertyActions {
        self.mask
    }
}

impl Permission for PropertyPermission {
    fn kind(&self) -> &str {
        PROPERTY_KIND
    }

    fn name(&self) -> &str {
        &self.name.name
    }

    fn actions(&self) -> Option<&str> {
        Some(&self.actions)
    }

    fn implies(&self, other: &dyn Permission) -> bool {
        match other.as_any().downcast_ref::<PropertyPermission>() {
            Some(that) => self.mask.contains(that.mask) && self.name.implies(&that.name),
            None => false,
        }
    }

    fn new_collection(&self) -> Option<Box<dyn PermissionCollection>> {
        Some(Box::new(PropertyPermissionCollection::new()))
    }

    fn clone_box(&self) -> Box<dyn Permission> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct PropertyEntries {
    by_name: HashMap<String, PropertyPermission>,
    order: Vec<String>,
}

/// Collection of [`PropertyPermission`]s.
///
/// Actions granted under the same name are merged on insertion, and a query
/// accumulates the effective mask over `*`, the exact name and the walked-up
/// wildcard names until the requested actions are covered.
#[derive(Debug, Default)]
pub struct PropertyPermissionCollection {
    entries: RwLock<PropertyEntries>,
    read_only: AtomicBool,
}

impl PropertyPermissionCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionCollection for PropertyPermissionCollection {
    fn add(&self, permission: Box<dyn Permission>) -> Result<()> {
        let property = permission
            .as_any()
            .downcast_ref::<PropertyPermission>()
            .ok_or_else(|| {
                PermissionError::InvalidArgument(format!("invalid permission: {}", permission))
            })?;

        if self.is_read_only() {
            return Err(PermissionError::ReadOnly(permission.to_string()).into());
        }

        let mut entries = self.entries.write();
        let key = property.name.name.clone();
        match entries.by_name.get(&key) {
            Some(existing) => {
                let merged = existing.mask | property.mask;
                if merged != existing.mask {
                    let updated = PropertyPermission::with_mask(property.name.clone(), merged);
                    entries.by_name.insert(key, updated);
                }
            }
            None => {
                entries.order.push(key.clone());
                entries.by_name.insert(key, property.clone());
            }
        }
        Ok(())
    }

    fn implies(&self, permission: &dyn Permission) -> bool {
        let Some(wanted) = permission.as_any().downcast_ref::<PropertyPermission>() else {
            return false;
        };

        let entries = self.entries.read();
        let desired = wanted.mask;
        let mut effective = PropertyActions::empty();

        let candidates = std::iter::once("*".to_string())
            .chain(std::iter::once(wanted.name.name.clone()))
            .chain(wildcard_ancestors(&wanted.name.name));

        for candidate in candidates {
            if let Some(found) = entries.by_name.get(&candidate) {
                effective |= found.mask;
                if effective.contains(desired) {
                    return true;
                }
            }
        }

        false
    }

    fn elements(&self) -> Vec<Box<dyn Permission>> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|name| entries.by_name.get(name))
            .map(|p| p.clone_box())
            .collect()
    }

    fn set_read_only(&self) {
        self.read_only.store(true, Ordering::Release);
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.entries.read().order.len()
    }
}
