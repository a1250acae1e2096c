use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use warden_core::error::{PermissionError, Result};
use warden_core::traits::{Permission, PermissionCollection, PermissionKey};

#[derive(Debug, Default)]
struct HashedEntries {
    by_key: HashMap<PermissionKey, Box<dyn Permission>>,
    order: Vec<PermissionKey>,
}

/// Generic collection for kinds that bring no collection of their own.
///
/// A query is an exact key lookup, then a scan asking every member.
#[derive(Debug, Default)]
pub struct PermissionsHash {
    entries: RwLock<HashedEntries>,
    read_only: AtomicBool,
}

impl PermissionsHash {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionCollection for PermissionsHash {
    fn add(&self, permission: Box<dyn Permission>) -> Result<()> {
        if self.is_read_only() {
            return Err(PermissionError::ReadOnly(permission.to_string()).into());
        }

        let key = permission.key();
        let mut entries = self.entries.write();
        if !entries.by_key.contains_key(&key) {
            entries.order.push(key.clone());
            entries.by_key.insert(key, permission);
        }
        Ok(())
    }

    fn implies(&self, permission: &dyn Permission) -> bool {
        let entries = self.entries.read();
        if let Some(found) = entries.by_key.get(&permission.key()) {
            if found.implies(permission) {
                return true;
            }
        }
        entries.by_key.values().any(|p| p.implies(permission))
    }

    fn elements(&self) -> Vec<Box<dyn Permission>> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|key| entries.by_key.get(key))
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
