use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

use warden_core::error::{PermissionError, Result};
use warden_core::traits::{Permission, PermissionCollection, ALL_KIND};

/// The universal permission: implies every permission of every kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AllPermission;

impl AllPermission {
    pub fn new() -> Self {
        AllPermission
    }
}

impl Permission for AllPermission {
    fn kind(&self) -> &str {
        ALL_KIND
    }

    fn name(&self) -> &str {
        "<all permissions>"
    }

    fn actions(&self) -> Option<&str> {
        Some("<all actions>")
    }

    fn implies(&self, _other: &dyn Permission) -> bool {
        true
    }

    fn new_collection(&self) -> Option<Box<dyn PermissionCollection>> {
        Some(Box::new(AllPermissionCollection::new()))
    }

    fn clone_box(&self) -> Box<dyn Permission> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Collection holding at most one [`AllPermission`]; once it has one it
/// implies everything.
#[derive(Debug, Default)]
pub struct AllPermissionCollection {
    granted: AtomicBool,
    read_only: AtomicBool,
}

impl AllPermissionCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionCollection for AllPermissionCollection {
    fn add(&self, permission: Box<dyn Permission>) -> Result<()> {
        if !permission.is_universal() {
            return Err(PermissionError::InvalidArgument(format!(
                "invalid permission: {}",
                permission
            ))
            .into());
        }
        if self.is_read_only() {
            return Err(PermissionError::ReadOnly(permission.to_string()).into());
        }
        self.granted.store(true, Ordering::Release);
        Ok(())
    }

    fn implies(&self, _permission: &dyn Permission) -> bool {
        self.granted.load(Ordering::Acquire)
    }

    fn elements(&self) -> Vec<Box<dyn Permission>> {
        if self.granted.load(Ordering::Acquire) {
            vec![Box::new(AllPermission)]
        } else {
            Vec::new()
        }
    }

    fn set_read_only(&self) {
        self.read_only.store(true, Ordering::Release);
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilePermission, NamedPermission};

    #[test]
    fn test_implies_everything() {
        let all = AllPermission::new();
        assert!(all.is_universal());
        assert!(all.implies(&NamedPermission::runtime("exitVM.0").unwrap()));
        assert!(all.implies(&FilePermission::read("/etc/passwd").unwrap()));
        assert!(all.implies(&AllPermission));
    }

    #[test]
    fn test_collection() {
        let collection = AllPermissionCollection::new();
        let wanted = NamedPermission::runtime("x").unwrap();
        assert!(!collection.implies(&wanted));
        assert!(collection.is_empty());

        assert!(collection.add(Box::new(wanted.clone())).is_err());
        collection.add(Box::new(AllPermission)).unwrap();
        assert!(collection.implies(&wanted));
        assert_eq!(collection.len(), 1);
    }
}
