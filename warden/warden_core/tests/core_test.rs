//! Integration tests for the core contracts.
//!
//! A permission kind and collection defined outside the crate, the way a
//! downstream crate would, exercised through the guard macro and the error
//! taxonomy.

use std::any::Any;

use parking_lot::RwLock;
use warden_core::error::{Error, PermissionError, Result};
use warden_core::traits::{Permission, PermissionCollection, PermissionKey};
use warden_core::utils::logging;
use warden_core::{ensure_implied, DebugFlags, SecurityConfig};

/// A permission naming a single queue, or every queue with `*`.
#[derive(Debug, Clone)]
struct QueuePermission(String);

impl Permission for QueuePermission {
    fn kind(&self) -> &str {
        "queue"
    }

    fn name(&self) -> &str {
        &self.0
    }

    fn implies(&self, other: &dyn Permission) -> bool {
        other.kind() == self.kind() && (self.0 == "*" || other.name() == self.0)
    }

    fn clone_box(&self) -> Box<dyn Permission> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct QueueCollection {
    members: RwLock<Vec<Box<dyn Permission>>>,
    read_only: RwLock<bool>,
}

impl PermissionCollection for QueueCollection {
    fn add(&self, permission: Box<dyn Permission>) -> Result<()> {
        if *self.read_only.read() {
            return Err(PermissionError::ReadOnly(permission.key().to_string()).into());
        }
        if permission.kind() != "queue" {
            return Err(PermissionError::InvalidArgument(permission.key().to_string()).into());
        }
        self.members.write().push(permission);
        Ok(())
    }

    fn implies(&self, permission: &dyn Permission) -> bool {
        self.members.read().iter().any(|p| p.implies(permission))
    }

    fn elements(&self) -> Vec<Box<dyn Permission>> {
        self.members.read().clone()
    }

    fn set_read_only(&self) {
        *self.read_only.write() = true;
    }

    fn is_read_only(&self) -> bool {
        *self.read_only.read()
    }
}

fn publish(grants: &dyn PermissionCollection, queue: &str) -> Result<String> {
    let wanted = QueuePermission(queue.to_string());
    ensure_implied!(grants, &wanted);
    Ok(format!("published to {}", queue))
}

#[test]
fn test_guard_macro_with_custom_kind() {
    let grants = QueueCollection::default();
    grants.add(Box::new(QueuePermission("orders".to_string()))).unwrap();

    assert_eq!(publish(&grants, "orders").unwrap(), "published to orders");

    let err = publish(&grants, "billing").unwrap_err();
    assert!(err.is_denied());
    assert_eq!(err.denied_domain(), None);
    assert_eq!(
        err.denied_permission().map(|p| p.key()),
        Some(PermissionKey::new("queue", "billing", None))
    );
    assert_eq!(err.to_string(), "access denied (queue \"billing\")");
}

#[test]
fn test_frozen_collection_rejects_additions() {
    let grants = QueueCollection::default();
    grants.add(Box::new(QueuePermission("*".to_string()))).unwrap();
    grants.set_read_only();

    let err = grants
        .add(Box::new(QueuePermission("late".to_string())))
        .unwrap_err();
    assert!(matches!(err, Error::Permission(PermissionError::ReadOnly(_))));
    assert_eq!(grants.len(), 1);
    assert!(publish(&grants, "anything").is_ok());
}

#[test]
fn test_config_drives_debug_categories() {
    let config = SecurityConfig::from_toml(
        r#"
        [debug]
        flags = ["access", "failure"]
        "#,
    )
    .unwrap();

    config.apply_debug().unwrap();
    assert!(logging::enabled(DebugFlags::FAILURE));
    assert!(!logging::enabled(DebugFlags::SCOPE));

    logging::set_debug_flags(DebugFlags::empty());
    assert!(!logging::enabled(DebugFlags::all()));
}
