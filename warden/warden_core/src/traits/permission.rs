//! Permission and permission-collection traits.
//!
//! Permissions form a partial order by privilege inclusion: `a.implies(b)`
//! holds when everything `b` grants is also granted by `a`. Implication is only
//! defined between permissions of the same kind, with the single exception of
//! the universal permission (kind [`ALL_KIND`]) which implies everything.

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of the universal permission.
pub const ALL_KIND: &str = "all";

/// Identity triple of a permission: `(kind, name, actions)`.
///
/// Two permissions with the same key are interchangeable. The key is used to
/// deduplicate merged grant lists and to index hash-backed collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    pub kind: String,
    pub name: String,
    pub actions: Option<String>,
}

impl PermissionKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, actions: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            actions,
        }
    }
}

impl Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actions {
            Some(actions) => write!(f, "({} \"{}\" \"{}\")", self.kind, self.name, actions),
            None => write!(f, "({} \"{}\")", self.kind, self.name),
        }
    }
}

/// A typed, named capability, optionally qualified by an action string.
pub trait Permission: Send + Sync + Debug {
    /// The runtime type of this permission. Implication never crosses kinds.
    fn kind(&self) -> &str;

    /// The target name, in canonical form.
    fn name(&self) -> &str;

    /// Canonical action string, if this kind carries actions.
    fn actions(&self) -> Option<&str> {
        None
    }

    /// Returns true if this permission grants everything `other` grants.
    fn implies(&self, other: &dyn Permission) -> bool;

    /// Type-supplied collection for permissions of this kind.
    ///
    /// Kinds that return `None` are stored in a generic hash-backed collection.
    fn new_collection(&self) -> Option<Box<dyn PermissionCollection>> {
        None
    }

    /// Returns true for the universal permission.
    fn is_universal(&self) -> bool {
        self.kind() == ALL_KIND
    }

    /// The identity triple of this permission.
    fn key(&self) -> PermissionKey {
        PermissionKey::new(self.kind(), self.name(), self.actions().map(str::to_string))
    }

    /// Clones this permission (since dyn Trait cannot implement Clone directly)
    fn clone_box(&self) -> Box<dyn Permission>;

    /// Convert to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn Permission> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl<'a> PartialEq for dyn Permission + 'a {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
            && self.name() == other.name()
            && self.actions() == other.actions()
    }
}

impl<'a> Eq for dyn Permission + 'a {}

impl<'a> Hash for dyn Permission + 'a {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.name().hash(state);
        self.actions().hash(state);
    }
}

impl<'a> Display for dyn Permission + 'a {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actions() {
            Some(actions) => write!(f, "({} \"{}\" \"{}\")", self.kind(), self.name(), actions),
            None => write!(f, "({} \"{}\")", self.kind(), self.name()),
        }
    }
}

/// An aggregate of permissions that answers implication queries.
///
/// Collections use interior mutability: `add` is serialized per instance and
/// a frozen (read-only) collection rejects further additions.
pub trait PermissionCollection: Send + Sync + Debug {
    /// Adds a permission. Fails if the collection is read-only or the
    /// permission does not belong in it.
    fn add(&self, permission: Box<dyn Permission>) -> Result<()>;

    /// Returns true if any combination of the members implies `permission`.
    fn implies(&self, permission: &dyn Permission) -> bool;

    /// Snapshot of the members.
    fn elements(&self) -> Vec<Box<dyn Permission>>;

    /// Freezes the collection.
    fn set_read_only(&self);

    fn is_read_only(&self) -> bool;

    fn len(&self) -> usize {
        self.elements().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
