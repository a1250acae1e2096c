//! # Warden Permission
//!
//! Concrete permission kinds and the collections that answer implication
//! queries over them.
//!
//! ## Kinds
//!
//! - [`NamedPermission`]: hierarchical dot-separated names with trailing `.*`
//!   wildcards (`runtime`, `security` and any custom kind)
//! - [`PropertyPermission`]: named properties with `read`/`write` actions
//! - [`FilePermission`]: path patterns with file actions
//! - [`AllPermission`]: the universal permission
//! - [`UnresolvedPermission`]: a placeholder for a type not yet registered
//!
//! ## Collections
//!
//! Every kind brings a homogeneous collection. [`Permissions`] holds any mix
//! of kinds, one collection per kind, and resolves placeholders through a
//! [`PermissionRegistry`].
//!
//! ```
//! use warden_core::traits::PermissionCollection;
//! use warden_permission::{FilePermission, NamedPermission, Permissions};
//!
//! let granted = Permissions::new();
//! granted.add(Box::new(NamedPermission::runtime("exitVM.*")?))?;
//! granted.add(Box::new(FilePermission::read("/tmp/*")?))?;
//!
//! assert!(granted.implies(&NamedPermission::runtime("exitVM.0")?));
//! assert!(granted.implies(&FilePermission::read("/tmp/a")?));
//! assert!(!granted.implies(&FilePermission::read("/tmp/a/b")?));
//! # Ok::<(), warden_core::Error>(())
//! ```

pub mod collection;
pub mod model;
pub mod registry;

pub use collection::{Permissions, PermissionsHash};
pub use model::{
    AllPermission, FileActions, FilePermission, NamedPermission, PropertyActions,
    PropertyPermission, UnresolvedPermission, ALL_FILES, FILE_KIND, PROPERTY_KIND, RUNTIME_KIND,
    SECURITY_KIND, UNRESOLVED_KIND,
};
pub use registry::{PermissionRegistry, PermissionType};
