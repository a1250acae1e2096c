//! Concrete permission kinds.

mod all;
mod file;
mod named;
mod property;
mod unresolved;

pub use all::{AllPermission, AllPermissionCollection};
pub use file::{FileActions, FilePermission, FilePermissionCollection, ALL_FILES, FILE_KIND};
pub use named::{NamedPermission, NamedPermissionCollection, RUNTIME_KIND, SECURITY_KIND};
pub use property::{
    PropertyActions, PropertyPermission, PropertyPermissionCollection, PROPERTY_KIND,
};
pub use unresolved::{UnresolvedPermission, UNRESOLVED_KIND};
