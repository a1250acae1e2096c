//! Permission collections that span kinds.

mod hashed;
mod permissions;

pub use hashed::PermissionsHash;
pub use permissions::Permissions;
