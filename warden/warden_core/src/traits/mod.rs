//! Core traits of the Warden engine.
//!
//! These traits are the seams between the permission model and everything
//! that consumes it: collections, trust domains, policies and snapshots all
//! speak in terms of `dyn Permission` and `dyn PermissionCollection`.

pub mod permission;

pub use permission::{Permission, PermissionCollection, PermissionKey, ALL_KIND};
