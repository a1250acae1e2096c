//! # Warden Core
//!
//! `warden_core` provides the building blocks of the Warden stack-based
//! authorization engine: the error taxonomy, identifier types, the
//! [`Permission`] and [`PermissionCollection`] traits, configuration and the
//! security debug categories.
//!
//! ## Model
//!
//! A sensitive operation runs on behalf of a chain of mutually-distrusting
//! code units (trust domains). The operation may proceed only if every domain
//! in the chain implies the required permission:
//!
//! ```text
//! permit(p) := for all d in chain: d.implies(p)  and  scope.within(p)
//! ```
//!
//! Permissions form a partial order by privilege inclusion; collections answer
//! implication queries over many permissions at once.
//!
//! ## Crate Structure
//!
//! - **error**: Error types for all Warden components
//! - **id**: Strongly-typed identifier types
//! - **traits**: Permission and collection interfaces
//! - **utils**: Configuration and debug categories
//! - **macros**: Debug and guard macros

pub mod error;
pub mod id;
pub mod macros;
pub mod traits;
pub mod utils;

#[doc(hidden)]
pub use tracing as __tracing;

pub use error::{AccessError, ConfigError, Error, PermissionError, PolicyError, Result};
pub use id::{DomainId, EngineId};
pub use traits::{Permission, PermissionCollection, PermissionKey, ALL_KIND};
pub use utils::{DebugFlags, SecurityConfig};
