//! # Warden Context
//!
//! Stack-based authorization over explicit call chains.
//!
//! A [`CallChain`] lists the trust domains of the code an operation runs on
//! behalf of. The [`AccessController`] captures it into an [`AccessSnapshot`]
//! and permits the operation only if every domain implies the required
//! permission. Privileged blocks cut the walk short at their caller, limited
//! ones only for a bound set of permissions, and [`DomainCombiner`]s let a
//! context rewrite the domains captured under it.
//!
//! ```
//! use std::sync::Arc;
//! use warden_core::traits::PermissionCollection;
//! use warden_permission::{NamedPermission, Permissions};
//! use warden_policy::{CodeSource, GrantPolicy, PolicyHandle, TrustDomain};
//! use warden_context::{AccessController, CallChain};
//!
//! let grants = Permissions::new();
//! grants.add(Box::new(NamedPermission::runtime("exitVM.*")?))?;
//! let library = Arc::new(TrustDomain::new(Some(CodeSource::local("/lib/core")), Some(grants)));
//! let plugin = Arc::new(TrustDomain::new(Some(CodeSource::local("/plugins/p")), None));
//!
//! let controller = AccessController::new(PolicyHandle::from_policy(Arc::new(GrantPolicy::new())));
//! let chain = CallChain::new().enter(plugin).enter(library);
//! let exit = NamedPermission::runtime("exitVM.0")?;
//!
//! assert!(controller.check_permission(&chain, &exit).is_err());
//! controller.do_privileged(&chain, |chain| controller.check_permission(chain, &exit))?;
//! # Ok::<(), warden_core::Error>(())
//! ```
//!
//! ## Crate Structure
//!
//! - **combine**: Domain-list combination
//! - **combiner**: Pluggable domain combiners
//! - **scope**: Limited-privilege scope arena
//! - **snapshot**: Access snapshots and their optimization
//! - **chain**: Call chains and their providers
//! - **controller**: Checks and privileged execution
//! - **enforcer**: The enforcement entry point
//! - **admin**: Guarded policy administration
//! - **audit**: Decision log

pub mod admin;
pub mod audit;
pub mod chain;
pub mod combine;
pub mod combiner;
pub mod controller;
pub mod enforcer;
pub mod scope;
pub mod snapshot;

pub use admin::PolicyAdmin;
pub use audit::{AuditEntry, AuditLog};
pub use chain::{CallChain, CallChainProvider};
pub use combine::DomainList;
pub use combiner::{DomainCombiner, PrincipalCombiner};
pub use controller::AccessController;
pub use enforcer::{Enforcer, SecurityManager};
pub use scope::{LimitedScope, ScopeArena, ScopeIndex, ScopeRecord};
pub use snapshot::AccessSnapshot;
