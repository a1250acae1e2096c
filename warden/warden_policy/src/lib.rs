//! # Warden Policy
//!
//! Trust domains and the policies that grant them permissions.
//!
//! A [`TrustDomain`] is either static (it carries exactly the permissions it
//! was built with) or dynamic (the installed [`Policy`] is asked as well).
//! Policies are consulted through a [`PolicyEngine`], which caches resolved
//! permissions per domain, and the engine in force is reached through a
//! swappable [`PolicyHandle`].
//!
//! ```
//! use std::sync::Arc;
//! use warden_permission::NamedPermission;
//! use warden_policy::{CodeSource, GrantEntry, GrantPolicy, PolicyEngine, TrustDomain};
//!
//! let policy = GrantPolicy::new();
//! policy.add_grant(
//!     GrantEntry::new()
//!         .codebase("/plugins/-")
//!         .permission(NamedPermission::runtime("plugin.*")?),
//! );
//! let engine = PolicyEngine::new(Arc::new(policy));
//!
//! let domain = TrustDomain::dynamic(Some(CodeSource::local("/plugins/codec")), None, vec![]);
//! assert!(domain.implies_with(&engine, &NamedPermission::runtime("plugin.load")?));
//! # Ok::<(), warden_core::Error>(())
//! ```

pub mod code_source;
pub mod domain;
pub mod engine;
pub mod handle;
pub mod policy;
pub mod provider;

pub use code_source::{CodeSource, Principal};
pub use domain::{DomainKey, TrustDomain};
pub use engine::PolicyEngine;
pub use handle::PolicyHandle;
pub use policy::{BootstrapPolicy, GrantEntry, GrantPolicy, Policy};
pub use provider::ProviderRegistry;
