//! Trust domains.
//!
//! A trust domain is the unit of privilege: every code unit in a call chain
//! belongs to one. A domain is immutable once built and is identified by an
//! internally generated token, never by its content, so two domains built from
//! the same origin and permissions are still different domains.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use warden_core::id::DomainId;
use warden_core::traits::{Permission, PermissionCollection};
use warden_permission::Permissions;

use crate::code_source::{CodeSource, Principal};
use crate::engine::PolicyEngine;
use crate::handle::PolicyHandle;

/// Identity token of a domain.
///
/// Resolution caches hold a weak reference to it, so a cached entry dies with
/// the last handle to its domain.
#[derive(Debug)]
pub struct DomainKey {
    id: DomainId,
}

impl DomainKey {
    pub fn id(&self) -> DomainId {
        self.id
    }
}

/// A set of code units sharing an origin, principals and permissions.
#[derive(Debug)]
pub struct TrustDomain {
    key: Arc<DomainKey>,
    origin: Option<CodeSource>,
    principals: Vec<Principal>,
    permissions: Option<Arc<Permissions>>,
    dynamic: bool,
    has_all: bool,
}

impl TrustDomain {
    /// Creates a static domain: it is granted exactly `permissions` and the
    /// policy is never consulted.
    pub fn new(origin: Option<CodeSource>, permissions: Option<Permissions>) -> Self {
        Self::build(origin, Vec::new(), permissions.map(Arc::new), false)
    }

    /// Creates a dynamic domain: its permissions are whatever the installed
    /// policy grants to its origin and principals, plus `permissions`.
    pub fn dynamic(
        origin: Option<CodeSource>,
        permissions: Option<Permissions>,
        principals: Vec<Principal>,
    ) -> Self {
        Self::build(origin, principals, permissions.map(Arc::new), true)
    }

    /// A new dynamic domain with this domain's origin and static permissions
    /// and the given principals.
    pub fn with_principals(&self, principals: Vec<Principal>) -> Self {
        Self::build(
            self.origin.clone(),
            principals,
            self.permissions.clone(),
            true,
        )
    }

    fn build(
        origin: Option<CodeSource>,
        principals: Vec<Principal>,
        permissions: Option<Arc<Permissions>>,
        dynamic: bool,
    ) -> Self {
        if let Some(permissions) = &permissions {
            permissions.set_read_only();
        }
        let has_all = permissions.as_ref().map_or(false, |p| p.grants_all());

        Self {
            key: Arc::new(DomainKey { id: DomainId::new() }),
            origin,
            principals,
            permissions,
            dynamic,
            has_all,
        }
    }

    pub fn id(&self) -> DomainId {
        self.key.id
    }

    pub fn key(&self) -> &Arc<DomainKey> {
        &self.key
    }

    pub fn origin(&self) -> Option<&CodeSource> {
        self.origin.as_ref()
    }

    pub fn principals(&self) -> &[Principal] {
        &self.principals
    }

    /// The static permissions, frozen.
    pub fn permissions(&self) -> Option<&Arc<Permissions>> {
        self.permissions.as_ref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Checks `permission` against the globally installed policy.
    pub fn implies(&self, permission: &dyn Permission) -> bool {
        self.implies_with(&PolicyHandle::global().current(), permission)
    }

    /// Checks `permission` against `engine`.
    ///
    /// A static set holding the universal permission answers immediately. A
    /// dynamic domain asks the engine; a static one asks its own set.
    pub fn implies_with(&self, engine: &PolicyEngine, permission: &dyn Permission) -> bool {
        if self.has_all {
            return true;
        }

        if self.dynamic {
            return engine.implies(self, permission);
        }

        self.permissions
            .as_ref()
            .map_or(false, |p| p.implies(permission))
    }

    /// Everything this domain is granted under `engine`, for diagnostics.
    pub fn merged_permissions(&self, engine: &PolicyEngine) -> Vec<Box<dyn Permission>> {
        if self.dynamic {
            engine.policy().permissions_for_domain(self)
        } else {
            self.permissions
                .as_ref()
                .map(|p| p.elements())
                .unwrap_or_default()
        }
    }
}

impl PartialEq for TrustDomain {
    fn eq(&self, other: &Self) -> bool {
        self.key.id == other.key.id
    }
}

impl Eq for TrustDomain {}

impl Hash for TrustDomain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.id.hash(state);
    }
}

impl fmt::Display for TrustDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrustDomain {} ", self.key.id)?;
        match &self.origin {
            Some(origin) => write!(f, "{}", origin)?,
            None => write!(f, "(null)")?,
        }
        if !self.principals.is_empty() {
            let principals: Vec<String> = self.principals.iter().map(|p| p.to_string()).collect();
            write!(f, " [{}]", principals.join(", "))?;
        }
        if self.dynamic {
            write!(f, " dynamic")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{GrantEntry, GrantPolicy};
    use warden_permission::{AllPermission, NamedPermission};

    fn rt(name: &str) -> NamedPermission {
        NamedPermission::runtime(name).unwrap()
    }

    fn static_set(names: &[&str]) -> Permissions {
        let set = Permissions::new();
        for name in names {
            set.add(Box::new(rt(name))).unwrap();
        }
        set
    }

    #[test]
    fn test_identity_not_content() {
        let a = TrustDomain::new(Some(CodeSource::local("/app/a")), None);
        let b = TrustDomain::new(Some(CodeSource::local("/app/a")), None);
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert_eq!(a, a);
    }

    #[test]
    fn test_static_domain_ignores_policy() {
        let policy = GrantPolicy::new();
        policy.add_grant(GrantEntry::new().permission(rt("granted.by.policy")));
        let engine = PolicyEngine::new(Arc::new(policy));

        let domain = TrustDomain::new(
            Some(CodeSource::local("/app/a")),
            Some(static_set(&["local.*"])),
        );
        assert!(domain.implies_with(&engine, &rt("local.x")));
        assert!(!domain.implies_with(&engine, &rt("granted.by.policy")));
        assert!(domain.permissions().unwrap().is_read_only());
    }

    #[test]
    fn test_dynamic_domain_merges_policy() {
        let policy = GrantPolicy::new();
        policy.add_grant(
            GrantEntry::new()
                .codebase("/app/-")
                .permission(rt("granted.by.policy")),
        );
        let engine = PolicyEngine::new(Arc::new(policy));

        let domain = TrustDomain::dynamic(
            Some(CodeSource::local("/app/a")),
            Some(static_set(&["local.*"])),
            Vec::new(),
        );
        assert!(domain.implies_with(&engine, &rt("local.x")));
        assert!(domain.implies_with(&engine, &rt("granted.by.policy")));
        assert!(!domain.implies_with(&engine, &rt("other")));
        assert_eq!(domain.merged_permissions(&engine).len(), 2);
    }

    #[test]
    fn test_universal_static_set_short_circuits() {
        let set = Permissions::new();
        set.add(Box::new(AllPermission)).unwrap();
        let engine = PolicyEngine::new(Arc::new(GrantPolicy::new()));

        let domain = TrustDomain::dynamic(None, Some(set), Vec::new());
        assert!(domain.implies_with(&engine, &rt("anything")));
        assert_eq!(engine.cache_len(), 0);
    }
}
