//! Policy providers.
//!
//! A policy maps an origin (and the principals running it) to the
//! permissions it is granted. Policies are consulted only for dynamic
//! domains, and only through a [`PolicyEngine`](crate::PolicyEngine), which
//! caches the answer per domain.

use std::collections::HashSet;
use std::fmt;

use parking_lot::RwLock;
use tracing::debug;
use warden_core::error::Result;
use warden_core::traits::{Permission, PermissionCollection, PermissionKey};
use warden_permission::AllPermission;

use crate::code_source::{CodeSource, Principal};
use crate::domain::TrustDomain;

/// Trait for policy providers.
pub trait Policy: Send + Sync + fmt::Debug {
    /// Name of this provider.
    fn name(&self) -> &str;

    /// Permissions granted to code from `origin` running as `principals`.
    ///
    /// # Arguments
    ///
    /// * `origin` - The code source, or `None` for system code.
    /// * `principals` - The principals the code runs as.
    ///
    /// # Returns
    ///
    /// The granted permissions, in grant order.
    fn permissions_for_source(
        &self,
        origin: Option<&CodeSource>,
        principals: &[Principal],
    ) -> Vec<Box<dyn Permission>>;

    /// Permissions granted to `domain`: the policy's grants for its origin
    /// and principals, followed by the domain's static permissions not
    /// already present.
    fn permissions_for_domain(&self, domain: &TrustDomain) -> Vec<Box<dyn Permission>> {
        let mut merged = self.permissions_for_source(domain.origin(), domain.principals());

        if let Some(statics) = domain.permissions() {
            let mut seen: HashSet<PermissionKey> = merged.iter().map(|p| p.key()).collect();
            for permission in statics.elements() {
                if seen.insert(permission.key()) {
                    merged.push(permission);
                }
            }
        }

        merged
    }

    /// Reloads the policy from its source, if it has one.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// One grant: who it applies to and what it grants.
#[derive(Debug, Clone, Default)]
pub struct GrantEntry {
    pub codebase: Option<String>,
    pub signed_by: Vec<String>,
    pub principals: Vec<Principal>,
    pub permissions: Vec<Box<dyn Permission>>,
}

impl GrantEntry {
    /// Creates a grant that applies to every origin and grants nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codebase(mut self, location: &str) -> Self {
        self.codebase = Some(location.to_string());
        self
    }

    pub fn signed_by<I, S>(mut self, signers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signed_by = signers.into_iter().map(Into::into).collect();
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }

    pub fn permission<P: Permission + 'static>(mut self, permission: P) -> Self {
        self.permissions.push(Box::new(permission));
        self
    }

    pub fn permissions<I>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Permission>>,
    {
        self.permissions.extend(permissions);
        self
    }

    /// The grant target as a code source.
    pub fn code_source(&self) -> CodeSource {
        CodeSource::new(self.codebase.as_deref(), self.signed_by.iter().cloned())
    }

    /// Returns true if this grant covers code from `origin` running as `principals`.
    ///
    /// System code (no origin) is only covered by grants without a codebase
    /// or signers. Every principal of the grant must match one of `principals`.
    pub fn applies_to(&self, origin: Option<&CodeSource>, principals: &[Principal]) -> bool {
        let source_matches = match origin {
            Some(origin) => self.code_source().implies(origin),
            None => self.codebase.is_none() && self.signed_by.is_empty(),
        };

        source_matches
            && self
                .principals
                .iter()
                .all(|grant| principals.iter().any(|p| grant.matches(p)))
    }
}

type GrantLoader = Box<dyn Fn() -> Result<Vec<GrantEntry>> + Send + Sync>;

/// A policy made of grant entries.
///
/// Entries can be added directly or reloaded on [`refresh`](Policy::refresh)
/// from a loader function.
pub struct GrantPolicy {
    entries: RwLock<Vec<GrantEntry>>,
    loader: Option<GrantLoader>,
}

impl GrantPolicy {
    /// Creates an empty grant policy.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            loader: None,
        }
    }

    /// Creates a grant policy whose entries come from `loader`.
    ///
    /// The loader runs once now and again on every refresh.
    pub fn with_loader<F>(loader: F) -> Result<Self>
    where
        F: Fn() -> Result<Vec<GrantEntry>> + Send + Sync + 'static,
    {
        let entries = loader()?;
        Ok(Self {
            entries: RwLock::new(entries),
            loader: Some(Box::new(loader)),
        })
    }

    /// Appends a grant entry.
    ///
    /// Engines that already cached a domain's permissions see the new entry
    /// after their next refresh.
    pub fn add_grant(&self, entry: GrantEntry) {
        self.entries.write().push(entry);
    }

    pub fn grants(&self) -> Vec<GrantEntry> {
        self.entries.read().clone()
    }
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GrantPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantPolicy")
            .field("entries", &self.entries.read().len())
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

impl Policy for GrantPolicy {
    fn name(&self) -> &str {
        "grant"
    }

    fn permissions_for_source(
        &self,
        origin: Option<&CodeSource>,
        principals: &[Principal],
    ) -> Vec<Box<dyn Permission>> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.applies_to(origin, principals))
            .flat_map(|entry| entry.permissions.iter().cloned())
            .collect()
    }

    fn refresh(&self) -> Result<()> {
        if let Some(loader) = &self.loader {
            let entries = loader()?;
            debug!("Reloaded {} grant entries", entries.len());
            *self.entries.write() = entries;
        }
        Ok(())
    }
}

/// Fallback policy: system code (no origin) gets the universal permission,
/// everything else gets nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct BootstrapPolicy;

impl Policy for BootstrapPolicy {
    fn name(&self) -> &str {
        "bootstrap"
    }

    fn permissions_for_source(
        &self,
        origin: Option<&CodeSource>,
        _principals: &[Principal],
    ) -> Vec<Box<dyn Permission>> {
        match origin.and_then(CodeSource::location) {
            None => vec![Box::new(AllPermission)],
            Some(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use warden_permission::{NamedPermission, Permissions};

    fn rt(name: &str) -> NamedPermission {
        NamedPermission::runtime(name).unwrap()
    }

    #[test]
    fn test_grant_matching() {
        let policy = GrantPolicy::new();
        policy.add_grant(GrantEntry::new().codebase("/app/-").permission(rt("app")));
        policy.add_grant(
            GrantEntry::new()
                .principal(Principal::new("user", "*"))
                .permission(rt("user")),
        );
        policy.add_grant(GrantEntry::new().permission(rt("everyone")));

        let app = CodeSource::local("/app/x");
        let names = |origin: Option<&CodeSource>, principals: &[Principal]| -> Vec<String> {
            policy
                .permissions_for_source(origin, principals)
                .iter()
                .map(|p| p.name().to_string())
                .collect()
        };

        assert_eq!(names(Some(&app), &[]), vec!["app", "everyone"]);
        assert_eq!(
            names(Some(&app), &[Principal::new("user", "alice")]),
            vec!["app", "user", "everyone"]
        );
        assert_eq!(names(None, &[]), vec!["everyone"]);
    }

    #[test]
    fn test_domain_merge_dedupes_by_key() {
        let policy = GrantPolicy::new();
        policy.add_grant(GrantEntry::new().permission(rt("shared")).permission(rt("p")));

        let statics = Permissions::new();
        statics.add(Box::new(rt("shared"))).unwrap();
        statics.add(Box::new(rt("s"))).unwrap();
        let domain = TrustDomain::dynamic(Some(CodeSource::local("/a")), Some(statics), vec![]);

        let names: Vec<String> = policy
            .permissions_for_domain(&domain)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["shared", "p", "s"]);
    }

    #[test]
    fn test_refresh_reloads() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let policy = GrantPolicy::with_loader(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![GrantEntry::new().permission(rt(&format!("gen{}", n)))])
        })
        .unwrap();

        assert_eq!(policy.permissions_for_source(None, &[])[0].name(), "gen0");
        policy.refresh().unwrap();
        assert_eq!(policy.permissions_for_source(None, &[])[0].name(), "gen1");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_bootstrap_grants_system_code_only() {
        let policy = BootstrapPolicy;
        let granted = policy.permissions_for_source(None, &[]);
        assert_eq!(granted.len(), 1);
        assert!(granted[0].is_universal());
        assert!(policy
            .permissions_for_source(Some(&CodeSource::local("/app")), &[])
            .is_empty());
    }
}
