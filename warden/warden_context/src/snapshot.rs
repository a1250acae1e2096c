//! Access-control snapshots.
//!
//! An [`AccessSnapshot`] is the set of trust domains an operation runs on
//! behalf of, together with any limited-privilege scope that still applies.
//! A raw snapshot comes from capturing a [`CallChain`](crate::CallChain) and is
//! folded once with the context it runs under ([`AccessSnapshot::optimize`]);
//! the optimized snapshot is immutable, comparable and can be carried to other
//! threads to re-check permissions later.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use warden_core::error::{AccessError, Result};
use warden_core::security_debug;
use warden_core::traits::Permission;
use warden_core::utils::DebugFlags;
use warden_policy::{PolicyEngine, PolicyHandle, TrustDomain};

use crate::combine::{self, DomainList};
use crate::combiner::{combiners_equal, DomainCombiner};
use crate::scope::{limited_equal, BoundPermissions, LimitedScope, ScopeArena, ScopeRecord};

/// Checks `permission` against every domain of `list`, stopping at the first
/// domain that does not imply it.
pub(crate) fn check_domains(
    list: &DomainList,
    engine: &PolicyEngine,
    permission: &dyn Permission,
) -> Result<()> {
    for domain in combine::domains(list) {
        security_debug!(DebugFlags::DOMAIN, "checking {} against {}", permission, domain);
        if !domain.implies_with(engine, permission) {
            security_debug!(
                DebugFlags::ACCESS | DebugFlags::FAILURE,
                "access denied {}",
                permission
            );
            security_debug!(
                DebugFlags::FAILURE,
                "domain that failed {} granting {:?}",
                domain,
                domain
                    .merged_permissions(engine)
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
            );
            return Err(AccessError::denied(permission, Some(domain.id())).into());
        }
    }
    Ok(())
}

/// A comparable snapshot of the domains an operation runs on behalf of.
#[derive(Debug, Clone, Default)]
pub struct AccessSnapshot {
    domains: DomainList,
    privileged: bool,
    privileged_context: Option<Arc<AccessSnapshot>>,
    combiner: Option<Arc<dyn DomainCombiner>>,
    scope: Option<LimitedScope>,
}

impl AccessSnapshot {
    /// A snapshot over `frames`. Absent frames stand for system code and are
    /// dropped; repeated domains are kept once.
    pub fn new<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Option<Arc<TrustDomain>>>,
    {
        Self {
            domains: combine::from_frames(frames),
            ..Self::default()
        }
    }

    /// A snapshot over `domains`.
    pub fn from_domains(domains: Vec<Arc<TrustDomain>>) -> Self {
        Self::new(domains.into_iter().map(Some))
    }

    /// A snapshot with no domains: every check passes.
    pub fn trusted() -> Self {
        Self::default()
    }

    /// This snapshot's domains with `combiner` attached.
    ///
    /// The combiner takes over when a later capture running under this
    /// snapshot merges its stack domains into it.
    pub fn with_combiner(&self, combiner: Arc<dyn DomainCombiner>) -> Self {
        Self {
            domains: self.domains.clone(),
            combiner: Some(combiner),
            ..Self::default()
        }
    }

    /// A raw capture of a call chain.
    pub(crate) fn captured(
        domains: DomainList,
        privileged: bool,
        privileged_context: Option<Arc<AccessSnapshot>>,
    ) -> Self {
        Self {
            domains,
            privileged,
            privileged_context,
            ..Self::default()
        }
    }

    /// The context asserted by a privileged block that binds a caller domain
    /// to an optional context, combiner, enclosing context and bound permissions.
    ///
    /// The domains are the caller merged with `context` (through `combiner`
    /// when given). With an enclosing `parent` the wrapper is limited: checks
    /// outside `permissions` fall through to the parent. A bound list holding
    /// the universal permission lifts the limit altogether.
    pub(crate) fn wrapper(
        caller: Option<Arc<TrustDomain>>,
        combiner: Option<Arc<dyn DomainCombiner>>,
        parent: Option<Arc<AccessSnapshot>>,
        context: Option<Arc<AccessSnapshot>>,
        permissions: Option<Vec<Box<dyn Permission>>>,
    ) -> Self {
        let callers = combine::from_frames(std::iter::once(caller));
        let domains = match (&context, &combiner) {
            (Some(context), Some(combiner)) => {
                combine::sanitize(combiner.combine(&callers, &context.domains))
            }
            (Some(context), None) => combine::combine(&callers, &context.domains),
            (None, Some(combiner)) => combine::sanitize(combiner.combine(&None, &callers)),
            (None, None) => callers,
        };

        let mut parent = parent;
        if let Some(bound) = &permissions {
            if bound.iter().any(|p| p.is_universal()) {
                parent = None;
            }
        }

        let Some(parent) = parent else {
            return Self {
                domains,
                combiner,
                ..Self::default()
            };
        };

        let mut arena = ScopeArena::new();
        let privileged = context.as_ref().map(|c| arena.import(&c.as_scope()));
        let parent_index = arena.import(&parent.as_scope());
        let root = arena.push(ScopeRecord {
            domains: domains.clone(),
            limited_domains: combine::combine(&parent.domains, &parent.limited_domains()),
            permissions: permissions.map(BoundPermissions::from),
            privileged,
            parent: Some(parent_index),
            wrapped: true,
            limited: true,
            combiner: combiner.clone(),
        });

        Self {
            domains,
            privileged: false,
            privileged_context: context,
            combiner,
            scope: Some(LimitedScope::new(arena, root)),
        }
    }

    pub fn domains(&self) -> &[Arc<TrustDomain>] {
        combine::domains(&self.domains)
    }

    pub fn domain_list(&self) -> &DomainList {
        &self.domains
    }

    pub fn combiner(&self) -> Option<&Arc<dyn DomainCombiner>> {
        self.combiner.as_ref()
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn is_limited(&self) -> bool {
        self.scope.as_ref().map_or(false, LimitedScope::is_limited)
    }

    pub fn is_wrapped(&self) -> bool {
        self.scope.as_ref().map_or(false, LimitedScope::is_wrapped)
    }

    pub fn scope(&self) -> Option<&LimitedScope> {
        self.scope.as_ref()
    }

    fn limited_domains(&self) -> DomainList {
        self.scope
            .as_ref()
            .and_then(|s| s.record().limited_domains.clone())
    }

    /// This snapshot's limited-privilege state as a scope, limited or not.
    pub(crate) fn as_scope(&self) -> LimitedScope {
        match &self.scope {
            Some(scope) => scope.clone(),
            None => LimitedScope::unlimited(self.domains.clone(), self.combiner.clone()),
        }
    }

    /// The combiner of the context this capture runs under.
    pub(crate) fn assigned_combiner(
        &self,
        inherited: Option<&Arc<AccessSnapshot>>,
    ) -> Option<Arc<dyn DomainCombiner>> {
        let assigned = if self.privileged {
            self.privileged_context.as_ref()
        } else {
            inherited
        };
        assigned.and_then(|acc| acc.combiner.clone())
    }

    /// Folds a raw capture with the context it runs under.
    ///
    /// The assigned context is the privileged context for a privileged
    /// capture and `inherited` otherwise. Its domains are merged after the
    /// capture's own (through its combiner if it has one). The assigned
    /// snapshot itself is returned when merging would not change it and no
    /// limited scope applies.
    pub fn optimize(self, inherited: Option<&Arc<AccessSnapshot>>) -> Arc<AccessSnapshot> {
        let mut parent: Option<LimitedScope> = None;
        let mut permissions: Option<BoundPermissions> = None;

        let acc = if self.privileged {
            let acc = self.privileged_context.clone();
            if let Some(wrapper) = acc.as_ref().and_then(|a| a.scope.as_ref()) {
                if wrapper.is_wrapped() {
                    permissions = wrapper.record().permissions.clone();
                    parent = wrapper.parent();
                }
            }
            acc
        } else {
            let acc = inherited.cloned();
            if let Some(inherited) = &acc {
                if inherited.is_limited() {
                    parent = Some(inherited.as_scope());
                }
            }
            acc
        };

        let assigned: DomainList = acc.as_ref().and_then(|a| a.domains.clone());
        let skip_stack = self.domains.is_none();
        let skip_assigned = assigned.is_none();
        let skip_limited = !acc.as_ref().map_or(false, |a| a.is_wrapped()) && parent.is_none();

        let mut this = self;
        let assigned_combiner = acc.as_ref().and_then(|a| a.combiner.clone());

        let combined = if let Some(combiner) = assigned_combiner {
            security_debug!(DebugFlags::DOMAIN, "invoking domain combiner");
            let combined = combine::sanitize(combiner.combine(&this.domains, &assigned));
            this.combiner = Some(combiner);
            combined
        } else {
            if skip_stack {
                if skip_assigned {
                    this.calculate_fields(acc.as_deref(), parent, permissions);
                    return Arc::new(this);
                }
                if skip_limited {
                    if let Some(acc) = &acc {
                        return Arc::clone(acc);
                    }
                }
            } else if let (Some(stack), Some(assigned_domains)) = (&this.domains, &assigned) {
                let same_head = match (stack.first(), assigned_domains.first()) {
                    (Some(s), Some(a)) => s.id() == a.id(),
                    _ => false,
                };
                if skip_limited && stack.len() == 1 && same_head {
                    if let Some(acc) = &acc {
                        return Arc::clone(acc);
                    }
                }
            }

            let combined = combine::combine(&this.domains, &assigned);
            if skip_limited && !skip_assigned && combine::same_list(&combined, &assigned) {
                if let Some(acc) = &acc {
                    return Arc::clone(acc);
                }
            }
            if skip_assigned && combine::same_list(&combined, &this.domains) {
                this.calculate_fields(acc.as_deref(), parent, permissions);
                return Arc::new(this);
            }
            this.combiner = None;
            combined
        };

        this.domains = combined;
        this.privileged = false;
        this.calculate_fields(acc.as_deref(), parent, permissions);
        Arc::new(this)
    }

    /// Attaches a limited scope when the combined limit of the parent and the
    /// assigned context reaches beyond this snapshot's own domains.
    fn calculate_fields(
        &mut self,
        assigned: Option<&AccessSnapshot>,
        parent: Option<LimitedScope>,
        permissions: Option<BoundPermissions>,
    ) {
        let parent_limit = parent
            .as_ref()
            .and_then(|p| p.record().limited_domains.clone());
        let assigned_limit = assigned.and_then(|a| a.limited_domains());
        let limit = combine::combine(&parent_limit, &assigned_limit);

        if limit.is_none() || combine::contains_all(&self.domains, &limit) {
            return;
        }

        let mut arena = ScopeArena::new();
        let privileged = self
            .privileged_context
            .as_ref()
            .map(|pc| arena.import(&pc.as_scope()));
        let parent = parent.map(|p| arena.import(&p));
        let root = arena.push(ScopeRecord {
            domains: self.domains.clone(),
            limited_domains: limit,
            permissions,
            privileged,
            parent,
            wrapped: false,
            limited: true,
            combiner: self.combiner.clone(),
        });

        security_debug!(DebugFlags::SCOPE, "attaching limited scope");
        self.scope = Some(LimitedScope::new(arena, root));
    }

    /// Checks `permission` against the globally installed policy.
    pub fn check_permission(&self, permission: &dyn Permission) -> Result<()> {
        self.check_permission_with(&PolicyHandle::global().current(), permission)
    }

    /// Checks `permission` against `engine`: every domain must imply it, then
    /// the limited scope, if any, must allow it.
    ///
    /// # Errors
    ///
    /// `AccessError::Denied` naming the first domain that refused, or no
    /// domain when the limited scope refused.
    pub fn check_permission_with(
        &self,
        engine: &PolicyEngine,
        permission: &dyn Permission,
    ) -> Result<()> {
        if self.domains.is_none() {
            security_debug!(DebugFlags::ACCESS, "access allowed (no domains) {}", permission);
        }

        check_domains(&self.domains, engine, permission)?;

        if let Some(scope) = &self.scope {
            scope.check(engine, permission)?;
        }

        security_debug!(DebugFlags::ACCESS, "access allowed {}", permission);
        Ok(())
    }
}

impl PartialEq for AccessSnapshot {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        combine::equal_sets(&self.domains, &other.domains)
            && combiners_equal(&self.combiner, &other.combiner)
            && limited_equal(self.scope.as_ref(), other.scope.as_ref())
    }
}

impl Eq for AccessSnapshot {}

impl Hash for AccessSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut combined = 0u64;
        for domain in self.domains() {
            let mut hasher = DefaultHasher::new();
            domain.hash(&mut hasher);
            combined ^= hasher.finish();
        }
        state.write_u64(combined);
    }
}

impl fmt::Display for AccessSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AccessSnapshot [")?;
        for domain in self.domains() {
            writeln!(f, "  {}", domain)?;
        }
        write!(f, "]")?;
        if self.is_limited() {
            write!(f, " limited")?;
        }
        Ok(())
    }
}
