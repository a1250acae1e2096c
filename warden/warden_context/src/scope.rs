//! Limited-privilege scopes.
//!
//! A limited elevation (`do_privileged_limited`) asserts privilege only for a
//! bound list of permissions; anything else is still checked against the
//! enclosing context. The enclosing contexts form a chain (privileged context,
//! parent, the parent's own privileged context and parent, ...), stored here
//! as records in an append-only arena and addressed by index. Records only
//! point at records pushed before them, so the graph is acyclic.

use std::collections::HashMap;
use std::sync::Arc;

use warden_core::error::{AccessError, Result};
use warden_core::security_debug;
use warden_core::traits::Permission;
use warden_core::utils::DebugFlags;
use warden_policy::PolicyEngine;

use crate::combine::{self, DomainList};
use crate::combiner::{combiners_equal, DomainCombiner};
use crate::snapshot::check_domains;

/// Position of a record in a [`ScopeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeIndex(usize);

/// Permissions bound by a limited elevation.
pub type BoundPermissions = Arc<[Box<dyn Permission>]>;

/// The limited-privilege state of one context.
#[derive(Debug, Clone)]
pub struct ScopeRecord {
    /// Domains of the context
    pub domains: DomainList,
    /// Every domain that could be consulted if no bound permission matches
    pub limited_domains: DomainList,
    /// Bound permissions, if the context was created by a limited elevation
    pub permissions: Option<BoundPermissions>,
    /// The context asserted by the elevation
    pub privileged: Option<ScopeIndex>,
    /// The enclosing context
    pub parent: Option<ScopeIndex>,
    /// Set on the wrapper created by the elevation itself
    pub wrapped: bool,
    pub limited: bool,
    pub combiner: Option<Arc<dyn DomainCombiner>>,
}

impl ScopeRecord {
    /// A record that places no limit on anything.
    pub fn unlimited(domains: DomainList, combiner: Option<Arc<dyn DomainCombiner>>) -> Self {
        Self {
            domains,
            limited_domains: None,
            permissions: None,
            privileged: None,
            parent: None,
            wrapped: false,
            limited: false,
            combiner,
        }
    }
}

/// Append-only storage of scope records.
#[derive(Debug, Clone, Default)]
pub struct ScopeArena {
    records: Vec<ScopeRecord>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ScopeRecord) -> ScopeIndex {
        self.records.push(record);
        ScopeIndex(self.records.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copies the records reachable from `scope` into this arena.
    ///
    /// # Returns
    ///
    /// The index of the copied root.
    pub fn import(&mut self, scope: &LimitedScope) -> ScopeIndex {
        let mut remap = HashMap::new();
        self.import_from(&scope.arena, scope.root, &mut remap)
    }

    fn import_from(
        &mut self,
        source: &ScopeArena,
        index: ScopeIndex,
        remap: &mut HashMap<ScopeIndex, ScopeIndex>,
    ) -> ScopeIndex {
        if let Some(mapped) = remap.get(&index) {
            return *mapped;
        }

        let mut record = source.records[index.0].clone();
        record.privileged = record
            .privileged
            .map(|p| self.import_from(source, p, remap));
        record.parent = record.parent.map(|p| self.import_from(source, p, remap));

        let mapped = self.push(record);
        remap.insert(index, mapped);
        mapped
    }

    fn record(&self, index: ScopeIndex) -> &ScopeRecord {
        &self.records[index.0]
    }

    /// Domains of the record, then its scope.
    fn check_full(
        &self,
        index: ScopeIndex,
        engine: &PolicyEngine,
        permission: &dyn Permission,
    ) -> Result<()> {
        check_domains(&self.record(index).domains, engine, permission)?;
        self.check_scope(index, engine, permission)
    }

    /// The limited-privilege check of one record.
    fn check_scope(
        &self,
        index: ScopeIndex,
        engine: &PolicyEngine,
        permission: &dyn Permission,
    ) -> Result<()> {
        let record = self.record(index);
        if !record.limited {
            return Ok(());
        }

        if let Some(privileged) = record.privileged {
            self.check_scope(privileged, engine, permission)?;
        }

        // The wrapper's bound permissions and parent were carried into the
        // context that asserted it.
        if record.wrapped {
            return Ok(());
        }

        if let Some(bound) = &record.permissions {
            let matched = bound
                .iter()
                .any(|p| p.kind() == permission.kind() && p.implies(permission));
            if matched {
                security_debug!(DebugFlags::SCOPE, "{} within limited scope", permission);
                return Ok(());
            }
        }

        match (record.parent, &record.permissions) {
            (Some(parent), None) => self.check_scope(parent, engine, permission),
            (Some(parent), Some(_)) => self.check_full(parent, engine, permission),
            (None, Some(_)) => {
                security_debug!(DebugFlags::SCOPE, "{} outside limited scope", permission);
                Err(AccessError::denied(permission, None).into())
            }
            (None, None) => Ok(()),
        }
    }

    /// The next non-wrapped context along the privileged chain.
    fn next_privileged(&self, index: ScopeIndex) -> Option<ScopeIndex> {
        let mut current = self.record(index).privileged;
        while let Some(next) = current {
            if !self.record(next).wrapped {
                return Some(next);
            }
            current = self.record(next).privileged;
        }
        None
    }
}

/// A root record together with the arena holding it and everything it
/// refers to.
#[derive(Debug, Clone)]
pub struct LimitedScope {
    arena: Arc<ScopeArena>,
    root: ScopeIndex,
}

impl LimitedScope {
    pub fn new(arena: ScopeArena, root: ScopeIndex) -> Self {
        Self {
            arena: Arc::new(arena),
            root,
        }
    }

    /// A one-record scope that limits nothing.
    pub fn unlimited(domains: DomainList, combiner: Option<Arc<dyn DomainCombiner>>) -> Self {
        let mut arena = ScopeArena::new();
        let root = arena.push(ScopeRecord::unlimited(domains, combiner));
        Self::new(arena, root)
    }

    pub fn record(&self) -> &ScopeRecord {
        self.arena.record(self.root)
    }

    fn at(&self, index: ScopeIndex) -> LimitedScope {
        LimitedScope {
            arena: self.arena.clone(),
            root: index,
        }
    }

    pub fn parent(&self) -> Option<LimitedScope> {
        self.record().parent.map(|p| self.at(p))
    }

    pub fn privileged(&self) -> Option<LimitedScope> {
        self.record().privileged.map(|p| self.at(p))
    }

    pub fn is_limited(&self) -> bool {
        self.record().limited
    }

    pub fn is_wrapped(&self) -> bool {
        self.record().wrapped
    }

    /// Runs the limited-privilege check of the root record.
    pub fn check(&self, engine: &PolicyEngine, permission: &dyn Permission) -> Result<()> {
        self.arena.check_scope(self.root, engine, permission)
    }

    /// Full equality: domains as sets, combiners, then limited state.
    pub(crate) fn full_equal(&self, other: &LimitedScope) -> bool {
        let (a, b) = (self.record(), other.record());
        combine::equal_sets(&a.domains, &b.domains)
            && combiners_equal(&a.combiner, &b.combiner)
            && limited_equal(Some(self), Some(other))
    }
}

/// Structural equality of limited-privilege state.
///
/// Absent and non-limited scopes are equivalent. The domains and combiner of
/// privileged contexts are ignored; they were already merged into the
/// context that asserted them.
pub(crate) fn limited_equal(a: Option<&LimitedScope>, b: Option<&LimitedScope>) -> bool {
    let a = a.filter(|s| s.is_limited());
    let b = b.filter(|s| s.is_limited());
    let (a, b) = match (a, b) {
        (None, None) => return true,
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };

    let (ra, rb) = (a.record(), b.record());
    if ra.wrapped != rb.wrapped {
        return false;
    }

    match (&ra.permissions, &rb.permissions) {
        (None, None) => {}
        (Some(pa), Some(pb)) => {
            let covers = |x: &BoundPermissions, y: &BoundPermissions| {
                x.iter().all(|p| y.iter().any(|q| p.key() == q.key()))
            };
            if !(covers(pa, pb) && covers(pb, pa)) {
                return false;
            }
        }
        _ => return false,
    }

    let next_a = a.arena.next_privileged(a.root).map(|i| a.at(i));
    let next_b = b.arena.next_privileged(b.root).map(|i| b.at(i));
    if !limited_equal(next_a.as_ref(), next_b.as_ref()) {
        return false;
    }

    match (a.parent(), b.parent()) {
        (None, None) => true,
        (Some(pa), Some(pb)) => pa.full_equal(&pb),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_permission::NamedPermission;
    use warden_policy::GrantPolicy;

    fn rt(name: &str) -> Box<dyn Permission> {
        Box::new(NamedPermission::runtime(name).unwrap())
    }

    fn engine() -> PolicyEngine {
        PolicyEngine::new(Arc::new(GrantPolicy::new()))
    }

    fn limited(
        arena: &mut ScopeArena,
        permissions: Option<Vec<Box<dyn Permission>>>,
        parent: Option<ScopeIndex>,
    ) -> ScopeIndex {
        arena.push(ScopeRecord {
            limited: true,
            permissions: permissions.map(Into::into),
            parent,
            ..ScopeRecord::unlimited(None, None)
        })
    }

    #[test]
    fn test_unlimited_always_passes() {
        let scope = LimitedScope::unlimited(None, None);
        assert!(scope.check(&engine(), &*rt("anything")).is_ok());
    }

    #[test]
    fn test_bound_permissions() {
        let mut arena = ScopeArena::new();
        let root = limited(&mut arena, Some(vec![rt("a.*")]), None);
        let scope = LimitedScope::new(arena, root);

        assert!(scope.check(&engine(), &*rt("a.b")).is_ok());
        let err = scope.check(&engine(), &*rt("b")).unwrap_err();
        assert!(err.is_denied());
    }

    #[test]
    fn test_parent_consulted_on_miss() {
        let mut arena = ScopeArena::new();
        let outer = limited(&mut arena, Some(vec![rt("b")]), None);
        let inner = limited(&mut arena, Some(vec![rt("a")]), Some(outer));
        let scope = LimitedScope::new(arena, inner);

        assert!(scope.check(&engine(), &*rt("a")).is_ok());
        assert!(scope.check(&engine(), &*rt("b")).is_ok());
        assert!(scope.check(&engine(), &*rt("c")).is_err());
    }

    #[test]
    fn test_import_keeps_structure() {
        let mut source = ScopeArena::new();
        let outer = limited(&mut source, Some(vec![rt("b")]), None);
        let inner = limited(&mut source, Some(vec![rt("a")]), Some(outer));
        let original = LimitedScope::new(source, inner);

        let mut target = ScopeArena::new();
        target.push(ScopeRecord::unlimited(None, None));
        let root = target.import(&original);
        let copy = LimitedScope::new(target, root);

        assert_eq!(copy.arena.len(), 3);
        assert!(limited_equal(Some(&original), Some(&copy)));
        assert!(copy.check(&engine(), &*rt("b")).is_ok());
    }

    #[test]
    fn test_limited_equality() {
        let build = |names: &[&str]| {
            let mut arena = ScopeArena::new();
            let root = limited(
                &mut arena,
                Some(names.iter().map(|n| rt(n)).collect()),
                None,
            );
            LimitedScope::new(arena, root)
        };

        let ab = build(&["a", "b"]);
        let ba = build(&["b", "a"]);
        let a = build(&["a"]);
        let unlimited = LimitedScope::unlimited(None, None);

        assert!(limited_equal(Some(&ab), Some(&ba)));
        assert!(!limited_equal(Some(&ab), Some(&a)));
        assert!(!limited_equal(Some(&ab), None));
        assert!(limited_equal(Some(&unlimited), None));
    }
}
