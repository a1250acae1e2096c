//! Domain combiners.
//!
//! A combiner attached to a snapshot replaces the default [`combine`] when a
//! later capture merges its stack domains with that snapshot, e.g. to rebind
//! every domain to the principals of an authenticated subject.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use warden_core::id::DomainId;
use warden_policy::{DomainKey, Principal, TrustDomain};

use crate::combine::{self, DomainList};

/// Strategy for merging stack domains with the domains of an assigned context.
pub trait DomainCombiner: Send + Sync + Debug {
    /// Merges `current` (the stack) with `assigned` (the context carrying
    /// this combiner).
    fn combine(&self, current: &DomainList, assigned: &DomainList) -> DomainList;

    /// Structural equality with another combiner. Combiners that are the same
    /// instance are always equal; this is consulted otherwise.
    fn equals(&self, _other: &dyn DomainCombiner) -> bool {
        false
    }

    /// Convert to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Combiner equality as used by snapshot comparison.
pub(crate) fn combiners_equal(
    a: &Option<Arc<dyn DomainCombiner>>,
    b: &Option<Arc<dyn DomainCombiner>>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a.equals(b.as_ref()),
        _ => false,
    }
}

/// Rebinds the stack domains to a fixed set of principals.
///
/// Each stack domain is replaced by a dynamic domain with the same origin and
/// static permissions but the combiner's principals, so the policy can grant
/// by principal. Assigned domains are appended unchanged. Rebound domains are
/// cached while their source domain is alive so repeated captures yield
/// identical lists.
#[derive(Debug)]
pub struct PrincipalCombiner {
    principals: Vec<Principal>,
    rebound: Mutex<HashMap<DomainId, Rebound>>,
}

#[derive(Debug)]
struct Rebound {
    source: Weak<DomainKey>,
    domain: Arc<TrustDomain>,
}

impl PrincipalCombiner {
    pub fn new(principals: Vec<Principal>) -> Self {
        Self {
            principals,
            rebound: Mutex::new(HashMap::new()),
        }
    }

    pub fn principals(&self) -> &[Principal] {
        &self.principals
    }

    /// Number of rebound domains currently cached.
    pub fn cached(&self) -> usize {
        self.rebound.lock().len()
    }

    fn rebind(&self, domain: &Arc<TrustDomain>) -> Arc<TrustDomain> {
        let mut rebound = self.rebound.lock();
        if let Some(entry) = rebound.get(&domain.id()) {
            if entry.source.strong_count() > 0 {
                return entry.domain.clone();
            }
        }
        // Drop entries whose source domain is gone before adding another.
        rebound.retain(|_, entry| entry.source.strong_count() > 0);
        let fresh = Arc::new(domain.with_principals(self.principals.clone()));
        rebound.insert(
            domain.id(),
            Rebound {
                source: Arc::downgrade(domain.key()),
                domain: fresh.clone(),
            },
        );
        fresh
    }
}

impl DomainCombiner for PrincipalCombiner {
    fn combine(&self, current: &DomainList, assigned: &DomainList) -> DomainList {
        let rebound = combine::domains(current).iter().map(|d| Some(self.rebind(d)));
        let assigned = combine::domains(assigned).iter().cloned().map(Some);
        combine::from_frames(rebound.chain(assigned))
    }

    fn equals(&self, other: &dyn DomainCombiner) -> bool {
        other
            .as_any()
            .downcast_ref::<PrincipalCombiner>()
            .map_or(false, |other| other.principals == self.principals)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_policy::CodeSource;

    fn domain(location: &str) -> Arc<TrustDomain> {
        Arc::new(TrustDomain::new(Some(CodeSource::local(location)), None))
    }

    #[test]
    fn test_rebinds_current_only() {
        let alice = vec![Principal::new("user", "alice")];
        let combiner = PrincipalCombiner::new(alice.clone());
        let stack = domain("/app");
        let assigned = domain("/lib");

        let current = combine::from_frames(vec![Some(stack.clone())]);
        let context = combine::from_frames(vec![Some(assigned.clone())]);
        let merged = combiner.combine(&current, &context);
        let merged = combine::domains(&merged);

        assert_eq!(merged.len(), 2);
        assert_ne!(merged[0].id(), stack.id());
        assert_eq!(merged[0].principals(), alice.as_slice());
        assert!(merged[0].is_dynamic());
        assert_eq!(merged[1].id(), assigned.id());

        // Same rebound domain on the next capture.
        let again = combiner.combine(&current, &None);
        assert_eq!(combine::domains(&again)[0].id(), merged[0].id());
    }

    #[test]
    fn test_cache_forgets_dropped_domains() {
        let combiner = PrincipalCombiner::new(vec![Principal::new("user", "alice")]);

        for i in 0..1000 {
            let transient = domain(&format!("/tmp/job-{}", i));
            let current = combine::from_frames(vec![Some(transient)]);
            combiner.combine(&current, &None);
        }

        let kept = domain("/app");
        let current = combine::from_frames(vec![Some(kept.clone())]);
        let first = combiner.combine(&current, &None);
        assert_eq!(combiner.cached(), 1);

        let again = combiner.combine(&current, &None);
        assert_eq!(
            combine::domains(&again)[0].id(),
            combine::domains(&first)[0].id()
        );
        assert_eq!(combiner.cached(), 1);
    }

    #[test]
    fn test_equality() {
        let a: Option<Arc<dyn DomainCombiner>> =
            Some(Arc::new(PrincipalCombiner::new(vec![Principal::new("user", "a")])));
        let same: Option<Arc<dyn DomainCombiner>> =
            Some(Arc::new(PrincipalCombiner::new(vec![Principal::new("user", "a")])));
        let other: Option<Arc<dyn DomainCombiner>> =
            Some(Arc::new(PrincipalCombiner::new(vec![Principal::new("user", "b")])));

        assert!(combiners_equal(&a, &a));
        assert!(combiners_equal(&a, &same));
        assert!(!combiners_equal(&a, &other));
        assert!(!combiners_equal(&a, &None));
        assert!(combiners_equal(&None, &None));
    }
}
