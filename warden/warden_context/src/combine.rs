//! Domain-list combination.
//!
//! A domain list is an ordered, duplicate-free sequence of trust domains.
//! `None` stands for "no domains" (only system code was involved) and is
//! distinct from nothing else: an empty list always normalizes to `None`.
//!
//! [`combine`] hands back one of its inputs (the same `Arc`) when combining
//! would not change it, so callers can detect a no-op with [`same_list`].

use std::collections::HashSet;
use std::sync::Arc;

use warden_core::id::DomainId;
use warden_policy::TrustDomain;

/// An optional, shared, duplicate-free list of domains.
pub type DomainList = Option<Arc<[Arc<TrustDomain>]>>;

/// Builds a list from call frames: absent frames (system code) are dropped,
/// duplicates keep their first position, and an empty result is `None`.
pub fn from_frames<I>(frames: I) -> DomainList
where
    I: IntoIterator<Item = Option<Arc<TrustDomain>>>,
{
    let mut seen = HashSet::new();
    let domains: Vec<Arc<TrustDomain>> = frames
        .into_iter()
        .flatten()
        .filter(|domain| seen.insert(domain.id()))
        .collect();
    normalize(domains)
}

pub(crate) fn normalize(domains: Vec<Arc<TrustDomain>>) -> DomainList {
    if domains.is_empty() {
        None
    } else {
        Some(domains.into())
    }
}

/// Restores the list invariants on a list produced elsewhere, e.g. by a
/// [`DomainCombiner`](crate::DomainCombiner): empty becomes `None` and
/// repeated domains are dropped. A list that already holds is returned as is.
pub(crate) fn sanitize(list: DomainList) -> DomainList {
    let domains = list.as_deref()?;
    if domains.is_empty() {
        return None;
    }
    let mut seen = HashSet::new();
    if domains.iter().all(|d| seen.insert(d.id())) {
        return list;
    }
    from_frames(domains.iter().cloned().map(Some))
}

/// The domains of `list`, or an empty slice.
pub fn domains(list: &DomainList) -> &[Arc<TrustDomain>] {
    list.as_deref().unwrap_or(&[])
}

/// Returns true if `list` holds `domain` (by identity).
pub fn contains(list: &DomainList, domain: &TrustDomain) -> bool {
    domains(list).iter().any(|d| d.id() == domain.id())
}

/// Returns true if every domain of `other` is in `list`.
pub fn contains_all(list: &DomainList, other: &DomainList) -> bool {
    let ids: HashSet<DomainId> = domains(list).iter().map(|d| d.id()).collect();
    domains(other).iter().all(|d| ids.contains(&d.id()))
}

/// Returns true if both are `None` or both are the same allocation.
pub fn same_list(a: &DomainList, b: &DomainList) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Returns true if both lists hold the same domains, in any order.
pub fn equal_sets(a: &DomainList, b: &DomainList) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(_), Some(_)) => contains_all(a, b) && contains_all(b, a),
        _ => false,
    }
}

/// Combines the domains on the stack (`current`) with those of an assigned
/// context: the assigned domains first, then the current ones not already
/// present.
///
/// Returns `assigned` itself when `current` adds nothing, and `current`
/// itself when there is nothing assigned.
pub fn combine(current: &DomainList, assigned: &DomainList) -> DomainList {
    let Some(current_domains) = current else {
        return assigned.clone();
    };
    let Some(assigned_domains) = assigned else {
        return current.clone();
    };

    let mut seen: HashSet<DomainId> = assigned_domains.iter().map(|d| d.id()).collect();
    let added: Vec<Arc<TrustDomain>> = current_domains
        .iter()
        .filter(|d| seen.insert(d.id()))
        .cloned()
        .collect();

    if added.is_empty() {
        return assigned.clone();
    }

    let mut merged: Vec<Arc<TrustDomain>> = Vec::with_capacity(assigned_domains.len() + added.len());
    merged.extend(assigned_domains.iter().cloned());
    merged.extend(added);
    normalize(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_policy::CodeSource;

    fn domain(location: &str) -> Arc<TrustDomain> {
        Arc::new(TrustDomain::new(Some(CodeSource::local(location)), None))
    }

    fn ids(list: &DomainList) -> Vec<DomainId> {
        domains(list).iter().map(|d| d.id()).collect()
    }

    #[test]
    fn test_from_frames_dedupes_and_drops_system() {
        let a = domain("/a");
        let b = domain("/b");

        let list = from_frames(vec![
            Some(a.clone()),
            None,
            Some(b.clone()),
            Some(a.clone()),
        ]);
        assert_eq!(ids(&list), vec![a.id(), b.id()]);

        let system: Vec<Option<Arc<TrustDomain>>> = vec![None, None];
        assert!(from_frames(system).is_none());
        assert!(from_frames(Vec::<Option<Arc<TrustDomain>>>::new()).is_none());
    }

    #[test]
    fn test_combine_order_and_identity() {
        let a = domain("/a");
        let b = domain("/b");
        let c = domain("/c");

        let current = from_frames(vec![Some(a.clone()), Some(b.clone())]);
        let assigned = from_frames(vec![Some(c.clone()), Some(a.clone())]);

        let merged = combine(&current, &assigned);
        assert_eq!(ids(&merged), vec![c.id(), a.id(), b.id()]);

        let covered = from_frames(vec![Some(a.clone())]);
        assert!(same_list(&combine(&covered, &assigned), &assigned));
        assert!(same_list(&combine(&None, &assigned), &assigned));
        assert!(same_list(&combine(&current, &None), &current));
        assert!(combine(&None, &None).is_none());
    }

    #[test]
    fn test_sanitize_foreign_lists() {
        let a = domain("/a");
        let b = domain("/b");

        let empty: DomainList = Some(Vec::new().into());
        assert!(sanitize(empty).is_none());
        assert!(sanitize(None).is_none());

        let clean = from_frames(vec![Some(a.clone()), Some(b.clone())]);
        assert!(same_list(&sanitize(clean.clone()), &clean));

        let repeated: DomainList = Some(vec![a.clone(), b.clone(), a.clone()].into());
        assert_eq!(ids(&sanitize(repeated)), vec![a.id(), b.id()]);
    }

    #[test]
    fn test_set_helpers() {
        let a = domain("/a");
        let b = domain("/b");

        let ab = from_frames(vec![Some(a.clone()), Some(b.clone())]);
        let ba = from_frames(vec![Some(b.clone()), Some(a.clone())]);
        let just_a = from_frames(vec![Some(a.clone())]);

        assert!(equal_sets(&ab, &ba));
        assert!(!same_list(&ab, &ba));
        assert!(contains_all(&ab, &just_a));
        assert!(!contains_all(&just_a, &ab));
        assert!(contains(&just_a, &a));
        assert!(!contains(&just_a, &b));
        assert!(!equal_sets(&None, &just_a));
    }
}
