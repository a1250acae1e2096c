use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use warden_core::id::DomainId;
use warden_core::traits::{Permission, PermissionKey};

/// An entry in the audit log
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// When the decision was made
    pub timestamp: DateTime<Utc>,

    /// The permission that was checked
    pub permission: PermissionKey,

    /// Whether the access was allowed
    pub allowed: bool,

    /// The domain that refused the permission, if known
    pub domain: Option<DomainId>,
}

impl AuditEntry {
    pub fn new(permission: &dyn Permission, allowed: bool, domain: Option<DomainId>) -> Self {
        Self {
            timestamp: Utc::now(),
            permission: permission.key(),
            allowed,
            domain,
        }
    }
}

/// A thread-safe, bounded log of authorization decisions.
///
/// Once full, the oldest entries are dropped first.
#[derive(Debug)]
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,

    /// Maximum number of entries kept
    max_entries: usize,
}

impl AuditLog {
    /// Creates a new audit log keeping at most `max_entries` entries
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    /// Records a decision
    pub fn record(&self, permission: &dyn Permission, allowed: bool, domain: Option<DomainId>) {
        if self.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.lock();
        while entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(AuditEntry::new(permission, allowed, domain));
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Denied entries, oldest first
    pub fn denials(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| !e.allowed)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_permission::NamedPermission;

    fn rt(name: &str) -> NamedPermission {
        NamedPermission::runtime(name).unwrap()
    }

    #[test]
    fn test_record_and_filter() {
        let log = AuditLog::new(10);
        let domain = DomainId::new();

        log.record(&rt("a"), true, None);
        log.record(&rt("b"), false, Some(domain));

        assert_eq!(log.len(), 2);
        let denials = log.denials();
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].permission.name, "b");
        assert_eq!(denials[0].domain, Some(domain));
        assert!(log.entries()[0].timestamp <= denials[0].timestamp);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_bounded() {
        let log = AuditLog::new(2);
        for name in ["a", "b", "c"] {
            log.record(&rt(name), true, None);
        }

        let names: Vec<_> = log.entries().into_iter().map(|e| e.permission.name).collect();
        assert_eq!(names, vec!["b", "c"]);

        let disabled = AuditLog::new(0);
        disabled.record(&rt("a"), true, None);
        assert!(disabled.is_empty());
    }
}
