use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use warden_core::error::{PermissionError, Result};
use warden_core::traits::{Permission, PermissionCollection};

/// Kind of runtime permissions (`exitVM.*`, `setContextLoader`, ...)
pub const RUNTIME_KIND: &str = "runtime";

/// Kind of security administration permissions (`setPolicy`, `getPolicy`, ...)
pub const SECURITY_KIND: &str = "security";

/// Historical spellings, canonicalized at construction: `(kind, alias, canonical)`
const ALIASES: &[(&str, &str, &str)] = &[(RUNTIME_KIND, "exitVM", "exitVM.*")];

/// Parsed form of a hierarchical, dot-separated permission name.
///
/// A name ending in `.*` (or the bare `*`) is a wildcard whose `path` is the
/// prefix up to and including the last dot (empty for `*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct HierarchicalName {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) wildcard: bool,
}

impl HierarchicalName {
    pub(crate) fn parse(kind: &str, name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PermissionError::InvalidArgument(format!(
                "{} permission name can't be empty",
                kind
            ))
            .into());
        }

        let name = ALIASES
            .iter()
            .find(|(k, alias, _)| *k == kind && *alias == name)
            .map(|(_, _, canonical)| *canonical)
            .unwrap_or(name);

        let stars = name.matches('*').count();
        let wildcard = name == "*" || (name.ends_with(".*") && stars == 1);
        if stars > 0 && !wildcard {
            return Err(PermissionError::InvalidArgument(format!(
                "malformed wildcard in {} permission name '{}'",
                kind, name
            ))
            .into());
        }

        let path = if wildcard {
            name[..name.len() - 1].to_string()
        } else {
            name.to_string()
        };

        Ok(Self {
            name: name.to_string(),
            path,
            wildcard,
        })
    }

    /// Name implication, ignoring kind and actions.
    pub(crate) fn implies(&self, that: &HierarchicalName) -> bool {
        match (self.wildcard, that.wildcard) {
            (true, true) => that.path.starts_with(&self.path),
            (true, false) => that.path.len() > self.path.len() && that.path.starts_with(&self.path),
            (false, true) => false,
            (false, false) => self.path == that.path,
        }
    }
}

/// Successively broader wildcard names for `name`: `a.b.c` yields `a.b.*`
/// then `a.*`. The bare `*` is never produced; collections track it with a
/// separate flag.
pub(crate) fn wildcard_ancestors(name: &str) -> impl Iterator<Item = String> + '_ {
    let mut end = name.len();
    std::iter::from_fn(move || {
        let last = name[..end].rfind('.')?;
        end = last;
        Some(format!("{}*", &name[..=last]))
    })
}

/// A permission identified by a hierarchical name and no actions.
///
/// Different kinds share the matching rules but never imply each other:
/// `runtime:a.*` says nothing about `security:a.b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedPermission {
    kind: String,
    name: HierarchicalName,
}

impl NamedPermission {
    /// Creates a named permission of an arbitrary kind.
    pub fn new(kind: impl Into<String>, name: &str) -> Result<Self> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(
                PermissionError::InvalidArgument("permission kind can't be empty".into()).into(),
            );
        }
        let name = HierarchicalName::parse(&kind, name)?;
        Ok(Self { kind, name })
    }

    /// A `runtime` permission.
    pub fn runtime(name: &str) -> Result<Self> {
        Self::new(RUNTIME_KIND, name)
    }

    /// A `security` permission.
    pub fn security(name: &str) -> Result<Self> {
        Self::new(SECURITY_KIND, name)
    }

    pub fn is_wildcard(&self) -> bool {
        self.name.wildcard
    }
}

impl Permission for NamedPermission {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn name(&self) -> &str {
        &self.name.name
    }

    fn implies(&self, other: &dyn Permission) -> bool {
        match other.as_any().downcast_ref::<NamedPermission>() {
            Some(that) => that.kind == self.kind && self.name.implies(&that.name),
            None => false,
        }
    }

    fn new_collection(&self) -> Option<Box<dyn PermissionCollection>> {
        Some(Box::new(NamedPermissionCollection::new()))
    }

    fn clone_box(&self) -> Box<dyn Permission> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct NamedEntries {
    kind: Option<String>,
    by_name: HashMap<String, NamedPermission>,
    order: Vec<String>,
}

/// Collection of same-kind [`NamedPermission`]s.
///
/// Lookups are an exact-name hash lookup followed by a walk up the name
/// hierarchy (`a.b.c` → `a.b.*` → `a.*`). Adding `*` sets a flag that answers
/// every later query without a lookup.
#[derive(Debug, Default)]
pub struct NamedPermissionCollection {
    entries: RwLock<NamedEntries>,
    all_allowed: AtomicBool,
    read_only: AtomicBool,
}

impl NamedPermissionCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionCollection for NamedPermissionCollection {
    fn add(&self, permission: Box<dyn Permission>) -> Result<()> {
        let named = permission
            .as_any()
            .downcast_ref::<NamedPermission>()
            .ok_or_else(|| {
                PermissionError::InvalidArgument(format!("invalid permission: {}", permission))
            })?;

        if self.is_read_only() {
            return Err(PermissionError::ReadOnly(permission.to_string()).into());
        }

        let mut entries = self.entries.write();
        match &entries.kind {
            Some(kind) if *kind != named.kind => {
                return Err(PermissionError::InvalidArgument(format!(
                    "invalid permission: {} in a {} collection",
                    permission, kind
                ))
                .into());
            }
            Some(_) => {}
            None => entries.kind = Some(named.kind.clone()),
        }

        let key = named.name.name.clone();
        if !entries.by_name.contains_key(&key) {
            entries.order.push(key.clone());
            entries.by_name.insert(key.clone(), named.clone());
        }

        if key == "*" {
            self.all_allowed.store(true, Ordering::Relaxed);
        }

        Ok(())
    }

    fn implies(&self, permission: &dyn Permission) -> bool {
        let Some(wanted) = permission.as_any().downcast_ref::<NamedPermission>() else {
            return false;
        };

        let entries = self.entries.read();
        if entries.kind.as_deref() != Some(wanted.kind.as_str()) {
            return false;
        }

        if self.all_allowed.load(Ordering::Relaxed) {
            return true;
        }

        if let Some(found) = entries.by_name.get(&wanted.name.name) {
            return found.implies(permission);
        }

        for candidate in wildcard_ancestors(&wanted.name.name) {
            if let Some(found) = entries.by_name.get(&candidate) {
                return found.implies(permission);
            }
        }

        false
    }

    fn elements(&self) -> Vec<Box<dyn Permission>> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|name| entries.by_name.get(name))
            .map(|p| p.clone_box())
            .collect()
    }

    fn set_read_only(&self) {
        self.read_only.store(true, Ordering::Release);
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.entries.read().order.len()
    }
}
