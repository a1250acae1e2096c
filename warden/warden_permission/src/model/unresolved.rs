use std::any::Any;
use std::fmt;

use warden_core::error::{PermissionError, Result};
use warden_core::traits::{Permission, PermissionKey};

use crate::registry::PermissionType;

/// Kind reported by placeholders
pub const UNRESOLVED_KIND: &str = "unresolved";

enum Step {
    ZeroArg,
    Name,
    NameActions,
}

/// A placeholder for a permission whose type was not available when the
/// grant was read.
///
/// A placeholder never implies anything. [`Permissions`](crate::Permissions)
/// keeps it aside and materializes it once the named type is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnresolvedPermission {
    type_name: String,
    target: Option<String>,
    actions: Option<String>,
    signers: Vec<String>,
}

impl UnresolvedPermission {
    pub fn new(
        type_name: impl Into<String>,
        target: Option<&str>,
        actions: Option<&str>,
        signers: Vec<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            target: target.map(str::to_string),
            actions: actions.map(str::to_string),
            signers,
        }
    }

    /// Name of the permission type this placeholder stands for
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn target_actions(&self) -> Option<&str> {
        self.actions.as_deref()
    }

    pub fn signers(&self) -> &[String] {
        &self.signers
    }

    /// Materializes this placeholder with the factories of `ty`.
    ///
    /// Every signer of the placeholder must also sign the type. The factory
    /// tried depends on which arguments are present: with neither, the
    /// zero-argument, name and name+actions factories are tried in turn; with
    /// a name only, the name then name+actions factories; otherwise only the
    /// name+actions factory. Missing arguments are passed as empty strings.
    pub fn resolve(&self, ty: &PermissionType) -> Result<Box<dyn Permission>> {
        if let Some(missing) = self
            .signers
            .iter()
            .find(|s| !ty.signers().contains(s))
        {
            return Err(self.failure(format!("signer '{}' does not sign the type", missing)));
        }

        let name = self.target.as_deref().unwrap_or("");
        let actions = self.actions.as_deref().unwrap_or("");

        let steps: &[Step] = match (&self.target, &self.actions) {
            (None, None) => &[Step::ZeroArg, Step::Name, Step::NameActions],
            (Some(_), None) => &[Step::Name, Step::NameActions],
            _ => &[Step::NameActions],
        };

        let mut last = None;
        for step in steps {
            let outcome = match step {
                Step::ZeroArg => ty.zero_arg().map(|f| f()),
                Step::Name => ty.named().map(|f| f(name)),
                Step::NameActions => ty.name_actions().map(|f| f(name, actions)),
            };
            match outcome {
                Some(Ok(permission)) => return Ok(permission),
                Some(Err(e)) => last = Some(e.to_string()),
                None => {}
            }
        }

        Err(self.failure(last.unwrap_or_else(|| "no applicable constructor".to_string())))
    }

    fn failure(&self, reason: String) -> warden_core::Error {
        PermissionError::Unresolved {
            type_name: self.type_name.clone(),
            reason,
        }
        .into()
    }
}

impl fmt::Display for UnresolvedPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(unresolved {} {} {})",
            self.type_name,
            self.target.as_deref().unwrap_or("-"),
            self.actions.as_deref().unwrap_or("-")
        )
    }
}

impl Permission for UnresolvedPermission {
    fn kind(&self) -> &str {
        UNRESOLVED_KIND
    }

    fn name(&self) -> &str {
        &self.type_name
    }

    fn implies(&self, _other: &dyn Permission) -> bool {
        false
    }

    fn key(&self) -> PermissionKey {
        PermissionKey::new(
            UNRESOLVED_KIND,
            self.type_name.clone(),
            Some(format!(
                "{} {}",
                self.target.as_deref().unwrap_or(""),
                self.actions.as_deref().unwrap_or("")
            )),
        )
    }

    fn clone_box(&self) -> Box<dyn Permission> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NamedPermission, PropertyPermission};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_never_implies() {
        let placeholder = UnresolvedPermission::new("custom", Some("x"), None, vec![]);
        assert!(!placeholder.implies(&placeholder));
        assert!(!placeholder.implies(&NamedPermission::runtime("x").unwrap()));
    }

    #[test]
    fn test_name_only_prefers_name_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let ty = PermissionType::new("custom")
            .with_name(|name| Ok(Box::new(NamedPermission::new("custom", name)?)))
            .with_name_actions(move |name, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(NamedPermission::new("custom", name)?))
            });

        let resolved = UnresolvedPermission::new("custom", Some("a.b"), None, vec![])
            .resolve(&ty)
            .unwrap();
        assert_eq!(resolved.name(), "a.b");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_falls_through_failing_factories() {
        let ty = PermissionType::new("property")
            .with_name(|_| {
                Err(PermissionError::InvalidArgument("needs actions".into()).into())
            })
            .with_name_actions(|name, _| Ok(Box::new(PropertyPermission::read(name)?)));

        let resolved = UnresolvedPermission::new("property", Some("user.home"), None, vec![])
            .resolve(&ty)
            .unwrap();
        assert_eq!(resolved.actions(), Some("read"));
    }

    #[test]
    fn test_signers_must_be_subset() {
        let ty = PermissionType::new("custom")
            .signed_by(["alice"])
            .with_name(|name| Ok(Box::new(NamedPermission::new("custom", name)?)));

        let ok = UnresolvedPermission::new("custom", Some("a"), None, vec!["alice".into()]);
        assert!(ok.resolve(&ty).is_ok());

        let bad = UnresolvedPermission::new("custom", Some("a"), None, vec!["mallory".into()]);
        let err = bad.resolve(&ty).unwrap_err();
        assert!(matches!(
            err,
            warden_core::Error::Permission(PermissionError::Unresolved { .. })
        ));
    }
}
