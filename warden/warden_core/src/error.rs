//! Error types for the Warden engine.
//!
//! Errors are organized by subsystem. The root [`Error`] wraps each of them so
//! callers can match on a single type, while the subsystem enums stay precise.
//!
//! A denial ([`AccessError::Denied`]) is an expected, first-class outcome: it
//! carries the exact permission that failed so the caller can retry with a
//! narrower request, fail the operation, or escalate.

use crate::id::DomainId;
use crate::traits::Permission;
use thiserror::Error;

/// Root error type for the Warden engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Authorization decisions
    #[error("{0}")]
    Access(#[from] AccessError),

    /// Permission construction and collection errors
    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    /// Policy provider errors
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error is an authorization denial.
    pub fn is_denied(&self) -> bool {
        matches!(self, Error::Access(AccessError::Denied { .. }))
    }

    /// The permission that was denied, if this is a denial.
    pub fn denied_permission(&self) -> Option<&dyn Permission> {
        match self {
            Error::Access(AccessError::Denied { permission, .. }) => Some(permission.as_ref()),
            _ => None,
        }
    }

    /// The domain that refused the permission, if known.
    pub fn denied_domain(&self) -> Option<DomainId> {
        match self {
            Error::Access(AccessError::Denied { domain, .. }) => *domain,
            _ => None,
        }
    }
}

/// Authorization outcomes that stop an operation.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The permission is not granted by the current context.
    #[error("access denied {permission}")]
    Denied {
        permission: Box<dyn Permission>,
        domain: Option<DomainId>,
    },
}

impl AccessError {
    /// Creates a denial for `permission`, optionally naming the domain that refused it.
    pub fn denied(permission: &dyn Permission, domain: Option<DomainId>) -> Self {
        AccessError::Denied {
            permission: permission.clone_box(),
            domain,
        }
    }
}

/// Errors related to permissions and permission collections.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Malformed name, wildcard or actions, or a permission added to a
    /// collection of another kind
    #[error("Invalid permission argument: {0}")]
    InvalidArgument(String),

    /// Attempt to add to a frozen collection
    #[error("Attempt to add a permission to a read-only collection: {0}")]
    ReadOnly(String),

    /// A placeholder could not be materialized into its concrete type
    #[error("Unresolved permission {type_name}: {reason}")]
    Unresolved { type_name: String, reason: String },
}

/// Errors related to policy providers.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// No policy could be constructed
    #[error("Policy unavailable: {0}")]
    Unavailable(String),

    /// No provider is registered under the requested name
    #[error("Policy provider not found: {0}")]
    ProviderNotFound(String),
}

/// Errors that can occur in configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type used throughout the Warden engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::PermissionKey;
    use std::any::Any;

    #[derive(Debug, Clone)]
    struct Named(&'static str);

    impl Permission for Named {
        fn kind(&self) -> &str {
            "runtime"
        }

        fn name(&self) -> &str {
            self.0
        }

        fn implies(&self, other: &dyn Permission) -> bool {
            other.name() == self.0
        }

        fn clone_box(&self) -> Box<dyn Permission> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = PermissionError::InvalidArgument("empty name".to_string()).into();
        assert!(matches!(err, Error::Permission(_)));

        let err: Error = PolicyError::Unavailable("boom".to_string()).into();
        assert!(matches!(err, Error::Policy(_)));
        assert!(!err.is_denied());
    }

    #[test]
    fn test_denial_carries_permission() {
        let domain = DomainId::new();
        let err: Error = AccessError::denied(&Named("exitVM.1"), Some(domain)).into();

        assert!(err.is_denied());
        assert_eq!(
            err.denied_permission().map(|p| p.key()),
            Some(PermissionKey::new("runtime", "exitVM.1", None))
        );
        assert_eq!(err.denied_domain(), Some(domain));
        assert_eq!(err.to_string(), "access denied (runtime \"exitVM.1\")");
    }
}
