//! The enforcement entry point for sensitive operations.

use std::fmt;
use std::sync::Arc;

use warden_core::error::Result;
use warden_core::traits::Permission;
use warden_policy::PolicyHandle;

use crate::chain::CallChainProvider;
use crate::controller::AccessController;
use crate::snapshot::AccessSnapshot;

/// Decides whether the current operation may use a permission.
///
/// Code guarding a sensitive operation calls `enforce` before acting and
/// propagates the denial otherwise.
pub trait Enforcer: Send + Sync {
    fn enforce(&self, permission: &dyn Permission) -> Result<()>;
}

/// An [`Enforcer`] that checks the call chain reported by a
/// [`CallChainProvider`].
pub struct SecurityManager {
    provider: Arc<dyn CallChainProvider>,
    controller: AccessController,
}

impl SecurityManager {
    pub fn new(provider: Arc<dyn CallChainProvider>, policy: PolicyHandle) -> Self {
        Self::with_controller(provider, AccessController::new(policy))
    }

    pub fn with_controller(provider: Arc<dyn CallChainProvider>, controller: AccessController) -> Self {
        Self {
            provider,
            controller,
        }
    }

    pub fn controller(&self) -> &AccessController {
        &self.controller
    }

    /// The context of the current call chain, to be checked later with
    /// [`enforce_in`](Self::enforce_in).
    pub fn current_context(&self) -> Arc<AccessSnapshot> {
        self.controller
            .get_context(&self.provider.current_call_chain())
    }

    /// Checks `permission` against a previously captured context instead of
    /// the current chain.
    pub fn enforce_in(&self, context: &AccessSnapshot, permission: &dyn Permission) -> Result<()> {
        self.controller.check_snapshot(context, permission)
    }
}

impl Enforcer for SecurityManager {
    fn enforce(&self, permission: &dyn Permission) -> Result<()> {
        self.controller
            .check_permission(&self.provider.current_call_chain(), permission)
    }
}

impl fmt::Debug for SecurityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityManager")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use warden_core::traits::PermissionCollection;
    use warden_permission::{NamedPermission, Permissions};
    use warden_policy::{CodeSource, GrantPolicy, TrustDomain};

    use crate::chain::CallChain;

    fn rt(name: &str) -> NamedPermission {
        NamedPermission::runtime(name).unwrap()
    }

    #[test]
    fn test_enforce_follows_provider() {
        let set = Permissions::new();
        set.add(Box::new(rt("net.*"))).unwrap();
        let app = Arc::new(TrustDomain::new(Some(CodeSource::local("/app")), Some(set)));

        let current = Arc::new(Mutex::new(CallChain::new()));
        let source = current.clone();
        let manager = SecurityManager::new(
            Arc::new(move || source.lock().clone()),
            PolicyHandle::from_policy(Arc::new(GrantPolicy::new())),
        );

        assert!(manager.enforce(&rt("fs.write")).is_ok());

        *current.lock() = CallChain::new().enter(app);
        assert!(manager.enforce(&rt("net.connect")).is_ok());
        assert!(manager.enforce(&rt("fs.write")).unwrap_err().is_denied());

        let captured = manager.current_context();
        *current.lock() = CallChain::new();
        assert!(manager.enforce_in(&captured, &rt("fs.write")).is_err());
    }
}
