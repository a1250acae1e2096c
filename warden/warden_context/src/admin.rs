//! Guarded policy administration.

use std::fmt;
use std::sync::Arc;

use tracing::info;
use warden_core::error::Result;
use warden_permission::NamedPermission;
use warden_policy::{Policy, PolicyHandle};

use crate::enforcer::Enforcer;

/// Administrative operations on a [`PolicyHandle`], each guarded by its own
/// `security` permission: `setPolicy`, `getPolicy` and `refreshPolicy`.
pub struct PolicyAdmin {
    policy: PolicyHandle,
    enforcer: Arc<dyn Enforcer>,
}

impl PolicyAdmin {
    pub fn new(policy: PolicyHandle, enforcer: Arc<dyn Enforcer>) -> Self {
        Self { policy, enforcer }
    }

    fn guard(&self, action: &str) -> Result<()> {
        self.enforcer.enforce(&NamedPermission::security(action)?)
    }

    /// Installs `policy` in place of the current one.
    ///
    /// Checks already running keep the engine they started with.
    pub fn install_policy(&self, policy: Arc<dyn Policy>) -> Result<()> {
        self.guard("setPolicy")?;
        info!("Installing policy {}", policy.name());
        self.policy.install_policy(policy);
        Ok(())
    }

    /// The policy currently installed.
    pub fn get_policy(&self) -> Result<Arc<dyn Policy>> {
        self.guard("getPolicy")?;
        Ok(self.policy.current().policy().clone())
    }

    /// Reloads the current policy and invalidates resolved permissions.
    pub fn refresh_policy(&self) -> Result<()> {
        self.guard("refreshPolicy")?;
        self.policy.refresh()
    }
}

impl fmt::Debug for PolicyAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyAdmin")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::error::AccessError;
    use warden_core::traits::Permission;
    use warden_policy::{BootstrapPolicy, GrantPolicy};

    /// Allows exactly the listed `security` targets.
    struct Allow(&'static [&'static str]);

    impl Enforcer for Allow {
        fn enforce(&self, permission: &dyn Permission) -> Result<()> {
            if self.0.iter().any(|name| *name == permission.name()) {
                Ok(())
            } else {
                Err(AccessError::denied(permission, None).into())
            }
        }
    }

    #[test]
    fn test_each_operation_has_its_own_guard() {
        let handle = PolicyHandle::from_policy(Arc::new(GrantPolicy::new()));
        let admin = PolicyAdmin::new(handle.clone(), Arc::new(Allow(&["getPolicy"])));

        assert_eq!(admin.get_policy().unwrap().name(), "grant");

        let err = admin.install_policy(Arc::new(BootstrapPolicy)).unwrap_err();
        assert_eq!(
            err.denied_permission().map(|p| p.name().to_string()),
            Some("setPolicy".to_string())
        );
        assert_eq!(handle.current().policy().name(), "grant");

        assert!(admin.refresh_policy().unwrap_err().is_denied());
        assert_eq!(handle.current().generation(), 0);
    }

    #[test]
    fn test_allowed_operations_take_effect() {
        let handle = PolicyHandle::from_policy(Arc::new(GrantPolicy::new()));
        let admin = PolicyAdmin::new(
            handle.clone(),
            Arc::new(Allow(&["setPolicy", "refreshPolicy"])),
        );

        admin.install_policy(Arc::new(BootstrapPolicy)).unwrap();
        assert_eq!(handle.current().policy().name(), "bootstrap");

        admin.refresh_policy().unwrap();
        assert_eq!(handle.current().generation(), 1);
    }
}
