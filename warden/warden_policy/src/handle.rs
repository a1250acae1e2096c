//! Swappable reference to the installed policy engine.
//!
//! Readers clone the current `Arc<PolicyEngine>` under a brief read lock and
//! work on that snapshot, so installing a new engine never tears a check in
//! progress: it simply runs against the engine it started with.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::warn;
use warden_core::error::Result;
use warden_core::security_debug;
use warden_core::utils::{DebugFlags, SecurityConfig};

use crate::engine::PolicyEngine;
use crate::policy::Policy;
use crate::provider;

/// Shared handle to the current [`PolicyEngine`].
///
/// Clones share the same slot: installing through one clone is visible to all.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    current: Arc<RwLock<Arc<PolicyEngine>>>,
}

impl PolicyHandle {
    pub fn new(engine: PolicyEngine) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(engine))),
        }
    }

    /// A handle over `policy` with the default cache settings.
    pub fn from_policy(policy: Arc<dyn Policy>) -> Self {
        Self::new(PolicyEngine::new(policy))
    }

    /// A handle over the provider named in `config`.
    pub fn from_config(config: &SecurityConfig) -> Self {
        let policy = provider::global().load(config);
        Self::new(PolicyEngine::with_config(policy, config.policy.clone()))
    }

    /// The process-wide handle, initialised on first use from the environment.
    pub fn global() -> &'static PolicyHandle {
        &GLOBAL
    }

    /// The engine checks should run against.
    pub fn current(&self) -> Arc<PolicyEngine> {
        self.current.read().clone()
    }

    /// Replaces the engine. Returns the previous one.
    pub fn install(&self, engine: PolicyEngine) -> Arc<PolicyEngine> {
        let engine = Arc::new(engine);
        security_debug!(
            DebugFlags::POLICY,
            "Installing policy {} (engine {})",
            engine.policy().name(),
            engine.id()
        );
        std::mem::replace(&mut *self.current.write(), engine)
    }

    /// Replaces the policy, keeping the current cache settings.
    pub fn install_policy(&self, policy: Arc<dyn Policy>) -> Arc<PolicyEngine> {
        let config = self.current().config().clone();
        self.install(PolicyEngine::with_config(policy, config))
    }

    /// Refreshes the current engine.
    pub fn refresh(&self) -> Result<()> {
        self.current().refresh()
    }
}

static GLOBAL: Lazy<PolicyHandle> = Lazy::new(|| {
    let config = SecurityConfig::from_env();
    if let Err(e) = config.apply_debug() {
        warn!("Ignoring debug configuration: {}", e);
    }
    PolicyHandle::from_config(&config)
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{BootstrapPolicy, GrantPolicy};

    #[test]
    fn test_install_swaps_for_all_clones() {
        let handle = PolicyHandle::from_policy(Arc::new(GrantPolicy::new()));
        let other = handle.clone();
        let before = handle.current();

        let previous = other.install_policy(Arc::new(BootstrapPolicy));
        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(handle.current().policy().name(), "bootstrap");
        // Existing snapshots keep the engine they started with.
        assert_eq!(before.policy().name(), "grant");
    }

    #[test]
    fn test_from_config_keeps_settings() {
        let mut config = SecurityConfig::default();
        config.policy.provider = "bootstrap".to_string();
        config.policy.cache_enabled = false;

        let handle = PolicyHandle::from_config(&config);
        assert_eq!(handle.current().policy().name(), "bootstrap");
        assert!(!handle.current().config().cache_enabled);

        handle.install_policy(Arc::new(GrantPolicy::new()));
        assert!(!handle.current().config().cache_enabled);
    }

    #[test]
    fn test_refresh_bumps_generation() {
        let handle = PolicyHandle::from_policy(Arc::new(GrantPolicy::new()));
        handle.refresh().unwrap();
        handle.refresh().unwrap();
        assert_eq!(handle.current().generation(), 2);
    }
}
