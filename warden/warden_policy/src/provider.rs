//! Named policy providers.
//!
//! The configuration selects a policy by name (`[policy] provider`). The
//! registry maps names to constructors; when a provider is unknown or fails to
//! construct, the engine falls back to [`BootstrapPolicy`] so system code keeps
//! working.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{info, warn};
use warden_core::error::{PolicyError, Result};
use warden_core::utils::SecurityConfig;

use crate::policy::{BootstrapPolicy, GrantPolicy, Policy};

pub type PolicyConstructor = Arc<dyn Fn(&SecurityConfig) -> Result<Arc<dyn Policy>> + Send + Sync>;

/// Registry of policy constructors by provider name.
pub struct ProviderRegistry {
    providers: DashMap<String, PolicyConstructor>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    /// Creates a registry with the `grant` and `bootstrap` providers.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("grant", |_| Ok(Arc::new(GrantPolicy::new())));
        registry.register("bootstrap", |_| Ok(Arc::new(BootstrapPolicy)));
        registry
    }

    pub fn register<F>(&self, name: &str, constructor: F)
    where
        F: Fn(&SecurityConfig) -> Result<Arc<dyn Policy>> + Send + Sync + 'static,
    {
        self.providers.insert(name.to_string(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Constructs the provider named `name`.
    ///
    /// # Errors
    ///
    /// `ProviderNotFound` if no provider has that name, `Unavailable` if its
    /// constructor fails.
    pub fn create(&self, name: &str, config: &SecurityConfig) -> Result<Arc<dyn Policy>> {
        let constructor = self
            .providers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PolicyError::ProviderNotFound(name.to_string()))?;

        constructor(config)
            .map_err(|e| PolicyError::Unavailable(format!("{}: {}", name, e)).into())
    }

    /// Constructs the configured provider, falling back to [`BootstrapPolicy`].
    pub fn load(&self, config: &SecurityConfig) -> Arc<dyn Policy> {
        match self.create(&config.policy.provider, config) {
            Ok(policy) => {
                info!("Loaded policy provider {}", policy.name());
                policy
            }
            Err(e) => {
                warn!("Falling back to bootstrap policy: {}", e);
                Arc::new(BootstrapPolicy)
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

static GLOBAL: Lazy<ProviderRegistry> = Lazy::new(ProviderRegistry::with_builtin);

/// The process-wide provider registry.
pub fn global() -> &'static ProviderRegistry {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::error::ConfigError;

    fn config(provider: &str) -> SecurityConfig {
        let mut config = SecurityConfig::default();
        config.policy.provider = provider.to_string();
        config
    }

    #[test]
    fn test_builtin_providers() {
        let registry = ProviderRegistry::with_builtin();
        assert_eq!(registry.load(&config("grant")).name(), "grant");
        assert_eq!(registry.load(&config("bootstrap")).name(), "bootstrap");
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let registry = ProviderRegistry::with_builtin();
        let err = registry.create("ldap", &config("ldap")).err().unwrap();
        assert!(matches!(
            err,
            warden_core::Error::Policy(PolicyError::ProviderNotFound(_))
        ));
        assert_eq!(registry.load(&config("ldap")).name(), "bootstrap");
    }

    #[test]
    fn test_failing_provider_falls_back() {
        let registry = ProviderRegistry::with_builtin();
        registry.register("broken", |_| {
            Err(ConfigError::Invalid("missing grant file".to_string()).into())
        });

        let err = registry.create("broken", &config("broken")).err().unwrap();
        assert!(matches!(
            err,
            warden_core::Error::Policy(PolicyError::Unavailable(_))
        ));
        assert_eq!(registry.load(&config("broken")).name(), "bootstrap");
    }
}
