//! Policy engine.
//!
//! The engine wraps an installed [`Policy`] and caches, per domain, the
//! frozen [`Permissions`] the policy grants it. Cached entries hold only a
//! weak reference to the domain's identity token; dead entries are swept
//! periodically. A refresh bumps the engine's generation and entries from an
//! older generation are recomputed on their next use.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, trace};
use warden_core::error::Result;
use warden_core::id::{DomainId, EngineId};
use warden_core::security_debug;
use warden_core::traits::{Permission, PermissionCollection};
use warden_core::utils::config::PolicyConfig;
use warden_core::utils::DebugFlags;
use warden_permission::Permissions;

use crate::domain::{DomainKey, TrustDomain};
use crate::policy::Policy;

#[derive(Debug)]
struct CachedGrant {
    key: Weak<DomainKey>,
    generation: u64,
    permissions: Arc<Permissions>,
}

/// An installed policy with its resolution cache.
#[derive(Debug)]
pub struct PolicyEngine {
    id: EngineId,
    policy: Arc<dyn Policy>,
    config: PolicyConfig,
    cache: DashMap<DomainId, CachedGrant>,
    generation: AtomicU64,
    inserts: AtomicUsize,
}

impl PolicyEngine {
    /// Create a new engine with the default configuration.
    pub fn new(policy: Arc<dyn Policy>) -> Self {
        Self::with_config(policy, PolicyConfig::default())
    }

    /// Create a new engine.
    ///
    /// # Arguments
    ///
    /// * `policy` - The policy to consult for dynamic domains.
    /// * `config` - Cache settings.
    pub fn with_config(policy: Arc<dyn Policy>, config: PolicyConfig) -> Self {
        debug!("Installing policy engine for provider {}", policy.name());
        Self {
            id: EngineId::new(),
            policy,
            config,
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn policy(&self) -> &Arc<dyn Policy> {
        &self.policy
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns true if `domain` is granted `permission` by the policy.
    pub fn implies(&self, domain: &TrustDomain, permission: &dyn Permission) -> bool {
        let allowed = self.permissions_for(domain).implies(permission);
        trace!(
            "Policy {} {} {} for domain {}",
            self.policy.name(),
            if allowed { "grants" } else { "does not grant" },
            permission,
            domain.id()
        );
        allowed
    }

    /// The frozen permissions the policy grants `domain`, from the cache when
    /// a current entry exists.
    pub fn permissions_for(&self, domain: &TrustDomain) -> Arc<Permissions> {
        let generation = self.generation();

        if self.config.cache_enabled {
            if let Some(cached) = self.cache.get(&domain.id()) {
                if cached.generation == generation {
                    return cached.permissions.clone();
                }
            }
        }

        let permissions = Arc::new(self.resolve(domain));

        if self.config.cache_enabled {
            self.cache.insert(
                domain.id(),
                CachedGrant {
                    key: Arc::downgrade(domain.key()),
                    generation,
                    permissions: permissions.clone(),
                },
            );
            let inserts = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
            if inserts % self.config.sweep_interval.max(1) == 0 {
                self.sweep();
            }
        }

        permissions
    }

    fn resolve(&self, domain: &TrustDomain) -> Permissions {
        let resolved = Permissions::new();
        for permission in self.policy.permissions_for_domain(domain) {
            if let Err(e) = resolved.add(permission) {
                debug!("Skipping permission for domain {}: {}", domain.id(), e);
            }
        }
        resolved.set_read_only();

        security_debug!(
            DebugFlags::POLICY,
            "Resolved {} permissions for {}",
            resolved.len(),
            domain
        );
        resolved
    }

    /// Removes entries whose domain is gone or whose generation is stale.
    ///
    /// # Returns
    ///
    /// The number of entries removed.
    pub fn sweep(&self) -> usize {
        let generation = self.generation();
        let before = self.cache.len();
        self.cache
            .retain(|_, cached| cached.key.strong_count() > 0 && cached.generation == generation);
        let removed = before.saturating_sub(self.cache.len());
        if removed > 0 {
            security_debug!(DebugFlags::POLICY, "Swept {} cache entries", removed);
        }
        removed
    }

    /// Reloads the policy and invalidates every cached entry.
    ///
    /// Entries are recomputed lazily, so a concurrent check may still see the
    /// previous answer for a short while.
    pub fn refresh(&self) -> Result<()> {
        self.policy.refresh()?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        security_debug!(
            DebugFlags::POLICY,
            "Refreshed policy {} to generation {}",
            self.policy.name(),
            generation
        );
        Ok(())
    }

    /// Number of cached entries, live or not.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
