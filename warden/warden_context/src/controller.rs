use std::sync::Arc;

use warden_core::error::Result;
use warden_core::security_debug;
use warden_core::traits::Permission;
use warden_core::utils::DebugFlags;
use warden_policy::PolicyHandle;

use crate::audit::AuditLog;
use crate::chain::CallChain;
use crate::snapshot::AccessSnapshot;

/// Authorization checks and privileged execution over explicit call chains.
///
/// Every check captures the chain, folds it with the context it runs under
/// and asks the resulting snapshot, using the engine currently installed in
/// the controller's [`PolicyHandle`].
///
/// The `do_privileged*` family runs a closure on a copy of the chain whose
/// innermost frame is marked privileged, so checks made inside the closure
/// stop walking at the caller.
#[derive(Debug, Clone)]
pub struct AccessController {
    /// The policy checks are made against
    policy: PolicyHandle,

    /// Optional audit log for recording decisions
    audit_log: Option<Arc<AuditLog>>,
}

impl AccessController {
    pub fn new(policy: PolicyHandle) -> Self {
        Self {
            policy,
            audit_log: None,
        }
    }

    /// A controller over the process-wide policy handle.
    pub fn global() -> Self {
        Self::new(PolicyHandle::global().clone())
    }

    /// Creates a controller that records every decision in `audit_log`.
    pub fn with_audit(policy: PolicyHandle, audit_log: Arc<AuditLog>) -> Self {
        Self {
            policy,
            audit_log: Some(audit_log),
        }
    }

    /// Sets the audit log for this controller
    pub fn set_audit_log(&mut self, audit_log: Option<Arc<AuditLog>>) {
        self.audit_log = audit_log;
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    pub fn audit_log(&self) -> Option<&Arc<AuditLog>> {
        self.audit_log.as_ref()
    }

    /// Checks `permission` against the context of `chain`.
    ///
    /// # Arguments
    ///
    /// * `chain` - The calling code, innermost frame first
    /// * `permission` - The permission the operation needs
    ///
    /// # Returns
    ///
    /// * `Ok(())` if every domain in the context implies `permission`
    /// * `Err(Error::Access(AccessError::Denied { .. }))` naming the permission
    ///   and, when known, the domain that refused it
    pub fn check_permission(&self, chain: &CallChain, permission: &dyn Permission) -> Result<()> {
        let result = match chain.capture() {
            None => {
                security_debug!(
                    DebugFlags::ACCESS,
                    "access allowed (trusted chain) {}",
                    permission
                );
                Ok(())
            }
            Some(raw) => {
                let snapshot = raw.optimize(chain.inherited());
                snapshot.check_permission_with(&self.policy.current(), permission)
            }
        };
        self.audit(permission, &result);
        result
    }

    /// Checks `permission` against an already captured context.
    pub fn check_snapshot(
        &self,
        snapshot: &AccessSnapshot,
        permission: &dyn Permission,
    ) -> Result<()> {
        let result = snapshot.check_permission_with(&self.policy.current(), permission);
        self.audit(permission, &result);
        result
    }

    fn audit(&self, permission: &dyn Permission, result: &Result<()>) {
        if let Some(audit_log) = &self.audit_log {
            let domain = result.as_ref().err().and_then(|e| e.denied_domain());
            audit_log.record(permission, result.is_ok(), domain);
        }
    }

    /// Captures the context of `chain` for later checks, possibly on another
    /// thread.
    pub fn get_context(&self, chain: &CallChain) -> Arc<AccessSnapshot> {
        match chain.capture() {
            None => Arc::new(AccessSnapshot::trusted()),
            Some(raw) => raw.optimize(chain.inherited()),
        }
    }

    /// Runs `f` with the caller's privileges only: checks inside `f` stop at
    /// the innermost frame of `chain`.
    pub fn do_privileged<T, F>(&self, chain: &CallChain, f: F) -> T
    where
        F: FnOnce(&CallChain) -> T,
    {
        security_debug!(DebugFlags::STACK, "privileged block at depth {}", chain.depth());
        f(&chain.privileged(None))
    }

    /// Runs `f` with the caller's privileges intersected with `context`.
    pub fn do_privileged_with_context<T, F>(
        &self,
        chain: &CallChain,
        context: Option<Arc<AccessSnapshot>>,
        f: F,
    ) -> T
    where
        F: FnOnce(&CallChain) -> T,
    {
        f(&chain.privileged(context))
    }

    /// Runs `f` asserting the caller's privileges only for `permissions`.
    ///
    /// Checks for a bound permission behave as in
    /// [`do_privileged_with_context`](Self::do_privileged_with_context).
    /// Anything else is also checked against the context of `chain` as it
    /// was on entry. Binding the universal permission lifts that limit.
    pub fn do_privileged_limited<T, F>(
        &self,
        chain: &CallChain,
        context: Option<Arc<AccessSnapshot>>,
        permissions: Vec<Box<dyn Permission>>,
        f: F,
    ) -> T
    where
        F: FnOnce(&CallChain) -> T,
    {
        let parent = self.get_context(chain);
        let wrapper = AccessSnapshot::wrapper(
            chain.caller_domain(),
            None,
            Some(parent),
            context,
            Some(permissions),
        );
        security_debug!(
            DebugFlags::SCOPE,
            "limited privileged block, limited: {}",
            wrapper.is_limited()
        );
        f(&chain.privileged(Some(Arc::new(wrapper))))
    }

    /// Like [`do_privileged`](Self::do_privileged), but keeps the combiner
    /// of the context the chain runs under.
    pub fn do_privileged_with_combiner<T, F>(&self, chain: &CallChain, f: F) -> T
    where
        F: FnOnce(&CallChain) -> T,
    {
        let Some(raw) = chain.capture() else {
            return self.do_privileged(chain, f);
        };
        let combiner = raw.assigned_combiner(chain.inherited());
        let wrapper = AccessSnapshot::wrapper(chain.caller_domain(), combiner, None, None, None);
        f(&chain.privileged(Some(Arc::new(wrapper))))
    }

    /// Like [`do_privileged_limited`](Self::do_privileged_limited), but
    /// keeps the combiner of the current context, or else of `context`.
    pub fn do_privileged_limited_with_combiner<T, F>(
        &self,
        chain: &CallChain,
        context: Option<Arc<AccessSnapshot>>,
        permissions: Vec<Box<dyn Permission>>,
        f: F,
    ) -> T
    where
        F: FnOnce(&CallChain) -> T,
    {
        let parent = self.get_context(chain);
        let combiner = parent
            .combiner()
            .cloned()
            .or_else(|| context.as_ref().and_then(|c| c.combiner().cloned()));
        let wrapper = AccessSnapshot::wrapper(
            chain.caller_domain(),
            combiner,
            Some(parent),
            context,
            Some(permissions),
        );
        f(&chain.privileged(Some(Arc::new(wrapper))))
    }
}
