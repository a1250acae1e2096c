//! Explicit call chains.
//!
//! The engine does not walk native stacks. Embedders describe "who is
//! calling" with a [`CallChain`]: a persistent list of frames, each naming
//! the trust domain of the code running in it. Entering a frame or marking
//! one privileged returns a new chain and leaves the original untouched, so
//! chains can be shared freely and handed to spawned work.

use std::sync::Arc;

use warden_core::security_debug;
use warden_core::utils::DebugFlags;
use warden_policy::TrustDomain;

use crate::combine;
use crate::snapshot::AccessSnapshot;

/// Marks a frame as the caller of a privileged block.
#[derive(Debug, Clone)]
struct PrivilegeMark {
    /// The context the block asserted, if any
    context: Option<Arc<AccessSnapshot>>,
}

#[derive(Debug)]
struct FrameNode {
    domain: Option<Arc<TrustDomain>>,
    mark: Option<PrivilegeMark>,
    next: Option<Arc<FrameNode>>,
}

/// A call chain, innermost frame first.
#[derive(Debug, Clone, Default)]
pub struct CallChain {
    top: Option<Arc<FrameNode>>,
    inherited: Option<Arc<AccessSnapshot>>,
}

impl CallChain {
    /// An empty chain: only system code is running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a frame running code of `domain`.
    pub fn enter(&self, domain: Arc<TrustDomain>) -> Self {
        self.push(Some(domain), None)
    }

    /// Pushes a frame running system code.
    pub fn enter_system(&self) -> Self {
        self.push(None, None)
    }

    fn push(&self, domain: Option<Arc<TrustDomain>>, mark: Option<PrivilegeMark>) -> Self {
        Self {
            top: Some(Arc::new(FrameNode {
                domain,
                mark,
                next: self.top.clone(),
            })),
            inherited: self.inherited.clone(),
        }
    }

    /// Marks the innermost frame as the caller of a privileged block
    /// asserting `context`. A chain with no frames gets a system frame.
    pub(crate) fn privileged(&self, context: Option<Arc<AccessSnapshot>>) -> Self {
        let mark = Some(PrivilegeMark { context });
        match &self.top {
            Some(top) => Self {
                top: Some(Arc::new(FrameNode {
                    domain: top.domain.clone(),
                    mark,
                    next: top.next.clone(),
                })),
                inherited: self.inherited.clone(),
            },
            None => self.push(None, mark),
        }
    }

    /// The same frames running under `inherited`, e.g. the context captured
    /// by the code that spawned this work.
    pub fn with_inherited(&self, inherited: Arc<AccessSnapshot>) -> Self {
        Self {
            top: self.top.clone(),
            inherited: Some(inherited),
        }
    }

    pub fn inherited(&self) -> Option<&Arc<AccessSnapshot>> {
        self.inherited.as_ref()
    }

    /// The domain of the innermost frame, `None` for system code.
    pub fn caller_domain(&self) -> Option<Arc<TrustDomain>> {
        self.top.as_ref().and_then(|top| top.domain.clone())
    }

    pub fn depth(&self) -> usize {
        self.frames().count()
    }

    fn frames(&self) -> impl Iterator<Item = &FrameNode> {
        std::iter::successors(self.top.as_deref(), |node| node.next.as_deref())
    }

    /// Captures the raw context of this chain.
    ///
    /// Frames are collected innermost first up to and including the first
    /// privileged frame.
    ///
    /// # Returns
    ///
    /// `None` when a privileged block asserting no context was reached
    /// without meeting any domain: the code is fully trusted.
    pub(crate) fn capture(&self) -> Option<AccessSnapshot> {
        let mut frames = Vec::new();
        let mut privileged = None;

        for node in self.frames() {
            frames.push(node.domain.clone());
            if let Some(mark) = &node.mark {
                privileged = Some(mark.context.clone());
                break;
            }
        }

        let domains = combine::from_frames(frames);
        security_debug!(
            DebugFlags::STACK,
            "captured {} domain(s) from {} frame(s), privileged: {}",
            combine::domains(&domains).len(),
            self.depth(),
            privileged.is_some()
        );

        match privileged {
            Some(None) if domains.is_none() => None,
            Some(context) => Some(AccessSnapshot::captured(domains, true, context)),
            None => Some(AccessSnapshot::captured(domains, false, None)),
        }
    }
}

/// Supplies the call chain of the current operation.
pub trait CallChainProvider: Send + Sync {
    fn current_call_chain(&self) -> CallChain;
}

impl<F> CallChainProvider for F
where
    F: Fn() -> CallChain + Send + Sync,
{
    fn current_call_chain(&self) -> CallChain {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_policy::CodeSource;

    fn domain(location: &str) -> Arc<TrustDomain> {
        Arc::new(TrustDomain::new(Some(CodeSource::local(location)), None))
    }

    #[test]
    fn test_enter_is_persistent() {
        let a = domain("/a");
        let b = domain("/b");
        let base = CallChain::new().enter(a.clone());
        let deeper = base.enter(b.clone());

        assert_eq!(base.depth(), 1);
        assert_eq!(deeper.depth(), 2);
        assert_eq!(base.caller_domain().map(|d| d.id()), Some(a.id()));
        assert_eq!(deeper.caller_domain().map(|d| d.id()), Some(b.id()));
        assert!(CallChain::new().enter_system().caller_domain().is_none());
    }

    #[test]
    fn test_capture_stops_at_privileged_frame() {
        let a = domain("/a");
        let b = domain("/b");
        let c = domain("/c");

        let chain = CallChain::new()
            .enter(a.clone())
            .enter(b.clone())
            .privileged(None)
            .enter(c.clone());

        let raw = chain.capture().unwrap();
        let ids: Vec<_> = raw.domains().iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![c.id(), b.id()]);
        assert!(raw.is_privileged());
    }

    #[test]
    fn test_privileged_system_code_is_trusted() {
        let chain = CallChain::new().enter(domain("/a")).enter_system().privileged(None);
        assert!(chain.capture().is_none());

        let empty = CallChain::new().privileged(None);
        assert_eq!(empty.depth(), 1);
        assert!(empty.capture().is_none());

        let unprivileged = CallChain::new().enter_system().capture().unwrap();
        assert!(unprivileged.domains().is_empty());
        assert!(!unprivileged.is_privileged());
    }

    #[test]
    fn test_closure_provider() {
        let a = domain("/a");
        let provider = move || CallChain::new().enter(a.clone());
        assert_eq!(provider.current_call_chain().depth(), 1);
    }
}
