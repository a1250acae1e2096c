//! Registry of permission types.
//!
//! Placeholders ([`UnresolvedPermission`](crate::model::UnresolvedPermission))
//! name their type by string. The registry maps that name to the signers of
//! the type and to the constructors used to materialize it.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;
use warden_core::error::Result;
use warden_core::traits::{Permission, ALL_KIND};

use crate::model::{
    AllPermission, FilePermission, NamedPermission, PropertyPermission, FILE_KIND, PROPERTY_KIND,
    RUNTIME_KIND, SECURITY_KIND,
};

pub type ZeroArgFactory = Arc<dyn Fn() -> Result<Box<dyn Permission>> + Send + Sync>;
pub type NameFactory = Arc<dyn Fn(&str) -> Result<Box<dyn Permission>> + Send + Sync>;
pub type NameActionsFactory =
    Arc<dyn Fn(&str, &str) -> Result<Box<dyn Permission>> + Send + Sync>;

/// A registered permission type: its signers and its constructors.
#[derive(Clone)]
pub struct PermissionType {
    kind: String,
    signers: Vec<String>,
    zero_arg: Option<ZeroArgFactory>,
    named: Option<NameFactory>,
    name_actions: Option<NameActionsFactory>,
}

impl PermissionType {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            signers: Vec::new(),
            zero_arg: None,
            named: None,
            name_actions: None,
        }
    }

    /// Declares the signers of this type.
    pub fn signed_by<I, S>(mut self, signers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signers = signers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_zero_arg<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Permission>> + Send + Sync + 'static,
    {
        self.zero_arg = Some(Arc::new(factory));
        self
    }

    pub fn with_name<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> Result<Box<dyn Permission>> + Send + Sync + 'static,
    {
        self.named = Some(Arc::new(factory));
        self
    }

    pub fn with_name_actions<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Box<dyn Permission>> + Send + Sync + 'static,
    {
        self.name_actions = Some(Arc::new(factory));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn signers(&self) -> &[String] {
        &self.signers
    }

    pub fn zero_arg(&self) -> Option<&ZeroArgFactory> {
        self.zero_arg.as_ref()
    }

    pub fn named(&self) -> Option<&NameFactory> {
        self.named.as_ref()
    }

    pub fn name_actions(&self) -> Option<&NameActionsFactory> {
        self.name_actions.as_ref()
    }
}

impl fmt::Debug for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionType")
            .field("kind", &self.kind)
            .field("signers", &self.signers)
            .field("zero_arg", &self.zero_arg.is_some())
            .field("named", &self.named.is_some())
            .field("name_actions", &self.name_actions.is_some())
            .finish()
    }
}

/// Concurrent map from type name to [`PermissionType`].
#[derive(Debug, Default)]
pub struct PermissionRegistry {
    types: DashMap<String, PermissionType>,
}

impl PermissionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in kinds.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(
            PermissionType::new(ALL_KIND).with_zero_arg(|| Ok(Box::new(AllPermission))),
        );
        registry.register(
            PermissionType::new(RUNTIME_KIND)
                .with_name(|name| Ok(Box::new(NamedPermission::runtime(name)?))),
        );
        registry.register(
            PermissionType::new(SECURITY_KIND)
                .with_name(|name| Ok(Box::new(NamedPermission::security(name)?))),
        );
        registry.register(
            PermissionType::new(PROPERTY_KIND).with_name_actions(|name, actions| {
                Ok(Box::new(PropertyPermission::new(name, actions)?))
            }),
        );
        registry.register(
            PermissionType::new(FILE_KIND).with_name_actions(|path, actions| {
                Ok(Box::new(FilePermission::new(path, actions)?))
            }),
        );
        registry
    }

    /// Registers a type, replacing any previous type of the same name.
    pub fn register(&self, ty: PermissionType) {
        debug!("Registering permission type {}", ty.kind);
        self.types.insert(ty.kind.clone(), ty);
    }

    pub fn unregister(&self, kind: &str) -> Option<PermissionType> {
        self.types.remove(kind).map(|(_, ty)| ty)
    }

    pub fn get(&self, kind: &str) -> Option<PermissionType> {
        self.types.get(kind).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.types.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

static GLOBAL: Lazy<Arc<PermissionRegistry>> =
    Lazy::new(|| Arc::new(PermissionRegistry::with_builtin()));

/// The process-wide registry, pre-populated with the built-in kinds.
pub fn global() -> Arc<PermissionRegistry> {
    GLOBAL.clone()
}
