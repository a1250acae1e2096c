//! Strongly-typed identifiers for the Warden engine.
//!
//! Identifiers are thin wrappers around a UUID with a phantom marker, so a
//! [`DomainId`] can never be confused with an [`EngineId`] even though both
//! share the same representation.
//!
//! Domain identifiers are identity tokens: they are generated when a trust
//! domain is constructed and are never derived from the domain's content.
//!
//! # Examples
//!
//! ```
//! use warden_core::id::{DomainId, EngineId};
//!
//! let domain = DomainId::new();
//! let engine = EngineId::new();
//! assert_ne!(domain.to_string(), engine.to_string());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A type-safe identifier based on UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Id<T> {
    uuid: Uuid,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random identifier.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Create an identifier from a specific UUID.
    ///
    /// ```
    /// use warden_core::id::DomainId;
    /// use uuid::Uuid;
    ///
    /// let uuid = Uuid::new_v4();
    /// assert_eq!(DomainId::from_uuid(uuid).uuid(), uuid);
    /// ```
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Create a nil (all zeros) identifier.
    pub fn nil() -> Self {
        Self::from_uuid(Uuid::nil())
    }

    /// Check if this is a nil identifier.
    pub fn is_nil(&self) -> bool {
        self.uuid == Uuid::nil()
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_uuid(Uuid::parse_str(s)?))
    }
}

/// Marker type for trust domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainMarker;
/// Identity of a trust domain.
pub type DomainId = Id<DomainMarker>;

/// Marker type for policy engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineMarker;
/// Identity of an installed policy engine.
pub type EngineId = Id<EngineMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_new() {
        let id1 = DomainId::new();
        let id2 = DomainId::new();
        assert_ne!(id1, id2, "Generated IDs should be unique");
    }

    #[test]
    fn test_id_from_str() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = DomainId::from_str(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn test_id_nil() {
        let nil_id = EngineId::nil();
        assert_eq!(nil_id.to_string(), "00000000-0000-0000-0000-000000000000");
        assert!(nil_id.is_nil());
        assert!(!EngineId::new().is_nil());
    }

    #[test]
    fn test_type_safety() {
        let same_uuid = Uuid::new_v4();
        let domain_id = DomainId::from_uuid(same_uuid);
        let engine_id = EngineId::from_uuid(same_uuid);

        // Same representation, different types.
        assert_eq!(domain_id.uuid(), engine_id.uuid());
    }
}
