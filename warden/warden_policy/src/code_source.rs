//! Origin descriptors and principals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a piece of code came from: a location and the signers that vouch for it.
///
/// As a grant target, the location may end in `/-` (everything below the
/// directory) or `/*` (files directly in the directory). An absent grant
/// location matches every origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeSource {
    location: Option<String>,
    #[serde(default)]
    signers: Vec<String>,
}

impl CodeSource {
    pub fn new<I, S>(location: Option<&str>, signers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            location: location.map(str::to_string),
            signers: signers.into_iter().map(Into::into).collect(),
        }
    }

    /// An unsigned origin at `location`.
    pub fn local(location: &str) -> Self {
        Self {
            location: Some(location.to_string()),
            signers: Vec::new(),
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn signers(&self) -> &[String] {
        &self.signers
    }

    /// Returns true if this (grant) code source covers `other`.
    ///
    /// Every signer of `self` must sign `other`, and the locations must match
    /// exactly, by directory (`/*`) or recursively (`/-`).
    pub fn implies(&self, other: &CodeSource) -> bool {
        if !self.signers.iter().all(|s| other.signers.contains(s)) {
            return false;
        }

        let Some(grant) = self.location.as_deref() else {
            return true;
        };
        let Some(target) = other.location.as_deref() else {
            return false;
        };

        if let Some(prefix) = grant.strip_suffix('-').filter(|p| p.ends_with('/')) {
            return target.starts_with(prefix);
        }

        if let Some(prefix) = grant.strip_suffix('*').filter(|p| p.ends_with('/')) {
            return match target.rfind('/') {
                Some(last) => &target[..=last] == prefix,
                None => false,
            };
        }

        grant == target
    }
}

impl fmt::Display for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.location.as_deref().unwrap_or("<no location>"))?;
        if !self.signers.is_empty() {
            write!(f, " signed by {}", self.signers.join(","))?;
        }
        write!(f, ")")
    }
}

/// An authenticated identity attached to a domain, e.g. a user or a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal {
    kind: String,
    name: String,
}

impl Principal {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this (grant) principal matches `other`. Either field
    /// may be `*` to match any value.
    pub fn matches(&self, other: &Principal) -> bool {
        (self.kind == "*" || self.kind == other.kind) && (self.name == "*" || self.name == other.name)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.kind, self.name)
    }
}
