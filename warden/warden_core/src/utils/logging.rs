//! Security debug categories.
//!
//! Diagnostics from the authorization path are grouped in categories that can
//! be switched on independently, e.g. `access,failure` to trace every decision
//! and dump the context of every denial. The active set is process-wide and
//! read with a relaxed atomic load, so checking it on the hot path is cheap.
//!
//! Output goes through `tracing`; see the [`security_debug!`](crate::security_debug)
//! macro.

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::ConfigError;

bitflags! {
    /// Debug categories of the authorization engine.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DebugFlags: u8 {
        /// Every permission check and its outcome
        const ACCESS = 0b0000_0001;
        /// Context dump on denial
        const FAILURE = 0b0000_0010;
        /// Call chain capture and elevation marks
        const STACK = 0b0000_0100;
        /// Domains consulted during a check
        const DOMAIN = 0b0000_1000;
        /// Policy installation, refresh and cache activity
        const POLICY = 0b0001_0000;
        /// Limited-privilege scope evaluation
        const SCOPE = 0b0010_0000;
    }
}

const NAMES: [(&str, DebugFlags); 6] = [
    ("access", DebugFlags::ACCESS),
    ("failure", DebugFlags::FAILURE),
    ("stack", DebugFlags::STACK),
    ("domain", DebugFlags::DOMAIN),
    ("policy", DebugFlags::POLICY),
    ("scope", DebugFlags::SCOPE),
];

impl FromStr for DebugFlags {
    type Err = ConfigError;

    /// Parses a comma separated category list. `all` enables everything.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = DebugFlags::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let part = part.to_lowercase();
            if part == "all" {
                flags = DebugFlags::all();
                continue;
            }
            match NAMES.iter().find(|(name, _)| *name == part) {
                Some((_, flag)) => flags |= *flag,
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "unknown debug category '{}'",
                        part
                    )))
                }
            }
        }
        Ok(flags)
    }
}

impl fmt::Display for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "{}", names.join(","))
    }
}

static ACTIVE: AtomicU8 = AtomicU8::new(0);

/// The currently enabled categories.
pub fn debug_flags() -> DebugFlags {
    DebugFlags::from_bits_truncate(ACTIVE.load(Ordering::Relaxed))
}

/// Replaces the enabled categories.
pub fn set_debug_flags(flags: DebugFlags) {
    ACTIVE.store(flags.bits(), Ordering::Relaxed);
}

/// Returns true if any of `flags` is enabled.
pub fn enabled(flags: DebugFlags) -> bool {
    debug_flags().intersects(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_categories() {
        let flags: DebugFlags = "access, Failure".parse().unwrap();
        assert_eq!(flags, DebugFlags::ACCESS | DebugFlags::FAILURE);
        assert_eq!(flags.to_string(), "access,failure");

        assert_eq!("all".parse::<DebugFlags>().unwrap(), DebugFlags::all());
        assert_eq!("".parse::<DebugFlags>().unwrap(), DebugFlags::empty());
        assert!("bogus".parse::<DebugFlags>().is_err());
    }
}
