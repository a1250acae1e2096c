//! Engine configuration.
//!
//! Configuration is a small TOML document:
//!
//! ```toml
//! [debug]
//! flags = ["access", "failure"]
//!
//! [policy]
//! provider = "grant"
//! cache_enabled = true
//! sweep_interval = 256
//! ```
//!
//! Environment variables override the file: `WARDEN_DEBUG` takes a comma
//! separated category list and `WARDEN_POLICY_PROVIDER` a provider name.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConfigError, Result};
use crate::utils::logging::{self, DebugFlags};

/// Environment variable holding debug categories.
pub const DEBUG_ENV: &str = "WARDEN_DEBUG";

/// Environment variable selecting the policy provider.
pub const PROVIDER_ENV: &str = "WARDEN_POLICY_PROVIDER";

/// Debug output configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Enabled categories, see [`DebugFlags`]
    #[serde(default)]
    pub flags: Vec<String>,
}

impl DebugConfig {
    /// Parses the configured categories.
    pub fn flags(&self) -> Result<DebugFlags> {
        Ok(self.flags.join(",").parse::<DebugFlags>()?)
    }
}

/// Policy engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Name of the registered policy provider to install at startup
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Whether resolved domain permissions are cached
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Number of cache insertions between sweeps of dead entries
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: usize,
}

fn default_provider() -> String {
    "grant".to_string()
}

fn default_cache_enabled() -> bool {
    true
}

fn default_sweep_interval() -> usize {
    256
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            cache_enabled: default_cache_enabled(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Root configuration of the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

impl SecurityConfig {
    /// Parses a configuration document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SecurityConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Configuration file not found: {}", path.display());
            return Ok(Self::default());
        }

        info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadFailed(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Defaults with environment overrides applied.
    ///
    /// Invalid environment values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Err(e) = config.apply_env() {
            warn!("Ignoring invalid environment configuration: {}", e);
        }
        config
    }

    /// Applies `WARDEN_DEBUG` and `WARDEN_POLICY_PROVIDER` on top of this configuration.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(debug) = std::env::var(DEBUG_ENV) {
            // Validate before replacing.
            debug.parse::<DebugFlags>()?;
            self.debug.flags = debug
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(provider) = std::env::var(PROVIDER_ENV) {
            self.policy.provider = provider;
        }
        self.validate()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.debug.flags()?;

        if self.policy.provider.trim().is_empty() {
            return Err(ConfigError::Invalid("Policy provider cannot be empty".to_string()).into());
        }

        if self.policy.sweep_interval == 0 {
            return Err(ConfigError::Invalid("Sweep interval cannot be zero".to_string()).into());
        }

        Ok(())
    }

    /// Installs the configured debug categories process-wide.
    pub fn apply_debug(&self) -> Result<()> {
        logging::set_debug_flags(self.debug.flags()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SecurityConfig::default();
        assert_eq!(config.policy.provider, "grant");
        assert!(config.policy.cache_enabled);
        assert_eq!(config.debug.flags().unwrap(), DebugFlags::empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = SecurityConfig::from_toml(
            r#"
            [debug]
            flags = ["access", "scope"]

            [policy]
            provider = "bootstrap"
            sweep_interval = 8
            "#,
        )
        .unwrap();

        assert_eq!(
            config.debug.flags().unwrap(),
            DebugFlags::ACCESS | DebugFlags::SCOPE
        );
        assert_eq!(config.policy.provider, "bootstrap");
        assert_eq!(config.policy.sweep_interval, 8);
        assert!(config.policy.cache_enabled);
    }

    #[test]
    fn test_invalid_config() {
        assert!(SecurityConfig::from_toml("[policy]\nsweep_interval = 0").is_err());
        assert!(SecurityConfig::from_toml("[debug]\nflags = [\"nope\"]").is_err());
        assert!(SecurityConfig::from_toml("not toml at all = = =").is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy]\nprovider = \"grant\"\ncache_enabled = false").unwrap();

        let config = SecurityConfig::load(file.path()).unwrap();
        assert!(!config.policy.cache_enabled);

        let missing = SecurityConfig::load("/nonexistent/warden.toml").unwrap();
        assert_eq!(missing, SecurityConfig::default());
    }
}
