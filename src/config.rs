//! Run configuration
//!
//! Loaded from a TOML file. Every section is optional so the tool can run
//! against a snapshot with no file at all.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::infrastructure::looks_like_dn;

/// Environment variable consulted when `bind_password` is absent from the file
pub const BIND_PASSWORD_ENV: &str = "ADRESOLVE_BIND_PASSWORD";

pub const DEFAULT_LOG_FILE: &str = "adresolve.log";

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub ldap: Option<LdapSettings>,
    pub resolver: ResolverSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LdapSettings {
    pub url: String,
    pub base_dn: String,
    #[serde(default)]
    pub bind_dn: String,
    #[serde(default)]
    pub bind_password: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_fast_path_timeout")]
    pub fast_path_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSettings {
    pub domain_suffix: Option<String>,
    pub attributes: Vec<String>,
    pub recursive: bool,
    pub include_disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Defaults to the executable's directory
    pub directory: Option<PathBuf>,
    pub file_name: String,
    pub level: String,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_search_timeout() -> u64 {
    60
}

fn default_fast_path_timeout() -> u64 {
    30
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            domain_suffix: None,
            attributes: Vec::new(),
            recursive: true,
            include_disabled: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            file_name: DEFAULT_LOG_FILE.to_string(),
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Read, parse and validate a TOML configuration file
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)
            .map_err(|e| AppError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> AppResult<Self> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| AppError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if let Some(ldap) = &self.ldap {
            ldap.validate()?;
        }
        if self.logging.file_name.trim().is_empty() {
            return Err(AppError::ConfigError("logging.file_name must not be empty".to_string()));
        }
        if self.resolver.attributes.iter().any(|a| a.trim().is_empty()) {
            return Err(AppError::ConfigError("resolver.attributes contains an empty name".to_string()));
        }
        Ok(())
    }
}

impl LdapSettings {
    pub fn validate(&self) -> AppResult<()> {
        let url = self.url.to_lowercase();
        if !url.starts_with("ldap://") && !url.starts_with("ldaps://") {
            return Err(AppError::ConfigError(format!(
                "ldap.url must start with ldap:// or ldaps://, got {}",
                self.url
            )));
        }
        if !looks_like_dn(&self.base_dn) {
            return Err(AppError::ConfigError(format!(
                "ldap.base_dn is not a distinguished name: {}",
                self.base_dn
            )));
        }
        if self.fast_path_timeout_secs == 0 {
            return Err(AppError::ConfigError("ldap.fast_path_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Password from the file, else from the environment
    pub fn bind_password(&self) -> Option<String> {
        self.bind_password
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| std::env::var(BIND_PASSWORD_ENV).ok().filter(|p| !p.is_empty()))
    }
}

impl fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapSettings")
            .field("url", &self.url)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| REDACTED))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("search_timeout_secs", &self.search_timeout_secs)
            .field("fast_path_timeout_secs", &self.fast_path_timeout_secs)
            .finish()
    }
}
