//! Configuration management
//!
//! The configuration file is YAML and mirrors the layout documented in the
//! CLI help: an exact `modules` replacement map, an ordered `regexp` rule
//! list, default git credentials, and an optional local cache directory.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Exact module path replacements, applied before the regexp rules
    #[serde(default)]
    pub modules: HashMap<String, String>,

    /// Ordered match-and-rewrite rules; the first matching rule wins
    #[serde(default, rename = "regexp")]
    pub rules: Vec<RouteRule>,

    /// Default git credentials, used when a rule carries none
    #[serde(default, rename = "git-token")]
    pub git_token: Option<String>,
    #[serde(default, rename = "git-url")]
    pub git_url: Option<String>,
    #[serde(default, rename = "git-provider")]
    pub git_provider: Option<ForgeKind>,

    /// Filesystem root for cached upstream tarballs; unset disables caching
    #[serde(default, rename = "local-cache")]
    pub local_cache: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A single match-and-rewrite rule
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRule {
    /// Regular expression matched against the (possibly remapped) module path
    #[serde(rename = "match")]
    pub pattern: String,

    /// Rewrite templates with `$n` capture-group substitution; an unset
    /// template leaves the structural split of the path in place
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,

    #[serde(default, rename = "git-token")]
    pub git_token: Option<String>,
    #[serde(default, rename = "git-url")]
    pub git_url: Option<String>,
    #[serde(default, rename = "git-provider")]
    pub git_provider: Option<ForgeKind>,
}

/// Upstream forge family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeKind {
    GitLab,
    GitHub,
    Offline,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "full".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from the given file plus environment overrides
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("MODGATE").separator("__"))
            .build()?
            .try_deserialize()
    }
}
