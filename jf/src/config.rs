//! jobform configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::StaticCatalog;
use crate::resolver::{DEFAULT_CHANNEL_CAPACITY, ResolverConfig};
use crate::template::FormTemplate;

/// Main jobform configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Remote lookup settings
    pub lookup: LookupConfig,

    /// Form template selection
    pub template: TemplateConfig,

    /// Datasource catalog selection
    pub catalog: CatalogConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .jobform.yml
        let local_config = PathBuf::from(".jobform.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/jobform/jobform.yml
        if let Some(user_config) = user_config_path() {
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => std::iter::once(PathBuf::from(".jobform.yml"))
                .chain(user_config_path())
                .collect(),
        };
        candidates
            .into_iter()
            .filter(|path| path.exists())
            .find_map(|path| Self::load_from_file(&path).ok())
            .and_then(|config| config.log_level)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("jobform").join("jobform.yml"))
}

/// Remote lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Timeout for each catalog call in milliseconds (0 disables it)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Capacity of the completion and event channels
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl LookupConfig {
    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            lookup_timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Form template selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Template file; the embedded DataX template when unset
    pub path: Option<PathBuf>,
}

impl TemplateConfig {
    pub fn load_template(&self) -> Result<FormTemplate> {
        match &self.path {
            Some(path) => FormTemplate::load(path),
            None => FormTemplate::datax().context("Embedded template is invalid"),
        }
    }
}

/// Datasource catalog selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog fixture file
    pub path: Option<PathBuf>,
}

impl CatalogConfig {
    /// Load the configured fixture, or an empty catalog with the default types
    pub fn load_catalog(&self) -> Result<StaticCatalog> {
        match &self.path {
            Some(path) => StaticCatalog::load(path),
            None => Ok(StaticCatalog::new()),
        }
    }
}
