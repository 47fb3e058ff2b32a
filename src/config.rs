//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$AS4SHELL_CONFIG` (environment variable)
//! 2. `~/.config/as4shell/config.toml` (Linux/macOS)
//!    `%APPDATA%\as4shell\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::attachment::DEFAULT_IN_MEMORY_THRESHOLD;
use crate::compression::CompressionMode;
use crate::pmode::{PModeLeg, PModeLegProtocol, PModeLegSecurity};
use crate::resource::ResourceManager;
use crate::soap::SoapVersion;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Attachment handling.
    pub attachments: AttachmentsConfig,
    /// Default WS-Security settings for outbound legs.
    pub security: PModeLegSecurity,
    /// MIME packaging.
    pub mime: MimeConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Attachment handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentsConfig {
    /// Inbound parts up to this many bytes stay in memory (default: 65536).
    pub in_memory_threshold: u64,
    /// Directory for spooled and compressed attachments (default: OS temp dir).
    pub temp_dir: Option<PathBuf>,
    /// Compression applied to outgoing attachments, if any.
    pub default_compression: Option<CompressionMode>,
}

/// MIME packaging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MimeConfig {
    /// SOAP version of outbound envelopes: "1.1" or "1.2".
    pub soap_version: SoapVersion,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            in_memory_threshold: DEFAULT_IN_MEMORY_THRESHOLD,
            temp_dir: None,
            default_compression: None,
        }
    }
}

impl Config {
    /// A resource manager writing into the configured temp dir.
    pub fn resource_manager(&self) -> ResourceManager {
        match self.attachments.temp_dir {
            Some(ref dir) => ResourceManager::with_temp_dir(dir.clone()),
            None => ResourceManager::new(),
        }
    }

    /// Leg towards `address` with the configured SOAP version and security.
    pub fn leg(&self, address: Option<String>) -> PModeLeg {
        PModeLeg::new(
            PModeLegProtocol::new(address, self.mime.soap_version),
            self.security.clone(),
        )
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (env var first, then the standard config dir).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("AS4SHELL_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("as4shell").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("as4shell")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("as4shell.log")
}
