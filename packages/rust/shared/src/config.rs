//! Application configuration for Autograph.
//!
//! User config lives at `~/.autograph/autograph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AutographError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "autograph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".autograph";

// ---------------------------------------------------------------------------
// Config structs (matching autograph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata store location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Snapshot build tuning.
    #[serde(default)]
    pub build: BuildConfig,

    /// Export defaults.
    #[serde(default)]
    pub export: ExportConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL metadata database. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.autograph/metadata.db".into()
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Maximum number of nodes computed concurrently inside one build.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> u32 {
    8
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory receiving exported tables.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Number of nodes read per page while exporting.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            page_size: default_page_size(),
        }
    }
}

fn default_output_dir() -> String {
    "./exports".into()
}
fn default_page_size() -> u32 {
    128
}

impl StorageConfig {
    /// Resolve `db_path`, expanding a leading `~/`.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.db_path)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| AutographError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.autograph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AutographError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.autograph/autograph.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AutographError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        AutographError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values the builder and exporter cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.build.concurrency == 0 {
        return Err(AutographError::config("build.concurrency must be at least 1"));
    }
    if config.export.page_size == 0 {
        return Err(AutographError::config("export.page_size must be at least 1"));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AutographError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AutographError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AutographError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
