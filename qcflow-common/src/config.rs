//! Bootstrap configuration loading and data folder resolution
//!
//! Resolution priority for every bootstrap value:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data folder
pub const DATA_FOLDER_ENV: &str = "QCFLOW_DATA_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "QCFLOW_CONFIG";

/// Database file name inside the data folder
pub const DATABASE_FILE_NAME: &str = "qcflow.db";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5780;

/// Default retraining threshold
pub const DEFAULT_RETRAINING_THRESHOLD: i64 = 10;

/// TOML bootstrap configuration
///
/// Every section is optional; absent values fall back to [`CompiledDefaults`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the SQLite database
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    /// Bind address (e.g. "127.0.0.1")
    #[serde(default)]
    pub bind: Option<String>,

    /// HTTP port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub prediction: PredictionConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub retraining: RetrainingConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// External prediction service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Base URL, e.g. "http://127.0.0.1:8000"
    #[serde(default)]
    pub url: Option<String>,

    /// Request timeout in seconds (default 30)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// External training service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Endpoint receiving retraining jobs (POST)
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Push notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    /// Public key handed to clients registering for push delivery
    #[serde(default)]
    pub public_key: Option<String>,
}

/// Which feedback records count towards the retraining threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCountMode {
    /// Only feedback reporting an incorrect prediction
    #[default]
    Incorrect,
    /// Every feedback record, whatever its verdict
    All,
}

/// Retraining trigger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainingConfig {
    #[serde(default = "default_threshold")]
    pub threshold: i64,

    #[serde(default)]
    pub count_mode: FeedbackCountMode,
}

impl Default for RetrainingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            count_mode: FeedbackCountMode::default(),
        }
    }
}

fn default_threshold() -> i64 {
    DEFAULT_RETRAINING_THRESHOLD
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> i64 {
    12
}

/// First-run administrator account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub admin_username: Option<String>,

    #[serde(default)]
    pub admin_password: Option<String>,
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_folder: PathBuf,
    pub bind: String,
    pub port: u16,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_folder = dirs::data_local_dir()
            .map(|d| d.join("qcflow"))
            .unwrap_or_else(|| PathBuf::from("./qcflow_data"));

        Self {
            data_folder,
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            log_level: default_log_level(),
        }
    }
}

/// Locate the TOML config file
///
/// Order: explicit path, `QCFLOW_CONFIG`, `~/.config/qcflow/config.toml`,
/// `/etc/qcflow/config.toml`. Returns `None` when nothing exists.
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("qcflow").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/qcflow/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the TOML config with graceful degradation
///
/// Missing file → defaults (info). Unreadable or invalid file → defaults (warning).
pub fn load_toml_config(explicit: Option<&Path>) -> TomlConfig {
    let Some(path) = locate_config_file(explicit) else {
        info!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match read_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config file: {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - continuing with compiled defaults", e);
            TomlConfig::default()
        }
    }
}

/// Data folder resolution following CLI → ENV → TOML → default
pub struct DataFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl DataFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_value: Option<PathBuf>) -> Self {
        Self { cli_arg, toml_value }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().data_folder
    }
}

/// Create the data folder if missing and return the database path inside it
pub fn prepare_data_folder(data_folder: &Path) -> Result<PathBuf> {
    if !data_folder.exists() {
        std::fs::create_dir_all(data_folder)?;
        info!("Created data folder: {}", data_folder.display());
    }
    Ok(data_folder.join(DATABASE_FILE_NAME))
}
