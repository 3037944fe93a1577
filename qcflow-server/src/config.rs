//! Runtime settings for qcflow-server
//!
//! Merges command-line values, `QCFLOW_*` environment variables, the TOML file
//! and compiled defaults into one [`ServerSettings`], highest priority first.
//! Clap already folds the environment into the command-line values it owns;
//! the remaining keys are resolved here.

use chrono::Duration as ChronoDuration;
use qcflow_common::config::{CompiledDefaults, FeedbackCountMode, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const PREDICTION_URL_ENV: &str = "QCFLOW_PREDICTION_URL";
pub const TRAINING_URL_ENV: &str = "QCFLOW_TRAINING_URL";
pub const PUSH_PUBLIC_KEY_ENV: &str = "QCFLOW_PUSH_PUBLIC_KEY";
pub const ADMIN_PASSWORD_ENV: &str = "QCFLOW_ADMIN_PASSWORD";

/// Timeout for calls to external services when the TOML leaves it unset
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Values taken from the command line (clap has already applied env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub data_folder: Option<PathBuf>,
    pub prediction_url: Option<String>,
}

/// Fully resolved settings shared through `AppState`
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    pub data_folder: PathBuf,
    pub log_level: String,
    /// Base URL of the prediction service; `None` disables analysis
    pub prediction_url: Option<String>,
    pub prediction_timeout: Duration,
    /// Endpoint receiving retraining jobs; `None` fails jobs with a message
    pub training_url: Option<String>,
    pub training_timeout: Duration,
    pub push_public_key: Option<String>,
    pub retraining_threshold: i64,
    pub count_mode: FeedbackCountMode,
    pub session_ttl: ChronoDuration,
    pub admin_username: String,
    pub admin_password: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::resolve(CliOverrides::default(), &TomlConfig::default())
    }
}

impl ServerSettings {
    /// Resolve every setting: CLI → ENV → TOML → default
    pub fn resolve(cli: CliOverrides, toml: &TomlConfig) -> Self {
        let defaults = CompiledDefaults::for_current_platform();

        let data_folder = qcflow_common::config::DataFolderResolver::new(
            cli.data_folder,
            toml.data_folder.clone(),
        )
        .resolve();

        let prediction_url = resolve_optional(
            "prediction service URL",
            cli.prediction_url,
            PREDICTION_URL_ENV,
            toml.prediction.url.clone(),
        );
        let training_url = resolve_optional(
            "training service URL",
            None,
            TRAINING_URL_ENV,
            toml.training.url.clone(),
        );
        let push_public_key = resolve_optional(
            "push public key",
            None,
            PUSH_PUBLIC_KEY_ENV,
            toml.push.public_key.clone(),
        );
        let admin_password = resolve_optional(
            "bootstrap admin password",
            None,
            ADMIN_PASSWORD_ENV,
            toml.bootstrap.admin_password.clone(),
        );

        let threshold = if toml.retraining.threshold < 1 {
            warn!(
                "retraining.threshold = {} is not positive, using 1",
                toml.retraining.threshold
            );
            1
        } else {
            toml.retraining.threshold
        };

        let ttl_hours = if toml.sessions.ttl_hours < 1 {
            warn!(
                "sessions.ttl_hours = {} is not positive, using 12",
                toml.sessions.ttl_hours
            );
            12
        } else {
            toml.sessions.ttl_hours
        };

        Self {
            bind: cli
                .bind
                .or_else(|| toml.bind.clone())
                .unwrap_or(defaults.bind),
            port: cli.port.or(toml.port).unwrap_or(defaults.port),
            data_folder,
            log_level: toml.logging.level.clone(),
            prediction_url: prediction_url.map(|url| url.trim_end_matches('/').to_string()),
            prediction_timeout: toml
                .prediction
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_EXTERNAL_TIMEOUT),
            training_url,
            training_timeout: toml
                .training
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_EXTERNAL_TIMEOUT),
            push_public_key,
            retraining_threshold: threshold,
            count_mode: toml.retraining.count_mode,
            session_ttl: ChronoDuration::hours(ttl_hours),
            admin_username: toml
                .bootstrap
                .admin_username
                .clone()
                .filter(|name| is_valid_value(name))
                .unwrap_or_else(|| "admin".to_string()),
            admin_password,
        }
    }

    /// `bind:port` for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Resolve an optional string with CLI → ENV → TOML priority
///
/// Blank values count as unset.
fn resolve_optional(
    label: &str,
    cli: Option<String>,
    env_key: &str,
    toml: Option<String>,
) -> Option<String> {
    if let Some(value) = cli.filter(|v| is_valid_value(v)) {
        info!("{} taken from command line", label);
        return Some(value);
    }

    if let Some(value) = std::env::var(env_key).ok().filter(|v| is_valid_value(v)) {
        info!("{} taken from {}", label, env_key);
        return Some(value);
    }

    if let Some(value) = toml.filter(|v| is_valid_value(v)) {
        info!("{} taken from TOML config", label);
        return Some(value);
    }

    None
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
