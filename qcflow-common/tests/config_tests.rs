//! Tests for bootstrap configuration and graceful degradation
//!
//! Tests that touch QCFLOW_* environment variables are #[serial] so they do
//! not race each other.

use qcflow_common::config::{
    load_toml_config, prepare_data_folder, read_toml_config, CompiledDefaults,
    DataFolderResolver, FeedbackCountMode, CONFIG_FILE_ENV, DATABASE_FILE_NAME, DATA_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_compiled_defaults() {
    let defaults = CompiledDefaults::for_current_platform();
    assert!(!defaults.data_folder.as_os_str().is_empty());
    assert_eq!(defaults.port, 5780);
    assert_eq!(defaults.bind, "127.0.0.1");
    assert_eq!(defaults.log_level, "info");
}

#[test]
#[serial]
fn test_resolver_without_overrides_uses_default() {
    env::remove_var(DATA_FOLDER_ENV);

    let resolver = DataFolderResolver::new(None, None);
    assert_eq!(
        resolver.resolve(),
        CompiledDefaults::for_current_platform().data_folder
    );
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(DATA_FOLDER_ENV, "/tmp/qcflow-env-folder");

    let resolver = DataFolderResolver::new(None, Some(PathBuf::from("/tmp/qcflow-toml-folder")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/qcflow-env-folder"));

    env::remove_var(DATA_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_used_when_env_missing() {
    env::remove_var(DATA_FOLDER_ENV);

    let resolver = DataFolderResolver::new(None, Some(PathBuf::from("/tmp/qcflow-toml-folder")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/qcflow-toml-folder"));
}

#[test]
#[serial]
fn test_missing_config_file_degrades_to_defaults() {
    env::remove_var(CONFIG_FILE_ENV);
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let config = load_toml_config(Some(&missing));
    assert!(config.port.is_none());
    assert_eq!(config.retraining.threshold, 10);
}

#[test]
fn test_invalid_config_file_degrades_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number\"\n[[[").unwrap();

    assert!(read_toml_config(&path).is_err());

    let config = load_toml_config(Some(&path));
    assert!(config.port.is_none());
}

#[test]
fn test_full_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
data_folder = "/srv/qcflow"
bind = "0.0.0.0"
port = 8080

[logging]
level = "debug"

[prediction]
url = "http://10.0.0.5:8000"

[training]
url = "http://10.0.0.6:9000/train"

[push]
public_key = "BPx-test-key"

[retraining]
threshold = 25
count_mode = "all"

[sessions]
ttl_hours = 4

[bootstrap]
admin_username = "root"
"#,
    )
    .unwrap();

    let config = read_toml_config(&path).unwrap();
    assert_eq!(config.data_folder, Some(PathBuf::from("/srv/qcflow")));
    assert_eq!(config.bind.as_deref(), Some("0.0.0.0"));
    assert_eq!(config.port, Some(8080));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.training.url.as_deref(), Some("http://10.0.0.6:9000/train"));
    assert_eq!(config.push.public_key.as_deref(), Some("BPx-test-key"));
    assert_eq!(config.retraining.threshold, 25);
    assert_eq!(config.retraining.count_mode, FeedbackCountMode::All);
    assert_eq!(config.sessions.ttl_hours, 4);
    assert_eq!(config.bootstrap.admin_username.as_deref(), Some("root"));
    assert!(config.bootstrap.admin_password.is_none());
}

#[test]
fn test_prepare_data_folder_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let folder = temp_dir.path().join("nested").join("data");

    let db_path = prepare_data_folder(&folder).unwrap();
    assert!(folder.is_dir());
    assert_eq!(db_path, folder.join(DATABASE_FILE_NAME));
}
