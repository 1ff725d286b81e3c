//! Configuration resolution tests
//!
//! Uses serial_test to prevent environment variable races: every test that
//! touches SEAMLESS_CONFIG is marked #[serial].

use seamless_common::config::{resolve_config_path, EngineConfig, CONFIG_ENV_VAR};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_cli_path_wins_over_env() {
    let env_file = write_config("[timing]\nsync_tick_ms = 75\n");
    let cli_file = write_config("[timing]\nsync_tick_ms = 20\n");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    let config = EngineConfig::load(Some(cli_file.path())).unwrap();
    assert_eq!(config.timing.sync_tick_ms, 20);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    let env_file = write_config("[audio]\nsample_rate = 48000\n[logging]\nlevel = \"debug\"\n");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    assert_eq!(resolve_config_path(None).as_deref(), Some(env_file.path()));
    let config = EngineConfig::load(None).unwrap();
    assert_eq!(config.audio.sample_rate, 48_000);
    assert_eq!(config.logging.level, "debug");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = EngineConfig::load(Some(Path::new("/nonexistent/seamless/config.toml")));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let file = write_config("[timing\nfade_tick_ms = ");
    assert!(EngineConfig::load(Some(file.path())).is_err());
}
