//! Tests for configuration file resolution and TOML loading
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate SEGUE_CONFIG are marked with #[serial].

use segue_common::config::{load_or_default, load_toml, resolve_config_path, CONFIG_ENV_VAR};
use segue_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Deserialize, Default, PartialEq)]
struct SampleConfig {
    #[serde(default)]
    volume: Option<f32>,
    #[serde(default)]
    name: String,
}

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(resolved.unwrap(), Path::new("/tmp/from-cli.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(resolved.unwrap(), Path::new("/tmp/from-env.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_load_toml_parses_fields() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "volume = 0.5\nname = \"living room\"").unwrap();

    let config: SampleConfig = load_toml(file.path()).unwrap();
    assert_eq!(config.volume, Some(0.5));
    assert_eq!(config.name, "living room");
}

#[test]
fn test_load_toml_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let result: Result<SampleConfig, Error> = load_toml(&missing);
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_load_toml_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "volume = [not valid").unwrap();

    let result: Result<SampleConfig, Error> = load_toml(file.path());
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

#[test]
#[serial]
fn test_load_or_default_with_explicit_file() {
    env::remove_var(CONFIG_ENV_VAR);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name = \"kitchen\"").unwrap();

    let config: SampleConfig = load_or_default(Some(file.path()), CONFIG_ENV_VAR).unwrap();
    assert_eq!(config.name, "kitchen");
    assert_eq!(config.volume, None);
}
