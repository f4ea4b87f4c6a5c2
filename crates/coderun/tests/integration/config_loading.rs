use coderun::config::{Config, SourceLayout};

use super::FIXTURES_PATH;

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.language_ids(), vec!["test"]);
    assert_eq!(config.server.port, 5000);
    assert!(config.toolchains.is_empty());
}

#[test]
fn test_load_layers_file_over_defaults() {
    let path = format!("{FIXTURES_PATH}/configs/valid_overrides.toml");
    let config = Config::load(Some(path.as_ref())).expect("Failed to load config");

    // File values win
    assert!(!config.allow_privileged);
    assert_eq!(config.max_concurrent_executions, Some(4));
    assert_eq!(config.default_limits.wall_time_limit, Some(3.0));

    // Defaults survive where the file is silent
    assert_eq!(config.default_limits.max_output, Some(1024));
    assert_eq!(config.language_ids().len(), 8);

    let python = config.get_language("python").unwrap();
    assert_eq!(python.run.command, vec!["python3", "{source}"]);
    let limits = config.effective_limits(python.limits.as_ref());
    assert_eq!(limits.wall_time_limit, Some(30.0));
}

#[test]
fn test_load_without_file_uses_defaults() {
    let config = Config::load(None).expect("Failed to load config");
    let java = config.get_language("java").unwrap();
    assert_eq!(java.source, SourceLayout::JavaClass);
    assert!(java.is_compiled());
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file("/nonexistent/coderun.toml");
    assert!(result.is_err());

    let result = Config::load(Some("/nonexistent/coderun.toml".as_ref()));
    assert!(result.is_err());
}

#[test]
fn test_load_invalid_empty_name() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_name.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_inline_compile() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_inline_compile.toml");
    let err = Config::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("inline"), "{err}");
}

#[test]
fn test_load_invalid_output_name() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_output_name.toml");
    let err = Config::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("output name"), "{err}");
}

#[test]
fn test_example_config_parses() {
    let config = Config::parse_toml(coderun::EXAMPLE_CONFIG).expect("example config is valid");
    assert_eq!(config.language_ids().len(), 8);
}
