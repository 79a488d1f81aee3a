// Tests for loading the edge configuration from disk

use exodus_edge::config::{CONF_FILE_ENV, ENDPOINT_URL_ENV};
use exodus_edge::{EdgeConfig, EdgeError};
use std::io::Write;
use tempfile::NamedTempFile;

const YAML_CONFIG: &str = r#"
table:
  name: my-table
  available_regions:
    - us-east-1
    - us-west-2
config_table:
  name: my-config-table
  available_regions: [us-east-1]
config_cache_ttl: 5
headers:
  max_age: 300
  strip_prefixes: [x-amz-meta-]
index: index.html
mirror_reads: "false"
lambda_version: "1.2.3"
connect_timeout: 1
read_timeout: 2.5
logging:
  level: debug
  json: false
"#;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_yaml_config() {
    let file = write_config(YAML_CONFIG);
    let config = EdgeConfig::from_file(file.path()).unwrap();

    assert_eq!(config.table.name, "my-table");
    assert_eq!(config.regions_for("my-table"), vec!["us-east-1", "us-west-2"]);
    assert_eq!(config.regions_for("my-config-table"), vec!["us-east-1"]);
    assert_eq!(config.cache_ttl().as_secs(), 300);
    assert_eq!(config.headers.max_age, 300);
    assert_eq!(config.headers.strip_prefixes, vec!["x-amz-meta-"]);
    assert_eq!(config.index, "index.html");
    assert!(!config.mirror_reads);
    assert_eq!(config.lambda_version, "1.2.3");
    assert_eq!(config.read_timeout().unwrap().as_millis(), 2500);
    assert_eq!(config.logging.level, "debug");
    assert!(!config.logging.json);
}

#[test]
fn test_load_json_config() {
    let file = write_config(
        r#"{
            "table": {"name": "my-table", "available_regions": ["us-east-1"]},
            "config_table": {"name": "my-config-table"},
            "headers": {"max_age": 600},
            "lambda_version": "fake version"
        }"#,
    );

    let config = EdgeConfig::from_file(file.path()).unwrap();
    assert_eq!(config.config_table.name, "my-config-table");
    assert!(config.mirror_reads);
    assert!(config.logging.json);
}

#[test]
fn test_invalid_configs_rejected() {
    for text in [
        "table: [not, a, table]",
        "table:\n  name: t\n",
        "table:\n  name: t\nconfig_table:\n  name: c\nconfig_cache_ttl: 0\n",
        "table:\n  name: \"\"\nconfig_table:\n  name: c\n",
    ] {
        let file = write_config(text);
        let result = EdgeConfig::from_file(file.path());
        assert!(
            matches!(result, Err(EdgeError::Config(_))),
            "accepted invalid config: {}",
            text
        );
    }
}

#[test]
fn test_from_env() {
    let file = write_config(YAML_CONFIG);

    std::env::set_var(CONF_FILE_ENV, file.path());
    std::env::set_var(ENDPOINT_URL_ENV, "http://localhost:4566");
    let config = EdgeConfig::from_env();
    std::env::remove_var(CONF_FILE_ENV);
    std::env::remove_var(ENDPOINT_URL_ENV);

    let config = config.unwrap();
    assert_eq!(config.table.name, "my-table");
    assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:4566"));
}

#[test]
fn test_shipped_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/lambda_config.yaml");
    let config = EdgeConfig::from_file(path).unwrap();

    assert_eq!(config.table.name, "exodus-cdn");
    assert_eq!(config.regions_for("exodus-config"), vec!["us-east-1", "us-east-2"]);
    assert_eq!(config.index, ".__exodus_autoindex");
}
