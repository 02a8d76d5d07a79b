//! YAML configuration files layered under environment variables.

use std::io::Write;
use std::time::Duration;

use rbac_reconciler::config::CONFIG_PATH_VAR;
use rbac_reconciler::{BackendKind, InventoryTarget, ReconcilerConfig};
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn with_file<'a>(file: &'a NamedTempFile, vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
    move |key: &str| {
        if key == CONFIG_PATH_VAR {
            return Some(file.path().to_string_lossy().to_string());
        }
        vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }
}

const FULL: &str = r#"
role_prefix: acme
deployment_role_suffix: cicd
backend: memory
operation_timeout_secs: 15
excluded_schemas: [INFORMATION_SCHEMA, PUBLIC, SCRATCH]
monitor_concurrency: 2
snowflake:
  account_url: https://acme.snowflakecomputing.com
  warehouse: ADMIN_WH
inventory:
  - environment: DEV
    database: HR
    schema: EMPLOYEES
  - environment: PRD
    database: FINANCE
"#;

#[test]
fn file_settings_are_applied() {
    let file = write_config(FULL);
    let config = ReconcilerConfig::from_file(file.path()).unwrap();

    assert_eq!(config.naming.prefix, "ACME");
    assert_eq!(config.naming.deployment_role_suffix, "CICD");
    assert_eq!(config.backend, BackendKind::Memory);
    assert_eq!(config.operation_timeout, Duration::from_secs(15));
    assert_eq!(config.monitor_concurrency, 2);
    assert!(config.audit_options().is_excluded("scratch"));
    assert_eq!(
        config.inventory,
        vec![
            InventoryTarget {
                environment: "DEV".into(),
                database: "HR".into(),
                schema: Some("EMPLOYEES".into()),
            },
            InventoryTarget {
                environment: "PRD".into(),
                database: "FINANCE".into(),
                schema: None,
            },
        ]
    );
}

#[test]
fn environment_wins_over_file() {
    let file = write_config(FULL);
    let vars = [("RBAC_ROLE_PREFIX", "OPS"), ("SNOWFLAKE_TOKEN", "t0ken")];
    let config = ReconcilerConfig::from_lookup(with_file(&file, &vars)).unwrap();

    assert_eq!(config.naming.prefix, "OPS");
    assert_eq!(config.naming.deployment_role_suffix, "CICD");
    let client = config.snowflake.client_config().unwrap();
    assert_eq!(client.account_url, "https://acme.snowflakecomputing.com");
    assert_eq!(client.token, "t0ken");
    assert_eq!(client.warehouse.as_deref(), Some("ADMIN_WH"));
    assert_eq!(client.token_type, "OAUTH");
}

#[test]
fn unknown_keys_are_rejected() {
    let file = write_config("role_prefx: DP\n");
    let err = ReconcilerConfig::from_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("role_prefx"));
}

#[test]
fn file_prefix_is_validated() {
    let file = write_config("role_prefix: \"D P\"\n");
    assert!(ReconcilerConfig::from_file(file.path()).is_err());
}

#[test]
fn file_naming_segments_are_trimmed() {
    let file = write_config("role_prefix: \" acme \"\ndeployment_role_suffix: \" cicd\"\n");
    let config = ReconcilerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.naming.prefix, "ACME");
    assert_eq!(config.naming.deployment_role_suffix, "CICD");
}

#[test]
fn file_suffix_colliding_with_functional_role_is_rejected() {
    let file = write_config("deployment_role_suffix: developer\n");
    let err = ReconcilerConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("DEVELOPER"), "{err}");
}

#[test]
fn missing_file_names_the_path() {
    let err = ReconcilerConfig::from_lookup(|key: &str| {
        (key == CONFIG_PATH_VAR).then(|| "/nonexistent/rbac.yaml".to_string())
    })
    .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/rbac.yaml"));
}
