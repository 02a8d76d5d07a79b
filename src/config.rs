//! Reconciler configuration
//!
//! Built in three layers: defaults, then the optional YAML file named by
//! `RBAC_CONFIG`, then individual environment variables (`.env` is loaded
//! first by [`ReconcilerConfig::from_env`]).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `RBAC_ROLE_PREFIX` | `DP` |
//! | `RBAC_DEPLOYMENT_ROLE_SUFFIX` | `DEPLOYER` |
//! | `RBAC_BACKEND` | `snowflake` |
//! | `RBAC_OPERATION_TIMEOUT_SECS` | `60` |
//! | `SNOWFLAKE_ACCOUNT_URL` | - |
//! | `SNOWFLAKE_TOKEN` | - |
//! | `SNOWFLAKE_TOKEN_TYPE` | `OAUTH` |
//! | `SNOWFLAKE_WAREHOUSE` | - |
//! | `SNOWFLAKE_ROLE` | - |
//! | `SNOWFLAKE_STATEMENT_TIMEOUT_SECS` | `60` |

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use rbac_core::auditor::DEFAULT_EXCLUDED_SCHEMAS;
use rbac_core::types::normalize_segment;
use rbac_core::{AuditOptions, ExecutionControl, NamingScheme};
use rbac_snowflake::SnowflakeConfig;

pub const CONFIG_PATH_VAR: &str = "RBAC_CONFIG";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MONITOR_CONCURRENCY: usize = 4;

/// Legal leading fragment of an unquoted identifier.
static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9]*$").unwrap());
static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap());

// ============================================================================
// BACKEND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Snowflake,
    /// Fresh in-process platform; nothing persists between runs.
    Memory,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Snowflake => "snowflake",
            BackendKind::Memory => "memory",
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "snowflake" => Ok(BackendKind::Snowflake),
            "memory" | "in-memory" => Ok(BackendKind::Memory),
            other => Err(anyhow!(
                "Unknown RBAC_BACKEND '{}'. Valid values: snowflake, memory",
                other
            )),
        }
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowflakeSettings {
    pub account_url: Option<String>,
    pub token: Option<String>,
    pub token_type: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub statement_timeout_secs: Option<u64>,
}

impl fmt::Debug for SnowflakeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeSettings")
            .field("account_url", &self.account_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .finish()
    }
}

impl SnowflakeSettings {
    /// Client configuration; account URL and token are required.
    pub fn client_config(&self) -> Result<SnowflakeConfig> {
        let account_url = self
            .account_url
            .clone()
            .ok_or_else(|| anyhow!("SNOWFLAKE_ACCOUNT_URL is not set"))?;
        let token = self
            .token
            .clone()
            .ok_or_else(|| anyhow!("SNOWFLAKE_TOKEN is not set"))?;

        let mut config = SnowflakeConfig::new(account_url, token);
        if let Some(token_type) = &self.token_type {
            config.token_type = token_type.clone();
        }
        config.warehouse = self.warehouse.clone();
        config.role = self.role.clone();
        config.statement_timeout = Duration::from_secs(self.statement_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        Ok(config)
    }
}

/// One monitored scope; `schema: None` audits the whole database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTarget {
    pub environment: String,
    pub database: String,
    #[serde(default)]
    pub schema: Option<String>,
}

impl fmt::Display for InventoryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}:{}.{}", self.environment, self.database, schema),
            None => write!(f, "{}:{}", self.environment, self.database),
        }
    }
}

/// Shape of the YAML file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    role_prefix: Option<String>,
    deployment_role_suffix: Option<String>,
    backend: Option<BackendKind>,
    operation_timeout_secs: Option<u64>,
    snowflake: Option<SnowflakeSettings>,
    excluded_schemas: Option<Vec<String>>,
    monitor_concurrency: Option<usize>,
    inventory: Vec<InventoryTarget>,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub naming: NamingScheme,
    pub backend: BackendKind,
    pub operation_timeout: Duration,
    pub snowflake: SnowflakeSettings,
    pub excluded_schemas: Vec<String>,
    pub monitor_concurrency: usize,
    pub inventory: Vec<InventoryTarget>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            naming: NamingScheme::default(),
            backend: BackendKind::Snowflake,
            operation_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            snowflake: SnowflakeSettings::default(),
            excluded_schemas: DEFAULT_EXCLUDED_SCHEMAS.iter().map(|s| s.to_string()).collect(),
            monitor_concurrency: DEFAULT_MONITOR_CONCURRENCY,
            inventory: Vec::new(),
        }
    }
}

impl ReconcilerConfig {
    /// Load `.env`, then build from the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup(CONFIG_PATH_VAR) {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from a YAML file alone.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if let Some(prefix) = file.role_prefix {
            self.naming.prefix = normalize_segment(&prefix);
        }
        if let Some(suffix) = file.deployment_role_suffix {
            self.naming.deployment_role_suffix = normalize_segment(&suffix);
        }
        if let Some(backend) = file.backend {
            self.backend = backend;
        }
        if let Some(secs) = file.operation_timeout_secs {
            self.operation_timeout = Duration::from_secs(secs);
        }
        if let Some(snowflake) = file.snowflake {
            self.snowflake = snowflake;
        }
        if let Some(excluded) = file.excluded_schemas {
            self.excluded_schemas = excluded;
        }
        if let Some(concurrency) = file.monitor_concurrency {
            self.monitor_concurrency = concurrency;
        }
        self.inventory = file.inventory;
        Ok(())
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(prefix) = lookup("RBAC_ROLE_PREFIX") {
            self.naming.prefix = normalize_segment(&prefix);
        }
        if let Some(suffix) = lookup("RBAC_DEPLOYMENT_ROLE_SUFFIX") {
            self.naming.deployment_role_suffix = normalize_segment(&suffix);
        }
        if let Some(backend) = lookup("RBAC_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(secs) = lookup("RBAC_OPERATION_TIMEOUT_SECS") {
            self.operation_timeout = Duration::from_secs(parse_secs("RBAC_OPERATION_TIMEOUT_SECS", &secs)?);
        }

        let sf = &mut self.snowflake;
        let overrides: [(&str, &mut Option<String>); 5] = [
            ("SNOWFLAKE_ACCOUNT_URL", &mut sf.account_url),
            ("SNOWFLAKE_TOKEN", &mut sf.token),
            ("SNOWFLAKE_TOKEN_TYPE", &mut sf.token_type),
            ("SNOWFLAKE_WAREHOUSE", &mut sf.warehouse),
            ("SNOWFLAKE_ROLE", &mut sf.role),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key) {
                *slot = Some(value);
            }
        }
        if let Some(secs) = lookup("SNOWFLAKE_STATEMENT_TIMEOUT_SECS") {
            sf.statement_timeout_secs = Some(parse_secs("SNOWFLAKE_STATEMENT_TIMEOUT_SECS", &secs)?);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !PREFIX_RE.is_match(&self.naming.prefix) {
            bail!(
                "role prefix '{}' must start with a letter and contain only A-Z and 0-9",
                self.naming.prefix
            );
        }
        if !SUFFIX_RE.is_match(&self.naming.deployment_role_suffix) {
            bail!(
                "deployment role suffix '{}' is not a legal identifier fragment",
                self.naming.deployment_role_suffix
            );
        }
        self.naming.validate()?;
        if self.operation_timeout.is_zero() {
            bail!("operation timeout must be positive");
        }
        if self.monitor_concurrency == 0 {
            bail!("monitor_concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn execution_control(&self) -> ExecutionControl {
        ExecutionControl::with_timeout(self.operation_timeout)
    }

    pub fn audit_options(&self) -> AuditOptions {
        AuditOptions {
            excluded_schemas: self.excluded_schemas.clone(),
        }
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got '{}'", key, value))
}
