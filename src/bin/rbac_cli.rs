//! RBAC reconciler command line
//!
//! Provision schemas, audit them, rectify drift and manage roles. Results
//! are printed as pretty JSON on stdout; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Provision a schema
//! rbac_cli provision --env DEV --database HR --schema EMPLOYEES
//!
//! # Show the SQL a provision would run
//! rbac_cli plan --env PRD --database HR --schema EMPLOYEES
//!
//! # Audit, then fix what the audit found
//! rbac_cli audit --env DEV --database HR --schema EMPLOYEES > report.json
//! rbac_cli rectify --report report.json --dry-run
//!
//! # Audit every inventory target from RBAC_CONFIG
//! rbac_cli monitor
//!
//! # Try it without a live account
//! rbac_cli --backend memory provision --env DEV --database HR --schema EMPLOYEES
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;

use rbac_core::memory::InMemoryPlatform;
use rbac_core::naming::NameRequest;
use rbac_core::{AccessLevel, ComplianceReport, Operation, ProvisionStatus, Provisioner};
use rbac_reconciler::config::{BackendKind, ReconcilerConfig};
use rbac_reconciler::{run_inventory, telemetry, Engine};

#[derive(Parser)]
#[command(name = "rbac_cli")]
#[command(version = "0.1.0")]
#[command(about = "Provision, audit and rectify environment role hierarchies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Platform backend (overrides RBAC_BACKEND)
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// YAML configuration file (overrides RBAC_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Snowflake,
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Create database, schema, roles, grants and ownership for one schema
    Provision {
        #[command(flatten)]
        scope: SchemaScope,

        /// Comment for created objects
        #[arg(long)]
        comment: Option<String>,
    },

    /// Print the operations and SQL a provision would run, without executing
    Plan {
        #[command(flatten)]
        scope: SchemaScope,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Audit one schema, or every schema of a database
    Audit {
        #[arg(long)]
        env: String,

        #[arg(long)]
        database: String,

        /// Omit to audit every schema in the database
        #[arg(long)]
        schema: Option<String>,
    },

    /// Apply corrective actions for the FAIL findings of an audit report
    Rectify {
        /// Audit report JSON written by `audit`
        #[arg(long)]
        report: PathBuf,

        /// Plan actions without executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Audit every inventory target from configuration
    Monitor,

    /// Create the functional role ladder and deployment role for an environment
    BootstrapEnv {
        #[arg(long)]
        env: String,
    },

    /// Domain access roles
    AccessRole {
        #[command(subcommand)]
        action: AccessRoleAction,
    },

    /// Service-wrapper roles
    ServiceRole {
        #[command(subcommand)]
        action: ServiceRoleAction,
    },

    /// Grant a managed role to a user
    AssignRole {
        #[arg(long)]
        user: String,

        #[arg(long)]
        role: String,
    },

    /// Print the canonical name of a role
    DeriveName {
        #[arg(value_enum)]
        kind: NameKind,

        #[arg(long)]
        env: String,

        #[arg(long)]
        database: Option<String>,

        #[arg(long)]
        schema: Option<String>,

        /// READ or WRITE (database roles)
        #[arg(long, default_value = "READ")]
        level: String,

        #[arg(long)]
        domain: Option<String>,

        #[arg(long)]
        capability: Option<String>,
    },
}

#[derive(clap::Args)]
struct SchemaScope {
    #[arg(long)]
    env: String,

    #[arg(long)]
    database: String,

    #[arg(long)]
    schema: String,
}

#[derive(Subcommand)]
enum AccessRoleAction {
    /// Create <prefix>_<ENV>_<DOMAIN>_ACCESS
    Create {
        #[arg(long)]
        env: String,

        #[arg(long)]
        domain: String,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Grant a schema's database role to an access role
    Link {
        #[arg(long)]
        env: String,

        #[arg(long)]
        domain: String,

        #[arg(long)]
        database: String,

        #[arg(long)]
        schema: String,

        #[arg(long, default_value = "READ")]
        level: String,
    },
}

#[derive(Subcommand)]
enum ServiceRoleAction {
    /// Create a service role holding one functional role and access roles
    Create {
        #[arg(long)]
        env: String,

        #[arg(long)]
        domain: String,

        #[arg(long)]
        capability: String,

        /// Access-role domains, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        access: Vec<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NameKind {
    Database,
    Access,
    Functional,
    Service,
    Deployment,
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<ReconcilerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_string_lossy().to_string();
            let _ = dotenvy::dotenv();
            ReconcilerConfig::from_lookup(|key| {
                if key == rbac_reconciler::config::CONFIG_PATH_VAR {
                    Some(path.clone())
                } else {
                    std::env::var(key).ok()
                }
            })?
        }
        None => ReconcilerConfig::from_env()?,
    };
    if let Some(backend) = cli.backend {
        config.backend = match backend {
            BackendArg::Snowflake => BackendKind::Snowflake,
            BackendArg::Memory => BackendKind::Memory,
        };
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Plan { scope, comment } => cmd_plan(&config, &scope, comment.as_deref()),
        Commands::DeriveName {
            kind,
            env,
            database,
            schema,
            level,
            domain,
            capability,
        } => cmd_derive_name(&config, kind, &env, database, schema, &level, domain, capability),
        command => {
            let engine = Engine::new(&config)?;
            execute(&config, &engine, command).await
        }
    }
}

async fn execute(config: &ReconcilerConfig, engine: &Engine, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Provision { scope, comment } => {
            let response = engine
                .provisioner
                .provision(&scope.env, &scope.database, &scope.schema, comment.as_deref())
                .await
                .to_response();
            print_json(&response)?;
            Ok(exit_if(response.status != ProvisionStatus::Success))
        }
        Commands::Audit { env, database, schema } => {
            let report = engine.auditor.audit(&env, &database, schema.as_deref()).await;
            print_json(&report)?;
            Ok(exit_if(report.error.is_some()))
        }
        Commands::Rectify { report, dry_run } => {
            let content = std::fs::read_to_string(&report)
                .with_context(|| format!("Failed to read report {}", report.display()))?;
            let report: ComplianceReport = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse report {}", report.display()))?;
            let result = engine.rectifier.rectify(&report, dry_run).await;

            let mut output = serde_json::to_value(&result)?;
            if dry_run {
                let sql = render_all(result.actions_planned.iter().flat_map(|a| a.operations.iter()));
                output["sql"] = serde_json::json!(sql);
            }
            print_json(&output)?;
            Ok(exit_if(result.error.is_some() || result.actions_applied.iter().any(|a| !a.succeeded())))
        }
        Commands::Monitor => {
            if config.inventory.is_empty() {
                anyhow::bail!("no inventory targets configured (set RBAC_CONFIG or pass --config)");
            }
            let summary = run_inventory(&engine.auditor, &config.inventory, config.monitor_concurrency).await;
            print_json(&summary)?;
            Ok(exit_if(!summary.is_healthy()))
        }
        Commands::BootstrapEnv { env } => report_role_op(engine.roles.bootstrap_environment(&env).await),
        Commands::AccessRole { action } => match action {
            AccessRoleAction::Create { env, domain, comment } => report_role_op(
                engine
                    .roles
                    .create_access_role(&env, &domain, comment.as_deref())
                    .await,
            ),
            AccessRoleAction::Link {
                env,
                domain,
                database,
                schema,
                level,
            } => report_role_op(
                engine
                    .roles
                    .link_access_role(&env, &domain, &database, &schema, &level)
                    .await,
            ),
        },
        Commands::ServiceRole {
            action:
                ServiceRoleAction::Create {
                    env,
                    domain,
                    capability,
                    access,
                },
        } => {
            let access: Vec<&str> = access.iter().map(String::as_str).collect();
            report_role_op(
                engine
                    .roles
                    .create_service_role(&env, &domain, &capability, &access)
                    .await,
            )
        }
        Commands::AssignRole { user, role } => report_role_op(engine.roles.assign_role(&user, &role).await),
        Commands::Plan { scope, comment } => cmd_plan(config, &scope, comment.as_deref()),
        Commands::DeriveName {
            kind,
            env,
            database,
            schema,
            level,
            domain,
            capability,
        } => cmd_derive_name(config, kind, &env, database, schema, &level, domain, capability),
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_plan(config: &ReconcilerConfig, scope: &SchemaScope, comment: Option<&str>) -> Result<ExitCode> {
    // Planning reads nothing from the platform.
    let provisioner = Provisioner::new(Arc::new(InMemoryPlatform::new()), config.naming.clone());
    let plan = provisioner.plan(&scope.env, &scope.database, &scope.schema, comment)?;
    let sql = render_all(plan.operations());
    print_json(&serde_json::json!({ "plan": plan, "sql": sql }))?;
    Ok(ExitCode::SUCCESS)
}

#[allow(clippy::too_many_arguments)]
fn cmd_derive_name(
    config: &ReconcilerConfig,
    kind: NameKind,
    env: &str,
    database: Option<String>,
    schema: Option<String>,
    level: &str,
    domain: Option<String>,
    capability: Option<String>,
) -> Result<ExitCode> {
    let (database, schema) = (database.unwrap_or_default(), schema.unwrap_or_default());
    let (domain, capability) = (domain.unwrap_or_default(), capability.unwrap_or_default());
    let missing = match kind {
        NameKind::Database if database.is_empty() || schema.is_empty() => Some("--database and --schema"),
        NameKind::Access if domain.is_empty() => Some("--domain"),
        NameKind::Functional if capability.is_empty() => Some("--capability"),
        NameKind::Service if domain.is_empty() || capability.is_empty() => Some("--domain and --capability"),
        _ => None,
    };
    if let Some(flags) = missing {
        anyhow::bail!("{} required for this role kind", flags);
    }

    let request = match kind {
        NameKind::Database => NameRequest::Database {
            environment: env,
            database: &database,
            schema: &schema,
            level: level.parse::<AccessLevel>()?,
        },
        NameKind::Access => NameRequest::Access {
            environment: env,
            domain: &domain,
        },
        NameKind::Functional => NameRequest::Functional {
            environment: env,
            capability: &capability,
        },
        NameKind::Service => NameRequest::ServiceWrapper {
            environment: env,
            domain: &domain,
            capability: &capability,
        },
        NameKind::Deployment => NameRequest::Deployment { environment: env },
    };

    let name = config.naming.derive(request)?;
    print_json(&serde_json::json!({ "kind": request.kind().to_string(), "name": name }))?;
    Ok(ExitCode::SUCCESS)
}

fn report_role_op(report: rbac_core::RoleOperationReport) -> Result<ExitCode> {
    print_json(&report)?;
    Ok(exit_if(!report.is_success()))
}

// =============================================================================
// HELPERS
// =============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("JSON serialization failed")?
    );
    Ok(())
}

fn exit_if(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn render_all<'a>(operations: impl Iterator<Item = &'a Operation>) -> Vec<String> {
    operations.map(rbac_snowflake::render).collect()
}
