//! Compliance Auditor
//!
//! Re-derives the desired state for each schema in scope and diffs it
//! against introspected platform state. Read-only: the auditor never issues
//! `execute`.
//!
//! ## Checks
//!
//! | Check | Scope | Fails when |
//! |-------|-------|------------|
//! | `SCHEMA_EXISTS` | schema | the requested schema is missing |
//! | `MANAGED_ACCESS` | schema | managed access is off |
//! | `READ_ROLE_EXISTS` | schema | READ database role missing |
//! | `WRITE_ROLE_EXISTS` | schema | DEV without WRITE role (WARNING when present outside DEV) |
//! | `OBJECT_OWNERSHIP` | object | owner differs from the object owner (one finding per object) |
//! | `FUTURE_OWNERSHIP` | schema | a class lacks a future-ownership rule to the object owner |
//! | `FUTURE_GRANTS` | database role | a desired future grant is missing, or a live current grant has no future counterpart (one finding per class and privilege) |
//! | `READ_ROLE_HIERARCHY` | schema | READ role not reachable from END_USER |
//! | `FUNCTIONAL_ROLE_EXISTS` | environment | a functional ladder role is missing |
//! | `DEPLOYMENT_ROLE_EXISTS` | environment | non-DEV deployment role missing |
//!
//! FAIL and WARNING are ordinary audit outcomes. Only a missing database (or
//! unusable input) produces a report-level `ERROR`.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::desired_state::{build_desired_state, DatabaseRoleSpec, DesiredState};
use crate::error::{ErrorPayload, RbacError, Result};
use crate::executor::{ExecutionControl, Executor};
use crate::naming::{Identifier, NamingScheme};
use crate::operation::RoleRef;
use crate::ports::{CurrentGrant, FutureGrant, PlatformCatalog};
use crate::types::{normalize_segment, AccessLevel, CapabilityLevel, Environment, ObjectClass, Privilege, RoleKind};

/// Schemas skipped by default when a whole database is audited.
pub const DEFAULT_EXCLUDED_SCHEMAS: [&str; 2] = ["INFORMATION_SCHEMA", "PUBLIC"];

// ============================================================================
// FINDINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckId {
    SchemaExists,
    ManagedAccess,
    ReadRoleExists,
    WriteRoleExists,
    ObjectOwnership,
    FutureOwnership,
    FutureGrants,
    ReadRoleHierarchy,
    FunctionalRoleExists,
    DeploymentRoleExists,
}

impl CheckId {
    /// Per-schema battery, in execution order.
    pub const SCHEMA_CHECKS: [CheckId; 8] = [
        CheckId::SchemaExists,
        CheckId::ManagedAccess,
        CheckId::ReadRoleExists,
        CheckId::WriteRoleExists,
        CheckId::ObjectOwnership,
        CheckId::FutureOwnership,
        CheckId::FutureGrants,
        CheckId::ReadRoleHierarchy,
    ];

    pub const ENVIRONMENT_CHECKS: [CheckId; 2] = [CheckId::FunctionalRoleExists, CheckId::DeploymentRoleExists];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckId::SchemaExists => "SCHEMA_EXISTS",
            CheckId::ManagedAccess => "MANAGED_ACCESS",
            CheckId::ReadRoleExists => "READ_ROLE_EXISTS",
            CheckId::WriteRoleExists => "WRITE_ROLE_EXISTS",
            CheckId::ObjectOwnership => "OBJECT_OWNERSHIP",
            CheckId::FutureOwnership => "FUTURE_OWNERSHIP",
            CheckId::FutureGrants => "FUTURE_GRANTS",
            CheckId::ReadRoleHierarchy => "READ_ROLE_HIERARCHY",
            CheckId::FunctionalRoleExists => "FUNCTIONAL_ROLE_EXISTS",
            CheckId::DeploymentRoleExists => "DEPLOYMENT_ROLE_EXISTS",
        }
    }

    pub fn is_environment_scoped(&self) -> bool {
        Self::ENVIRONMENT_CHECKS.contains(self)
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckId {
    type Err = RbacError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        CheckId::SCHEMA_CHECKS
            .into_iter()
            .chain(CheckId::ENVIRONMENT_CHECKS)
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| RbacError::InvalidInput(format!("unknown check '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Pass,
    Fail,
    Warning,
}

/// The catalog element a finding is about. Lets the rectifier scope its
/// corrective action without re-parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FindingSubject {
    Schema,
    DatabaseRole {
        level: AccessLevel,
        role: Identifier,
    },
    Object {
        class: ObjectClass,
        name: String,
        owner: Option<String>,
    },
    /// A privilege held on current objects with no matching future grant.
    UnmirroredGrant {
        level: AccessLevel,
        role: Identifier,
        class: ObjectClass,
        privilege: Privilege,
    },
    EnvironmentRole {
        kind: RoleKind,
        capability: Option<CapabilityLevel>,
        role: Identifier,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceFinding {
    pub check: CheckId,
    pub scope: String,
    pub status: FindingStatus,
    pub expected: String,
    pub actual: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<FindingSubject>,
}

impl ComplianceFinding {
    fn new(check: CheckId, scope: &str, status: FindingStatus, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            check,
            scope: scope.to_string(),
            status,
            expected: expected.into(),
            actual: actual.into(),
            message: String::new(),
            subject: None,
        }
    }

    fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn subject(mut self, subject: FindingSubject) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn is_fail(&self) -> bool {
        self.status == FindingStatus::Fail
    }
}

fn pass_or_fail(ok: bool) -> FindingStatus {
    if ok {
        FindingStatus::Pass
    } else {
        FindingStatus::Fail
    }
}

fn presence(exists: bool) -> &'static str {
    if exists {
        "exists"
    } else {
        "missing"
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Compliant,
    NonCompliant,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaAudit {
    pub schema: String,
    pub status: AuditStatus,
    pub issues: usize,
    pub warnings: usize,
    pub findings: Vec<ComplianceFinding>,
}

impl SchemaAudit {
    fn from_findings(schema: &str, findings: Vec<ComplianceFinding>) -> Self {
        let issues = count(&findings, FindingStatus::Fail);
        Self {
            schema: schema.to_string(),
            status: if issues == 0 {
                AuditStatus::Compliant
            } else {
                AuditStatus::NonCompliant
            },
            issues,
            warnings: count(&findings, FindingStatus::Warning),
            findings,
        }
    }
}

fn count(findings: &[ComplianceFinding], status: FindingStatus) -> usize {
    findings.iter().filter(|f| f.status == status).count()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_id: Uuid,
    pub environment: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub status: AuditStatus,
    pub schemas_checked: usize,
    pub total_issues: usize,
    pub total_warnings: usize,
    pub schema_results: Vec<SchemaAudit>,
    /// Environment-scoped role ladder findings.
    pub role_hierarchy: Vec<ComplianceFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    pub timestamp: DateTime<Utc>,
}

impl ComplianceReport {
    fn errored(environment: &str, database: &str, schema: Option<&str>, err: &RbacError) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            environment: normalize_segment(environment),
            database: normalize_segment(database),
            schema: schema.map(normalize_segment),
            status: AuditStatus::Error,
            schemas_checked: 0,
            total_issues: 0,
            total_warnings: 0,
            schema_results: Vec::new(),
            role_hierarchy: Vec::new(),
            error: Some(err.payload()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_compliant(&self) -> bool {
        self.status == AuditStatus::Compliant
    }

    /// Every finding, schema findings first.
    pub fn findings(&self) -> impl Iterator<Item = (&str, &ComplianceFinding)> {
        self.schema_results
            .iter()
            .flat_map(|s| s.findings.iter().map(move |f| (s.schema.as_str(), f)))
            .chain(self.role_hierarchy.iter().map(|f| ("", f)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ComplianceFinding)> {
        self.findings().filter(|(_, f)| f.is_fail())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOptions {
    pub excluded_schemas: Vec<String>,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            excluded_schemas: DEFAULT_EXCLUDED_SCHEMAS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AuditOptions {
    pub fn is_excluded(&self, schema: &str) -> bool {
        self.excluded_schemas.iter().any(|e| e.eq_ignore_ascii_case(schema))
    }
}

// ============================================================================
// AUDITOR
// ============================================================================

pub struct Auditor {
    platform: Arc<dyn PlatformCatalog>,
    naming: NamingScheme,
    control: ExecutionControl,
    options: AuditOptions,
}

impl Auditor {
    pub fn new(platform: Arc<dyn PlatformCatalog>, naming: NamingScheme) -> Self {
        Self {
            platform,
            naming,
            control: ExecutionControl::default(),
            options: AuditOptions::default(),
        }
    }

    pub fn with_control(mut self, control: ExecutionControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_options(mut self, options: AuditOptions) -> Self {
        self.options = options;
        self
    }

    pub fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    /// Audit one schema, or every non-excluded schema when `schema` is `None`.
    pub async fn audit(&self, environment: &str, database: &str, schema: Option<&str>) -> ComplianceReport {
        match self.try_audit(environment, database, schema).await {
            Ok(report) => report,
            Err(err) => {
                warn!(environment, database, error = %err, "audit ended in error");
                ComplianceReport::errored(environment, database, schema, &err)
            }
        }
    }

    async fn try_audit(&self, environment: &str, database: &str, schema: Option<&str>) -> Result<ComplianceReport> {
        let env: Environment = environment.parse()?;
        let database = normalize_segment(database);
        if database.is_empty() {
            return Err(RbacError::InvalidInput("database name cannot be empty".into()));
        }
        let executor = Executor::new(self.platform.as_ref(), &self.control);

        if !executor
            .query("database exists", self.platform.database_exists(&database))
            .await?
        {
            return Err(RbacError::DatabaseNotFound(database));
        }

        let schemas: Vec<String> = match schema {
            Some(name) => vec![normalize_segment(name)],
            None => executor
                .query("list schemas", self.platform.list_schemas(&database))
                .await?
                .iter()
                .filter(|s| !self.options.is_excluded(&s.name))
                .map(|s| s.name.clone())
                .collect(),
        };
        info!("Auditing {} schema(s) in {} ({})", schemas.len(), database, env);

        let mut schema_results = Vec::with_capacity(schemas.len());
        for name in &schemas {
            let desired = build_desired_state(&self.naming, env, &database, name);
            let findings = self.audit_schema(&executor, &desired).await?;
            let audit = SchemaAudit::from_findings(name, findings);
            debug!(schema = %name, issues = audit.issues, warnings = audit.warnings, "schema audited");
            schema_results.push(audit);
        }

        let env_desired = build_desired_state(&self.naming, env, &database, "");
        let mut role_hierarchy = Vec::new();
        for check in CheckId::ENVIRONMENT_CHECKS {
            role_hierarchy.extend(self.check(&executor, check, &env_desired).await?);
        }

        let total_issues = schema_results.iter().map(|s| s.issues).sum::<usize>()
            + count(&role_hierarchy, FindingStatus::Fail);
        let total_warnings = schema_results.iter().map(|s| s.warnings).sum::<usize>()
            + count(&role_hierarchy, FindingStatus::Warning);

        let report = ComplianceReport {
            report_id: Uuid::new_v4(),
            environment: env.to_string(),
            database,
            schema: schema.map(normalize_segment),
            status: if total_issues == 0 {
                AuditStatus::Compliant
            } else {
                AuditStatus::NonCompliant
            },
            schemas_checked: schema_results.len(),
            total_issues,
            total_warnings,
            schema_results,
            role_hierarchy,
            error: None,
            timestamp: Utc::now(),
        };
        info!(
            report_id = %report.report_id,
            status = ?report.status,
            "Audit of {} complete: {} issue(s), {} warning(s)",
            report.database,
            report.total_issues,
            report.total_warnings
        );
        Ok(report)
    }

    async fn audit_schema(&self, executor: &Executor<'_>, desired: &DesiredState) -> Result<Vec<ComplianceFinding>> {
        let mut findings = self.check(executor, CheckId::SchemaExists, desired).await?;
        if findings.iter().any(ComplianceFinding::is_fail) {
            // Nothing else can be inspected in a schema that does not exist.
            return Ok(findings);
        }
        for check in &CheckId::SCHEMA_CHECKS[1..] {
            findings.extend(self.check(executor, *check, desired).await?);
        }
        Ok(findings)
    }

    /// Re-run a single check for one schema's desired state.
    pub async fn run_check(&self, check: CheckId, desired: &DesiredState) -> Result<Vec<ComplianceFinding>> {
        let executor = Executor::new(self.platform.as_ref(), &self.control);
        self.check(&executor, check, desired).await
    }

    async fn check(&self, executor: &Executor<'_>, check: CheckId, desired: &DesiredState) -> Result<Vec<ComplianceFinding>> {
        let container = &desired.container;
        let scope = container.qualified_name();
        let platform = executor.platform();

        let findings = match check {
            CheckId::SchemaExists | CheckId::ManagedAccess => {
                let info = executor
                    .query(
                        "describe schema",
                        platform.describe_schema(&container.database, &container.schema),
                    )
                    .await?;
                if check == CheckId::SchemaExists {
                    vec![ComplianceFinding::new(check, &scope, pass_or_fail(info.is_some()), "exists", presence(info.is_some()))
                        .message(format!("schema {}", presence(info.is_some())))
                        .subject(FindingSubject::Schema)]
                } else {
                    let managed = info.map(|i| i.managed_access).unwrap_or(false);
                    vec![ComplianceFinding::new(check, &scope, pass_or_fail(managed), "true", managed.to_string())
                        .message(if managed {
                            "managed access enabled"
                        } else {
                            "managed access disabled; enable manually"
                        })
                        .subject(FindingSubject::Schema)]
                }
            }
            CheckId::ReadRoleExists => {
                let Some(read) = desired.read_role() else {
                    return Ok(Vec::new());
                };
                let exists = executor.query("database role exists", read.role.exists(platform)).await?;
                vec![role_finding(check, &scope, read, pass_or_fail(exists), exists)]
            }
            CheckId::WriteRoleExists => self.check_write_role(executor, desired, &scope).await?,
            CheckId::ObjectOwnership => {
                let objects = executor
                    .query(
                        "list objects",
                        platform.list_objects(&container.database, &container.schema),
                    )
                    .await?;
                let owner = desired.ownership_target.name().as_str();
                let mut findings: Vec<ComplianceFinding> = objects
                    .iter()
                    .filter(|o| desired.ownership_classes.contains(&o.class))
                    .filter(|o| o.owner.as_deref() != Some(owner))
                    .map(|o| {
                        let actual = o.owner.clone().unwrap_or_else(|| "<none>".to_string());
                        ComplianceFinding::new(check, &format!("{}.{}", scope, o.name), FindingStatus::Fail, owner, actual.clone())
                            .message(format!("{} {} owned by {}", o.class, o.name, actual))
                            .subject(FindingSubject::Object {
                                class: o.class,
                                name: o.name.clone(),
                                owner: o.owner.clone(),
                            })
                    })
                    .collect();
                if findings.is_empty() {
                    findings.push(
                        ComplianceFinding::new(check, &scope, FindingStatus::Pass, owner, owner)
                            .message(format!("{} object(s) owned by {}", objects.len(), owner)),
                    );
                }
                findings
            }
            CheckId::FutureOwnership => {
                let rules = executor
                    .query(
                        "list future grants",
                        platform.list_future_grants(&container.database, &container.schema),
                    )
                    .await?;
                let target = &desired.future_ownership_target;
                let missing: Vec<String> = desired
                    .ownership_classes
                    .iter()
                    .filter(|class| {
                        !rules.iter().any(|g| {
                            g.class == **class && g.privilege == Privilege::Ownership && g.grantee.name() == target.name()
                        })
                    })
                    .map(|class| class.plural_keyword())
                    .collect();
                let actual = if missing.is_empty() {
                    "all classes".to_string()
                } else {
                    format!("missing for {}", missing.join(", "))
                };
                vec![ComplianceFinding::new(check, &scope, pass_or_fail(missing.is_empty()), format!("future OWNERSHIP to {}", target), actual.clone())
                    .message(format!("future ownership {}", actual))]
            }
            CheckId::FutureGrants => {
                let rules = executor
                    .query(
                        "list future grants",
                        platform.list_future_grants(&container.database, &container.schema),
                    )
                    .await?;
                let present: BTreeSet<&FutureGrant> = rules.iter().collect();
                let mut findings = Vec::new();
                for role in &desired.database_roles {
                    if !executor.query("database role exists", role.role.exists(platform)).await? {
                        continue;
                    }
                    let missing = missing_future_grants(role, &present);
                    let actual = if missing.is_empty() {
                        "complete".to_string()
                    } else {
                        format!("missing {}", missing.join("; "))
                    };
                    findings.push(role_finding(check, &scope, role, pass_or_fail(missing.is_empty()), true).with_evidence(
                        "all current grants mirrored as future grants",
                        actual,
                    ));

                    let held = executor
                        .query(
                            "list current grants",
                            platform.list_current_grants(&container.database, &container.schema, &role.role),
                        )
                        .await?;
                    findings.extend(
                        held.iter()
                            .filter(|grant| !present.contains(&grant.future_counterpart()))
                            .map(|grant| unmirrored_finding(&scope, role, grant)),
                    );
                }
                findings
            }
            CheckId::ReadRoleHierarchy => {
                let Some(read) = desired.read_role() else {
                    return Ok(Vec::new());
                };
                let parent = match &read.granted_to {
                    Some(parent) => parent,
                    None => return Ok(Vec::new()),
                };
                let reachable = self.reaches(executor, parent, &read.role).await?;
                vec![ComplianceFinding::new(check, &scope, pass_or_fail(reachable), format!("{} -> {}", read.role, parent), if reachable { "granted" } else { "not granted" })
                    .message(format!("{} {} reachable from {}", read.role, if reachable { "is" } else { "is not" }, parent))
                    .subject(FindingSubject::DatabaseRole {
                        level: read.level,
                        role: read.name().clone(),
                    })]
            }
            CheckId::FunctionalRoleExists | CheckId::DeploymentRoleExists => {
                let env_scope = container.environment.to_string();
                let wanted = if check == CheckId::FunctionalRoleExists {
                    RoleKind::Functional
                } else {
                    RoleKind::System
                };
                let mut findings = Vec::new();
                for role in desired.environment_roles.iter().filter(|r| r.kind == wanted) {
                    let exists = executor.query("role exists", platform.account_role_exists(&role.name)).await?;
                    findings.push(
                        ComplianceFinding::new(check, &env_scope, pass_or_fail(exists), "exists", presence(exists))
                            .message(format!("{} role {} {}", role.kind, role.name, presence(exists)))
                            .subject(FindingSubject::EnvironmentRole {
                                kind: role.kind,
                                capability: role.capability,
                                role: role.name.clone(),
                            }),
                    );
                }
                findings
            }
        };
        Ok(findings)
    }

    async fn check_write_role(&self, executor: &Executor<'_>, desired: &DesiredState, scope: &str) -> Result<Vec<ComplianceFinding>> {
        let check = CheckId::WriteRoleExists;
        let container = &desired.container;
        match desired.write_role() {
            Some(write) => {
                let exists = executor.query("database role exists", write.role.exists(executor.platform())).await?;
                Ok(vec![role_finding(check, scope, write, pass_or_fail(exists), exists)])
            }
            None => {
                let name = self.naming.database_role(
                    container.environment,
                    &container.database,
                    &container.schema,
                    AccessLevel::Write,
                );
                let exists = executor
                    .query(
                        "database role exists",
                        executor.platform().database_role_exists(&container.database, &name),
                    )
                    .await?;
                let status = if exists {
                    FindingStatus::Warning
                } else {
                    FindingStatus::Pass
                };
                let message = if exists {
                    format!("{} exists outside DEV; confirm it is an approved exception", name)
                } else {
                    format!("no WRITE role in {}", container.environment)
                };
                Ok(vec![ComplianceFinding::new(check, scope, status, "absent", presence(exists)).message(message)])
            }
        }
    }

    /// Breadth-first search over role grants: is `target` granted to `root`,
    /// directly or through intermediate roles?
    async fn reaches(&self, executor: &Executor<'_>, root: &RoleRef, target: &RoleRef) -> Result<bool> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(grantee) = queue.pop_front() {
            if !seen.insert(grantee.clone()) {
                continue;
            }
            let granted = executor
                .query("role grants", executor.platform().role_grants_to(&grantee))
                .await?;
            for role in &granted {
                if role == target {
                    return Ok(true);
                }
                queue.push_back(role.clone());
            }
        }
        Ok(false)
    }
}

fn role_finding(check: CheckId, scope: &str, role: &DatabaseRoleSpec, status: FindingStatus, exists: bool) -> ComplianceFinding {
    ComplianceFinding::new(check, scope, status, "exists", presence(exists))
        .message(format!("{} role {} {}", role.level, role.name(), presence(exists)))
        .subject(FindingSubject::DatabaseRole {
            level: role.level,
            role: role.name().clone(),
        })
}

impl ComplianceFinding {
    fn with_evidence(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = expected.into();
        self.actual = actual.into();
        self.message = format!("{}: {}", self.check, self.actual);
        self
    }
}

fn unmirrored_finding(scope: &str, role: &DatabaseRoleSpec, grant: &CurrentGrant) -> ComplianceFinding {
    let classes = grant.class.plural_keyword();
    ComplianceFinding::new(
        CheckId::FutureGrants,
        &format!("{}.{}", scope, role.name()),
        FindingStatus::Fail,
        format!("{} on future {}", grant.privilege, classes),
        "no future grant",
    )
    .message(format!(
        "{} holds {} on current {} with no matching future grant",
        role.name(),
        grant.privilege,
        classes
    ))
    .subject(FindingSubject::UnmirroredGrant {
        level: role.level,
        role: role.name().clone(),
        class: grant.class,
        privilege: grant.privilege,
    })
}

fn missing_future_grants(role: &DatabaseRoleSpec, present: &BTreeSet<&FutureGrant>) -> Vec<String> {
    let mut missing = Vec::new();
    for edge in role.future_grants() {
        let Some(class) = edge.class() else { continue };
        for privilege in &edge.privileges {
            let wanted = FutureGrant {
                class,
                privilege: *privilege,
                grantee: role.role.clone(),
            };
            if !present.contains(&wanted) {
                missing.push(format!("{} on future {}", privilege, class.plural_keyword()));
            }
        }
    }
    missing
}
