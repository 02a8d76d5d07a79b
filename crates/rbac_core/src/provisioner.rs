//! Provisioner
//!
//! Applies the desired-state graph for one (environment, database, schema)
//! in a fixed order. Every step is create-if-absent or grant restatement, so
//! the whole call is safe to repeat:
//!
//! | # | Step | Operations |
//! |---|------|------------|
//! | 1 | `ensure_database` | create database |
//! | 2 | `ensure_schema` | create managed-access schema, or `SchemaConflict` |
//! | 3 | `ensure_roles` | functional ladder, deployment role, database roles |
//! | 4 | `apply_grants` | current + future grants, READ → END_USER link |
//! | 5 | `transfer_ownership` | existing objects → object owner, copying grants |
//! | 6 | `future_ownership` | future objects → object owner |
//! | 7 | `creation_grants` | USAGE + CREATE privileges → object owner |
//!
//! A failing step halts the run. Completed steps stay in place (no rollback)
//! and are returned in the report next to the error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::desired_state::{build_desired_state, DesiredState};
use crate::error::{ErrorPayload, RbacError, Result};
use crate::executor::{ExecutionControl, Executor, OperationRecord};
use crate::naming::{Identifier, NamingScheme};
use crate::operation::Operation;
use crate::plan;
use crate::ports::PlatformCatalog;
use crate::types::{normalize_segment, AccessLevel, Environment};

/// Placeholder reported for the WRITE role outside DEV.
pub const WRITE_ROLE_NOT_APPLICABLE: &str = "N/A - Non-DEV environment";

// ============================================================================
// STEPS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    EnsureDatabase,
    EnsureSchema,
    EnsureRoles,
    ApplyGrants,
    TransferOwnership,
    FutureOwnership,
    CreationGrants,
}

impl ProvisionStep {
    pub const ORDER: [ProvisionStep; 7] = [
        ProvisionStep::EnsureDatabase,
        ProvisionStep::EnsureSchema,
        ProvisionStep::EnsureRoles,
        ProvisionStep::ApplyGrants,
        ProvisionStep::TransferOwnership,
        ProvisionStep::FutureOwnership,
        ProvisionStep::CreationGrants,
    ];

    pub fn number(&self) -> u8 {
        match self {
            ProvisionStep::EnsureDatabase => 1,
            ProvisionStep::EnsureSchema => 2,
            ProvisionStep::EnsureRoles => 3,
            ProvisionStep::ApplyGrants => 4,
            ProvisionStep::TransferOwnership => 5,
            ProvisionStep::FutureOwnership => 6,
            ProvisionStep::CreationGrants => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProvisionStep::EnsureDatabase => "ensure_database",
            ProvisionStep::EnsureSchema => "ensure_schema",
            ProvisionStep::EnsureRoles => "ensure_roles",
            ProvisionStep::ApplyGrants => "apply_grants",
            ProvisionStep::TransferOwnership => "transfer_ownership",
            ProvisionStep::FutureOwnership => "future_ownership",
            ProvisionStep::CreationGrants => "creation_grants",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// At least one operation changed the platform.
    Success,
    /// Every operation was a no-op (already in the desired state).
    Unchanged,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Unchanged)
    }
}

/// Structured trace of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: ProvisionStep,
    pub name: String,
    pub inputs: BTreeMap<String, String>,
    pub status: StepStatus,
    pub operations: Vec<OperationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Operations one step would execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step: ProvisionStep,
    pub operations: Vec<Operation>,
}

/// Dry-run output of [`Provisioner::plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionPlan {
    pub desired: DesiredState,
    pub steps: Vec<PlannedStep>,
}

impl ProvisionPlan {
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.steps.iter().flat_map(|s| s.operations.iter())
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Artifacts of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionSummary {
    pub environment: Environment,
    pub database: String,
    pub schema: String,
    pub read_role: Identifier,
    pub write_role: Option<Identifier>,
    pub object_owner: Identifier,
}

impl ProvisionSummary {
    fn from_desired(naming: &NamingScheme, desired: &DesiredState) -> Self {
        let container = &desired.container;
        Self {
            environment: desired.container.environment,
            database: desired.container.database.clone(),
            schema: desired.container.schema.clone(),
            read_role: naming.database_role(
                container.environment,
                &container.database,
                &container.schema,
                AccessLevel::Read,
            ),
            write_role: desired.write_role().map(|r| r.name().clone()),
            object_owner: desired.container.object_owner.clone(),
        }
    }
}

/// In-process result: the step trace plus a terminal outcome.
#[derive(Debug)]
pub struct ProvisionReport {
    pub database: String,
    pub schema: String,
    pub steps: Vec<StepResult>,
    pub outcome: std::result::Result<ProvisionSummary, RbacError>,
}

impl ProvisionReport {
    fn rejected(database: &str, schema: &str, err: RbacError) -> Self {
        Self {
            database: normalize_segment(database),
            schema: normalize_segment(schema),
            steps: Vec::new(),
            outcome: Err(err),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Steps that finished before the run stopped.
    pub fn completed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.status.is_ok())
    }

    pub fn status(&self) -> ProvisionStatus {
        match &self.outcome {
            Ok(_) => ProvisionStatus::Success,
            Err(_) if self.completed_steps().next().is_some() => ProvisionStatus::Partial,
            Err(_) => ProvisionStatus::Error,
        }
    }

    pub fn to_response(&self) -> ProvisionResponse {
        let (database_roles, object_owner, error) = match &self.outcome {
            Ok(summary) => (
                Some(DatabaseRolesView {
                    read: summary.read_role.to_string(),
                    write: summary
                        .write_role
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| WRITE_ROLE_NOT_APPLICABLE.to_string()),
                }),
                Some(summary.object_owner.to_string()),
                None,
            ),
            Err(err) => (None, None, Some(err.payload())),
        };
        ProvisionResponse {
            status: self.status(),
            database: self.database.clone(),
            schema: self.schema.clone(),
            database_roles,
            object_owner,
            steps: self.steps.clone(),
            error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisionStatus {
    Success,
    /// Stopped after at least one completed step; re-invoking is safe.
    Partial,
    /// Nothing was applied.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRolesView {
    pub read: String,
    pub write: String,
}

/// Externally visible provisioning result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub status: ProvisionStatus,
    pub database: String,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_roles: Option<DatabaseRolesView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_owner: Option<String>,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

// ============================================================================
// PROVISIONER
// ============================================================================

pub struct Provisioner {
    platform: Arc<dyn PlatformCatalog>,
    naming: NamingScheme,
    control: ExecutionControl,
}

impl Provisioner {
    pub fn new(platform: Arc<dyn PlatformCatalog>, naming: NamingScheme) -> Self {
        Self {
            platform,
            naming,
            control: ExecutionControl::default(),
        }
    }

    pub fn with_control(mut self, control: ExecutionControl) -> Self {
        self.control = control;
        self
    }

    pub fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    /// Compute every step's operations without touching the platform.
    pub fn plan(&self, environment: &str, database: &str, schema: &str, comment: Option<&str>) -> Result<ProvisionPlan> {
        let desired = self.validate(environment, database, schema)?;
        let steps = ProvisionStep::ORDER
            .into_iter()
            .map(|step| PlannedStep {
                step,
                operations: step_operations(step, &desired, comment),
            })
            .collect();
        Ok(ProvisionPlan { desired, steps })
    }

    pub async fn provision(
        &self,
        environment: &str,
        database: &str,
        schema: &str,
        comment: Option<&str>,
    ) -> ProvisionReport {
        let desired = match self.validate(environment, database, schema) {
            Ok(desired) => desired,
            Err(err) => {
                warn!(environment, database, schema, error = %err, "provision rejected");
                return ProvisionReport::rejected(database, schema, err);
            }
        };

        let container = &desired.container;
        info!(
            "Provisioning {} in {} on {}",
            container.qualified_name(),
            container.environment,
            self.platform.backend_name()
        );

        let executor = Executor::new(self.platform.as_ref(), &self.control);
        let mut steps = Vec::with_capacity(ProvisionStep::ORDER.len());

        for step in ProvisionStep::ORDER {
            let mut records = Vec::new();
            let result = self.run_step(&executor, step, &desired, comment, &mut records).await;
            let failed = result.as_ref().err().map(|err| (step_failure_status(err), err.payload()));

            let status = match &failed {
                Some((status, _)) => *status,
                None if records.iter().all(|r| r.outcome.is_noop()) => StepStatus::Unchanged,
                None => StepStatus::Success,
            };
            info!(step = step.name(), ?status, operations = records.len(), "step {}", step);

            steps.push(StepResult {
                step,
                name: step.name().to_string(),
                inputs: step_inputs(step, &desired, comment),
                status,
                operations: records,
                error: failed.map(|(_, payload)| payload),
            });

            if let Err(err) = result {
                warn!(step = step.name(), error = %err, "provisioning halted");
                return ProvisionReport {
                    database: container.database.clone(),
                    schema: container.schema.clone(),
                    steps,
                    outcome: Err(err),
                };
            }
        }

        info!("Provisioned {} ({})", container.qualified_name(), container.environment);
        ProvisionReport {
            database: container.database.clone(),
            schema: container.schema.clone(),
            steps,
            outcome: Ok(ProvisionSummary::from_desired(&self.naming, &desired)),
        }
    }

    fn validate(&self, environment: &str, database: &str, schema: &str) -> Result<DesiredState> {
        let environment: Environment = environment.parse()?;
        if normalize_segment(database).is_empty() {
            return Err(RbacError::InvalidInput("database name cannot be empty".into()));
        }
        if normalize_segment(schema).is_empty() {
            return Err(RbacError::InvalidInput("schema name cannot be empty".into()));
        }
        Ok(build_desired_state(&self.naming, environment, database, schema))
    }

    async fn run_step(
        &self,
        executor: &Executor<'_>,
        step: ProvisionStep,
        desired: &DesiredState,
        comment: Option<&str>,
        records: &mut Vec<OperationRecord>,
    ) -> Result<()> {
        if step == ProvisionStep::EnsureSchema {
            ensure_no_schema_conflict(executor, desired).await?;
        }
        executor
            .run_all(&step_operations(step, desired, comment), records)
            .await
    }
}

/// Refuse to adopt an existing schema that lacks managed access.
pub(crate) async fn ensure_no_schema_conflict(executor: &Executor<'_>, desired: &DesiredState) -> Result<()> {
    let container = &desired.container;
    let existing = executor
        .query(
            "describe schema",
            executor.platform().describe_schema(&container.database, &container.schema),
        )
        .await?;
    match existing {
        Some(info) if !info.managed_access => Err(RbacError::SchemaConflict {
            database: container.database.clone(),
            schema: container.schema.clone(),
        }),
        _ => Ok(()),
    }
}

fn step_failure_status(err: &RbacError) -> StepStatus {
    match err {
        RbacError::Cancelled(_) => StepStatus::Cancelled,
        _ => StepStatus::Failed,
    }
}

fn step_operations(step: ProvisionStep, desired: &DesiredState, comment: Option<&str>) -> Vec<Operation> {
    match step {
        ProvisionStep::EnsureDatabase => plan::database_ops(desired, None),
        ProvisionStep::EnsureSchema => plan::schema_ops(desired, comment),
        ProvisionStep::EnsureRoles => {
            let mut ops = plan::environment_role_ops(desired);
            for role in &desired.database_roles {
                ops.extend(plan::database_role_create_ops(desired, role));
            }
            ops
        }
        ProvisionStep::ApplyGrants => desired
            .database_roles
            .iter()
            .flat_map(|role| {
                let mut ops = plan::grant_ops(role);
                ops.extend(plan::hierarchy_ops(role));
                ops
            })
            .collect(),
        ProvisionStep::TransferOwnership => plan::ownership_ops(desired),
        ProvisionStep::FutureOwnership => plan::future_ownership_ops(desired),
        ProvisionStep::CreationGrants => plan::creation_ops(desired),
    }
}

fn step_inputs(step: ProvisionStep, desired: &DesiredState, comment: Option<&str>) -> BTreeMap<String, String> {
    let container = &desired.container;
    let mut inputs = BTreeMap::new();
    inputs.insert("environment".to_string(), container.environment.to_string());
    inputs.insert("database".to_string(), container.database.clone());
    match step {
        ProvisionStep::EnsureDatabase => {}
        ProvisionStep::EnsureSchema => {
            inputs.insert("schema".to_string(), container.schema.clone());
            inputs.insert("managed_access".to_string(), container.managed_access.to_string());
            if let Some(comment) = comment {
                inputs.insert("comment".to_string(), comment.to_string());
            }
        }
        ProvisionStep::EnsureRoles | ProvisionStep::ApplyGrants => {
            inputs.insert("schema".to_string(), container.schema.clone());
            let roles: Vec<String> = desired.database_roles.iter().map(|r| r.name().to_string()).collect();
            inputs.insert("database_roles".to_string(), roles.join(","));
        }
        ProvisionStep::TransferOwnership | ProvisionStep::FutureOwnership | ProvisionStep::CreationGrants => {
            inputs.insert("schema".to_string(), container.schema.clone());
            inputs.insert("object_owner".to_string(), container.object_owner.to_string());
        }
    }
    inputs
}
