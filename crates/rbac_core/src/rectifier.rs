//! Rectifier
//!
//! Turns the FAIL findings of a [`ComplianceReport`] into corrective actions,
//! one per finding, built from the same planning primitives the Provisioner
//! executes. WARNINGs are never acted on, and `MANAGED_ACCESS` failures are
//! left for manual remediation because the Provisioner never alters an
//! existing schema.
//!
//! After applying, only the checks touched by an action are re-run; each
//! action gets a before/after status pair.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auditor::{AuditStatus, Auditor, CheckId, ComplianceFinding, ComplianceReport, FindingStatus, FindingSubject};
use crate::desired_state::{build_desired_state, class_privileges, DesiredState, EnvironmentRole};
use crate::error::{ErrorPayload, RbacError, Result};
use crate::executor::{ExecutionControl, Executor, OperationRecord};
use crate::naming::NamingScheme;
use crate::operation::Operation;
use crate::plan;
use crate::ports::{CatalogObject, PlatformCatalog};
use crate::types::Environment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectificationAction {
    pub check: CheckId,
    /// Schema the action applies to; empty for environment-scoped checks.
    pub schema: String,
    pub scope: String,
    pub description: String,
    pub operations: Vec<Operation>,
    /// The finding this action corrects.
    pub finding: ComplianceFinding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedAction {
    pub check: CheckId,
    pub scope: String,
    pub operations: Vec<OperationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl AppliedAction {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeforeAfter {
    pub check: CheckId,
    pub scope: String,
    pub before: FindingStatus,
    pub after: FindingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFinding {
    pub check: CheckId,
    pub scope: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectificationResult {
    pub report_id: Uuid,
    pub dry_run: bool,
    pub actions_planned: Vec<RectificationAction>,
    pub actions_applied: Vec<AppliedAction>,
    pub before_after: Vec<BeforeAfter>,
    pub skipped: Vec<SkippedFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl RectificationResult {
    fn empty(report: &ComplianceReport, dry_run: bool) -> Self {
        Self {
            report_id: report.report_id,
            dry_run,
            actions_planned: Vec::new(),
            actions_applied: Vec::new(),
            before_after: Vec::new(),
            skipped: Vec::new(),
            error: None,
        }
    }

    /// Number of actions whose finding now passes.
    pub fn resolved(&self) -> usize {
        self.before_after
            .iter()
            .filter(|b| b.after == FindingStatus::Pass)
            .count()
    }
}

pub struct Rectifier {
    platform: Arc<dyn PlatformCatalog>,
    naming: NamingScheme,
    control: ExecutionControl,
}

impl Rectifier {
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

    pub async fn rectify(&self, report: &ComplianceReport, dry_run: bool) -> RectificationResult {
        let mut result = RectificationResult::empty(report, dry_run);

        if report.status == AuditStatus::Error {
            let err = RbacError::InvalidInput("cannot rectify a report that ended in ERROR".into());
            result.error = Some(err.payload());
            return result;
        }
        let environment: Environment = match report.environment.parse() {
            Ok(env) => env,
            Err(err) => {
                result.error = Some(RbacError::payload(&err));
                return result;
            }
        };

        let (actions, skipped) = self.plan_actions(report, environment);
        result.actions_planned = actions;
        result.skipped = skipped;
        info!(
            report_id = %report.report_id,
            dry_run,
            "{} corrective action(s) planned, {} finding(s) skipped",
            result.actions_planned.len(),
            result.skipped.len()
        );
        if dry_run {
            return result;
        }

        let executor = Executor::new(self.platform.as_ref(), &self.control);
        for action in &result.actions_planned {
            let mut records = Vec::new();
            let outcome = executor.run_all(&action.operations, &mut records).await;
            let cancelled = matches!(outcome, Err(RbacError::Cancelled(_)));
            if let Err(err) = &outcome {
                warn!(check = %action.check, scope = %action.scope, error = %err, "corrective action failed");
            } else {
                info!(check = %action.check, scope = %action.scope, "corrective action applied");
            }
            result.actions_applied.push(AppliedAction {
                check: action.check,
                scope: action.scope.clone(),
                operations: records,
                error: outcome.err().map(|e| e.payload()),
            });
            if cancelled {
                break;
            }
        }

        match self.recheck(report, environment, &result.actions_planned).await {
            Ok(before_after) => result.before_after = before_after,
            Err(err) => result.error = Some(err.payload()),
        }
        result
    }

    fn plan_actions(
        &self,
        report: &ComplianceReport,
        environment: Environment,
    ) -> (Vec<RectificationAction>, Vec<SkippedFinding>) {
        let mut actions = Vec::new();
        let mut skipped = Vec::new();

        // Environment roles first: database role links depend on them.
        let env_desired = build_desired_state(&self.naming, environment, &report.database, "");
        for finding in report.role_hierarchy.iter().filter(|f| f.is_fail()) {
            match self.action_for(&env_desired, "", finding) {
                Ok(action) => actions.push(action),
                Err(reason) => skipped.push(skip(finding, reason)),
            }
        }

        for schema in &report.schema_results {
            let desired = build_desired_state(&self.naming, environment, &report.database, &schema.schema);
            for finding in schema.findings.iter().filter(|f| f.is_fail()) {
                match self.action_for(&desired, &schema.schema, finding) {
                    Ok(action) => actions.push(action),
                    Err(reason) => skipped.push(skip(finding, reason)),
                }
            }
        }
        (actions, skipped)
    }

    /// Map one FAIL finding to its corrective operations.
    fn action_for(
        &self,
        desired: &DesiredState,
        schema: &str,
        finding: &ComplianceFinding,
    ) -> std::result::Result<RectificationAction, String> {
        let (description, operations) = match (finding.check, &finding.subject) {
            (CheckId::SchemaExists, _) => (
                "provision missing schema (steps 2-7)".to_string(),
                schema_provisioning_ops(desired),
            ),
            (CheckId::ManagedAccess, _) => {
                return Err("managed access cannot be enabled on an existing schema automatically; enable it manually".into())
            }
            (CheckId::ReadRoleExists | CheckId::WriteRoleExists, Some(FindingSubject::DatabaseRole { level, .. })) => {
                let role = desired
                    .database_role(*level)
                    .ok_or_else(|| format!("no {} role is expected in {}", level, desired.container.environment))?;
                let mut ops = plan::database_role_create_ops(desired, role);
                ops.extend(plan::grant_ops(role));
                ops.extend(plan::hierarchy_ops(role));
                (format!("create {} and apply its grants (steps 3-4)", role.name()), ops)
            }
            (CheckId::FutureGrants, Some(FindingSubject::UnmirroredGrant { level, role, class, privilege })) => {
                let spec = desired
                    .database_role(*level)
                    .ok_or_else(|| format!("no {} role is expected in {}", level, desired.container.environment))?;
                if !class_privileges(*class, *level).contains(privilege) {
                    return Err(format!(
                        "{} on {} is outside the grant set of {}; revoke it manually",
                        privilege,
                        class.plural_keyword(),
                        role
                    ));
                }
                (
                    format!("register future {} on {} for {} (step 4)", privilege, class.plural_keyword(), role),
                    vec![Operation::GrantPrivileges {
                        privileges: vec![*privilege],
                        on: desired.container.future_in_schema(*class),
                        to: spec.role.clone(),
                    }],
                )
            }
            (CheckId::FutureGrants, Some(FindingSubject::DatabaseRole { level, .. })) => {
                let role = desired
                    .database_role(*level)
                    .ok_or_else(|| format!("no {} role is expected in {}", level, desired.container.environment))?;
                (format!("re-apply grants of {} (step 4)", role.name()), plan::grant_ops(role))
            }
            (CheckId::ObjectOwnership, Some(FindingSubject::Object { class, name, owner })) => {
                let object = CatalogObject {
                    class: *class,
                    name: name.clone(),
                    owner: owner.clone(),
                };
                (
                    format!("transfer ownership of {} {} to {} (step 5)", class, name, desired.ownership_target),
                    plan::object_ownership_ops(desired, std::slice::from_ref(&object)),
                )
            }
            (CheckId::FutureOwnership, _) => (
                format!("register future ownership for {} (step 6)", desired.future_ownership_target),
                plan::future_ownership_ops(desired),
            ),
            (CheckId::ReadRoleHierarchy, _) => {
                let read = desired
                    .read_role()
                    .ok_or_else(|| "no READ role in the desired state".to_string())?;
                (format!("grant {} to its functional role", read.role), plan::hierarchy_ops(read))
            }
            (
                CheckId::FunctionalRoleExists | CheckId::DeploymentRoleExists,
                Some(FindingSubject::EnvironmentRole { kind, capability, role }),
            ) => {
                let env_role = EnvironmentRole {
                    kind: *kind,
                    capability: *capability,
                    name: role.clone(),
                };
                (
                    format!("create role {} (step 3)", role),
                    vec![plan::environment_role_op(&env_role, desired.container.environment.as_str())],
                )
            }
            (check, _) => return Err(format!("{} finding carries no actionable subject", check)),
        };

        if operations.is_empty() {
            return Err("no corrective operations apply".into());
        }
        Ok(RectificationAction {
            check: finding.check,
            schema: schema.to_string(),
            scope: finding.scope.clone(),
            description,
            operations,
            finding: finding.clone(),
        })
    }

    /// Re-run only the checks touched by an action.
    async fn recheck(
        &self,
        report: &ComplianceReport,
        environment: Environment,
        actions: &[RectificationAction],
    ) -> Result<Vec<BeforeAfter>> {
        let auditor = Auditor::new(Arc::clone(&self.platform), self.naming.clone()).with_control(self.control.clone());

        let affected: BTreeSet<(String, CheckId)> = actions.iter().map(|a| (a.schema.clone(), a.check)).collect();
        let mut rerun: Vec<(String, ComplianceFinding)> = Vec::new();
        for (schema, check) in &affected {
            let desired = build_desired_state(&self.naming, environment, &report.database, schema);
            for finding in auditor.run_check(*check, &desired).await? {
                rerun.push((schema.clone(), finding));
            }
        }

        Ok(actions
            .iter()
            .map(|action| {
                let after = rerun
                    .iter()
                    .filter(|(schema, f)| *schema == action.schema && f.check == action.check)
                    .find(|(_, f)| same_element(f, &action.finding))
                    .map(|(_, f)| f.status)
                    // An itemized failure that disappeared now conforms.
                    .unwrap_or(FindingStatus::Pass);
                BeforeAfter {
                    check: action.check,
                    scope: action.scope.clone(),
                    before: action.finding.status,
                    after,
                }
            })
            .collect())
    }
}

fn skip(finding: &ComplianceFinding, reason: String) -> SkippedFinding {
    SkippedFinding {
        check: finding.check,
        scope: finding.scope.clone(),
        reason,
    }
}

/// Whether two findings of the same check describe the same catalog element.
fn same_element(a: &ComplianceFinding, b: &ComplianceFinding) -> bool {
    match (&a.subject, &b.subject) {
        (Some(FindingSubject::Object { class: ca, name: na, .. }), Some(FindingSubject::Object { class: cb, name: nb, .. })) => {
            ca == cb && na == nb
        }
        (Some(FindingSubject::DatabaseRole { role: ra, .. }), Some(FindingSubject::DatabaseRole { role: rb, .. })) => ra == rb,
        (Some(FindingSubject::EnvironmentRole { role: ra, .. }), Some(FindingSubject::EnvironmentRole { role: rb, .. })) => {
            ra == rb
        }
        (
            Some(FindingSubject::UnmirroredGrant { role: ra, class: ca, privilege: pa, .. }),
            Some(FindingSubject::UnmirroredGrant { role: rb, class: cb, privilege: pb, .. }),
        ) => ra == rb && ca == cb && pa == pb,
        (None | Some(FindingSubject::Schema), None | Some(FindingSubject::Schema)) => a.scope == b.scope,
        _ => false,
    }
}

/// Everything the Provisioner applies to a schema, minus the database step.
fn schema_provisioning_ops(desired: &DesiredState) -> Vec<Operation> {
    let mut ops = plan::schema_ops(desired, None);
    ops.extend(plan::environment_role_ops(desired));
    for role in &desired.database_roles {
        ops.extend(plan::database_role_create_ops(desired, role));
    }
    for role in &desired.database_roles {
        ops.extend(plan::grant_ops(role));
        ops.extend(plan::hierarchy_ops(role));
    }
    ops.extend(plan::ownership_ops(desired));
    ops.extend(plan::future_ownership_ops(desired));
    ops.extend(plan::creation_ops(desired));
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auditor::SchemaAudit;
    use crate::memory::InMemoryPlatform;
    use crate::naming::Identifier;
    use crate::types::{AccessLevel, ObjectClass, Privilege};
    use chrono::Utc;

    fn finding(check: CheckId, subject: Option<FindingSubject>) -> ComplianceFinding {
        ComplianceFinding {
            check,
            scope: "HR.EMPLOYEES".into(),
            status: FindingStatus::Fail,
            expected: String::new(),
            actual: String::new(),
            message: String::new(),
            subject,
        }
    }

    fn report(findings: Vec<ComplianceFinding>) -> ComplianceReport {
        ComplianceReport {
            report_id: Uuid::new_v4(),
            environment: "DEV".into(),
            database: "HR".into(),
            schema: Some("EMPLOYEES".into()),
            status: AuditStatus::NonCompliant,
            schemas_checked: 1,
            total_issues: findings.len(),
            total_warnings: 0,
            schema_results: vec![SchemaAudit {
                schema: "EMPLOYEES".into(),
                status: AuditStatus::NonCompliant,
                issues: findings.len(),
                warnings: 0,
                findings,
            }],
            role_hierarchy: Vec::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn rectifier() -> Rectifier {
        Rectifier::new(Arc::new(InMemoryPlatform::new()), NamingScheme::default())
    }

    #[tokio::test]
    async fn managed_access_is_skipped() {
        let result = rectifier()
            .rectify(&report(vec![finding(CheckId::ManagedAccess, Some(FindingSubject::Schema))]), true)
            .await;
        assert!(result.actions_planned.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert!(result.skipped[0].reason.contains("manually"));
    }

    #[tokio::test]
    async fn warnings_are_never_planned() {
        let mut warning = finding(CheckId::WriteRoleExists, None);
        warning.status = FindingStatus::Warning;
        let result = rectifier().rectify(&report(vec![warning]), true).await;
        assert!(result.actions_planned.is_empty());
        assert!(result.skipped.is_empty());
    }

    #[tokio::test]
    async fn ownership_action_is_scoped_to_the_object() {
        let subject = FindingSubject::Object {
            class: ObjectClass::Table,
            name: "PAYROLL".into(),
            owner: Some("SYSADMIN".into()),
        };
        let result = rectifier()
            .rectify(&report(vec![finding(CheckId::ObjectOwnership, Some(subject))]), true)
            .await;
        let action = &result.actions_planned[0];
        assert_eq!(action.operations.len(), 1);
        assert!(action.operations[0].to_string().contains("TABLE HR.EMPLOYEES.PAYROLL"));
        assert!(result.actions_applied.is_empty());
    }

    #[tokio::test]
    async fn read_role_action_creates_and_grants() {
        let subject = FindingSubject::DatabaseRole {
            level: AccessLevel::Read,
            role: Identifier::new("DP_HR_DEV_EMPLOYEES_READ"),
        };
        let result = rectifier()
            .rectify(&report(vec![finding(CheckId::ReadRoleExists, Some(subject))]), true)
            .await;
        let ops = &result.actions_planned[0].operations;
        assert!(matches!(ops[0], Operation::CreateDatabaseRole { .. }));
        assert!(matches!(ops.last(), Some(Operation::GrantRole { .. })));
    }

    #[tokio::test]
    async fn unmirrored_grant_inside_the_model_gets_its_future_rule() {
        let subject = FindingSubject::UnmirroredGrant {
            level: AccessLevel::Read,
            role: Identifier::new("DP_HR_DEV_EMPLOYEES_READ"),
            class: ObjectClass::View,
            privilege: Privilege::Select,
        };
        let result = rectifier()
            .rectify(&report(vec![finding(CheckId::FutureGrants, Some(subject))]), true)
            .await;
        let ops = &result.actions_planned[0].operations;
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            Operation::GrantPrivileges { on: crate::operation::Securable::FutureInSchema { class: ObjectClass::View, .. }, .. }
        ));
    }

    #[tokio::test]
    async fn unmirrored_grant_outside_the_model_is_left_for_revocation() {
        let subject = FindingSubject::UnmirroredGrant {
            level: AccessLevel::Read,
            role: Identifier::new("DP_HR_DEV_EMPLOYEES_READ"),
            class: ObjectClass::Table,
            privilege: Privilege::Insert,
        };
        let result = rectifier()
            .rectify(&report(vec![finding(CheckId::FutureGrants, Some(subject))]), true)
            .await;
        assert!(result.actions_planned.is_empty());
        assert!(result.skipped[0].reason.contains("revoke it manually"));
    }

    #[tokio::test]
    async fn errored_report_is_refused() {
        let mut errored = report(Vec::new());
        errored.status = AuditStatus::Error;
        let result = rectifier().rectify(&errored, false).await;
        assert_eq!(result.error.unwrap().code, "INVALID_INPUT");
    }
}
