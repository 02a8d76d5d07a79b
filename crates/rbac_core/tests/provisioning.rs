//! Provisioner behaviour against the in-memory platform.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rbac_core::memory::InMemoryPlatform;
use rbac_core::provisioner::WRITE_ROLE_NOT_APPLICABLE;
use rbac_core::{
    AuditStatus, Auditor, CancellationFlag, ExecutionControl, NamingScheme, ObjectClass, Operation, PlatformCatalog,
    Privilege, ProvisionStatus, ProvisionStep, Provisioner, RoleRef, StepStatus,
};

fn setup() -> (Arc<InMemoryPlatform>, Provisioner) {
    let platform = Arc::new(InMemoryPlatform::new());
    let provisioner = Provisioner::new(platform.clone(), NamingScheme::default());
    (platform, provisioner)
}

// ── scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn fresh_dev_provisioning() {
    let (_, provisioner) = setup();
    let report = provisioner
        .provision("DEV", "HR", "EMPLOYEES", Some("Employee data"))
        .await;
    let response = report.to_response();

    assert_eq!(response.status, ProvisionStatus::Success);
    let roles = response.database_roles.unwrap();
    assert_eq!(roles.read, "DP_HR_DEV_EMPLOYEES_READ");
    assert_eq!(roles.write, "DP_HR_DEV_EMPLOYEES_WRITE");
    assert_eq!(response.object_owner.as_deref(), Some("DP_DEV_DEVELOPER"));

    let steps: Vec<_> = response.steps.iter().map(|s| s.step).collect();
    assert_eq!(steps, ProvisionStep::ORDER.to_vec());
    assert!(response.steps.iter().all(|s| s.status == StepStatus::Success));
}

#[tokio::test]
async fn non_dev_has_no_write_role() {
    let (platform, provisioner) = setup();
    let response = provisioner
        .provision("PRD", "HR", "EMPLOYEES", None)
        .await
        .to_response();

    assert_eq!(response.status, ProvisionStatus::Success);
    let roles = response.database_roles.unwrap();
    assert_eq!(roles.read, "DP_HR_PRD_EMPLOYEES_READ");
    assert_eq!(roles.write, WRITE_ROLE_NOT_APPLICABLE);
    assert_eq!(response.object_owner.as_deref(), Some("DP_PRD_DEPLOYER"));
    assert!(!platform
        .database_role_exists("HR", &"DP_HR_PRD_EMPLOYEES_WRITE".into())
        .await
        .unwrap());
}

#[tokio::test]
async fn invalid_environment_touches_nothing() {
    let (platform, provisioner) = setup();
    let response = provisioner
        .provision("QA", "HR", "EMPLOYEES", None)
        .await
        .to_response();

    assert_eq!(response.status, ProvisionStatus::Error);
    assert_eq!(response.error.unwrap().code, "INVALID_ENVIRONMENT");
    assert!(response.steps.is_empty());
    assert!(platform.operations().is_empty());
}

// ── idempotence ─────────────────────────────────────────────

#[tokio::test]
async fn second_provision_is_a_no_op() {
    let (platform, provisioner) = setup();
    assert!(provisioner.provision("UAT", "HR", "EMPLOYEES", None).await.is_success());

    let second = provisioner.provision("UAT", "HR", "EMPLOYEES", None).await;
    assert!(second.is_success());
    for step in &second.steps {
        assert_eq!(step.status, StepStatus::Unchanged, "{} changed state", step.name);
    }

    let audit = Auditor::new(platform, NamingScheme::default())
        .audit("UAT", "HR", Some("EMPLOYEES"))
        .await;
    assert_eq!(audit.status, AuditStatus::Compliant);
    assert_eq!(audit.total_issues, 0);
}

// ── ownership ───────────────────────────────────────────────

#[tokio::test]
async fn existing_objects_are_reowned_with_grants_kept() {
    let (platform, provisioner) = setup();
    platform.add_schema("HR", "EMPLOYEES", true);
    platform
        .create_object("HR", "EMPLOYEES", ObjectClass::Table, "PAYROLL")
        .unwrap();

    assert!(provisioner.provision("DEV", "HR", "EMPLOYEES", None).await.is_success());

    let objects = platform.list_objects("HR", "EMPLOYEES").await.unwrap();
    let payroll = objects.iter().find(|o| o.name == "PAYROLL").unwrap();
    assert_eq!(payroll.owner.as_deref(), Some("DP_DEV_DEVELOPER"));

    let read = RoleRef::database("HR", "DP_HR_DEV_EMPLOYEES_READ".into());
    let grants = platform.object_grants("HR", "EMPLOYEES", ObjectClass::Table, "PAYROLL");
    assert!(grants.contains(&(Privilege::Select, read)));
}

#[tokio::test]
async fn objects_created_later_inherit_owner_and_grants() {
    let (platform, provisioner) = setup();
    assert!(provisioner.provision("TST", "HR", "EMPLOYEES", None).await.is_success());

    platform
        .create_object("HR", "EMPLOYEES", ObjectClass::View, "HEADCOUNT")
        .unwrap();
    let objects = platform.list_objects("HR", "EMPLOYEES").await.unwrap();
    assert_eq!(objects.iter().next().unwrap().owner.as_deref(), Some("DP_TST_DEPLOYER"));

    let read = RoleRef::database("HR", "DP_HR_TST_EMPLOYEES_READ".into());
    assert_eq!(
        platform.object_grants("HR", "EMPLOYEES", ObjectClass::View, "HEADCOUNT"),
        vec![(Privilege::Select, read)]
    );
}

// ── failure handling ────────────────────────────────────────

#[tokio::test]
async fn schema_without_managed_access_conflicts() {
    let (platform, provisioner) = setup();
    platform.add_schema("HR", "LEGACY", false);

    let report = provisioner.provision("DEV", "HR", "LEGACY", None).await;
    assert_eq!(report.status(), ProvisionStatus::Partial);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[1].status, StepStatus::Failed);
    assert_eq!(report.steps[1].error.as_ref().unwrap().code, "SCHEMA_CONFLICT");

    let schema = platform.describe_schema("HR", "LEGACY").await.unwrap().unwrap();
    assert!(!schema.managed_access, "existing schema must not be altered");
}

#[tokio::test]
async fn mid_sequence_failure_returns_completed_steps() {
    let (platform, provisioner) = setup();
    platform.fail_when(
        |op| matches!(op, Operation::TransferOwnership { .. }),
        "SQL access control error: Insufficient privileges to operate on schema 'EMPLOYEES'",
    );

    let report = provisioner.provision("DEV", "HR", "EMPLOYEES", None).await;
    let response = report.to_response();
    assert_eq!(response.status, ProvisionStatus::Partial);
    assert_eq!(report.completed_steps().count(), 4);

    let failed = response.steps.last().unwrap();
    assert_eq!(failed.step, ProvisionStep::TransferOwnership);
    assert_eq!(failed.status, StepStatus::Failed);
    let error = response.error.unwrap();
    assert_eq!(error.code, "PLATFORM_OPERATION_FAILED");
    assert!(error
        .message
        .contains("Insufficient privileges to operate on schema 'EMPLOYEES'"));

    // Fix the blocker and re-run: earlier steps are no-ops, the rest apply.
    platform.clear_failures();
    let retry = provisioner.provision("DEV", "HR", "EMPLOYEES", None).await;
    assert!(retry.is_success());
    assert_eq!(retry.steps[0].status, StepStatus::Unchanged);
}

#[tokio::test]
async fn cancellation_keeps_completed_steps() {
    let platform = Arc::new(InMemoryPlatform::new());
    let flag = CancellationFlag::new();
    let trigger = flag.clone();
    platform.fail_when(
        move |op| {
            if matches!(op, Operation::TransferOwnership { .. }) {
                trigger.cancel();
            }
            false
        },
        "never raised",
    );
    let provisioner = Provisioner::new(platform.clone(), NamingScheme::default())
        .with_control(ExecutionControl::default().with_cancellation(flag));

    let report = provisioner.provision("DEV", "HR", "EMPLOYEES", None).await;
    assert_eq!(report.status(), ProvisionStatus::Partial);
    let last = report.steps.last().unwrap();
    assert_eq!(last.step, ProvisionStep::TransferOwnership);
    assert_eq!(last.status, StepStatus::Cancelled);
    assert_eq!(last.operations.len(), 1);
    assert_eq!(last.error.as_ref().unwrap().code, "CANCELLED");
}

#[tokio::test]
async fn slow_operations_time_out() {
    let platform = Arc::new(InMemoryPlatform::new().with_latency(Duration::from_millis(200)));
    let provisioner = Provisioner::new(platform, NamingScheme::default())
        .with_control(ExecutionControl::with_timeout(Duration::from_millis(10)));

    let report = provisioner.provision("DEV", "HR", "EMPLOYEES", None).await;
    assert_eq!(report.status(), ProvisionStatus::Error);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].error.as_ref().unwrap().code, "TIMEOUT");
}

// ── planning & concurrency ──────────────────────────────────

#[tokio::test]
async fn plan_executes_nothing() {
    let (platform, provisioner) = setup();
    let plan = provisioner.plan("PPE", "HR", "EMPLOYEES", None).unwrap();
    assert!(plan.operations().count() > 20);
    assert!(platform.operations().is_empty());
}

#[tokio::test]
async fn independent_schemas_provision_concurrently() {
    let (platform, provisioner) = setup();
    let (a, b) = tokio::join!(
        provisioner.provision("DEV", "HR", "EMPLOYEES", None),
        provisioner.provision("DEV", "HR", "CONTRACTORS", None),
    );
    assert!(a.is_success());
    assert!(b.is_success());

    let audit = Auditor::new(platform, NamingScheme::default())
        .audit("DEV", "HR", None)
        .await;
    assert_eq!(audit.schemas_checked, 2);
    assert!(audit.is_compliant());
}
