//! `SnowflakePlatform` against scripted statement results.

use std::sync::Mutex;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rbac_core::ports::PlatformResult;
use rbac_core::{
    Identifier, ObjectClass, OpOutcome, Operation, PlatformCatalog, PlatformError, PrincipalKind, Privilege, RoleRef,
    Securable,
};
use rbac_snowflake::{ResultSet, SnowflakePlatform, StatementRunner};

/// Answers statements by prefix and records everything it was asked.
#[derive(Default)]
struct Scripted {
    answers: Vec<(&'static str, PlatformResult<ResultSet>)>,
    seen: Mutex<Vec<String>>,
}

impl Scripted {
    fn answer(mut self, prefix: &'static str, result: ResultSet) -> Self {
        self.answers.push((prefix, Ok(result)));
        self
    }

    fn reject(mut self, prefix: &'static str, message: &str) -> Self {
        self.answers.push((prefix, Err(PlatformError::rejected(message))));
        self
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatementRunner for Scripted {
    async fn run(&self, statement: &str) -> PlatformResult<ResultSet> {
        self.seen.lock().unwrap().push(statement.to_string());
        for (prefix, answer) in &self.answers {
            if statement.starts_with(prefix) {
                return match answer {
                    Ok(rows) => Ok(rows.clone()),
                    Err(err) => Err(PlatformError::rejected(err.to_string())),
                };
            }
        }
        Ok(ResultSet::default())
    }
}

fn cells(values: &[Option<&str>]) -> Vec<Option<String>> {
    values.iter().map(|v| v.map(str::to_string)).collect()
}

fn status(message: &str) -> ResultSet {
    ResultSet::new(&["status"], vec![cells(&[Some(message)])])
}

// ── execute ─────────────────────────────────────────────────

#[tokio::test]
async fn create_outcomes_follow_status_text() {
    let platform = SnowflakePlatform::new(
        Scripted::default()
            .answer("CREATE ROLE", status("DP_DEV_ANALYST already exists, statement succeeded."))
            .answer("CREATE DATABASE ROLE", status("Database role DP_HR_DEV_EMPLOYEES_READ successfully created.")),
    );

    let role = Operation::CreateAccountRole {
        role: "DP_DEV_ANALYST".into(),
        comment: None,
    };
    assert_eq!(platform.execute(&role).await.unwrap(), OpOutcome::AlreadyExists);

    let db_role = Operation::CreateDatabaseRole {
        database: "HR".into(),
        role: "DP_HR_DEV_EMPLOYEES_READ".into(),
        comment: None,
    };
    assert_eq!(platform.execute(&db_role).await.unwrap(), OpOutcome::Created);

    let grant = Operation::GrantRole {
        role: RoleRef::database("HR", "DP_HR_DEV_EMPLOYEES_READ".into()),
        to: RoleRef::account("DP_DEV_END_USER".into()),
    };
    assert_eq!(platform.execute(&grant).await.unwrap(), OpOutcome::Applied);

    assert_eq!(
        platform.runner().seen(),
        vec![
            "CREATE ROLE IF NOT EXISTS DP_DEV_ANALYST",
            "CREATE DATABASE ROLE IF NOT EXISTS HR.DP_HR_DEV_EMPLOYEES_READ",
            "SHOW GRANTS TO ROLE DP_DEV_END_USER",
            "GRANT DATABASE ROLE HR.DP_HR_DEV_EMPLOYEES_READ TO ROLE DP_DEV_END_USER",
        ]
    );
}

#[tokio::test]
async fn execute_surfaces_platform_rejection() {
    let platform = SnowflakePlatform::new(Scripted::default().reject(
        "GRANT OWNERSHIP",
        "Insufficient privileges to operate on schema 'EMPLOYEES'",
    ));
    let op = Operation::TransferOwnership {
        on: rbac_core::Securable::Schema {
            database: "HR".into(),
            schema: "EMPLOYEES".into(),
        },
        to: RoleRef::account("DP_DEV_DEVELOPER".into()),
        copy_current_grants: true,
    };
    let err = platform.execute(&op).await.unwrap_err();
    assert!(err.to_string().contains("Insufficient privileges"));
}

fn read_role() -> RoleRef {
    RoleRef::database("HR", "DP_HR_PRD_EMPLOYEES_READ".into())
}

fn employees(class: ObjectClass, future: bool) -> Securable {
    let (database, schema) = ("HR".to_string(), "EMPLOYEES".to_string());
    if future {
        Securable::FutureInSchema { class, database, schema }
    } else {
        Securable::AllInSchema { class, database, schema }
    }
}

/// Catalog state as a second provisioning run finds it.
fn provisioned_state() -> Scripted {
    Scripted::default()
        .answer(
            "SHOW TABLES",
            ResultSet::new(
                &["name", "owner", "is_dynamic", "is_external"],
                vec![cells(&[Some("PAYROLL"), Some("DP_PRD_DEPLOYER"), Some("N"), Some("N")])],
            ),
        )
        .answer(
            "SHOW GRANTS TO DATABASE ROLE HR.DP_HR_PRD_EMPLOYEES_READ",
            ResultSet::new(
                &["privilege", "granted_on", "name"],
                vec![
                    cells(&[Some("USAGE"), Some("DATABASE"), Some("HR")]),
                    cells(&[Some("USAGE"), Some("SCHEMA"), Some("HR.EMPLOYEES")]),
                    cells(&[Some("SELECT"), Some("TABLE"), Some("HR.EMPLOYEES.PAYROLL")]),
                ],
            ),
        )
        .answer(
            "SHOW FUTURE GRANTS",
            ResultSet::new(
                &["privilege", "grant_on", "grant_to", "grantee_name"],
                vec![
                    cells(&[Some("SELECT"), Some("TABLE"), Some("DATABASE_ROLE"), Some("HR.DP_HR_PRD_EMPLOYEES_READ")]),
                    cells(&[Some("OWNERSHIP"), Some("TABLE"), Some("ROLE"), Some("DP_PRD_DEPLOYER")]),
                ],
            ),
        )
        .answer(
            "SHOW GRANTS TO ROLE DP_PRD_END_USER",
            ResultSet::new(
                &["privilege", "granted_on", "name"],
                vec![cells(&[Some("USAGE"), Some("DATABASE_ROLE"), Some("HR.DP_HR_PRD_EMPLOYEES_READ")])],
            ),
        )
}

#[tokio::test]
async fn grants_already_in_place_are_unchanged_and_not_reissued() {
    let platform = SnowflakePlatform::new(provisioned_state());
    let deployer = RoleRef::account("DP_PRD_DEPLOYER".into());
    let operations = vec![
        Operation::GrantPrivileges {
            privileges: vec![Privilege::Usage],
            on: Securable::Schema {
                database: "HR".into(),
                schema: "EMPLOYEES".into(),
            },
            to: read_role(),
        },
        Operation::GrantPrivileges {
            privileges: vec![Privilege::Select],
            on: employees(ObjectClass::Table, false),
            to: read_role(),
        },
        Operation::GrantPrivileges {
            privileges: vec![Privilege::Select],
            on: employees(ObjectClass::Table, true),
            to: read_role(),
        },
        Operation::GrantRole {
            role: read_role(),
            to: RoleRef::account("DP_PRD_END_USER".into()),
        },
        Operation::TransferOwnership {
            on: employees(ObjectClass::Table, false),
            to: deployer.clone(),
            copy_current_grants: true,
        },
        Operation::TransferOwnership {
            on: employees(ObjectClass::Table, true),
            to: deployer,
            copy_current_grants: false,
        },
    ];
    for op in &operations {
        assert_eq!(platform.execute(op).await.unwrap(), OpOutcome::Unchanged, "{op}");
    }
    assert!(
        platform
            .runner()
            .seen()
            .iter()
            .all(|s| s.starts_with("SHOW") || s.starts_with("SELECT")),
        "no grant statement is issued"
    );
}

#[tokio::test]
async fn missing_grants_are_applied() {
    let platform = SnowflakePlatform::new(provisioned_state());
    let insert = Operation::GrantPrivileges {
        privileges: vec![Privilege::Select, Privilege::Insert],
        on: employees(ObjectClass::Table, false),
        to: read_role(),
    };
    assert_eq!(platform.execute(&insert).await.unwrap(), OpOutcome::Applied);
    let views = Operation::GrantPrivileges {
        privileges: vec![Privilege::Select],
        on: employees(ObjectClass::View, true),
        to: read_role(),
    };
    assert_eq!(platform.execute(&views).await.unwrap(), OpOutcome::Applied);

    let issued: Vec<String> = platform
        .runner()
        .seen()
        .into_iter()
        .filter(|s| s.starts_with("GRANT"))
        .collect();
    assert_eq!(issued.len(), 2);
}

#[tokio::test]
async fn current_grants_are_scoped_to_the_schema() {
    let platform = SnowflakePlatform::new(Scripted::default().answer(
        "SHOW GRANTS TO DATABASE ROLE",
        ResultSet::new(
            &["privilege", "granted_on", "name"],
            vec![
                cells(&[Some("USAGE"), Some("SCHEMA"), Some("HR.EMPLOYEES")]),
                cells(&[Some("SELECT"), Some("TABLE"), Some("HR.EMPLOYEES.PAYROLL")]),
                cells(&[Some("SELECT"), Some("TABLE"), Some("HR.EMPLOYEES.BONUS")]),
                cells(&[Some("INSERT"), Some("TABLE"), Some("HR.EMPLOYEES.BONUS")]),
                cells(&[Some("USAGE"), Some("FUNCTION"), Some("HR.EMPLOYEES.\"NET_PAY(GROSS NUMBER):NUMBER(38,0)\"")]),
                cells(&[Some("SELECT"), Some("TABLE"), Some("HR.EMPLOYEES_OLD.PAYROLL")]),
            ],
        ),
    ));
    let held: Vec<(ObjectClass, Privilege)> = platform
        .list_current_grants("HR", "EMPLOYEES", &read_role())
        .await
        .unwrap()
        .iter()
        .map(|g| (g.class, g.privilege))
        .collect();
    assert_eq!(
        held,
        vec![
            (ObjectClass::Table, Privilege::Select),
            (ObjectClass::Table, Privilege::Insert),
            (ObjectClass::Function, Privilege::Usage),
        ]
    );
}

// ── introspection ───────────────────────────────────────────

#[tokio::test]
async fn schema_managed_access_from_options() {
    let platform = SnowflakePlatform::new(Scripted::default().answer(
        "SHOW SCHEMAS",
        ResultSet::new(
            &["created_on", "name", "database_name", "options"],
            vec![
                cells(&[Some("2024-01-01"), Some("EMPLOYEES"), Some("HR"), Some("MANAGED ACCESS")]),
                cells(&[Some("2024-01-01"), Some("EMPLOYEES_OLD"), Some("HR"), Some("")]),
            ],
        ),
    ));

    let schema = platform.describe_schema("HR", "EMPLOYEES").await.unwrap().unwrap();
    assert!(schema.managed_access);
    let legacy = platform.describe_schema("HR", "EMPLOYEES_OLD").await.unwrap().unwrap();
    assert!(!legacy.managed_access);
    assert_eq!(platform.list_schemas("HR").await.unwrap().len(), 2);
}

#[tokio::test]
async fn missing_database_reads_as_absent() {
    let platform = SnowflakePlatform::new(
        Scripted::default().reject("SHOW", "Database 'HR' does not exist or not authorized."),
    );
    assert!(!platform.database_exists("HR").await.unwrap());
    assert!(platform.describe_schema("HR", "EMPLOYEES").await.unwrap().is_none());
    assert!(!platform
        .database_role_exists("HR", &Identifier::new("DP_HR_DEV_EMPLOYEES_READ"))
        .await
        .unwrap());
}

#[tokio::test]
async fn like_wildcards_do_not_produce_false_matches() {
    let platform = SnowflakePlatform::new(Scripted::default().answer(
        "SHOW ROLES",
        ResultSet::new(&["name"], vec![cells(&[Some("DP_DEVXEND_USER")])]),
    ));
    assert!(!platform
        .account_role_exists(&Identifier::new("DP_DEV_END_USER"))
        .await
        .unwrap());
}

#[tokio::test]
async fn objects_are_listed_once_per_class() {
    let platform = SnowflakePlatform::new(
        Scripted::default()
            .answer(
                "SHOW TABLES",
                ResultSet::new(
                    &["name", "owner", "is_dynamic", "is_external"],
                    vec![
                        cells(&[Some("PAYROLL"), Some("SYSADMIN"), Some("N"), Some("N")]),
                        cells(&[Some("LIVE_HEADCOUNT"), Some("DP_DEV_DEVELOPER"), Some("Y"), Some("N")]),
                    ],
                ),
            )
            .answer(
                "SHOW DYNAMIC TABLES",
                ResultSet::new(&["name", "owner"], vec![cells(&[Some("LIVE_HEADCOUNT"), Some("DP_DEV_DEVELOPER")])]),
            )
            .answer(
                "SELECT FUNCTION_NAME",
                ResultSet::new(
                    &["NAME", "ARGUMENT_SIGNATURE", "OWNER"],
                    vec![cells(&[Some("NET_PAY"), Some("(GROSS NUMBER)"), Some("DP_DEV_DEVELOPER")])],
                ),
            ),
    );

    let objects = platform.list_objects("HR", "EMPLOYEES").await.unwrap();
    let listed: Vec<(ObjectClass, &str, Option<&str>)> = objects
        .iter()
        .map(|o| (o.class, o.name.as_str(), o.owner.as_deref()))
        .collect();
    assert_eq!(
        listed,
        vec![
            (ObjectClass::Table, "PAYROLL", Some("SYSADMIN")),
            (ObjectClass::DynamicTable, "LIVE_HEADCOUNT", Some("DP_DEV_DEVELOPER")),
            (ObjectClass::Function, "NET_PAY(NUMBER)", Some("DP_DEV_DEVELOPER")),
        ]
    );

    let seen = platform.runner().seen();
    assert!(seen.contains(&"SHOW MATERIALIZED VIEWS IN SCHEMA HR.EMPLOYEES".to_string()));
    assert!(seen.iter().any(|s| s.contains("HR.INFORMATION_SCHEMA.PROCEDURES")));
}

#[tokio::test]
async fn future_grants_parse_grantee_and_class() {
    let platform = SnowflakePlatform::new(Scripted::default().answer(
        "SHOW FUTURE GRANTS",
        ResultSet::new(
            &["created_on", "privilege", "grant_on", "name", "grant_to", "grantee_name"],
            vec![
                cells(&[
                    Some("2024-01-01"),
                    Some("SELECT"),
                    Some("MATERIALIZED_VIEW"),
                    Some("HR.EMPLOYEES.<MATERIALIZED_VIEW>"),
                    Some("DATABASE_ROLE"),
                    Some("HR.DP_HR_DEV_EMPLOYEES_READ"),
                ]),
                cells(&[
                    Some("2024-01-01"),
                    Some("OWNERSHIP"),
                    Some("TABLE"),
                    Some("HR.EMPLOYEES.<TABLE>"),
                    Some("ROLE"),
                    Some("DP_DEV_DEVELOPER"),
                ]),
                cells(&[
                    Some("2024-01-01"),
                    Some("MONITOR"),
                    Some("TASK"),
                    Some("HR.EMPLOYEES.<TASK>"),
                    Some("ROLE"),
                    Some("DP_DEV_DEVELOPER"),
                ]),
            ],
        ),
    ));

    let grants = platform.list_future_grants("HR", "EMPLOYEES").await.unwrap();
    assert_eq!(grants.len(), 2, "unknown privilege rows are skipped");
    let select = grants.iter().find(|g| g.privilege == Privilege::Select).unwrap();
    assert_eq!(select.class, ObjectClass::MaterializedView);
    assert_eq!(
        select.grantee,
        RoleRef::database("HR", "DP_HR_DEV_EMPLOYEES_READ".into())
    );
    let owner = grants.iter().find(|g| g.privilege == Privilege::Ownership).unwrap();
    assert_eq!(owner.grantee, RoleRef::account("DP_DEV_DEVELOPER".into()));
}

#[tokio::test]
async fn role_grants_keep_only_role_usage() {
    let platform = SnowflakePlatform::new(Scripted::default().answer(
        "SHOW GRANTS TO ROLE DP_DEV_END_USER",
        ResultSet::new(
            &["privilege", "granted_on", "name"],
            vec![
                cells(&[Some("USAGE"), Some("DATABASE_ROLE"), Some("HR.DP_HR_DEV_EMPLOYEES_READ")]),
                cells(&[Some("USAGE"), Some("ROLE"), Some("DP_DEV_HR_ACCESS")]),
                cells(&[Some("USAGE"), Some("WAREHOUSE"), Some("COMPUTE_WH")]),
            ],
        ),
    ));
    let held: Vec<String> = platform
        .role_grants_to(&RoleRef::account("DP_DEV_END_USER".into()))
        .await
        .unwrap()
        .iter()
        .map(|r| r.to_string())
        .collect();
    assert_eq!(held, vec!["DP_DEV_HR_ACCESS", "HR.DP_HR_DEV_EMPLOYEES_READ"]);
}

#[tokio::test]
async fn principal_kind_from_user_type() {
    let platform = SnowflakePlatform::new(Scripted::default().answer(
        "SHOW USERS",
        ResultSet::new(
            &["name", "type"],
            vec![
                cells(&[Some("ALICE"), Some("PERSON")]),
                cells(&[Some("ETL_SVC"), Some("SERVICE")]),
                cells(&[Some("OLD_BOT"), Some("LEGACY_SERVICE")]),
                cells(&[Some("BOB"), None]),
            ],
        ),
    ));
    assert_eq!(platform.principal_kind("alice").await.unwrap(), Some(PrincipalKind::Human));
    assert_eq!(platform.principal_kind("ETL_SVC").await.unwrap(), Some(PrincipalKind::Service));
    assert_eq!(platform.principal_kind("old_bot").await.unwrap(), Some(PrincipalKind::Service));
    assert_eq!(platform.principal_kind("bob").await.unwrap(), Some(PrincipalKind::Human));
    assert_eq!(platform.principal_kind("mallory").await.unwrap(), None);
    assert_eq!(platform.backend_name(), "snowflake");
}
