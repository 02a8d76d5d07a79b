//! `PlatformCatalog` over Snowflake
//!
//! Writes go through [`render`](crate::render::render). Reads use `SHOW`
//! commands, plus `INFORMATION_SCHEMA` for functions and procedures, whose
//! owners and argument signatures `SHOW` does not report.
//!
//! Missing databases surface as "does not exist or not authorized"
//! rejections; introspection treats those as absence rather than failure.
//!
//! Grant statements succeed whether or not the grant was new, so before a
//! grant or ownership transfer the current state is read back; an operation
//! whose effect is already present is skipped and reported `Unchanged`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::debug;

use rbac_core::ports::PlatformResult;
use rbac_core::{
    CatalogObject, CatalogRows, CurrentGrant, FutureGrant, Identifier, ObjectClass, OpOutcome, Operation,
    PlatformCatalog, PlatformError, PrincipalKind, Privilege, RoleRef, SchemaInfo, Securable,
};

use crate::client::{ResultSet, Row, SqlApiClient, StatementRunner};
use crate::render::{like_pattern, quote_ident, render, role_ref, string_literal};

/// One row of `SHOW GRANTS TO <role>`. `name` is unquoted and routine
/// signatures are dropped, so it compares against `DB.SCHEMA.OBJECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeldGrant {
    privilege: Privilege,
    granted_on: String,
    name: String,
}

impl HeldGrant {
    fn class(&self) -> Option<ObjectClass> {
        self.granted_on.parse().ok()
    }
}

pub struct SnowflakePlatform<R = SqlApiClient> {
    runner: R,
}

impl<R: StatementRunner> SnowflakePlatform<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run an introspection query; a missing container yields no rows.
    async fn query(&self, sql: &str) -> PlatformResult<ResultSet> {
        match self.runner.run(sql).await {
            Err(err) if is_missing(&err) => {
                debug!(sql, "container missing, treating as empty");
                Ok(ResultSet::default())
            }
            other => other,
        }
    }

    async fn objects_of(&self, class: ObjectClass, database: &str, schema: &str) -> PlatformResult<Vec<CatalogObject>> {
        if class.has_signature() {
            return self.routines(class, database, schema).await;
        }
        let sql = format!(
            "SHOW {} IN SCHEMA {}.{}",
            class.plural_keyword(),
            quote_ident(database),
            quote_ident(schema)
        );
        let rows = self.query(&sql).await?;
        Ok(rows
            .iter()
            .filter(|row| listed_as(class, row))
            .filter_map(|row| {
                Some(CatalogObject {
                    class,
                    name: row.get("name")?.to_string(),
                    owner: row.get("owner").filter(|o| !o.is_empty()).map(str::to_string),
                })
            })
            .collect())
    }

    async fn routines(&self, class: ObjectClass, database: &str, schema: &str) -> PlatformResult<Vec<CatalogObject>> {
        let (view, prefix) = match class {
            ObjectClass::Procedure => ("PROCEDURES", "PROCEDURE"),
            _ => ("FUNCTIONS", "FUNCTION"),
        };
        let sql = format!(
            "SELECT {p}_NAME AS NAME, ARGUMENT_SIGNATURE, {p}_OWNER AS OWNER FROM {db}.INFORMATION_SCHEMA.{view} \
             WHERE {p}_SCHEMA = {schema}",
            p = prefix,
            db = quote_ident(database),
            view = view,
            schema = string_literal(schema),
        );
        let rows = self.query(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get("name")?;
                let signature = signature_types(row.get("argument_signature").unwrap_or("()"));
                Some(CatalogObject {
                    class,
                    name: format!("{}{}", name, signature),
                    owner: row.get("owner").map(str::to_string),
                })
            })
            .collect())
    }

    async fn held_grants(&self, grantee: &RoleRef) -> PlatformResult<Vec<HeldGrant>> {
        let rows = self.query(&format!("SHOW GRANTS TO {}", role_ref(grantee))).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(HeldGrant {
                    privilege: row.get("privilege")?.parse().ok()?,
                    granted_on: row.get("granted_on")?.to_uppercase(),
                    name: bare_name(row.get("name")?),
                })
            })
            .collect())
    }

    /// True when executing `operation` would not change the catalog.
    async fn already_applied(&self, operation: &Operation) -> PlatformResult<bool> {
        match operation {
            Operation::GrantPrivileges { privileges, on, to } => match on {
                Securable::FutureInSchema { class, database, schema } => {
                    let rules = self.list_future_grants(database, schema).await?;
                    Ok(privileges.iter().all(|privilege| {
                        rules
                            .iter()
                            .any(|g| g.class == *class && g.privilege == *privilege && &g.grantee == to)
                    }))
                }
                Securable::AllInSchema { class, database, schema } => {
                    let objects = self.objects_of(*class, database, schema).await?;
                    if objects.is_empty() {
                        return Ok(true);
                    }
                    let held = self.held_grants(to).await?;
                    Ok(objects.iter().all(|object| {
                        let name = object_path(database, schema, &object.name);
                        privileges.iter().all(|privilege| {
                            held.iter()
                                .any(|g| g.privilege == *privilege && g.class() == Some(*class) && g.name == name)
                        })
                    }))
                }
                Securable::Object { class, database, schema, name } => {
                    let held = self.held_grants(to).await?;
                    let name = object_path(database, schema, name);
                    Ok(privileges.iter().all(|privilege| {
                        held.iter()
                            .any(|g| g.privilege == *privilege && g.class() == Some(*class) && g.name == name)
                    }))
                }
                Securable::Database { database } => {
                    let held = self.held_grants(to).await?;
                    Ok(container_held(&held, "DATABASE", database, privileges))
                }
                Securable::Schema { database, schema } => {
                    let held = self.held_grants(to).await?;
                    Ok(container_held(&held, "SCHEMA", &format!("{}.{}", database, schema), privileges))
                }
            },
            Operation::GrantRole { role, to } => Ok(self.role_grants_to(to).await?.iter().any(|r| r == role)),
            Operation::GrantRoleToUser { role, user } => {
                let rows = self.query(&format!("SHOW GRANTS TO USER {}", quote_ident(user))).await?;
                let found = rows.iter().any(|row| row.get("role") == Some(role.as_str()));
                Ok(found)
            }
            Operation::TransferOwnership { on, to, .. } => match on {
                Securable::FutureInSchema { class, database, schema } => {
                    let rules = self.list_future_grants(database, schema).await?;
                    Ok(rules
                        .iter()
                        .any(|g| g.class == *class && g.privilege == Privilege::Ownership && &g.grantee == to))
                }
                Securable::AllInSchema { class, database, schema } => {
                    let objects = self.objects_of(*class, database, schema).await?;
                    Ok(objects.iter().all(|o| o.owner.as_deref() == Some(to.name().as_str())))
                }
                Securable::Object { class, database, schema, name } => {
                    let objects = self.objects_of(*class, database, schema).await?;
                    let bare = bare_name(name);
                    let matching: Vec<&CatalogObject> = objects.iter().filter(|o| bare_name(&o.name) == bare).collect();
                    Ok(!matching.is_empty() && matching.iter().all(|o| o.owner.as_deref() == Some(to.name().as_str())))
                }
                Securable::Database { .. } | Securable::Schema { .. } => Ok(false),
            },
            Operation::CreateDatabase { .. }
            | Operation::CreateSchema { .. }
            | Operation::CreateAccountRole { .. }
            | Operation::CreateDatabaseRole { .. } => Ok(false),
        }
    }
}

/// Strip identifier quotes and any routine signature:
/// `HR.S."NET_PAY(GROSS NUMBER):NUMBER"` → `HR.S.NET_PAY`.
fn bare_name(name: &str) -> String {
    let unquoted = name.replace('"', "");
    match unquoted.split_once('(') {
        Some((bare, _)) => bare.to_string(),
        None => unquoted,
    }
}

fn object_path(database: &str, schema: &str, name: &str) -> String {
    format!("{}.{}.{}", database, schema, bare_name(name))
}

fn container_held(held: &[HeldGrant], kind: &str, name: &str, privileges: &[Privilege]) -> bool {
    privileges
        .iter()
        .all(|privilege| held.iter().any(|g| g.privilege == *privilege && g.granted_on == kind && g.name == name))
}

/// "does not exist or not authorized" for a database or schema.
fn is_missing(err: &PlatformError) -> bool {
    matches!(err, PlatformError::Rejected { message, .. } if message.contains("does not exist"))
}

/// `SHOW TABLES` also lists dynamic and external tables, and `SHOW VIEWS`
/// lists materialized views; keep each object under one class.
fn listed_as(class: ObjectClass, row: &Row<'_>) -> bool {
    let flag = |column: &str| {
        row.get(column)
            .map(|v| v.eq_ignore_ascii_case("Y") || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
    match class {
        ObjectClass::Table => !flag("is_dynamic") && !flag("is_external"),
        ObjectClass::View => !flag("is_materialized"),
        _ => true,
    }
}

/// `(X NUMBER, Y VARCHAR)` → `(NUMBER, VARCHAR)`; grants address routines
/// by argument types only.
pub fn signature_types(signature: &str) -> String {
    let inner = signature.trim().trim_start_matches('(').trim_end_matches(')');
    let types: Vec<&str> = inner
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(|arg| arg.split_once(' ').map(|(_, ty)| ty.trim()).unwrap_or(arg))
        .collect();
    format!("({})", types.join(", "))
}

/// Grantee columns in `SHOW GRANTS` / `SHOW FUTURE GRANTS`.
fn grantee(kind: &str, name: &str, database: &str) -> RoleRef {
    if kind.eq_ignore_ascii_case("DATABASE_ROLE") {
        match name.split_once('.') {
            Some((db, role)) => RoleRef::database(db, Identifier::new(role)),
            None => RoleRef::database(database, Identifier::new(name)),
        }
    } else {
        RoleRef::account(Identifier::new(name))
    }
}

/// Map a DDL status line to an outcome.
fn create_outcome(result: &ResultSet) -> OpOutcome {
    match result.status_message() {
        Some(status) if status.contains("already exists") => OpOutcome::AlreadyExists,
        _ => OpOutcome::Created,
    }
}

#[async_trait]
impl<R: StatementRunner> PlatformCatalog for SnowflakePlatform<R> {
    async fn execute(&self, operation: &Operation) -> PlatformResult<OpOutcome> {
        let creates = matches!(
            operation,
            Operation::CreateDatabase { .. }
                | Operation::CreateSchema { .. }
                | Operation::CreateAccountRole { .. }
                | Operation::CreateDatabaseRole { .. }
        );
        if !creates {
            match self.already_applied(operation).await {
                Ok(true) => {
                    debug!(%operation, "already in place");
                    return Ok(OpOutcome::Unchanged);
                }
                Ok(false) => {}
                Err(err) => debug!(%operation, error = %err, "state check failed, executing anyway"),
            }
        }

        let sql = render(operation);
        let result = self.runner.run(&sql).await?;
        Ok(if creates {
            create_outcome(&result)
        } else {
            OpOutcome::Applied
        })
    }

    async fn database_exists(&self, database: &str) -> PlatformResult<bool> {
        let rows = self
            .query(&format!("SHOW DATABASES LIKE {}", like_pattern(database)))
            .await?;
        let found = rows.iter().any(|row| row.get("name") == Some(database));
        Ok(found)
    }

    async fn describe_schema(&self, database: &str, schema: &str) -> PlatformResult<Option<SchemaInfo>> {
        let rows = self
            .query(&format!(
                "SHOW SCHEMAS LIKE {} IN DATABASE {}",
                like_pattern(schema),
                quote_ident(database)
            ))
            .await?;
        Ok(schema_rows(&rows, database).into_iter().find(|s| s.name == schema))
    }

    async fn list_schemas(&self, database: &str) -> PlatformResult<CatalogRows<SchemaInfo>> {
        let rows = self
            .query(&format!("SHOW SCHEMAS IN DATABASE {}", quote_ident(database)))
            .await?;
        Ok(CatalogRows::new(schema_rows(&rows, database)))
    }

    async fn account_role_exists(&self, role: &Identifier) -> PlatformResult<bool> {
        let rows = self
            .query(&format!("SHOW ROLES LIKE {}", like_pattern(role.as_str())))
            .await?;
        let found = rows.iter().any(|row| row.get("name") == Some(role.as_str()));
        Ok(found)
    }

    async fn database_role_exists(&self, database: &str, role: &Identifier) -> PlatformResult<bool> {
        let rows = self
            .query(&format!("SHOW DATABASE ROLES IN DATABASE {}", quote_ident(database)))
            .await?;
        let found = rows.iter().any(|row| row.get("name") == Some(role.as_str()));
        Ok(found)
    }

    async fn list_objects(&self, database: &str, schema: &str) -> PlatformResult<CatalogRows<CatalogObject>> {
        let mut objects = Vec::new();
        for class in ObjectClass::GRANTABLE {
            objects.extend(self.objects_of(class, database, schema).await?);
        }
        Ok(CatalogRows::new(objects))
    }

    async fn list_future_grants(&self, database: &str, schema: &str) -> PlatformResult<CatalogRows<FutureGrant>> {
        let rows = self
            .query(&format!(
                "SHOW FUTURE GRANTS IN SCHEMA {}.{}",
                quote_ident(database),
                quote_ident(schema)
            ))
            .await?;
        let grants = rows
            .iter()
            .filter_map(|row| {
                let parsed = (|| {
                    let class: ObjectClass = row.get("grant_on")?.parse().ok()?;
                    let privilege: Privilege = row.get("privilege")?.parse().ok()?;
                    Some(FutureGrant {
                        class,
                        privilege,
                        grantee: grantee(row.get("grant_to")?, row.get("grantee_name")?, database),
                    })
                })();
                if parsed.is_none() {
                    debug!(grant_on = ?row.get("grant_on"), privilege = ?row.get("privilege"), "skipping future grant row");
                }
                parsed
            })
            .collect();
        Ok(CatalogRows::new(grants))
    }

    async fn list_current_grants(
        &self,
        database: &str,
        schema: &str,
        grantee: &RoleRef,
    ) -> PlatformResult<CatalogRows<CurrentGrant>> {
        let prefix = format!("{}.{}.", database, schema);
        let held: BTreeSet<CurrentGrant> = self
            .held_grants(grantee)
            .await?
            .into_iter()
            .filter(|g| g.privilege != Privilege::Ownership && g.name.starts_with(&prefix))
            .filter_map(|g| {
                Some(CurrentGrant {
                    class: g.class()?,
                    privilege: g.privilege,
                    grantee: grantee.clone(),
                })
            })
            .collect();
        Ok(CatalogRows::new(held.into_iter().collect()))
    }

    async fn role_grants_to(&self, role: &RoleRef) -> PlatformResult<CatalogRows<RoleRef>> {
        let default_db = match role {
            RoleRef::Database { database, .. } => database.as_str(),
            RoleRef::Account { .. } => "",
        };
        let rows = self.query(&format!("SHOW GRANTS TO {}", role_ref(role))).await?;
        let held = rows
            .iter()
            .filter(|row| row.get("privilege") == Some("USAGE"))
            .filter_map(|row| {
                let kind = row.get("granted_on")?;
                if !kind.eq_ignore_ascii_case("ROLE") && !kind.eq_ignore_ascii_case("DATABASE_ROLE") {
                    return None;
                }
                Some(grantee(kind, row.get("name")?, default_db))
            })
            .collect();
        Ok(CatalogRows::new(held))
    }

    async fn principal_kind(&self, user: &str) -> PlatformResult<Option<PrincipalKind>> {
        let rows = self.query(&format!("SHOW USERS LIKE {}", like_pattern(user))).await?;
        let kind = rows
            .iter()
            .find(|row| row.get("name").is_some_and(|n| n.eq_ignore_ascii_case(user)))
            .map(|row| match row.get("type") {
                Some(kind) if kind.to_uppercase().contains("SERVICE") => PrincipalKind::Service,
                _ => PrincipalKind::Human,
            });
        Ok(kind)
    }

    fn backend_name(&self) -> &'static str {
        "snowflake"
    }
}

fn schema_rows(rows: &ResultSet, database: &str) -> Vec<SchemaInfo> {
    rows.iter()
        .filter_map(|row| {
            Some(SchemaInfo {
                database: database.to_string(),
                name: row.get("name")?.to_string(),
                managed_access: row
                    .get("options")
                    .map(|o| o.to_uppercase().contains("MANAGED ACCESS"))
                    .unwrap_or(false),
            })
        })
        .collect()
}
