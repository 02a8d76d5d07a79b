//! In-memory platform
//!
//! A `PlatformCatalog` backed by plain collections, used by the test suites
//! and by the CLI's `--backend memory` mode. It models the parts of the
//! platform catalog the engine reads and writes:
//!
//! - databases, schemas (with the managed-access flag) and schema objects
//!   with an owner and a grant set
//! - account roles, database roles and role-to-role grants
//! - future grants, including future ownership, applied when an object is
//!   created through [`InMemoryPlatform::create_object`]
//! - users with a principal kind
//!
//! Failure injection (`fail_when`) and artificial latency (`with_latency`)
//! let tests drive partial-failure and timeout paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::naming::Identifier;
use crate::operation::{Operation, RoleRef, Securable};
use crate::ports::{
    CatalogObject, CatalogRows, CurrentGrant, FutureGrant, OpOutcome, PlatformCatalog, PlatformError, PlatformResult,
    SchemaInfo,
};
use crate::types::{ObjectClass, Privilege, PrincipalKind};

/// Owner given to objects created without a future-ownership rule.
pub const DEFAULT_CREATOR: &str = "SYSADMIN";

type FailurePredicate = Box<dyn Fn(&Operation) -> bool + Send + Sync>;

struct FailureRule {
    predicate: FailurePredicate,
    message: String,
}

#[derive(Debug, Default, Clone)]
struct ObjectState {
    owner: Option<String>,
    grants: BTreeSet<(Privilege, RoleRef)>,
}

#[derive(Debug, Default, Clone)]
struct SchemaState {
    managed_access: bool,
    objects: BTreeMap<(ObjectClass, String), ObjectState>,
    future_grants: BTreeSet<FutureGrant>,
}

#[derive(Default)]
struct State {
    databases: BTreeSet<String>,
    schemas: BTreeMap<(String, String), SchemaState>,
    account_roles: BTreeSet<Identifier>,
    database_roles: BTreeSet<(String, Identifier)>,
    container_grants: BTreeSet<(Securable, Privilege, RoleRef)>,
    /// (granted role, grantee)
    role_grants: BTreeSet<(RoleRef, RoleRef)>,
    user_grants: BTreeSet<(Identifier, String)>,
    users: BTreeMap<String, PrincipalKind>,
    log: Vec<Operation>,
}

#[derive(Default)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
    failures: Mutex<Vec<FailureRule>>,
    latency: Option<Duration>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `execute` call, to exercise operation timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // TEST / SIMULATION HELPERS
    // ========================================================================

    /// Reject every later operation matching `predicate` with `message`.
    pub fn fail_when<F>(&self, predicate: F, message: impl Into<String>)
    where
        F: Fn(&Operation) -> bool + Send + Sync + 'static,
    {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(FailureRule {
                predicate: Box::new(predicate),
                message: message.into(),
            });
    }

    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn add_user(&self, name: &str, kind: PrincipalKind) {
        self.state().users.insert(name.to_uppercase(), kind);
    }

    /// Create a schema directly, bypassing the engine (e.g. a legacy schema
    /// without managed access).
    pub fn add_schema(&self, database: &str, schema: &str, managed_access: bool) {
        let mut state = self.state();
        state.databases.insert(database.to_string());
        state.schemas.insert(
            (database.to_string(), schema.to_string()),
            SchemaState {
                managed_access,
                ..SchemaState::default()
            },
        );
    }

    /// Simulate a deployment creating an object. Future ownership and
    /// future grants registered on the schema are applied.
    pub fn create_object(&self, database: &str, schema: &str, class: ObjectClass, name: &str) -> PlatformResult<()> {
        let mut state = self.state();
        let schema_state = schema_mut(&mut state, database, schema)?;

        let mut object = ObjectState {
            owner: Some(DEFAULT_CREATOR.to_string()),
            grants: BTreeSet::new(),
        };
        for rule in schema_state.future_grants.iter().filter(|g| g.class == class) {
            if rule.privilege == Privilege::Ownership {
                object.owner = Some(rule.grantee.name().to_string());
            } else {
                object.grants.insert((rule.privilege, rule.grantee.clone()));
            }
        }
        schema_state.objects.insert((class, name.to_string()), object);
        Ok(())
    }

    /// Re-own an object out of band, simulating drift.
    pub fn set_owner(
        &self,
        database: &str,
        schema: &str,
        class: ObjectClass,
        name: &str,
        owner: &str,
    ) -> PlatformResult<()> {
        let mut state = self.state();
        let object = schema_mut(&mut state, database, schema)?
            .objects
            .get_mut(&(class, name.to_string()))
            .ok_or_else(|| PlatformError::rejected(format!("Object '{}' does not exist or not authorized.", name)))?;
        object.owner = Some(owner.to_string());
        Ok(())
    }

    pub fn drop_database_role(&self, database: &str, role: &str) {
        let mut state = self.state();
        let key = (database.to_string(), Identifier::from(role));
        state.database_roles.remove(&key);
        let dropped = RoleRef::database(database, Identifier::from(role));
        state.role_grants.retain(|(granted, grantee)| granted != &dropped && grantee != &dropped);
    }

    pub fn drop_account_role(&self, role: &str) {
        let mut state = self.state();
        let name = Identifier::from(role);
        state.account_roles.remove(&name);
        let dropped = RoleRef::account(name);
        state.role_grants.retain(|(granted, grantee)| granted != &dropped && grantee != &dropped);
    }

    pub fn revoke_role(&self, role: &RoleRef, from: &RoleRef) {
        self.state().role_grants.remove(&(role.clone(), from.clone()));
    }

    pub fn clear_future_grants(&self, database: &str, schema: &str) {
        if let Some(schema_state) = self
            .state()
            .schemas
            .get_mut(&(database.to_string(), schema.to_string()))
        {
            schema_state.future_grants.clear();
        }
    }

    /// Current grants on one object, for assertions.
    pub fn object_grants(
        &self,
        database: &str,
        schema: &str,
        class: ObjectClass,
        name: &str,
    ) -> Vec<(Privilege, RoleRef)> {
        self.state()
            .schemas
            .get(&(database.to_string(), schema.to_string()))
            .and_then(|s| s.objects.get(&(class, name.to_string())))
            .map(|o| o.grants.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_has_role(&self, user: &str, role: &str) -> bool {
        self.state()
            .user_grants
            .contains(&(Identifier::from(role), user.to_uppercase()))
    }

    /// Successfully executed operations, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().log.clone()
    }

    fn injected_failure(&self, operation: &Operation) -> Option<String> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|rule| (rule.predicate)(operation))
            .map(|rule| rule.message.clone())
    }
}

// ============================================================================
// CATALOG MUTATION
// ============================================================================

fn schema_mut<'s>(state: &'s mut State, database: &str, schema: &str) -> PlatformResult<&'s mut SchemaState> {
    if !state.databases.contains(database) {
        return Err(missing_database(database));
    }
    state
        .schemas
        .get_mut(&(database.to_string(), schema.to_string()))
        .ok_or_else(|| PlatformError::rejected(format!("Schema '{}.{}' does not exist or not authorized.", database, schema)))
}

fn missing_database(database: &str) -> PlatformError {
    PlatformError::rejected(format!("Database '{}' does not exist or not authorized.", database))
}

fn role_exists(state: &State, role: &RoleRef) -> bool {
    match role {
        RoleRef::Account { name } => state.account_roles.contains(name),
        RoleRef::Database { database, name } => state.database_roles.contains(&(database.clone(), name.clone())),
    }
}

fn require_role(state: &State, role: &RoleRef) -> PlatformResult<()> {
    if role_exists(state, role) {
        Ok(())
    } else {
        Err(PlatformError::rejected(format!("Role '{}' does not exist or not authorized.", role)))
    }
}

fn changed(any: bool) -> OpOutcome {
    if any {
        OpOutcome::Applied
    } else {
        OpOutcome::Unchanged
    }
}

fn apply(state: &mut State, operation: &Operation) -> PlatformResult<OpOutcome> {
    match operation {
        Operation::CreateDatabase { database, .. } => {
            if !state.databases.insert(database.clone()) {
                return Ok(OpOutcome::AlreadyExists);
            }
            for builtin in ["INFORMATION_SCHEMA", "PUBLIC"] {
                state
                    .schemas
                    .insert((database.clone(), builtin.to_string()), SchemaState::default());
            }
            Ok(OpOutcome::Created)
        }
        Operation::CreateSchema {
            database,
            schema,
            managed_access,
            ..
        } => {
            if !state.databases.contains(database) {
                return Err(missing_database(database));
            }
            let key = (database.clone(), schema.clone());
            if state.schemas.contains_key(&key) {
                return Ok(OpOutcome::AlreadyExists);
            }
            state.schemas.insert(
                key,
                SchemaState {
                    managed_access: *managed_access,
                    ..SchemaState::default()
                },
            );
            Ok(OpOutcome::Created)
        }
        Operation::CreateAccountRole { role, .. } => Ok(if state.account_roles.insert(role.clone()) {
            OpOutcome::Created
        } else {
            OpOutcome::AlreadyExists
        }),
        Operation::CreateDatabaseRole { database, role, .. } => {
            if !state.databases.contains(database) {
                return Err(missing_database(database));
            }
            Ok(if state.database_roles.insert((database.clone(), role.clone())) {
                OpOutcome::Created
            } else {
                OpOutcome::AlreadyExists
            })
        }
        Operation::GrantPrivileges { privileges, on, to } => {
            require_role(state, to)?;
            grant_privileges(state, privileges, on, to)
        }
        Operation::GrantRole { role, to } => {
            require_role(state, role)?;
            require_role(state, to)?;
            Ok(changed(state.role_grants.insert((role.clone(), to.clone()))))
        }
        Operation::GrantRoleToUser { role, user } => {
            if !state.account_roles.contains(role) {
                return Err(PlatformError::rejected(format!("Role '{}' does not exist or not authorized.", role)));
            }
            let user = user.to_uppercase();
            if !state.users.contains_key(&user) {
                return Err(PlatformError::rejected(format!("User '{}' does not exist or not authorized.", user)));
            }
            Ok(changed(state.user_grants.insert((role.clone(), user))))
        }
        Operation::TransferOwnership {
            on,
            to,
            copy_current_grants,
        } => {
            require_role(state, to)?;
            transfer_ownership(state, on, to, *copy_current_grants)
        }
    }
}

fn grant_privileges(
    state: &mut State,
    privileges: &[Privilege],
    on: &Securable,
    to: &RoleRef,
) -> PlatformResult<OpOutcome> {
    match on {
        Securable::Database { database } => {
            if !state.databases.contains(database) {
                return Err(missing_database(database));
            }
            let mut any = false;
            for privilege in privileges {
                any |= state.container_grants.insert((on.clone(), *privilege, to.clone()));
            }
            Ok(changed(any))
        }
        Securable::Schema { database, schema } => {
            schema_mut(state, database, schema)?;
            let mut any = false;
            for privilege in privileges {
                any |= state.container_grants.insert((on.clone(), *privilege, to.clone()));
            }
            Ok(changed(any))
        }
        Securable::AllInSchema {
            class,
            database,
            schema,
        } => {
            let schema_state = schema_mut(state, database, schema)?;
            let mut any = false;
            for ((object_class, _), object) in schema_state.objects.iter_mut() {
                if object_class == class {
                    for privilege in privileges {
                        any |= object.grants.insert((*privilege, to.clone()));
                    }
                }
            }
            Ok(changed(any))
        }
        Securable::FutureInSchema {
            class,
            database,
            schema,
        } => {
            let schema_state = schema_mut(state, database, schema)?;
            let mut any = false;
            for privilege in privileges {
                any |= schema_state.future_grants.insert(FutureGrant {
                    class: *class,
                    privilege: *privilege,
                    grantee: to.clone(),
                });
            }
            Ok(changed(any))
        }
        Securable::Object {
            class,
            database,
            schema,
            name,
        } => {
            let object = schema_mut(state, database, schema)?
                .objects
                .get_mut(&(*class, name.clone()))
                .ok_or_else(|| PlatformError::rejected(format!("Object '{}' does not exist or not authorized.", name)))?;
            let mut any = false;
            for privilege in privileges {
                any |= object.grants.insert((*privilege, to.clone()));
            }
            Ok(changed(any))
        }
    }
}

fn transfer_ownership(state: &mut State, on: &Securable, to: &RoleRef, copy_current_grants: bool) -> PlatformResult<OpOutcome> {
    let owner = to.name().to_string();
    let reown = |object: &mut ObjectState| -> bool {
        if object.owner.as_deref() == Some(owner.as_str()) {
            return false;
        }
        object.owner = Some(owner.clone());
        if !copy_current_grants {
            object.grants.clear();
        }
        true
    };

    match on {
        Securable::AllInSchema {
            class,
            database,
            schema,
        } => {
            let schema_state = schema_mut(state, database, schema)?;
            let mut any = false;
            for ((object_class, _), object) in schema_state.objects.iter_mut() {
                if object_class == class {
                    any |= reown(object);
                }
            }
            Ok(changed(any))
        }
        Securable::Object {
            class,
            database,
            schema,
            name,
        } => {
            let object = schema_mut(state, database, schema)?
                .objects
                .get_mut(&(*class, name.clone()))
                .ok_or_else(|| PlatformError::rejected(format!("Object '{}' does not exist or not authorized.", name)))?;
            Ok(changed(reown(object)))
        }
        Securable::FutureInSchema {
            class,
            database,
            schema,
        } => {
            let schema_state = schema_mut(state, database, schema)?;
            let rule = FutureGrant {
                class: *class,
                privilege: Privilege::Ownership,
                grantee: to.clone(),
            };
            if schema_state.future_grants.contains(&rule) {
                return Ok(OpOutcome::Unchanged);
            }
            // At most one future owner per class.
            schema_state
                .future_grants
                .retain(|g| !(g.class == *class && g.privilege == Privilege::Ownership));
            schema_state.future_grants.insert(rule);
            Ok(OpOutcome::Applied)
        }
        Securable::Database { .. } | Securable::Schema { .. } => Err(PlatformError::rejected(format!(
            "ownership transfer of {} is not supported",
            on
        ))),
    }
}

// ============================================================================
// PORT IMPLEMENTATION
// ============================================================================

#[async_trait]
impl PlatformCatalog for InMemoryPlatform {
    async fn execute(&self, operation: &Operation) -> PlatformResult<OpOutcome> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.injected_failure(operation) {
            return Err(PlatformError::rejected(message));
        }

        let mut state = self.state();
        let outcome = apply(&mut state, operation)?;
        state.log.push(operation.clone());
        Ok(outcome)
    }

    async fn database_exists(&self, database: &str) -> PlatformResult<bool> {
        Ok(self.state().databases.contains(database))
    }

    async fn describe_schema(&self, database: &str, schema: &str) -> PlatformResult<Option<SchemaInfo>> {
        Ok(self
            .state()
            .schemas
            .get(&(database.to_string(), schema.to_string()))
            .map(|s| SchemaInfo {
                database: database.to_string(),
                name: schema.to_string(),
                managed_access: s.managed_access,
            }))
    }

    async fn list_schemas(&self, database: &str) -> PlatformResult<CatalogRows<SchemaInfo>> {
        let state = self.state();
        if !state.databases.contains(database) {
            return Err(missing_database(database));
        }
        let rows = state
            .schemas
            .iter()
            .filter(|((db, _), _)| db == database)
            .map(|((db, name), s)| SchemaInfo {
                database: db.clone(),
                name: name.clone(),
                managed_access: s.managed_access,
            })
            .collect();
        Ok(CatalogRows::new(rows))
    }

    async fn account_role_exists(&self, role: &Identifier) -> PlatformResult<bool> {
        Ok(self.state().account_roles.contains(role))
    }

    async fn database_role_exists(&self, database: &str, role: &Identifier) -> PlatformResult<bool> {
        Ok(self
            .state()
            .database_roles
            .contains(&(database.to_string(), role.clone())))
    }

    async fn list_objects(&self, database: &str, schema: &str) -> PlatformResult<CatalogRows<CatalogObject>> {
        let mut state = self.state();
        let rows = schema_mut(&mut state, database, schema)?
            .objects
            .iter()
            .map(|((class, name), object)| CatalogObject {
                class: *class,
                name: name.clone(),
                owner: object.owner.clone(),
            })
            .collect();
        Ok(CatalogRows::new(rows))
    }

    async fn list_future_grants(&self, database: &str, schema: &str) -> PlatformResult<CatalogRows<FutureGrant>> {
        let mut state = self.state();
        let rows = schema_mut(&mut state, database, schema)?
            .future_grants
            .iter()
            .cloned()
            .collect();
        Ok(CatalogRows::new(rows))
    }

    async fn list_current_grants(
        &self,
        database: &str,
        schema: &str,
        grantee: &RoleRef,
    ) -> PlatformResult<CatalogRows<CurrentGrant>> {
        let mut state = self.state();
        let held: BTreeSet<CurrentGrant> = schema_mut(&mut state, database, schema)?
            .objects
            .iter()
            .flat_map(|((class, _), object)| {
                object
                    .grants
                    .iter()
                    .filter(|(privilege, to)| to == grantee && *privilege != Privilege::Ownership)
                    .map(move |(privilege, to)| CurrentGrant {
                        class: *class,
                        privilege: *privilege,
                        grantee: to.clone(),
                    })
            })
            .collect();
        Ok(CatalogRows::new(held.into_iter().collect()))
    }

    async fn role_grants_to(&self, grantee: &RoleRef) -> PlatformResult<CatalogRows<RoleRef>> {
        let rows = self
            .state()
            .role_grants
            .iter()
            .filter(|(_, to)| to == grantee)
            .map(|(role, _)| role.clone())
            .collect();
        Ok(CatalogRows::new(rows))
    }

    async fn principal_kind(&self, user: &str) -> PlatformResult<Option<PrincipalKind>> {
        Ok(self.state().users.get(&user.to_uppercase()).copied())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(db: &str, schema: &str) -> Securable {
        Securable::AllInSchema {
            class: ObjectClass::Table,
            database: db.into(),
            schema: schema.into(),
        }
    }

    async fn seeded() -> InMemoryPlatform {
        let platform = InMemoryPlatform::new();
        for op in [
            Operation::CreateDatabase {
                database: "HR".into(),
                comment: None,
            },
            Operation::CreateSchema {
                database: "HR".into(),
                schema: "EMPLOYEES".into(),
                managed_access: true,
                comment: None,
            },
            Operation::CreateAccountRole {
                role: "OWNER".into(),
                comment: None,
            },
            Operation::CreateDatabaseRole {
                database: "HR".into(),
                role: "READER".into(),
                comment: None,
            },
        ] {
            platform.execute(&op).await.unwrap();
        }
        platform
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let platform = seeded().await;
        let again = platform
            .execute(&Operation::CreateDatabase {
                database: "HR".into(),
                comment: None,
            })
            .await
            .unwrap();
        assert_eq!(again, OpOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn new_database_has_builtin_schemas() {
        let platform = seeded().await;
        let names: Vec<_> = platform
            .list_schemas("HR")
            .await
            .unwrap()
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(names, vec!["EMPLOYEES", "INFORMATION_SCHEMA", "PUBLIC"]);
    }

    #[tokio::test]
    async fn future_rules_apply_to_new_objects() {
        let platform = seeded().await;
        let reader = RoleRef::database("HR", "READER".into());
        let owner = RoleRef::account("OWNER".into());
        platform
            .execute(&Operation::GrantPrivileges {
                privileges: vec![Privilege::Select],
                on: Securable::FutureInSchema {
                    class: ObjectClass::Table,
                    database: "HR".into(),
                    schema: "EMPLOYEES".into(),
                },
                to: reader.clone(),
            })
            .await
            .unwrap();
        platform
            .execute(&Operation::TransferOwnership {
                on: Securable::FutureInSchema {
                    class: ObjectClass::Table,
                    database: "HR".into(),
                    schema: "EMPLOYEES".into(),
                },
                to: owner,
                copy_current_grants: false,
            })
            .await
            .unwrap();

        platform
            .create_object("HR", "EMPLOYEES", ObjectClass::Table, "PAYROLL")
            .unwrap();
        let objects = platform.list_objects("HR", "EMPLOYEES").await.unwrap();
        let payroll = objects.iter().next().unwrap();
        assert_eq!(payroll.owner.as_deref(), Some("OWNER"));
        assert_eq!(
            platform.object_grants("HR", "EMPLOYEES", ObjectClass::Table, "PAYROLL"),
            vec![(Privilege::Select, reader)]
        );
    }

    #[tokio::test]
    async fn copy_current_grants_preserves_grants() {
        let platform = seeded().await;
        platform
            .create_object("HR", "EMPLOYEES", ObjectClass::Table, "PAYROLL")
            .unwrap();
        let reader = RoleRef::database("HR", "READER".into());
        platform
            .execute(&Operation::GrantPrivileges {
                privileges: vec![Privilege::Select],
                on: table("HR", "EMPLOYEES"),
                to: reader.clone(),
            })
            .await
            .unwrap();
        let outcome = platform
            .execute(&Operation::TransferOwnership {
                on: table("HR", "EMPLOYEES"),
                to: RoleRef::account("OWNER".into()),
                copy_current_grants: true,
            })
            .await
            .unwrap();
        assert_eq!(outcome, OpOutcome::Applied);
        assert_eq!(
            platform.object_grants("HR", "EMPLOYEES", ObjectClass::Table, "PAYROLL"),
            vec![(Privilege::Select, reader)]
        );
    }

    #[tokio::test]
    async fn current_grants_are_listed_once_per_class_and_privilege() {
        let platform = seeded().await;
        for name in ["PAYROLL", "BONUS"] {
            platform
                .create_object("HR", "EMPLOYEES", ObjectClass::Table, name)
                .unwrap();
        }
        let reader = RoleRef::database("HR", "READER".into());
        platform
            .execute(&Operation::GrantPrivileges {
                privileges: vec![Privilege::Select],
                on: table("HR", "EMPLOYEES"),
                to: reader.clone(),
            })
            .await
            .unwrap();

        let held = platform.list_current_grants("HR", "EMPLOYEES", &reader).await.unwrap();
        let rows: Vec<_> = held.iter().map(|g| (g.class, g.privilege)).collect();
        assert_eq!(rows, vec![(ObjectClass::Table, Privilege::Select)]);

        let other = RoleRef::account("OWNER".into());
        assert!(platform
            .list_current_grants("HR", "EMPLOYEES", &other)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn grant_to_missing_role_is_rejected() {
        let platform = seeded().await;
        let err = platform
            .execute(&Operation::GrantRole {
                role: RoleRef::database("HR", "READER".into()),
                to: RoleRef::account("NOBODY".into()),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NOBODY"));
    }

    #[tokio::test]
    async fn injected_failures_stop_matching_operations() {
        let platform = InMemoryPlatform::new();
        platform.fail_when(
            |op| matches!(op, Operation::CreateDatabase { .. }),
            "Insufficient privileges to operate on account",
        );
        let op = Operation::CreateDatabase {
            database: "HR".into(),
            comment: None,
        };
        assert!(platform.execute(&op).await.is_err());
        platform.clear_failures();
        assert_eq!(platform.execute(&op).await.unwrap(), OpOutcome::Created);
        assert_eq!(platform.operations(), vec![op]);
    }

    #[tokio::test]
    async fn users_are_case_insensitive() {
        let platform = InMemoryPlatform::new();
        platform.add_user("alice", PrincipalKind::Human);
        assert_eq!(
            platform.principal_kind("ALICE").await.unwrap(),
            Some(PrincipalKind::Human)
        );
        assert_eq!(platform.principal_kind("bob").await.unwrap(), None);
    }
}
