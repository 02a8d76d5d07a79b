//! Desired-State Model Builder
//!
//! Computes the full target graph for one (environment, database, schema):
//! the resource container, the database roles and every grant they hold,
//! the ownership targets and the object-creation grants.
//!
//! Provisioning and auditing both call [`build_desired_state`]; it reads
//! nothing but its inputs, so "what should exist" is computed identically
//! on first provisioning and on an audit years later.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::naming::{Identifier, NamingScheme};
use crate::operation::{RoleRef, Securable};
use crate::types::{normalize_segment, AccessLevel, CapabilityLevel, Environment, ObjectClass, Privilege, RoleKind};

/// A (database, schema) pair belonging to one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContainer {
    pub environment: Environment,
    pub database: String,
    pub schema: String,
    pub managed_access: bool,
    pub object_owner: Identifier,
}

impl ResourceContainer {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.schema)
    }

    pub fn database_securable(&self) -> Securable {
        Securable::Database {
            database: self.database.clone(),
        }
    }

    pub fn schema_securable(&self) -> Securable {
        Securable::Schema {
            database: self.database.clone(),
            schema: self.schema.clone(),
        }
    }

    pub fn all_in_schema(&self, class: ObjectClass) -> Securable {
        Securable::AllInSchema {
            class,
            database: self.database.clone(),
            schema: self.schema.clone(),
        }
    }

    pub fn future_in_schema(&self, class: ObjectClass) -> Securable {
        Securable::FutureInSchema {
            class,
            database: self.database.clone(),
            schema: self.schema.clone(),
        }
    }

    pub fn object(&self, class: ObjectClass, name: &str) -> Securable {
        Securable::Object {
            class,
            database: self.database.clone(),
            schema: self.schema.clone(),
            name: name.to_string(),
        }
    }
}

/// Whether a grant applies to existing objects or to objects created later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    Container,
    Current,
    Future,
}

/// Directed relation: privileges on a securable, held by a grantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEdge {
    pub privileges: Vec<Privilege>,
    pub grantee: RoleRef,
    pub target: Securable,
}

impl GrantEdge {
    pub fn scope(&self) -> GrantScope {
        match self.target {
            Securable::FutureInSchema { .. } => GrantScope::Future,
            Securable::AllInSchema { .. } | Securable::Object { .. } => GrantScope::Current,
            Securable::Database { .. } | Securable::Schema { .. } => GrantScope::Container,
        }
    }

    /// Object class of a current or future grant.
    pub fn class(&self) -> Option<ObjectClass> {
        match &self.target {
            Securable::AllInSchema { class, .. }
            | Securable::FutureInSchema { class, .. }
            | Securable::Object { class, .. } => Some(*class),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRoleSpec {
    pub level: AccessLevel,
    pub role: RoleRef,
    pub grants: Vec<GrantEdge>,
    /// Functional role this database role rolls up into, if any.
    pub granted_to: Option<RoleRef>,
}

impl DatabaseRoleSpec {
    pub fn name(&self) -> &Identifier {
        self.role.name()
    }

    pub fn future_grants(&self) -> impl Iterator<Item = &GrantEdge> {
        self.grants.iter().filter(|g| g.scope() == GrantScope::Future)
    }

    pub fn current_grants(&self) -> impl Iterator<Item = &GrantEdge> {
        self.grants.iter().filter(|g| g.scope() == GrantScope::Current)
    }
}

/// Account-level role the environment must provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRole {
    pub kind: RoleKind,
    pub capability: Option<CapabilityLevel>,
    pub name: Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub container: ResourceContainer,
    pub environment_roles: Vec<EnvironmentRole>,
    pub database_roles: Vec<DatabaseRoleSpec>,
    pub ownership_target: RoleRef,
    pub future_ownership_target: RoleRef,
    pub ownership_classes: Vec<ObjectClass>,
    pub creation_grants: Vec<GrantEdge>,
}

impl DesiredState {
    /// Parse raw inputs first; invalid environments never reach the builder.
    pub fn from_raw(naming: &NamingScheme, environment: &str, database: &str, schema: &str) -> Result<Self> {
        let environment: Environment = environment.parse()?;
        Ok(build_desired_state(naming, environment, database, schema))
    }

    pub fn database_role(&self, level: AccessLevel) -> Option<&DatabaseRoleSpec> {
        self.database_roles.iter().find(|r| r.level == level)
    }

    /// `build_desired_state` always includes READ; a deserialized state may not.
    pub fn read_role(&self) -> Option<&DatabaseRoleSpec> {
        self.database_role(AccessLevel::Read)
    }

    pub fn write_role(&self) -> Option<&DatabaseRoleSpec> {
        self.database_role(AccessLevel::Write)
    }
}

/// Build the target graph. Pure with respect to its inputs.
pub fn build_desired_state(
    naming: &NamingScheme,
    environment: Environment,
    database: &str,
    schema: &str,
) -> DesiredState {
    let database = normalize_segment(database);
    let schema = normalize_segment(schema);
    let object_owner = naming.object_owner(environment);

    let container = ResourceContainer {
        environment,
        database: database.clone(),
        schema: schema.clone(),
        managed_access: true,
        object_owner: object_owner.clone(),
    };

    let environment_roles = environment_roles(naming, environment);
    let end_user = RoleRef::account(naming.functional_role(environment, CapabilityLevel::EndUser));

    let mut database_roles = vec![database_role_spec(
        naming,
        &container,
        AccessLevel::Read,
        Some(end_user),
    )];
    if environment.is_dev() {
        database_roles.push(database_role_spec(naming, &container, AccessLevel::Write, None));
    }

    let owner = RoleRef::account(object_owner);
    let mut create_privileges = vec![Privilege::Usage];
    create_privileges.extend(ObjectClass::CREATABLE.iter().map(|c| Privilege::Create(*c)));
    let creation_grants = vec![
        GrantEdge {
            privileges: vec![Privilege::Usage],
            grantee: owner.clone(),
            target: container.database_securable(),
        },
        GrantEdge {
            privileges: create_privileges,
            grantee: owner.clone(),
            target: container.schema_securable(),
        },
    ];

    DesiredState {
        container,
        environment_roles,
        database_roles,
        ownership_target: owner.clone(),
        future_ownership_target: owner,
        ownership_classes: ObjectClass::GRANTABLE.to_vec(),
        creation_grants,
    }
}

/// Account-level roles an environment must provide: the functional ladder,
/// plus the deployment-automation role outside DEV.
pub fn environment_roles(naming: &NamingScheme, environment: Environment) -> Vec<EnvironmentRole> {
    let mut roles: Vec<EnvironmentRole> = CapabilityLevel::LADDER
        .iter()
        .map(|capability| EnvironmentRole {
            kind: RoleKind::Functional,
            capability: Some(*capability),
            name: naming.functional_role(environment, *capability),
        })
        .collect();
    if !environment.is_dev() {
        roles.push(EnvironmentRole {
            kind: RoleKind::System,
            capability: None,
            name: naming.deployment_role(environment),
        });
    }
    roles
}

fn database_role_spec(
    naming: &NamingScheme,
    container: &ResourceContainer,
    level: AccessLevel,
    granted_to: Option<RoleRef>,
) -> DatabaseRoleSpec {
    let role = RoleRef::database(
        container.database.clone(),
        naming.database_role(container.environment, &container.database, &container.schema, level),
    );

    let mut grants = vec![
        GrantEdge {
            privileges: vec![Privilege::Usage],
            grantee: role.clone(),
            target: container.database_securable(),
        },
        GrantEdge {
            privileges: vec![Privilege::Usage],
            grantee: role.clone(),
            target: container.schema_securable(),
        },
    ];

    for class in ObjectClass::GRANTABLE {
        let privileges = class_privileges(class, level);
        grants.push(GrantEdge {
            privileges: privileges.clone(),
            grantee: role.clone(),
            target: container.all_in_schema(class),
        });
        grants.push(GrantEdge {
            privileges,
            grantee: role.clone(),
            target: container.future_in_schema(class),
        });
    }

    DatabaseRoleSpec {
        level,
        role,
        grants,
        granted_to,
    }
}

/// Privileges a database role of `level` holds on objects of `class`.
pub fn class_privileges(class: ObjectClass, level: AccessLevel) -> Vec<Privilege> {
    let mut privileges = read_privileges(class);
    if level == AccessLevel::Write {
        privileges.extend(write_privileges(class));
    }
    privileges
}

fn read_privileges(class: ObjectClass) -> Vec<Privilege> {
    match class {
        ObjectClass::Table
        | ObjectClass::View
        | ObjectClass::MaterializedView
        | ObjectClass::DynamicTable
        | ObjectClass::ExternalTable
        | ObjectClass::Stream => vec![Privilege::Select],
        ObjectClass::Function
        | ObjectClass::Procedure
        | ObjectClass::Sequence
        | ObjectClass::FileFormat => vec![Privilege::Usage],
        ObjectClass::Stage => vec![Privilege::Read],
        ObjectClass::Task | ObjectClass::Pipe | ObjectClass::Tag => vec![],
    }
}

fn write_privileges(class: ObjectClass) -> Vec<Privilege> {
    match class {
        ObjectClass::Table => vec![
            Privilege::Insert,
            Privilege::Update,
            Privilege::Delete,
            Privilege::Truncate,
            Privilege::References,
        ],
        ObjectClass::View => vec![Privilege::Insert, Privilege::Update, Privilege::Delete],
        ObjectClass::Stage => vec![Privilege::Write],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn build(env: Environment) -> DesiredState {
        build_desired_state(&NamingScheme::default(), env, "hr", "employees")
    }

    #[test]
    fn dev_has_read_and_write_roles() {
        let desired = build(Environment::Dev);
        let levels: Vec<_> = desired.database_roles.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![AccessLevel::Read, AccessLevel::Write]);
        assert_eq!(desired.read_role().unwrap().name().as_str(), "DP_HR_DEV_EMPLOYEES_READ");
        assert_eq!(
            desired.write_role().unwrap().name().as_str(),
            "DP_HR_DEV_EMPLOYEES_WRITE"
        );
    }

    #[test]
    fn non_dev_never_has_write_role() {
        for env in Environment::ALL.into_iter().filter(|e| !e.is_dev()) {
            let desired = build(env);
            assert!(desired.write_role().is_none(), "{env} has a write role");
            assert_eq!(desired.database_roles.len(), 1);
        }
    }

    #[test]
    fn object_owner_follows_environment() {
        assert_eq!(
            build(Environment::Dev).container.object_owner.as_str(),
            "DP_DEV_DEVELOPER"
        );
        assert_eq!(
            build(Environment::Uat).container.object_owner.as_str(),
            "DP_UAT_DEPLOYER"
        );
    }

    #[test]
    fn every_current_grant_has_matching_future_grant() {
        for env in Environment::ALL {
            for role in build(env).database_roles {
                let current: BTreeSet<_> = role
                    .current_grants()
                    .map(|g| (g.class(), g.privileges.clone()))
                    .collect();
                let future: BTreeSet<_> = role
                    .future_grants()
                    .map(|g| (g.class(), g.privileges.clone()))
                    .collect();
                assert_eq!(current, future);
            }
        }
    }

    #[test]
    fn write_role_is_superset_of_read() {
        let desired = build(Environment::Dev);
        let read = desired.read_role().unwrap();
        let write = desired.write_role().unwrap();
        for (r, w) in read.grants.iter().zip(write.grants.iter()) {
            assert_eq!(r.target, w.target);
            assert!(r.privileges.iter().all(|p| w.privileges.contains(p)));
        }
        let table = write
            .current_grants()
            .find(|g| g.class() == Some(ObjectClass::Table))
            .unwrap();
        assert_eq!(
            table.privileges,
            vec![
                Privilege::Select,
                Privilege::Insert,
                Privilege::Update,
                Privilege::Delete,
                Privilege::Truncate,
                Privilege::References
            ]
        );
    }

    #[test]
    fn read_role_rolls_up_to_end_user() {
        let desired = build(Environment::Prd);
        assert_eq!(
            desired.read_role().unwrap().granted_to,
            Some(RoleRef::account(Identifier::new("DP_PRD_END_USER")))
        );
    }

    #[test]
    fn deployment_role_only_outside_dev() {
        let dev = build(Environment::Dev);
        assert!(dev.environment_roles.iter().all(|r| r.kind == RoleKind::Functional));
        let prd = build(Environment::Prd);
        assert!(prd
            .environment_roles
            .iter()
            .any(|r| r.kind == RoleKind::System && r.name.as_str() == "DP_PRD_DEPLOYER"));
    }

    #[test]
    fn output_is_byte_identical_across_calls() {
        let a = serde_json::to_vec(&build(Environment::Dev)).unwrap();
        let b = serde_json::to_vec(&build(Environment::Dev)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn read_role_is_looked_up_by_level() {
        let mut desired = build(Environment::Dev);
        desired.database_roles.reverse();
        assert_eq!(desired.read_role().unwrap().level, AccessLevel::Read);
        desired.database_roles.clear();
        assert!(desired.read_role().is_none());
    }

    #[test]
    fn from_raw_validates_environment() {
        let err = DesiredState::from_raw(&NamingScheme::default(), "QA", "HR", "X").unwrap_err();
        assert_eq!(err.code(), "INVALID_ENVIRONMENT");
    }
}
