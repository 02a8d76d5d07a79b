//! Pure planning: desired state → ordered operations per provisioning step.
//!
//! The Provisioner executes these plans step by step; the Rectifier reuses
//! the same functions scoped to a single role, object or rule.

use crate::desired_state::{DatabaseRoleSpec, DesiredState, EnvironmentRole, GrantEdge};
use crate::operation::{Operation, RoleRef};
use crate::ports::CatalogObject;
use crate::types::RoleKind;

/// Step 1: the database container.
pub fn database_ops(desired: &DesiredState, comment: Option<&str>) -> Vec<Operation> {
    vec![Operation::CreateDatabase {
        database: desired.container.database.clone(),
        comment: comment.map(str::to_string),
    }]
}

/// Step 2: the schema, always with managed access.
pub fn schema_ops(desired: &DesiredState, comment: Option<&str>) -> Vec<Operation> {
    vec![Operation::CreateSchema {
        database: desired.container.database.clone(),
        schema: desired.container.schema.clone(),
        managed_access: desired.container.managed_access,
        comment: comment.map(str::to_string),
    }]
}

/// Step 3 (environment part): functional ladder and deployment role.
pub fn environment_role_ops(desired: &DesiredState) -> Vec<Operation> {
    desired
        .environment_roles
        .iter()
        .map(|role| environment_role_op(role, desired.container.environment.as_str()))
        .collect()
}

pub fn environment_role_op(role: &EnvironmentRole, environment: &str) -> Operation {
    let comment = match (role.kind, role.capability) {
        (RoleKind::Functional, Some(capability)) => {
            format!("Functional role {} for {}", capability, environment)
        }
        _ => format!("Deployment automation role for {}", environment),
    };
    Operation::CreateAccountRole {
        role: role.name.clone(),
        comment: Some(comment),
    }
}

/// Step 3 (database part): create one database role.
pub fn database_role_create_ops(desired: &DesiredState, spec: &DatabaseRoleSpec) -> Vec<Operation> {
    vec![Operation::CreateDatabaseRole {
        database: desired.container.database.clone(),
        role: spec.name().clone(),
        comment: Some(format!(
            "{} access to {} ({})",
            spec.level,
            desired.container.qualified_name(),
            desired.container.environment
        )),
    }]
}

/// Step 4: every current and future grant the role should hold.
pub fn grant_ops(spec: &DatabaseRoleSpec) -> Vec<Operation> {
    spec.grants.iter().filter_map(grant_op).collect()
}

/// Step 4 (hierarchy part): roll the database role up into its functional role.
pub fn hierarchy_ops(spec: &DatabaseRoleSpec) -> Vec<Operation> {
    spec.granted_to
        .iter()
        .map(|parent| Operation::GrantRole {
            role: spec.role.clone(),
            to: parent.clone(),
        })
        .collect()
}

/// Step 5: re-own all existing objects, keeping the grants they carry.
pub fn ownership_ops(desired: &DesiredState) -> Vec<Operation> {
    desired
        .ownership_classes
        .iter()
        .map(|class| Operation::TransferOwnership {
            on: desired.container.all_in_schema(*class),
            to: desired.ownership_target.clone(),
            copy_current_grants: true,
        })
        .collect()
}

/// Step 5 scoped to specific objects.
pub fn object_ownership_ops(desired: &DesiredState, objects: &[CatalogObject]) -> Vec<Operation> {
    objects
        .iter()
        .map(|object| Operation::TransferOwnership {
            on: desired.container.object(object.class, &object.name),
            to: desired.ownership_target.clone(),
            copy_current_grants: true,
        })
        .collect()
}

/// Step 6: objects created later are owned by the object owner.
pub fn future_ownership_ops(desired: &DesiredState) -> Vec<Operation> {
    desired
        .ownership_classes
        .iter()
        .map(|class| Operation::TransferOwnership {
            on: desired.container.future_in_schema(*class),
            to: desired.future_ownership_target.clone(),
            copy_current_grants: false,
        })
        .collect()
}

/// Step 7: object-creation privileges for the object owner.
pub fn creation_ops(desired: &DesiredState) -> Vec<Operation> {
    desired.creation_grants.iter().filter_map(grant_op).collect()
}

/// Grant a role to another role; used by role management.
pub fn role_grant_op(role: RoleRef, to: RoleRef) -> Operation {
    Operation::GrantRole { role, to }
}

fn grant_op(edge: &GrantEdge) -> Option<Operation> {
    if edge.privileges.is_empty() {
        return None;
    }
    Some(Operation::GrantPrivileges {
        privileges: edge.privileges.clone(),
        on: edge.target.clone(),
        to: edge.grantee.clone(),
    })
}
