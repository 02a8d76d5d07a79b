//! Typed privilege-management operations.
//!
//! The engine plans and executes `Operation` values only. Turning them into
//! platform statement text happens in the adapter crate, at the execution
//! boundary, so planning stays testable without a connection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::naming::Identifier;
use crate::types::{ObjectClass, Privilege};

/// A role that can receive grants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleRef {
    Account { name: Identifier },
    Database { database: String, name: Identifier },
}

impl RoleRef {
    pub fn account(name: Identifier) -> Self {
        RoleRef::Account { name }
    }

    pub fn database(database: impl Into<String>, name: Identifier) -> Self {
        RoleRef::Database {
            database: database.into(),
            name,
        }
    }

    pub fn name(&self) -> &Identifier {
        match self {
            RoleRef::Account { name } | RoleRef::Database { name, .. } => name,
        }
    }
}

impl fmt::Display for RoleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleRef::Account { name } => write!(f, "{}", name),
            RoleRef::Database { database, name } => write!(f, "{}.{}", database, name),
        }
    }
}

/// Something privileges or ownership can be granted on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Securable {
    Database {
        database: String,
    },
    Schema {
        database: String,
        schema: String,
    },
    AllInSchema {
        class: ObjectClass,
        database: String,
        schema: String,
    },
    FutureInSchema {
        class: ObjectClass,
        database: String,
        schema: String,
    },
    Object {
        class: ObjectClass,
        database: String,
        schema: String,
        name: String,
    },
}

impl fmt::Display for Securable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Securable::Database { database } => write!(f, "database {}", database),
            Securable::Schema { database, schema } => write!(f, "schema {}.{}", database, schema),
            Securable::AllInSchema {
                class,
                database,
                schema,
            } => write!(f, "all {} in {}.{}", class.plural_keyword(), database, schema),
            Securable::FutureInSchema {
                class,
                database,
                schema,
            } => write!(
                f,
                "future {} in {}.{}",
                class.plural_keyword(),
                database,
                schema
            ),
            Securable::Object {
                class,
                database,
                schema,
                name,
            } => write!(f, "{} {}.{}.{}", class, database, schema, name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateDatabase {
        database: String,
        comment: Option<String>,
    },
    CreateSchema {
        database: String,
        schema: String,
        managed_access: bool,
        comment: Option<String>,
    },
    CreateAccountRole {
        role: Identifier,
        comment: Option<String>,
    },
    CreateDatabaseRole {
        database: String,
        role: Identifier,
        comment: Option<String>,
    },
    GrantPrivileges {
        privileges: Vec<Privilege>,
        on: Securable,
        to: RoleRef,
    },
    GrantRole {
        role: RoleRef,
        to: RoleRef,
    },
    GrantRoleToUser {
        role: Identifier,
        user: String,
    },
    TransferOwnership {
        on: Securable,
        to: RoleRef,
        copy_current_grants: bool,
    },
}

impl Operation {
    /// Short operation name used in logs and error payloads.
    pub fn label(&self) -> &'static str {
        match self {
            Operation::CreateDatabase { .. } => "CreateDatabase",
            Operation::CreateSchema { .. } => "CreateSchema",
            Operation::CreateAccountRole { .. } => "CreateAccountRole",
            Operation::CreateDatabaseRole { .. } => "CreateDatabaseRole",
            Operation::GrantPrivileges { .. } => "GrantPrivileges",
            Operation::GrantRole { .. } => "GrantRole",
            Operation::GrantRoleToUser { .. } => "GrantRoleToUser",
            Operation::TransferOwnership { .. } => "TransferOwnership",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateDatabase { database, .. } => write!(f, "create database {}", database),
            Operation::CreateSchema {
                database,
                schema,
                managed_access,
                ..
            } => write!(
                f,
                "create schema {}.{}{}",
                database,
                schema,
                if *managed_access { " (managed access)" } else { "" }
            ),
            Operation::CreateAccountRole { role, .. } => write!(f, "create role {}", role),
            Operation::CreateDatabaseRole { database, role, .. } => {
                write!(f, "create database role {}.{}", database, role)
            }
            Operation::GrantPrivileges { privileges, on, to } => {
                let list: Vec<String> = privileges.iter().map(|p| p.to_string()).collect();
                write!(f, "grant {} on {} to {}", list.join(", "), on, to)
            }
            Operation::GrantRole { role, to } => write!(f, "grant role {} to {}", role, to),
            Operation::GrantRoleToUser { role, user } => {
                write!(f, "grant role {} to user {}", role, user)
            }
            Operation::TransferOwnership {
                on,
                to,
                copy_current_grants,
            } => write!(
                f,
                "transfer ownership of {} to {}{}",
                on,
                to,
                if *copy_current_grants {
                    " (copy current grants)"
                } else {
                    ""
                }
            ),
        }
    }
}
