//! Port traits: the boundary between the engine and a live platform.
//!
//! The engine reads and writes the platform's role/grant catalog only through
//! [`PlatformCatalog`]. Adapters (Snowflake SQL API, in-memory) implement it;
//! the engine never sees statement text or driver types.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::Identifier;
use crate::operation::{Operation, RoleRef};
use crate::types::{ObjectClass, Privilege, PrincipalKind};

#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform refused the statement (compilation error, missing object,
    /// insufficient privileges). The message is the platform's own.
    #[error("{message}")]
    Rejected { code: Option<String>, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PlatformError {
    pub fn rejected(message: impl Into<String>) -> Self {
        PlatformError::Rejected {
            code: None,
            message: message.into(),
        }
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// What executing one operation did to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpOutcome {
    Created,
    AlreadyExists,
    Applied,
    Unchanged,
}

impl OpOutcome {
    /// True when the platform state is unchanged by the operation.
    pub fn is_noop(&self) -> bool {
        matches!(self, OpOutcome::AlreadyExists | OpOutcome::Unchanged)
    }
}

// ============================================================================
// CATALOG ROWS
// ============================================================================

/// Finite, restartable snapshot of catalog query results.
///
/// Rows are sorted on construction so iteration order is deterministic for a
/// fixed catalog snapshot. Cloning is cheap and every `iter()` starts over.
#[derive(Debug, Clone)]
pub struct CatalogRows<T> {
    rows: Arc<[T]>,
}

impl<T: Ord> CatalogRows<T> {
    pub fn new(mut rows: Vec<T>) -> Self {
        rows.sort();
        Self { rows: rows.into() }
    }
}

impl<T> CatalogRows<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> Default for CatalogRows<T> {
    fn default() -> Self {
        Self {
            rows: Arc::from(Vec::new()),
        }
    }
}

impl<'a, T> IntoIterator for &'a CatalogRows<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// ============================================================================
// CATALOG ROW TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub database: String,
    pub name: String,
    pub managed_access: bool,
}

/// A schema-level object and its current owner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatalogObject {
    pub class: ObjectClass,
    pub name: String,
    pub owner: Option<String>,
}

/// A future-grant rule registered on a schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FutureGrant {
    pub class: ObjectClass,
    pub privilege: Privilege,
    pub grantee: RoleRef,
}

/// A privilege a role holds on existing objects of one class in a schema.
/// One row per (class, privilege), however many objects carry it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrentGrant {
    pub class: ObjectClass,
    pub privilege: Privilege,
    pub grantee: RoleRef,
}

impl CurrentGrant {
    /// The future-grant rule that keeps new objects in line with this grant.
    pub fn future_counterpart(&self) -> FutureGrant {
        FutureGrant {
            class: self.class,
            privilege: self.privilege,
            grantee: self.grantee.clone(),
        }
    }
}

// ============================================================================
// PORT TRAIT
// ============================================================================

#[async_trait]
pub trait PlatformCatalog: Send + Sync {
    /// Execute one privilege-management operation.
    async fn execute(&self, operation: &Operation) -> PlatformResult<OpOutcome>;

    async fn database_exists(&self, database: &str) -> PlatformResult<bool>;

    async fn describe_schema(&self, database: &str, schema: &str) -> PlatformResult<Option<SchemaInfo>>;

    async fn list_schemas(&self, database: &str) -> PlatformResult<CatalogRows<SchemaInfo>>;

    async fn account_role_exists(&self, role: &Identifier) -> PlatformResult<bool>;

    async fn database_role_exists(&self, database: &str, role: &Identifier) -> PlatformResult<bool>;

    async fn list_objects(&self, database: &str, schema: &str) -> PlatformResult<CatalogRows<CatalogObject>>;

    async fn list_future_grants(&self, database: &str, schema: &str) -> PlatformResult<CatalogRows<FutureGrant>>;

    /// Privileges `grantee` holds on objects currently in the schema.
    /// Ownership is not a grant and is never listed.
    async fn list_current_grants(
        &self,
        database: &str,
        schema: &str,
        grantee: &RoleRef,
    ) -> PlatformResult<CatalogRows<CurrentGrant>>;

    /// Roles granted directly to `grantee` (one level, not transitive).
    async fn role_grants_to(&self, grantee: &RoleRef) -> PlatformResult<CatalogRows<RoleRef>>;

    /// Kind of a user principal, or `None` when the user does not exist.
    async fn principal_kind(&self, user: &str) -> PlatformResult<Option<PrincipalKind>>;

    fn backend_name(&self) -> &'static str;
}

impl RoleRef {
    /// True when this role reference exists in the catalog.
    pub async fn exists(&self, platform: &dyn PlatformCatalog) -> PlatformResult<bool> {
        match self {
            RoleRef::Account { name } => platform.account_role_exists(name).await,
            RoleRef::Database { database, name } => platform.database_role_exists(database, name).await,
        }
    }
}
