//! RBAC Core - provisioning and compliance reconciliation engine
//!
//! Pure domain logic for a layered role hierarchy across the DEV, TST, UAT,
//! PPE and PRD environments. The crate never speaks SQL or HTTP: it plans
//! typed [`Operation`]s and reads the platform through the
//! [`PlatformCatalog`] port. Adapter crates render and execute.
//!
//! ## Flow
//!
//! ```text
//! NamingScheme ──► build_desired_state ──┬──► Provisioner ──► PlatformCatalog::execute
//!                                        └──► Auditor ──► ComplianceReport ──► Rectifier
//! ```
//!
//! Provisioner and Auditor derive "what should exist" from the same builder,
//! so an audit directly after provisioning is compliant.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rbac_core::{memory::InMemoryPlatform, Auditor, NamingScheme, Provisioner};
//!
//! # async fn demo() {
//! let platform = Arc::new(InMemoryPlatform::new());
//! let provisioner = Provisioner::new(platform.clone(), NamingScheme::default());
//! let report = provisioner.provision("DEV", "HR", "EMPLOYEES", Some("Employee data")).await;
//! assert!(report.is_success());
//!
//! let auditor = Auditor::new(platform, NamingScheme::default());
//! let audit = auditor.audit("DEV", "HR", Some("EMPLOYEES")).await;
//! assert!(audit.is_compliant());
//! # }
//! ```

pub mod error;
pub mod types;

// Naming and desired state (pure)
pub mod desired_state;
pub mod naming;
pub mod operation;
pub mod plan;

// Platform boundary
pub mod executor;
pub mod memory;
pub mod ports;

// Engine components
pub mod auditor;
pub mod provisioner;
pub mod rectifier;
pub mod roles;

pub use auditor::{
    AuditOptions, AuditStatus, Auditor, CheckId, ComplianceFinding, ComplianceReport, FindingStatus, FindingSubject,
    SchemaAudit,
};
pub use desired_state::{build_desired_state, DatabaseRoleSpec, DesiredState, GrantEdge, ResourceContainer};
pub use error::{ErrorPayload, RbacError, Result};
pub use executor::{CancellationFlag, ExecutionControl, OperationRecord};
pub use naming::{Identifier, NameRequest, NamingScheme};
pub use operation::{Operation, RoleRef, Securable};
pub use ports::{CatalogObject, CatalogRows, CurrentGrant, FutureGrant, OpOutcome, PlatformCatalog, PlatformError, SchemaInfo};
pub use provisioner::{ProvisionReport, ProvisionResponse, ProvisionStatus, ProvisionStep, Provisioner, StepStatus};
pub use rectifier::{RectificationResult, Rectifier};
pub use roles::{RoleManager, RoleOperationReport};
pub use types::{AccessLevel, CapabilityLevel, Domain, Environment, ObjectClass, PrincipalKind, Privilege, RoleKind};
