//! RBAC Reconciler
//!
//! Operator-facing layer over `rbac_core`: configuration, tracing, backend
//! wiring and the inventory monitor. The `rbac_cli` binary (feature `cli`)
//! is built on these.
//!
//! ```text
//! ReconcilerConfig ──► Engine { Provisioner, Auditor, Rectifier, RoleManager }
//!                         │
//!                         └── Arc<dyn PlatformCatalog>  (snowflake | memory)
//! ```

pub mod config;
pub mod engine;
pub mod monitor;
pub mod telemetry;

pub use config::{BackendKind, InventoryTarget, ReconcilerConfig, SnowflakeSettings};
pub use engine::{build_platform, Engine};
pub use monitor::{run_inventory, MonitorSummary, TargetReport};
