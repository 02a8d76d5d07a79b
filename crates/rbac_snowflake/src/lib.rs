//! RBAC Snowflake - platform adapter for `rbac_core`
//!
//! Renders the core's typed [`Operation`](rbac_core::Operation)s to SQL and
//! implements [`PlatformCatalog`](rbac_core::PlatformCatalog) over the
//! Snowflake SQL REST API.
//!
//! ## Layers
//!
//! ```text
//! SnowflakePlatform ── render ──► SQL text
//!        │
//!        └── StatementRunner ──► SqlApiClient ──► POST /api/v2/statements
//! ```
//!
//! `StatementRunner` is the seam tests use to replay canned result sets.

pub mod catalog;
pub mod client;
pub mod render;

use anyhow::Result;

pub use catalog::SnowflakePlatform;
pub use client::{ResultSet, Row, SnowflakeConfig, SqlApiClient, StatementRunner};
pub use render::render;

/// Build a platform that talks to the SQL API.
pub fn connect(config: SnowflakeConfig) -> Result<SnowflakePlatform> {
    Ok(SnowflakePlatform::new(SqlApiClient::new(config)?))
}
