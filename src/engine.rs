//! Backend wiring: one platform shared by every engine component.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use rbac_core::memory::InMemoryPlatform;
use rbac_core::{Auditor, PlatformCatalog, Provisioner, Rectifier, RoleManager};

use crate::config::{BackendKind, ReconcilerConfig};

pub fn build_platform(config: &ReconcilerConfig) -> Result<Arc<dyn PlatformCatalog>> {
    let platform: Arc<dyn PlatformCatalog> = match config.backend {
        BackendKind::Memory => Arc::new(InMemoryPlatform::new()),
        BackendKind::Snowflake => {
            let client = config
                .snowflake
                .client_config()
                .context("Snowflake backend selected but not configured")?;
            Arc::new(rbac_snowflake::connect(client)?)
        }
    };
    info!("Using {} backend", platform.backend_name());
    Ok(platform)
}

pub struct Engine {
    pub platform: Arc<dyn PlatformCatalog>,
    pub provisioner: Provisioner,
    pub auditor: Auditor,
    pub rectifier: Rectifier,
    pub roles: RoleManager,
}

impl Engine {
    pub fn new(config: &ReconcilerConfig) -> Result<Self> {
        Ok(Self::with_platform(config, build_platform(config)?))
    }

    /// Wire components over an existing platform.
    pub fn with_platform(config: &ReconcilerConfig, platform: Arc<dyn PlatformCatalog>) -> Self {
        let naming = config.naming.clone();
        let control = config.execution_control();
        Self {
            provisioner: Provisioner::new(platform.clone(), naming.clone()).with_control(control.clone()),
            auditor: Auditor::new(platform.clone(), naming.clone())
                .with_control(control.clone())
                .with_options(config.audit_options()),
            rectifier: Rectifier::new(platform.clone(), naming.clone()).with_control(control.clone()),
            roles: RoleManager::new(platform.clone(), naming).with_control(control),
            platform,
        }
    }
}
