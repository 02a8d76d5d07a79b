//! Role management: environment bootstrap, access roles, service-wrapper
//! roles and principal assignment.
//!
//! Every dependency (constituent roles, principals) is checked before the
//! first operation runs, so a rejected request never leaves partial state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::desired_state::environment_roles;
use crate::error::{ErrorPayload, RbacError, Result};
use crate::executor::{ExecutionControl, Executor, OperationRecord};
use crate::naming::{Identifier, NamingScheme};
use crate::operation::{Operation, RoleRef};
use crate::plan;
use crate::ports::PlatformCatalog;
use crate::types::{AccessLevel, CapabilityLevel, Domain, Environment, PrincipalKind, RoleKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleOperationStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOperationReport {
    pub status: RoleOperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub operations: Vec<OperationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl RoleOperationReport {
    pub fn is_success(&self) -> bool {
        self.status == RoleOperationStatus::Success
    }
}

/// A validated request: the role it concerns and the operations to run.
struct Prepared {
    role: Option<Identifier>,
    operations: Vec<Operation>,
}

pub struct RoleManager {
    platform: Arc<dyn PlatformCatalog>,
    naming: NamingScheme,
    control: ExecutionControl,
}

impl RoleManager {
    pub fn new(platform: Arc<dyn PlatformCatalog>, naming: NamingScheme) -> Self {
        Self {
            platform,
            naming,
            control: ExecutionControl::default(),
        }
    }

    pub fn with_control(mut self, control: ExecutionControl) -> Self {
        self.control = control;
        self
    }

    /// Create the functional ladder and, outside DEV, the deployment role.
    pub async fn bootstrap_environment(&self, environment: &str) -> RoleOperationReport {
        let prepared = environment.parse::<Environment>().map(|env| Prepared {
            role: None,
            operations: environment_roles(&self.naming, env)
                .iter()
                .map(|role| plan::environment_role_op(role, env.as_str()))
                .collect(),
        });
        self.finish("bootstrap_environment", prepared).await
    }

    pub async fn create_access_role(&self, environment: &str, domain: &str, comment: Option<&str>) -> RoleOperationReport {
        let prepared = (|| -> Result<Prepared> {
            let env: Environment = environment.parse()?;
            let domain = Domain::new(domain)?;
            let role = self.naming.access_role(env, &domain);
            let comment = comment
                .map(str::to_string)
                .unwrap_or_else(|| format!("Access to {} data in {}", domain, env));
            Ok(Prepared {
                operations: vec![Operation::CreateAccountRole {
                    role: role.clone(),
                    comment: Some(comment),
                }],
                role: Some(role),
            })
        })();
        self.finish("create_access_role", prepared).await
    }

    /// Grant a schema's database role to a domain access role.
    pub async fn link_access_role(
        &self,
        environment: &str,
        domain: &str,
        database: &str,
        schema: &str,
        level: &str,
    ) -> RoleOperationReport {
        let prepared = self.prepare_link(environment, domain, database, schema, level).await;
        self.finish("link_access_role", prepared).await
    }

    async fn prepare_link(
        &self,
        environment: &str,
        domain: &str,
        database: &str,
        schema: &str,
        level: &str,
    ) -> Result<Prepared> {
        let env: Environment = environment.parse()?;
        let level: AccessLevel = level.parse()?;
        if level == AccessLevel::Write && !env.is_dev() {
            return Err(RbacError::InvalidInput(format!("WRITE database roles exist only in DEV, not {}", env)));
        }
        let domain = Domain::new(domain)?;
        let database = crate::types::normalize_segment(database);

        let access = RoleRef::account(self.naming.access_role(env, &domain));
        let database_role = RoleRef::database(
            database.clone(),
            self.naming.database_role(env, &database, schema, level),
        );
        let executor = self.executor();
        for role in [&access, &database_role] {
            if !executor.query("role exists", role.exists(self.platform.as_ref())).await? {
                return Err(RbacError::RoleNotFound(role.to_string()));
            }
        }

        Ok(Prepared {
            role: Some(access.name().clone()),
            operations: vec![plan::role_grant_op(database_role, access)],
        })
    }

    /// Create a service-wrapper role holding one functional role and one or
    /// more access roles.
    pub async fn create_service_role(
        &self,
        environment: &str,
        domain: &str,
        capability: &str,
        access_domains: &[&str],
    ) -> RoleOperationReport {
        let prepared = self.prepare_service_role(environment, domain, capability, access_domains).await;
        self.finish("create_service_role", prepared).await
    }

    async fn prepare_service_role(
        &self,
        environment: &str,
        domain: &str,
        capability: &str,
        access_domains: &[&str],
    ) -> Result<Prepared> {
        let env: Environment = environment.parse()?;
        let capability: CapabilityLevel = capability.parse()?;
        let domain = Domain::new(domain)?;
        if access_domains.is_empty() {
            return Err(RbacError::InvalidInput(
                "a service role needs at least one access role".into(),
            ));
        }

        let functional = RoleRef::account(self.naming.functional_role(env, capability));
        let mut constituents = vec![functional];
        for access_domain in access_domains {
            let access_domain = Domain::new(access_domain)?;
            let access = RoleRef::account(self.naming.access_role(env, &access_domain));
            if !constituents.contains(&access) {
                constituents.push(access);
            }
        }

        let executor = self.executor();
        for role in &constituents {
            if !executor.query("role exists", role.exists(self.platform.as_ref())).await? {
                return Err(RbacError::RoleNotFound(role.to_string()));
            }
        }

        let wrapper = self.naming.service_wrapper_role(env, &domain, capability);
        let mut operations = vec![Operation::CreateAccountRole {
            role: wrapper.clone(),
            comment: Some(format!("Service role: {} {} in {}", domain, capability, env)),
        }];
        operations.extend(
            constituents
                .into_iter()
                .map(|role| plan::role_grant_op(role, RoleRef::account(wrapper.clone()))),
        );
        Ok(Prepared {
            role: Some(wrapper),
            operations,
        })
    }

    /// Grant a managed role to a user, enforcing which principal kind may
    /// hold which role kind.
    pub async fn assign_role(&self, user: &str, role: &str) -> RoleOperationReport {
        let prepared = self.prepare_assignment(user, role).await;
        self.finish("assign_role", prepared).await
    }

    async fn prepare_assignment(&self, user: &str, role: &str) -> Result<Prepared> {
        let role = Identifier::new(crate::types::normalize_segment(role));
        let kind = self
            .naming
            .classify(role.as_str())
            .ok_or_else(|| RbacError::InvalidInput(format!("{} is not a managed role name", role)))?;

        let Some(expected) = kind.holder() else {
            return Err(RbacError::PrincipalKindMismatch {
                principal: user.to_string(),
                role: role.to_string(),
                expected: "role (database roles are never held by principals)".into(),
            });
        };

        let executor = self.executor();
        let actual = executor
            .query("principal kind", self.platform.principal_kind(user))
            .await?
            .ok_or_else(|| RbacError::PrincipalNotFound(user.to_string()))?;
        if actual != expected {
            return Err(mismatch(user, &role, kind, expected));
        }
        if !executor.query("role exists", self.platform.account_role_exists(&role)).await? {
            return Err(RbacError::RoleNotFound(role.to_string()));
        }

        Ok(Prepared {
            operations: vec![Operation::GrantRoleToUser {
                role: role.clone(),
                user: user.to_string(),
            }],
            role: Some(role),
        })
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(self.platform.as_ref(), &self.control)
    }

    async fn finish(&self, action: &str, prepared: Result<Prepared>) -> RoleOperationReport {
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(action, error = %err, "role operation rejected");
                return RoleOperationReport {
                    status: RoleOperationStatus::Error,
                    role: None,
                    operations: Vec::new(),
                    error: Some(err.payload()),
                };
            }
        };

        let mut records = Vec::new();
        let outcome = self.executor().run_all(&prepared.operations, &mut records).await;
        let role = prepared.role.map(Identifier::into_string);
        match outcome {
            Ok(()) => {
                info!(action, role = role.as_deref().unwrap_or("-"), operations = records.len(), "role operation complete");
                RoleOperationReport {
                    status: RoleOperationStatus::Success,
                    role,
                    operations: records,
                    error: None,
                }
            }
            Err(err) => {
                warn!(action, error = %err, "role operation failed");
                RoleOperationReport {
                    status: RoleOperationStatus::Error,
                    role,
                    operations: records,
                    error: Some(err.payload()),
                }
            }
        }
    }
}

fn mismatch(user: &str, role: &Identifier, kind: RoleKind, expected: PrincipalKind) -> RbacError {
    RbacError::PrincipalKindMismatch {
        principal: user.to_string(),
        role: format!("{} ({})", role, kind),
        expected: expected.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPlatform;

    fn manager(platform: Arc<InMemoryPlatform>) -> RoleManager {
        RoleManager::new(platform, NamingScheme::default())
    }

    #[tokio::test]
    async fn bootstrap_creates_ladder_and_deployer() {
        let platform = Arc::new(InMemoryPlatform::new());
        let report = manager(platform.clone()).bootstrap_environment("PRD").await;
        assert!(report.is_success());
        assert_eq!(report.operations.len(), CapabilityLevel::LADDER.len() + 1);
        assert!(platform.account_role_exists(&"DP_PRD_DEPLOYER".into()).await.unwrap());
    }

    #[tokio::test]
    async fn access_role_name_follows_convention() {
        let platform = Arc::new(InMemoryPlatform::new());
        let report = manager(platform).create_access_role("dev", "finance", None).await;
        assert_eq!(report.role.as_deref(), Some("DP_DEV_FINANCE_ACCESS"));
    }

    #[tokio::test]
    async fn write_link_outside_dev_is_rejected() {
        let platform = Arc::new(InMemoryPlatform::new());
        let report = manager(platform)
            .link_access_role("PRD", "HR", "HR", "EMPLOYEES", "WRITE")
            .await;
        assert_eq!(report.error.unwrap().code, "INVALID_INPUT");
    }

    #[tokio::test]
    async fn service_role_needs_access_roles() {
        let platform = Arc::new(InMemoryPlatform::new());
        let report = manager(platform)
            .create_service_role("DEV", "HR", "ANALYST", &[])
            .await;
        assert_eq!(report.error.unwrap().code, "INVALID_INPUT");
    }

    #[tokio::test]
    async fn database_roles_are_never_assigned_to_users() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.add_user("alice", PrincipalKind::Human);
        let report = manager(platform)
            .assign_role("alice", "DP_HR_DEV_EMPLOYEES_READ")
            .await;
        assert_eq!(report.error.unwrap().code, "PRINCIPAL_KIND_MISMATCH");
    }

    #[tokio::test]
    async fn unmanaged_role_name_is_invalid_input() {
        let platform = Arc::new(InMemoryPlatform::new());
        let report = manager(platform).assign_role("alice", "ACCOUNTADMIN").await;
        assert_eq!(report.error.unwrap().code, "INVALID_INPUT");
    }
}
