//! Name Deriver
//!
//! Maps (kind, environment, domain, capability, resource) inputs to canonical
//! role identifiers. Pure: the same `NamingScheme` and inputs always yield the
//! same identifier, which is what lets the Auditor recompute exactly what the
//! Provisioner created.
//!
//! ## Convention
//!
//! | Kind | Pattern |
//! |------|---------|
//! | Database | `<prefix>_<DATABASE>_<ENVIRONMENT>_<SCHEMA>_<READ\|WRITE>` |
//! | Access | `<prefix>_<ENVIRONMENT>_<DOMAIN>_ACCESS` |
//! | Functional | `<prefix>_<ENVIRONMENT>_<CAPABILITY>` |
//! | ServiceWrapper | `<prefix>_<ENVIRONMENT>_<DOMAIN>_<CAPABILITY>` |
//! | System (deployment) | `<prefix>_<ENVIRONMENT>_<DEPLOYMENT_SUFFIX>` |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RbacError, Result};
use crate::types::{normalize_segment, AccessLevel, CapabilityLevel, Domain, Environment, RoleKind};

pub const DEFAULT_PREFIX: &str = "DP";
pub const DEFAULT_DEPLOYMENT_SUFFIX: &str = "DEPLOYER";

/// A derived role identifier (bare name, unqualified).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Naming configuration injected into every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingScheme {
    pub prefix: String,
    pub deployment_role_suffix: String,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            deployment_role_suffix: DEFAULT_DEPLOYMENT_SUFFIX.to_string(),
        }
    }
}

/// Raw derivation input. Environment and capability are unparsed so that
/// `derive` is the single place that rejects out-of-range values.
#[derive(Debug, Clone, Copy)]
pub enum NameRequest<'a> {
    Database {
        environment: &'a str,
        database: &'a str,
        schema: &'a str,
        level: AccessLevel,
    },
    Access {
        environment: &'a str,
        domain: &'a str,
    },
    Functional {
        environment: &'a str,
        capability: &'a str,
    },
    ServiceWrapper {
        environment: &'a str,
        domain: &'a str,
        capability: &'a str,
    },
    Deployment {
        environment: &'a str,
    },
}

impl NameRequest<'_> {
    pub fn kind(&self) -> RoleKind {
        match self {
            NameRequest::Database { .. } => RoleKind::Database,
            NameRequest::Access { .. } => RoleKind::Access,
            NameRequest::Functional { .. } => RoleKind::Functional,
            NameRequest::ServiceWrapper { .. } => RoleKind::ServiceWrapper,
            NameRequest::Deployment { .. } => RoleKind::System,
        }
    }
}

impl NamingScheme {
    pub fn new(prefix: impl Into<String>, deployment_role_suffix: impl Into<String>) -> Self {
        Self {
            prefix: normalize_segment(&prefix.into()),
            deployment_role_suffix: normalize_segment(&deployment_role_suffix.into()),
        }
    }

    /// Derive an identifier from raw inputs.
    ///
    /// Fails only with `InvalidEnvironment` or `InvalidCapability`; collision
    /// freedom is a property of the convention, not checked here.
    pub fn derive(&self, request: NameRequest<'_>) -> Result<Identifier> {
        match request {
            NameRequest::Database {
                environment,
                database,
                schema,
                level,
            } => Ok(self.database_role(environment.parse()?, database, schema, level)),
            NameRequest::Access {
                environment,
                domain,
            } => Ok(self.access_role_raw(environment.parse()?, domain)),
            NameRequest::Functional {
                environment,
                capability,
            } => {
                let env: Environment = environment.parse()?;
                Ok(self.functional_role(env, capability.parse()?))
            }
            NameRequest::ServiceWrapper {
                environment,
                domain,
                capability,
            } => {
                let env: Environment = environment.parse()?;
                let capability: CapabilityLevel = capability.parse()?;
                Ok(self.join(&[
                    env.as_str(),
                    &normalize_segment(domain),
                    capability.as_str(),
                ]))
            }
            NameRequest::Deployment { environment } => {
                Ok(self.deployment_role(environment.parse()?))
            }
        }
    }

    pub fn database_role(
        &self,
        environment: Environment,
        database: &str,
        schema: &str,
        level: AccessLevel,
    ) -> Identifier {
        self.join(&[
            &normalize_segment(database),
            environment.as_str(),
            &normalize_segment(schema),
            level.as_str(),
        ])
    }

    pub fn access_role(&self, environment: Environment, domain: &Domain) -> Identifier {
        self.access_role_raw(environment, domain.as_str())
    }

    pub fn functional_role(&self, environment: Environment, capability: CapabilityLevel) -> Identifier {
        self.join(&[environment.as_str(), capability.as_str()])
    }

    pub fn service_wrapper_role(
        &self,
        environment: Environment,
        domain: &Domain,
        capability: CapabilityLevel,
    ) -> Identifier {
        self.join(&[environment.as_str(), domain.as_str(), capability.as_str()])
    }

    /// The single deployment-automation role of an environment.
    pub fn deployment_role(&self, environment: Environment) -> Identifier {
        self.join(&[environment.as_str(), &self.deployment_role_suffix])
    }

    /// Role that owns schema objects: the Developer functional role in DEV,
    /// the deployment-automation role everywhere else.
    pub fn object_owner(&self, environment: Environment) -> Identifier {
        if environment.is_dev() {
            self.functional_role(environment, CapabilityLevel::Developer)
        } else {
            self.deployment_role(environment)
        }
    }

    /// Recover the kind of a role name produced by this scheme.
    ///
    /// Returns `None` for names outside the convention (platform system roles,
    /// hand-made roles).
    pub fn classify(&self, name: &str) -> Option<RoleKind> {
        let name = normalize_segment(name);
        let rest = name.strip_prefix(&self.prefix)?.strip_prefix('_')?;

        for environment in Environment::ALL {
            let Some(tail) = rest
                .strip_prefix(environment.as_str())
                .and_then(|t| t.strip_prefix('_'))
            else {
                continue;
            };
            if tail == self.deployment_role_suffix {
                return Some(RoleKind::System);
            }
            if CapabilityLevel::LADDER.iter().any(|c| c.as_str() == tail) {
                return Some(RoleKind::Functional);
            }
            if tail.len() > "_ACCESS".len() && tail.ends_with("_ACCESS") {
                return Some(RoleKind::Access);
            }
            let wraps_capability = CapabilityLevel::LADDER.iter().any(|c| {
                tail.strip_suffix(c.as_str())
                    .is_some_and(|domain| domain.len() > 1 && domain.ends_with('_'))
            });
            if wraps_capability {
                return Some(RoleKind::ServiceWrapper);
            }
        }

        let is_database_role = (rest.ends_with("_READ") || rest.ends_with("_WRITE"))
            && Environment::ALL
                .iter()
                .any(|e| rest.contains(&format!("_{}_", e.as_str())));
        is_database_role.then_some(RoleKind::Database)
    }

    /// Reject a deployment suffix whose role name another kind can also
    /// produce: a functional capability, `..._ACCESS`, `..._<CAPABILITY>`,
    /// or a database role ending in `_READ`/`_WRITE`.
    pub fn validate(&self) -> Result<()> {
        let suffix = self.deployment_role_suffix.as_str();
        let clash = if let Some(capability) = CapabilityLevel::LADDER.iter().find(|c| c.as_str() == suffix) {
            Some(format!("the {} functional role", capability))
        } else if suffix.ends_with("_ACCESS") {
            Some("access roles".to_string())
        } else if let Some(capability) = CapabilityLevel::LADDER
            .iter()
            .find(|c| suffix.ends_with(&format!("_{}", c.as_str())))
        {
            Some(format!("{} service roles", capability))
        } else if suffix.ends_with("_READ") || suffix.ends_with("_WRITE") {
            Some("database roles".to_string())
        } else {
            None
        };
        match clash {
            Some(other) => Err(RbacError::InvalidInput(format!(
                "deployment role suffix '{}' collides with {}",
                suffix, other
            ))),
            None => Ok(()),
        }
    }

    fn access_role_raw(&self, environment: Environment, domain: &str) -> Identifier {
        self.join(&[environment.as_str(), &normalize_segment(domain), "ACCESS"])
    }

    fn join(&self, parts: &[&str]) -> Identifier {
        let mut name = self.prefix.clone();
        for part in parts {
            name.push('_');
            name.push_str(part);
        }
        Identifier(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> NamingScheme {
        NamingScheme::default()
    }

    #[test]
    fn database_role_pattern() {
        let id = scheme()
            .derive(NameRequest::Database {
                environment: "dev",
                database: "hr",
                schema: "employees",
                level: AccessLevel::Read,
            })
            .unwrap();
        assert_eq!(id.as_str(), "DP_HR_DEV_EMPLOYEES_READ");
    }

    #[test]
    fn access_role_pattern() {
        let id = scheme()
            .derive(NameRequest::Access {
                environment: "PRD",
                domain: "finance",
            })
            .unwrap();
        assert_eq!(id.as_str(), "DP_PRD_FINANCE_ACCESS");
    }

    #[test]
    fn functional_role_pattern() {
        let id = scheme()
            .derive(NameRequest::Functional {
                environment: "UAT",
                capability: "data_scientist",
            })
            .unwrap();
        assert_eq!(id.as_str(), "DP_UAT_DATA_SCIENTIST");
    }

    #[test]
    fn service_wrapper_pattern() {
        let id = scheme()
            .derive(NameRequest::ServiceWrapper {
                environment: "TST",
                domain: "hr",
                capability: "ANALYST",
            })
            .unwrap();
        assert_eq!(id.as_str(), "DP_TST_HR_ANALYST");
    }

    #[test]
    fn deployment_role_uses_suffix() {
        let naming = NamingScheme::new("acme", "cicd");
        assert_eq!(
            naming.deployment_role(Environment::Ppe).as_str(),
            "ACME_PPE_CICD"
        );
    }

    #[test]
    fn object_owner_depends_on_environment() {
        let naming = scheme();
        assert_eq!(
            naming.object_owner(Environment::Dev).as_str(),
            "DP_DEV_DEVELOPER"
        );
        assert_eq!(
            naming.object_owner(Environment::Prd).as_str(),
            "DP_PRD_DEPLOYER"
        );
    }

    #[test]
    fn derive_rejects_invalid_environment() {
        let err = scheme()
            .derive(NameRequest::Deployment { environment: "QA" })
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidEnvironment(_)));
    }

    #[test]
    fn derive_rejects_invalid_capability() {
        let err = scheme()
            .derive(NameRequest::Functional {
                environment: "DEV",
                capability: "WIZARD",
            })
            .unwrap_err();
        assert!(matches!(err, RbacError::InvalidCapability(_)));
    }

    #[test]
    fn classify_recovers_kind_from_name() {
        let naming = scheme();
        assert_eq!(naming.classify("DP_DEV_END_USER"), Some(RoleKind::Functional));
        assert_eq!(naming.classify("DP_PRD_DEPLOYER"), Some(RoleKind::System));
        assert_eq!(naming.classify("DP_UAT_HR_ACCESS"), Some(RoleKind::Access));
        assert_eq!(naming.classify("dp_tst_hr_data_scientist"), Some(RoleKind::ServiceWrapper));
        assert_eq!(naming.classify("DP_HR_DEV_EMPLOYEES_READ"), Some(RoleKind::Database));
        assert_eq!(naming.classify("ACCOUNTADMIN"), None);
        assert_eq!(naming.classify("DP_QA_ANALYST"), None);
    }

    #[test]
    fn classify_agrees_with_derivation() {
        let naming = scheme();
        let hr = Domain::new("hr").unwrap();
        for env in Environment::ALL {
            for capability in CapabilityLevel::LADDER {
                let functional = naming.functional_role(env, capability);
                assert_eq!(naming.classify(functional.as_str()), Some(RoleKind::Functional));
                let wrapper = naming.service_wrapper_role(env, &hr, capability);
                assert_eq!(naming.classify(wrapper.as_str()), Some(RoleKind::ServiceWrapper));
            }
            let access = naming.access_role(env, &hr);
            assert_eq!(naming.classify(access.as_str()), Some(RoleKind::Access));
            let db = naming.database_role(env, "HR", "EMPLOYEES", AccessLevel::Write);
            assert_eq!(naming.classify(db.as_str()), Some(RoleKind::Database));
        }
    }

    #[test]
    fn request_kind_mapping() {
        assert_eq!(
            NameRequest::Deployment { environment: "DEV" }.kind(),
            RoleKind::System
        );
        assert_eq!(
            NameRequest::Access {
                environment: "DEV",
                domain: "HR"
            }
            .kind(),
            RoleKind::Access
        );
    }

    #[test]
    fn deployment_suffix_must_not_shadow_other_kinds() {
        assert!(scheme().validate().is_ok());
        assert!(NamingScheme::new("DP", "CICD").validate().is_ok());
        for suffix in ["DEVELOPER", "dbadmin", "X_ACCESS", "HR_ANALYST", "CI_END_USER", "OPS_READ"] {
            let naming = NamingScheme::new("DP", suffix);
            let err = naming.validate().unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT", "{suffix}");
        }

        let clashing = NamingScheme::new("DP", "DEVELOPER");
        assert_eq!(
            clashing.object_owner(Environment::Prd),
            clashing.functional_role(Environment::Prd, CapabilityLevel::Developer)
        );
        assert!(clashing.validate().is_err());
    }
}
