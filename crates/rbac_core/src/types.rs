//! Core vocabulary: environments, capability tiers, domains, role kinds,
//! object classes and privileges.
//!
//! Every enumeration here is closed. Parsing is case-insensitive and the
//! canonical rendering is the upper-case form used in identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RbacError;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Lifecycle environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    Dev,
    Tst,
    Uat,
    Ppe,
    Prd,
}

impl Environment {
    pub const ALL: [Environment; 5] = [
        Environment::Dev,
        Environment::Tst,
        Environment::Uat,
        Environment::Ppe,
        Environment::Prd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV",
            Environment::Tst => "TST",
            Environment::Uat => "UAT",
            Environment::Ppe => "PPE",
            Environment::Prd => "PRD",
        }
    }

    /// DEV is the only environment with interactive write access and
    /// direct object-creation rights for a human-facing role.
    pub fn is_dev(&self) -> bool {
        matches!(self, Environment::Dev)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEV" => Ok(Environment::Dev),
            "TST" => Ok(Environment::Tst),
            "UAT" => Ok(Environment::Uat),
            "PPE" => Ok(Environment::Ppe),
            "PRD" => Ok(Environment::Prd),
            _ => Err(RbacError::InvalidEnvironment(s.to_string())),
        }
    }
}

// ============================================================================
// CAPABILITY LEVEL
// ============================================================================

/// Capability tier. Ordered for naming and listing only; a higher tier never
/// implies the privileges of a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapabilityLevel {
    EndUser,
    Analyst,
    Developer,
    TeamLeader,
    DataScientist,
    #[serde(rename = "DBADMIN")]
    DbAdmin,
}

impl CapabilityLevel {
    /// The functional role ladder, in tier order.
    pub const LADDER: [CapabilityLevel; 6] = [
        CapabilityLevel::EndUser,
        CapabilityLevel::Analyst,
        CapabilityLevel::Developer,
        CapabilityLevel::TeamLeader,
        CapabilityLevel::DataScientist,
        CapabilityLevel::DbAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityLevel::EndUser => "END_USER",
            CapabilityLevel::Analyst => "ANALYST",
            CapabilityLevel::Developer => "DEVELOPER",
            CapabilityLevel::TeamLeader => "TEAM_LEADER",
            CapabilityLevel::DataScientist => "DATA_SCIENTIST",
            CapabilityLevel::DbAdmin => "DBADMIN",
        }
    }
}

impl fmt::Display for CapabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityLevel {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "END_USER" | "ENDUSER" => Ok(CapabilityLevel::EndUser),
            "ANALYST" => Ok(CapabilityLevel::Analyst),
            "DEVELOPER" => Ok(CapabilityLevel::Developer),
            "TEAM_LEADER" | "TEAMLEADER" => Ok(CapabilityLevel::TeamLeader),
            "DATA_SCIENTIST" | "DATASCIENTIST" => Ok(CapabilityLevel::DataScientist),
            "DBADMIN" | "DB_ADMIN" => Ok(CapabilityLevel::DbAdmin),
            _ => Err(RbacError::InvalidCapability(s.to_string())),
        }
    }
}

// ============================================================================
// DOMAIN
// ============================================================================

/// Business namespace, upper-cased for identifier construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    pub fn new(raw: &str) -> Result<Self, RbacError> {
        let normalized = normalize_segment(raw);
        if normalized.is_empty() {
            return Err(RbacError::InvalidInput("domain cannot be empty".into()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim and upper-case a free-text identifier segment.
pub fn normalize_segment(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ============================================================================
// ROLE KIND / ACCESS LEVEL / PRINCIPAL KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    System,
    Functional,
    Access,
    Database,
    ServiceWrapper,
}

impl RoleKind {
    /// Principal kind allowed to hold a role of this kind. `None` means the
    /// role is never granted directly to a principal.
    pub fn holder(&self) -> Option<PrincipalKind> {
        match self {
            RoleKind::Functional | RoleKind::Access => Some(PrincipalKind::Human),
            RoleKind::ServiceWrapper | RoleKind::System => Some(PrincipalKind::Service),
            RoleKind::Database => None,
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleKind::System => "system",
            RoleKind::Functional => "functional",
            RoleKind::Access => "access",
            RoleKind::Database => "database",
            RoleKind::ServiceWrapper => "service_wrapper",
        };
        f.write_str(name)
    }
}

/// Database role flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "READ",
            AccessLevel::Write => "WRITE",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "READ" => Ok(AccessLevel::Read),
            "WRITE" => Ok(AccessLevel::Write),
            other => Err(RbacError::InvalidInput(format!(
                "unknown access level '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Human,
    Service,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalKind::Human => f.write_str("human"),
            PrincipalKind::Service => f.write_str("service"),
        }
    }
}

// ============================================================================
// OBJECT CLASSES & PRIVILEGES
// ============================================================================

/// Schema-level object class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectClass {
    Table,
    View,
    MaterializedView,
    DynamicTable,
    ExternalTable,
    Stream,
    Function,
    Procedure,
    Sequence,
    FileFormat,
    Stage,
    Task,
    Pipe,
    Tag,
}

impl ObjectClass {
    /// Classes that receive read grants, ownership transfer and future
    /// ownership.
    pub const GRANTABLE: [ObjectClass; 11] = [
        ObjectClass::Table,
        ObjectClass::View,
        ObjectClass::MaterializedView,
        ObjectClass::DynamicTable,
        ObjectClass::ExternalTable,
        ObjectClass::Stream,
        ObjectClass::Function,
        ObjectClass::Procedure,
        ObjectClass::Sequence,
        ObjectClass::FileFormat,
        ObjectClass::Stage,
    ];

    /// Classes the object owner may create in a provisioned schema.
    pub const CREATABLE: [ObjectClass; 14] = [
        ObjectClass::Table,
        ObjectClass::View,
        ObjectClass::MaterializedView,
        ObjectClass::DynamicTable,
        ObjectClass::ExternalTable,
        ObjectClass::Stream,
        ObjectClass::Function,
        ObjectClass::Procedure,
        ObjectClass::Sequence,
        ObjectClass::FileFormat,
        ObjectClass::Stage,
        ObjectClass::Task,
        ObjectClass::Pipe,
        ObjectClass::Tag,
    ];

    /// Singular keyword, e.g. `MATERIALIZED VIEW`.
    pub fn keyword(&self) -> &'static str {
        match self {
            ObjectClass::Table => "TABLE",
            ObjectClass::View => "VIEW",
            ObjectClass::MaterializedView => "MATERIALIZED VIEW",
            ObjectClass::DynamicTable => "DYNAMIC TABLE",
            ObjectClass::ExternalTable => "EXTERNAL TABLE",
            ObjectClass::Stream => "STREAM",
            ObjectClass::Function => "FUNCTION",
            ObjectClass::Procedure => "PROCEDURE",
            ObjectClass::Sequence => "SEQUENCE",
            ObjectClass::FileFormat => "FILE FORMAT",
            ObjectClass::Stage => "STAGE",
            ObjectClass::Task => "TASK",
            ObjectClass::Pipe => "PIPE",
            ObjectClass::Tag => "TAG",
        }
    }

    /// Plural keyword used in bulk and future grants, e.g. `FILE FORMATS`.
    pub fn plural_keyword(&self) -> String {
        format!("{}S", self.keyword())
    }

    /// Objects whose names carry an argument signature.
    pub fn has_signature(&self) -> bool {
        matches!(self, ObjectClass::Function | ObjectClass::Procedure)
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for ObjectClass {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // No singular keyword ends in 'S', so a trailing 'S' is always a plural.
        let upper = s.trim().to_uppercase().replace('_', " ");
        let key = upper.strip_suffix('S').unwrap_or(&upper);
        ObjectClass::CREATABLE
            .into_iter()
            .find(|class| class.keyword() == key)
            .ok_or_else(|| RbacError::InvalidInput(format!("unknown object class '{}'", s)))
    }
}

/// A privilege on a securable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    Select,
    Usage,
    Read,
    Write,
    Insert,
    Update,
    Delete,
    Truncate,
    References,
    Ownership,
    Create(ObjectClass),
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::Select => f.write_str("SELECT"),
            Privilege::Usage => f.write_str("USAGE"),
            Privilege::Read => f.write_str("READ"),
            Privilege::Write => f.write_str("WRITE"),
            Privilege::Insert => f.write_str("INSERT"),
            Privilege::Update => f.write_str("UPDATE"),
            Privilege::Delete => f.write_str("DELETE"),
            Privilege::Truncate => f.write_str("TRUNCATE"),
            Privilege::References => f.write_str("REFERENCES"),
            Privilege::Ownership => f.write_str("OWNERSHIP"),
            Privilege::Create(class) => write!(f, "CREATE {}", class.keyword()),
        }
    }
}

impl FromStr for Privilege {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        if let Some(rest) = upper.strip_prefix("CREATE ") {
            return rest.parse::<ObjectClass>().map(Privilege::Create);
        }
        match upper.as_str() {
            "SELECT" => Ok(Privilege::Select),
            "USAGE" => Ok(Privilege::Usage),
            "READ" => Ok(Privilege::Read),
            "WRITE" => Ok(Privilege::Write),
            "INSERT" => Ok(Privilege::Insert),
            "UPDATE" => Ok(Privilege::Update),
            "DELETE" => Ok(Privilege::Delete),
            "TRUNCATE" => Ok(Privilege::Truncate),
            "REFERENCES" => Ok(Privilege::References),
            "OWNERSHIP" => Ok(Privilege::Ownership),
            _ => Err(RbacError::InvalidInput(format!("unknown privilege '{}'", s))),
        }
    }
}
