//! Operation → Snowflake SQL
//!
//! The only place statement text is produced. Identifiers that are not plain
//! upper-case words are double-quoted; comments and LIKE patterns are
//! single-quoted with embedded quotes doubled. LIKE wildcards in names are
//! backslash-escaped.
//!
//! | Operation | Statement |
//! |-----------|-----------|
//! | `CreateDatabase` | `CREATE DATABASE IF NOT EXISTS ...` |
//! | `CreateSchema` | `CREATE SCHEMA IF NOT EXISTS ... WITH MANAGED ACCESS` |
//! | `CreateAccountRole` | `CREATE ROLE IF NOT EXISTS ...` |
//! | `CreateDatabaseRole` | `CREATE DATABASE ROLE IF NOT EXISTS ...` |
//! | `GrantPrivileges` | `GRANT <privs> ON <securable> TO <role>` |
//! | `GrantRole` | `GRANT [DATABASE] ROLE ... TO [DATABASE] ROLE ...` |
//! | `GrantRoleToUser` | `GRANT ROLE ... TO USER ...` |
//! | `TransferOwnership` | `GRANT OWNERSHIP ON ... TO ... [COPY\|REVOKE] CURRENT GRANTS` |

use std::sync::LazyLock;

use rbac_core::{ObjectClass, Operation, RoleRef, Securable};
use regex::Regex;

static PLAIN_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z_][A-Z0-9_$]*$").unwrap());

/// Quote an identifier unless it is already a plain upper-case name.
pub fn quote_ident(name: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Single-quoted string literal.
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn qualified(parts: &[&str]) -> String {
    parts.iter().map(|p| quote_ident(p)).collect::<Vec<_>>().join(".")
}

/// Schema-qualified object name. Functions and procedures keep their
/// argument signature unquoted: `CALC(VARCHAR)` → `DB.S.CALC(VARCHAR)`.
fn object_name(class: ObjectClass, database: &str, schema: &str, name: &str) -> String {
    if class.has_signature() {
        if let Some((bare, signature)) = name.split_once('(') {
            return format!("{}({}", qualified(&[database, schema, bare]), signature);
        }
    }
    qualified(&[database, schema, name])
}

pub fn role_ref(role: &RoleRef) -> String {
    match role {
        RoleRef::Account { name } => format!("ROLE {}", quote_ident(name.as_str())),
        RoleRef::Database { database, name } => {
            format!("DATABASE ROLE {}", qualified(&[database, name.as_str()]))
        }
    }
}

pub fn securable(on: &Securable) -> String {
    match on {
        Securable::Database { database } => format!("DATABASE {}", quote_ident(database)),
        Securable::Schema { database, schema } => format!("SCHEMA {}", qualified(&[database, schema])),
        Securable::AllInSchema {
            class,
            database,
            schema,
        } => format!(
            "ALL {} IN SCHEMA {}",
            class.plural_keyword(),
            qualified(&[database, schema])
        ),
        Securable::FutureInSchema {
            class,
            database,
            schema,
        } => format!(
            "FUTURE {} IN SCHEMA {}",
            class.plural_keyword(),
            qualified(&[database, schema])
        ),
        Securable::Object {
            class,
            database,
            schema,
            name,
        } => format!("{} {}", class.keyword(), object_name(*class, database, schema, name)),
    }
}

fn with_comment(statement: String, comment: &Option<String>) -> String {
    match comment {
        Some(comment) => format!("{} COMMENT = {}", statement, string_literal(comment)),
        None => statement,
    }
}

/// Render one operation as a single SQL statement.
pub fn render(operation: &Operation) -> String {
    match operation {
        Operation::CreateDatabase { database, comment } => with_comment(
            format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database)),
            comment,
        ),
        Operation::CreateSchema {
            database,
            schema,
            managed_access,
            comment,
        } => {
            let mut sql = format!("CREATE SCHEMA IF NOT EXISTS {}", qualified(&[database, schema]));
            if *managed_access {
                sql.push_str(" WITH MANAGED ACCESS");
            }
            with_comment(sql, comment)
        }
        Operation::CreateAccountRole { role, comment } => with_comment(
            format!("CREATE ROLE IF NOT EXISTS {}", quote_ident(role.as_str())),
            comment,
        ),
        Operation::CreateDatabaseRole {
            database,
            role,
            comment,
        } => with_comment(
            format!(
                "CREATE DATABASE ROLE IF NOT EXISTS {}",
                qualified(&[database, role.as_str()])
            ),
            comment,
        ),
        Operation::GrantPrivileges { privileges, on, to } => {
            let list: Vec<String> = privileges.iter().map(|p| p.to_string()).collect();
            format!("GRANT {} ON {} TO {}", list.join(", "), securable(on), role_ref(to))
        }
        Operation::GrantRole { role, to } => format!("GRANT {} TO {}", role_ref(role), role_ref(to)),
        Operation::GrantRoleToUser { role, user } => format!(
            "GRANT ROLE {} TO USER {}",
            quote_ident(role.as_str()),
            quote_ident(user)
        ),
        Operation::TransferOwnership {
            on,
            to,
            copy_current_grants,
        } => {
            let sql = format!("GRANT OWNERSHIP ON {} TO {}", securable(on), role_ref(to));
            // Future ownership accepts no outbound-privileges clause.
            if matches!(on, Securable::FutureInSchema { .. }) {
                sql
            } else if *copy_current_grants {
                format!("{} COPY CURRENT GRANTS", sql)
            } else {
                format!("{} REVOKE CURRENT GRANTS", sql)
            }
        }
    }
}

/// `SHOW ... LIKE '<name>'` pattern matching one exact name.
///
/// `SHOW` accepts no `ESCAPE` clause; backslash is its escape character.
/// LIKE is case-insensitive, so callers still compare the returned `name`
/// column exactly.
pub fn like_pattern(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 8);
    for ch in name.chars() {
        if matches!(ch, '\\' | '_' | '%') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    string_literal(&escaped)
}
