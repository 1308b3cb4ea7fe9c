//! # Identifier Sanitization
//!
//! Clarion identifiers arrive with a table prefix (`WEL:NAME`), characters
//! SQLite identifiers cannot carry, and occasionally collide with SQLite
//! keywords. The rules:
//!
//! - field names lose the prefix through the first `:`
//! - `-`, `.`, `/`, `\`, and spaces map to `_`; anything else that is not
//!   alphanumeric maps to `_` as well
//! - names starting with a digit get an `_` prepended
//! - table names that hit a reserved word get an `_TABLE` suffix

use phf::phf_set;

static SQLITE_RESERVED: phf::Set<&'static str> = phf_set! {
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ANALYZE", "AND",
    "AS", "ASC", "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN",
    "BY", "CASCADE", "CASE", "CAST", "CHECK", "COLLATE", "COLUMN",
    "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS", "CURRENT",
    "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE",
    "DEFAULT", "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH",
    "DISTINCT", "DO", "DROP", "EACH", "ELSE", "END", "ESCAPE", "EXCEPT",
    "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL", "FILTER", "FOR", "FOREIGN",
    "FROM", "FULL", "GLOB", "GROUP", "HAVING", "IF", "IGNORE", "IMMEDIATE",
    "IN", "INDEX", "INDEXED", "INITIALLY", "INNER", "INSERT", "INSTEAD",
    "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "KEY", "LEFT", "LIKE",
    "LIMIT", "MATCH", "NATURAL", "NO", "NOT", "NOTNULL", "NULL", "OF",
    "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "PLAN", "PRAGMA",
    "PRIMARY", "QUERY", "RAISE", "RECURSIVE", "REFERENCES", "REGEXP",
    "REINDEX", "RELEASE", "RENAME", "REPLACE", "RESTRICT", "RIGHT",
    "ROLLBACK", "ROW", "ROWID", "SAVEPOINT", "SELECT", "SET", "TABLE",
    "TEMP", "TEMPORARY", "THEN", "TO", "TRANSACTION", "TRIGGER", "UNION",
    "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL",
    "WHEN", "WHERE", "WINDOW", "WITH", "WITHOUT",
};

fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 1);
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Sanitizes a field name: strips the Clarion `PREFIX:` and maps the rest
/// to a valid identifier.
pub fn sanitize_field_name(raw: &str) -> String {
    let stripped = raw.split_once(':').map(|(_, rest)| rest).unwrap_or(raw);
    sanitize_identifier(stripped)
}

/// Sanitizes a table name, suffixing `_TABLE` when it collides with an
/// SQLite keyword.
pub fn sanitize_table_name(raw: &str) -> String {
    let sanitized = sanitize_identifier(raw);
    if SQLITE_RESERVED.contains(sanitized.to_ascii_uppercase().as_str()) {
        format!("{}_TABLE", sanitized)
    } else {
        sanitized
    }
}
