//! Identifier rules shared by collection codes, table names, property codes
//! and storage columns.

use crate::sql::MAX_IDENTIFIER_LEN;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("identifier pattern compiles"));

pub const MIN_IDENTIFIER_LEN: usize = 2;

/// Prefixes owned by PostgreSQL or the SQL standard
pub const RESERVED_PREFIXES: &[&str] = &["pg_", "sql_"];

static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Core platform nouns
        "user", "users", "role", "roles", "permission", "permissions", "group", "groups",
        "tenant", "tenants", "session", "sessions", "setting", "settings", "module", "modules",
        "attachment", "attachments", "activity", "activities", "audit", "audit_log", "system",
        // Engine bookkeeping
        "collection", "collections", "property", "properties", "schema_collections",
        "schema_properties", "schema_change_log", "schema_versions", "schema_sync_state",
        "change_log", "sync_state", "version", "versions",
        // SQL keywords
        "all", "alter", "analyze", "and", "any", "as", "asc", "between", "by", "case", "cast",
        "check", "column", "constraint", "create", "cross", "current_date", "current_time",
        "current_timestamp", "current_user", "default", "delete", "desc", "distinct", "do",
        "drop", "else", "end", "except", "exists", "false", "fetch", "for", "foreign", "from",
        "grant", "having", "in", "index", "inner", "insert", "intersect", "into", "is", "join",
        "key", "left", "like", "limit", "not", "null", "offset", "on", "only", "or", "order",
        "outer", "primary", "references", "returning", "revoke", "right", "select", "set",
        "table", "then", "to", "true", "union", "unique", "update", "using", "values", "view",
        "when", "where", "with",
    ]
    .into_iter()
    .collect()
});

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(name)
}

/// Validate an identifier; returns every violation found.
///
/// `label` names the field in messages, e.g. "Collection code".
pub fn validate_identifier(label: &str, name: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if name.len() < MIN_IDENTIFIER_LEN || name.len() > MAX_IDENTIFIER_LEN {
        errors.push(format!(
            "{} '{}' must be between {} and {} characters",
            label, name, MIN_IDENTIFIER_LEN, MAX_IDENTIFIER_LEN
        ));
    }

    if !IDENTIFIER_RE.is_match(name) {
        errors.push(format!(
            "{} '{}' must start with a lowercase letter and contain only lowercase letters, digits and underscores",
            label, name
        ));
    }

    if is_reserved_word(name) {
        errors.push(format!("{} '{}' is a reserved word", label, name));
    }

    if let Some(prefix) = RESERVED_PREFIXES.iter().find(|p| name.starts_with(*p)) {
        errors.push(format!(
            "{} '{}' uses the reserved prefix '{}'",
            label, name, prefix
        ));
    }

    errors
}

/// Custom properties on module collections must carry the reserved prefix
pub fn validate_reserved_prefix(label: &str, name: &str, prefix: &str) -> Option<String> {
    if prefix.is_empty() || name.starts_with(prefix) {
        return None;
    }

    Some(format!(
        "{} '{}' must start with '{}' when extending a module collection",
        label, name, prefix
    ))
}
