//! Identifier and literal quoting for generated DDL.
//!
//! DDL cannot take bind parameters, so every name and literal that reaches a
//! statement goes through these helpers.

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// PostgreSQL truncates identifiers beyond this many bytes
pub const MAX_IDENTIFIER_LEN: usize = 63;
