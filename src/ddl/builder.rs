//! Pure DDL statement builders.
//!
//! Nothing here touches the database, so the exact statements an operation
//! will run can be inspected and tested before execution.

use crate::error::{EngineError, Result};
use crate::metadata::{Property, TOUCH_UPDATED_AT_FN};
use crate::sql::{quote_ident, quote_literal, MAX_IDENTIFIER_LEN};
use crate::types::LogicalType;
use serde::{Deserialize, Serialize};

/// Columns every engine-created table starts with
pub const STANDARD_COLUMNS: [&str; 7] = [
    "id",
    "created_at",
    "updated_at",
    "created_by",
    "updated_by",
    "is_deleted",
    "deleted_at",
];

const STANDARD_COLUMN_DEFINITIONS: [&str; 7] = [
    "\"id\" UUID PRIMARY KEY DEFAULT gen_random_uuid()",
    "\"created_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW()",
    "\"updated_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW()",
    "\"created_by\" UUID",
    "\"updated_by\" UUID",
    "\"is_deleted\" BOOLEAN NOT NULL DEFAULT FALSE",
    "\"deleted_at\" TIMESTAMPTZ",
];

/// Prefix carried by soft-deleted tables and columns
pub const DELETED_PREFIX: &str = "_deleted_";

pub fn is_standard_column(name: &str) -> bool {
    STANDARD_COLUMNS.contains(&name)
}

/// One user-defined column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub logical_type: LogicalType,
    pub is_required: bool,
    pub is_unique: bool,
    pub is_indexed: bool,
    /// Literal default; the type's own default applies when absent
    pub default_value: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: &str, logical_type: LogicalType) -> Self {
        Self {
            name: name.to_string(),
            logical_type,
            is_required: false,
            is_unique: false,
            is_indexed: false,
            default_value: None,
        }
    }

    pub fn from_property(property: &Property) -> Self {
        Self {
            name: property
                .storage_column
                .clone()
                .unwrap_or_else(|| property.code.clone()),
            logical_type: property.property_type,
            is_required: property.is_required,
            is_unique: property.is_unique,
            is_indexed: property.is_indexed,
            default_value: property.default_value.clone(),
        }
    }

    /// Column definition as it appears in CREATE TABLE / ADD COLUMN
    pub fn definition(&self) -> String {
        let physical = self.logical_type.physical();
        let mut sql = format!("{} {}", quote_ident(&self.name), physical.sql_type);

        if self.is_required {
            sql.push_str(" NOT NULL");
        }
        if self.is_unique {
            sql.push_str(" UNIQUE");
        }

        match (&self.default_value, physical.default) {
            (Some(value), _) => {
                sql.push_str(" DEFAULT ");
                sql.push_str(&quote_literal(value));
            }
            (None, Some(default)) => {
                sql.push_str(" DEFAULT ");
                sql.push_str(default);
            }
            (None, None) => {}
        }

        sql
    }

    fn needs_index(&self) -> bool {
        // UNIQUE already creates an index
        (self.logical_type.is_reference() || self.is_indexed) && !self.is_unique
    }
}

/// Index/trigger name bounded to the identifier limit
pub fn object_name(prefix: &str, table: &str, suffix: &str) -> String {
    let name = format!("{}_{}_{}", prefix, table, suffix);
    truncate_identifier(&name)
}

fn truncate_identifier(name: &str) -> String {
    if name.len() <= MAX_IDENTIFIER_LEN {
        return name.to_string();
    }
    let mut end = MAX_IDENTIFIER_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// `_deleted_<millis>_<name>`, trimming the name so the result fits in 63 bytes
pub fn soft_delete_name(name: &str, timestamp_millis: i64) -> String {
    truncate_identifier(&format!("{}{}_{}", DELETED_PREFIX, timestamp_millis, name))
}

pub fn is_soft_deleted(name: &str) -> bool {
    name.starts_with(DELETED_PREFIX)
}

fn column_index_statement(table: &str, column: &ColumnSpec) -> String {
    format!(
        "CREATE INDEX {} ON {} ({})",
        quote_ident(&object_name("idx", table, &column.name)),
        quote_ident(table),
        quote_ident(&column.name)
    )
}

pub fn create_table_statements(
    table: &str,
    columns: &[ColumnSpec],
    include_standard_columns: bool,
) -> Result<Vec<String>> {
    if columns.is_empty() && !include_standard_columns {
        return Err(EngineError::validation(format!(
            "Table '{}' needs at least one column",
            table
        )));
    }

    for column in columns {
        if include_standard_columns && is_standard_column(&column.name) {
            return Err(EngineError::validation(format!(
                "Column '{}' collides with a standard column",
                column.name
            )));
        }
    }

    let mut definitions: Vec<String> = Vec::new();
    if include_standard_columns {
        definitions.extend(STANDARD_COLUMN_DEFINITIONS.iter().map(|d| d.to_string()));
    }
    definitions.extend(columns.iter().map(ColumnSpec::definition));

    let mut statements = vec![format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote_ident(table),
        definitions.join(",\n    ")
    )];

    if include_standard_columns {
        statements.push(format!(
            "CREATE INDEX {} ON {} (\"created_at\" DESC)",
            quote_ident(&object_name("idx", table, "created_at")),
            quote_ident(table)
        ));
        statements.push(format!(
            "CREATE INDEX {} ON {} (\"id\") WHERE \"is_deleted\" = FALSE",
            quote_ident(&object_name("idx", table, "active")),
            quote_ident(table)
        ));
        statements.push(format!(
            "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {}()",
            quote_ident(&object_name("trg", table, "updated_at")),
            quote_ident(table),
            TOUCH_UPDATED_AT_FN
        ));
    }

    for column in columns.iter().filter(|c| c.needs_index()) {
        statements.push(column_index_statement(table, column));
    }

    Ok(statements)
}

pub fn add_column_statements(table: &str, column: &ColumnSpec) -> Vec<String> {
    let mut statements = vec![format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_ident(table),
        column.definition()
    )];

    if column.needs_index() {
        statements.push(column_index_statement(table, column));
    }

    statements
}

/// Renames plus the statements that undo them
pub struct SoftDelete {
    /// Index renames first, then the table or column rename
    pub statements: Vec<String>,
    /// Every undo statement, in order, as one batch
    pub recovery: String,
    pub renamed_to: String,
}

/// `_deleted_<millis>_`, shared by a soft-deleted object and its indexes
fn soft_delete_prefix(timestamp_millis: i64) -> String {
    format!("{}{}_", DELETED_PREFIX, timestamp_millis)
}

/// Loop over the indexes of `table` matching `filter`, renaming each to
/// `new_name` (an expression over `idx.name`). Index names are only known at
/// run time, so the renames happen server side.
fn index_rename_block(table: &str, filter: &str, new_name: &str) -> String {
    format!(
        r#"DO $soft$
DECLARE
    idx record;
BEGIN
    FOR idx IN
        SELECT n.nspname::text AS schema, i.relname::text AS name
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_namespace n ON n.oid = i.relnamespace
        WHERE ix.indrelid = {}::regclass{}
    LOOP
        EXECUTE format('ALTER INDEX %I.%I RENAME TO %I', idx.schema, idx.name, {});
    END LOOP;
END
$soft$"#,
        quote_literal(&quote_ident(table)),
        filter,
        new_name
    )
}

/// Move indexes out of the way so the original names can be reused. With a
/// column, only indexes covering that column are renamed.
pub fn hide_indexes_statement(table: &str, column: Option<&str>, prefix: &str) -> String {
    let filter = match column {
        Some(column) => format!(
            "\n            AND EXISTS (\n                SELECT 1 FROM pg_attribute a\n                WHERE a.attrelid = ix.indrelid\n                    AND a.attname = {}\n                    AND a.attnum = ANY(ix.indkey::int2[])\n            )",
            quote_literal(column)
        ),
        None => String::new(),
    };
    index_rename_block(
        table,
        &filter,
        &format!("left({} || idx.name, {})", quote_literal(prefix), MAX_IDENTIFIER_LEN),
    )
}

/// Undo `hide_indexes_statement` by stripping `prefix` again
pub fn restore_indexes_statement(table: &str, prefix: &str) -> String {
    index_rename_block(
        table,
        &format!(
            "\n            AND left(i.relname, {}) = {}",
            prefix.len(),
            quote_literal(prefix)
        ),
        &format!("substr(idx.name, {})", prefix.len() + 1),
    )
}

pub fn soft_delete_table(table: &str, timestamp_millis: i64) -> SoftDelete {
    let prefix = soft_delete_prefix(timestamp_millis);
    let renamed_to = soft_delete_name(table, timestamp_millis);
    SoftDelete {
        statements: vec![
            hide_indexes_statement(table, None, &prefix),
            format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(table),
                quote_ident(&renamed_to)
            ),
        ],
        recovery: [
            format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(&renamed_to),
                quote_ident(table)
            ),
            restore_indexes_statement(table, &prefix),
        ]
        .join(";\n"),
        renamed_to,
    }
}

pub fn soft_delete_column(table: &str, column: &str, timestamp_millis: i64) -> SoftDelete {
    let prefix = soft_delete_prefix(timestamp_millis);
    let renamed_to = soft_delete_name(column, timestamp_millis);
    SoftDelete {
        statements: vec![
            hide_indexes_statement(table, Some(column), &prefix),
            rename_column_statement(table, column, &renamed_to),
        ],
        recovery: [
            rename_column_statement(table, &renamed_to, column),
            restore_indexes_statement(table, &prefix),
        ]
        .join(";\n"),
        renamed_to,
    }
}

pub fn rename_column_statement(table: &str, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_ident(table),
        quote_ident(from),
        quote_ident(to)
    )
}

/// Nullability/default change for an existing column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ColumnAlteration {
    SetNullable,
    /// With a default, existing NULLs are backfilled before the constraint is added
    SetNotNull { default: Option<String> },
    /// `None` drops the default
    SetDefault { default: Option<String> },
}

pub fn alter_column_statements(
    table: &str,
    column: &str,
    alteration: &ColumnAlteration,
) -> Vec<String> {
    let alter = format!(
        "ALTER TABLE {} ALTER COLUMN {}",
        quote_ident(table),
        quote_ident(column)
    );

    match alteration {
        ColumnAlteration::SetNullable => vec![format!("{} DROP NOT NULL", alter)],
        ColumnAlteration::SetNotNull { default: None } => vec![format!("{} SET NOT NULL", alter)],
        ColumnAlteration::SetNotNull {
            default: Some(value),
        } => vec![
            format!("{} SET DEFAULT {}", alter, quote_literal(value)),
            format!(
                "UPDATE {} SET {} = {} WHERE {} IS NULL",
                quote_ident(table),
                quote_ident(column),
                quote_literal(value),
                quote_ident(column)
            ),
            format!("{} SET NOT NULL", alter),
        ],
        ColumnAlteration::SetDefault {
            default: Some(value),
        } => vec![format!("{} SET DEFAULT {}", alter, quote_literal(value))],
        ColumnAlteration::SetDefault { default: None } => vec![format!("{} DROP DEFAULT", alter)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_definition_uses_type_mapping() {
        let amount = ColumnSpec::new("amount", LogicalType::Currency);
        assert_eq!(amount.definition(), "\"amount\" NUMERIC(19,4)");

        let tags = ColumnSpec::new("related", LogicalType::MultiReference);
        assert_eq!(tags.definition(), "\"related\" JSONB DEFAULT '[]'::jsonb");

        let mut status = ColumnSpec::new("status", LogicalType::Choice);
        status.is_required = true;
        status.default_value = Some("draft".to_string());
        assert_eq!(
            status.definition(),
            "\"status\" VARCHAR(100) NOT NULL DEFAULT 'draft'"
        );
    }

    #[test]
    fn test_create_table_with_standard_columns() {
        let mut customer = ColumnSpec::new("customer_id", LogicalType::Reference);
        customer.is_required = true;
        let statements = create_table_statements(
            "orders",
            &[ColumnSpec::new("title", LogicalType::Text), customer],
            true,
        )
        .unwrap();

        assert_eq!(statements.len(), 5);
        for column in STANDARD_COLUMNS {
            assert!(statements[0].contains(&format!("\"{}\"", column)));
        }
        assert!(statements[0].contains("\"customer_id\" UUID NOT NULL"));
        assert_eq!(
            statements[1],
            "CREATE INDEX \"idx_orders_created_at\" ON \"orders\" (\"created_at\" DESC)"
        );
        assert!(statements[2].contains("WHERE \"is_deleted\" = FALSE"));
        assert!(statements[3].contains("EXECUTE FUNCTION _schema_touch_updated_at()"));
        assert_eq!(
            statements[4],
            "CREATE INDEX \"idx_orders_customer_id\" ON \"orders\" (\"customer_id\")"
        );
    }

    #[test]
    fn test_create_table_without_standard_columns() {
        let statements =
            create_table_statements("events", &[ColumnSpec::new("payload", LogicalType::Json)], false)
                .unwrap();
        assert_eq!(
            statements,
            vec!["CREATE TABLE \"events\" (\n    \"payload\" JSONB\n)".to_string()]
        );

        assert!(create_table_statements("events", &[], false).is_err());
        assert!(create_table_statements(
            "events",
            &[ColumnSpec::new("created_at", LogicalType::DateTime)],
            true
        )
        .is_err());
    }

    #[test]
    fn test_reference_column_gets_index() {
        let statements =
            add_column_statements("orders", &ColumnSpec::new("owner_id", LogicalType::Reference));
        assert_eq!(statements.len(), 2);
        assert!(statements[1].starts_with("CREATE INDEX \"idx_orders_owner_id\""));

        let plain = add_column_statements("orders", &ColumnSpec::new("notes", LogicalType::LongText));
        assert_eq!(plain, vec!["ALTER TABLE \"orders\" ADD COLUMN \"notes\" TEXT".to_string()]);
    }

    #[test]
    fn test_soft_delete_names() {
        let drop = soft_delete_table("orders", 1_700_000_000_000);
        assert_eq!(drop.renamed_to, "_deleted_1700000000000_orders");
        assert_eq!(drop.statements.len(), 2);
        assert_eq!(
            drop.statements[1],
            "ALTER TABLE \"orders\" RENAME TO \"_deleted_1700000000000_orders\""
        );
        assert!(drop.recovery.starts_with(
            "ALTER TABLE \"_deleted_1700000000000_orders\" RENAME TO \"orders\";\n"
        ));
        assert!(is_soft_deleted(&drop.renamed_to));

        let long = soft_delete_name(&"a".repeat(63), 1_700_000_000_000);
        assert_eq!(long.len(), MAX_IDENTIFIER_LEN);
        assert!(long.starts_with("_deleted_1700000000000_"));
    }

    #[test]
    fn test_soft_delete_table_frees_index_names() {
        let drop = soft_delete_table("orders", 42);

        // Every index of the table moves, before the table itself
        let hide = &drop.statements[0];
        assert!(hide.starts_with("DO $soft$"));
        assert!(hide.contains("WHERE ix.indrelid = '\"orders\"'::regclass\n"));
        assert!(hide.contains("left('_deleted_42_' || idx.name, 63)"));
        assert!(!hide.contains("pg_attribute"));

        // Recovery renames the table back first, then strips the prefix
        let (_, restore) = drop.recovery.split_once(";\n").unwrap();
        assert!(restore.contains("AND left(i.relname, 12) = '_deleted_42_'"));
        assert!(restore.contains("substr(idx.name, 13)"));
    }

    #[test]
    fn test_soft_delete_column_recovery() {
        let drop = soft_delete_column("orders", "notes", 42);
        assert!(drop.statements[0].contains("AND a.attname = 'notes'"));
        assert!(drop.statements[0].contains("a.attnum = ANY(ix.indkey::int2[])"));
        assert_eq!(
            drop.statements[1],
            "ALTER TABLE \"orders\" RENAME COLUMN \"notes\" TO \"_deleted_42_notes\""
        );
        assert!(drop.recovery.starts_with(
            "ALTER TABLE \"orders\" RENAME COLUMN \"_deleted_42_notes\" TO \"notes\";\n"
        ));
        assert!(drop.recovery.ends_with("$soft$"));
    }

    #[test]
    fn test_set_not_null_with_default_backfills() {
        let statements = alter_column_statements(
            "orders",
            "status",
            &ColumnAlteration::SetNotNull {
                default: Some("draft".to_string()),
            },
        );
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE \"orders\" ALTER COLUMN \"status\" SET DEFAULT 'draft'".to_string(),
                "UPDATE \"orders\" SET \"status\" = 'draft' WHERE \"status\" IS NULL".to_string(),
                "ALTER TABLE \"orders\" ALTER COLUMN \"status\" SET NOT NULL".to_string(),
            ]
        );

        assert_eq!(
            alter_column_statements("orders", "status", &ColumnAlteration::SetNullable),
            vec!["ALTER TABLE \"orders\" ALTER COLUMN \"status\" DROP NOT NULL".to_string()]
        );
        assert_eq!(
            alter_column_statements(
                "orders",
                "status",
                &ColumnAlteration::SetDefault { default: None }
            ),
            vec!["ALTER TABLE \"orders\" ALTER COLUMN \"status\" DROP DEFAULT".to_string()]
        );
    }
}
