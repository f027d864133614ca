use crate::error::{describe_pg_error, EngineError, Result};
use crate::sql::quote_ident;
use deadpool_postgres::{Client, Pool};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Schemas never considered user data
pub const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// A physical column as reported by information_schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
}

/// A physical index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub definition: String,
}

/// Every user table with its columns, captured in one pass
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub tables: HashMap<String, Vec<CatalogColumn>>,
    /// Schema each table name was taken from
    pub schemas: HashMap<String, String>,
}

impl CatalogSnapshot {
    /// Add one catalog row. A table name already seen in another schema keeps
    /// its first schema; later duplicates are ignored.
    pub fn record(&mut self, schema: &str, table: &str, column: Option<CatalogColumn>) {
        match self.schemas.get(table) {
            Some(seen) if seen != schema => {
                debug!(
                    "Ignoring {}.{}: table name already taken from schema {}",
                    schema, table, seen
                );
                return;
            }
            Some(_) => {}
            None => {
                self.schemas.insert(table.to_string(), schema.to_string());
            }
        }

        let columns = self.tables.entry(table.to_string()).or_default();
        if let Some(column) = column {
            columns.push(column);
        }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Option<&[CatalogColumn]> {
        self.tables.get(table).map(|c| c.as_slice())
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

/// Read-only catalog access
#[derive(Clone)]
pub struct CatalogIntrospector {
    pool: Pool,
    null_probe_timeout: Duration,
}

impl CatalogIntrospector {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            null_probe_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_null_probe_timeout(mut self, timeout: Duration) -> Self {
        self.null_probe_timeout = timeout;
        self
    }

    async fn client(&self) -> Result<Client> {
        self.pool.get().await.map_err(|e| EngineError::ConnectionFailed {
            cause: e.to_string(),
        })
    }

    /// Columns of every base table outside the system schemas
    pub async fn snapshot(&self) -> Result<CatalogSnapshot> {
        let client = self.client().await?;

        let rows = client
            .query(
                r#"
                SELECT
                    t.table_schema::text,
                    t.table_name::text,
                    c.column_name::text,
                    c.data_type::text,
                    c.is_nullable::text,
                    c.column_default::text,
                    c.character_maximum_length::int,
                    c.numeric_precision::int,
                    c.numeric_scale::int
                FROM information_schema.tables t
                LEFT JOIN information_schema.columns c
                    ON t.table_name = c.table_name
                    AND t.table_schema = c.table_schema
                WHERE t.table_type = 'BASE TABLE'
                    AND t.table_schema::text <> ALL($1::text[])
                    AND t.table_schema NOT LIKE 'pg_toast%'
                    AND t.table_schema NOT LIKE 'pg_temp%'
                ORDER BY t.table_schema, t.table_name, c.ordinal_position
                "#,
                &[&SYSTEM_SCHEMAS],
            )
            .await
            .map_err(|e| introspection_failed("columns", e))?;

        let mut snapshot = CatalogSnapshot::default();
        for row in rows {
            let schema: String = row.get(0);
            let table: String = row.get(1);

            // Zero-column tables come back as a single row of NULLs
            let column_name: Option<String> = row.get(2);
            let column = column_name.map(|_| column_from_row(&row, 2));
            snapshot.record(&schema, &table, column);
        }

        debug!("Catalog snapshot: {} tables", snapshot.tables.len());
        Ok(snapshot)
    }

    pub async fn list_columns(&self, table: &str) -> Result<Vec<CatalogColumn>> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT
                    c.column_name::text,
                    c.data_type::text,
                    c.is_nullable::text,
                    c.column_default::text,
                    c.character_maximum_length::int,
                    c.numeric_precision::int,
                    c.numeric_scale::int
                FROM information_schema.columns c
                WHERE c.table_name = $1::text
                    AND c.table_schema = ANY(current_schemas(false))
                ORDER BY c.ordinal_position
                "#,
                &[&table],
            )
            .await
            .map_err(|e| introspection_failed(table, e))?;

        Ok(rows.iter().map(|row| column_from_row(row, 0)).collect())
    }

    pub async fn list_indexes(&self, table: &str) -> Result<Vec<CatalogIndex>> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT
                    i.relname::text AS index_name,
                    ix.indisunique,
                    ix.indisprimary,
                    pg_get_indexdef(ix.indexrelid) AS definition,
                    ARRAY(
                        SELECT a.attname::text
                        FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
                        ORDER BY k.ord
                    ) AS columns
                FROM pg_class t
                JOIN pg_index ix ON t.oid = ix.indrelid
                JOIN pg_class i ON i.oid = ix.indexrelid
                JOIN pg_namespace n ON n.oid = t.relnamespace
                WHERE t.relname = $1
                    AND n.nspname = ANY(current_schemas(false))
                ORDER BY i.relname
                "#,
                &[&table],
            )
            .await
            .map_err(|e| introspection_failed(table, e))?;

        Ok(rows
            .iter()
            .map(|row| CatalogIndex {
                name: row.get("index_name"),
                table: table.to_string(),
                columns: row.get("columns"),
                is_unique: row.get("indisunique"),
                is_primary: row.get("indisprimary"),
                definition: row.get("definition"),
            })
            .collect())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.client().await?;
        let row = client
            .query_one(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_name = $1::text
                        AND table_type = 'BASE TABLE'
                        AND table_schema = ANY(current_schemas(false))
                )
                "#,
                &[&table],
            )
            .await
            .map_err(|e| introspection_failed(table, e))?;
        Ok(row.get(0))
    }

    /// Whether the column holds at least one NULL.
    ///
    /// `EXISTS` stops at the first NULL; a column without NULLs is a full scan,
    /// so the probe runs under a local statement timeout and a timeout is
    /// reported as an error rather than as "no NULLs".
    pub async fn has_null_values(&self, table: &str, column: &str) -> Result<bool> {
        let mut client = self.client().await?;
        let target = format!("{}.{}", table, column);

        let tx = client
            .transaction()
            .await
            .map_err(|e| introspection_failed(&target, e))?;

        tx.batch_execute(&format!(
            "SET TRANSACTION READ ONLY; SET LOCAL statement_timeout = {}",
            self.null_probe_timeout.as_millis()
        ))
        .await
        .map_err(|e| introspection_failed(&target, e))?;

        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} IS NULL)",
            quote_ident(table),
            quote_ident(column)
        );

        let row = match tx.query_one(&sql, &[]).await {
            Ok(row) => row,
            Err(e) => {
                warn!("NULL probe on {} failed: {}", target, describe_pg_error(&e));
                return Err(introspection_failed(&target, e));
            }
        };

        let has_nulls: bool = row.get(0);
        tx.commit()
            .await
            .map_err(|e| introspection_failed(&target, e))?;

        debug!("NULL probe on {}: has_nulls={}", target, has_nulls);
        Ok(has_nulls)
    }
}

fn column_from_row(row: &tokio_postgres::Row, offset: usize) -> CatalogColumn {
    let is_nullable: String = row.get(offset + 2);
    let data_type: String = row.get(offset + 1);
    CatalogColumn {
        name: row.get(offset),
        data_type: data_type.to_lowercase(),
        is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
        column_default: row.get(offset + 3),
        character_maximum_length: row.get(offset + 4),
        numeric_precision: row.get(offset + 5),
        numeric_scale: row.get(offset + 6),
    }
}

fn introspection_failed(target: &str, err: tokio_postgres::Error) -> EngineError {
    EngineError::IntrospectionFailed {
        target: target.to_string(),
        cause: describe_pg_error(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(data_type: &str) -> CatalogColumn {
        CatalogColumn {
            name: "c".to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            column_default: None,
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    #[test]
    fn test_snapshot_table_names_sorted() {
        let mut snapshot = CatalogSnapshot::default();
        snapshot.tables.insert("orders".to_string(), vec![column("uuid")]);
        snapshot.tables.insert("accounts".to_string(), Vec::new());

        assert_eq!(snapshot.table_names(), vec!["accounts", "orders"]);
        assert!(snapshot.has_table("orders"));
        assert_eq!(snapshot.columns("orders").map(|c| c.len()), Some(1));
        assert!(snapshot.columns("missing").is_none());
    }

    #[test]
    fn test_snapshot_keeps_first_schema_for_duplicate_names() {
        let mut snapshot = CatalogSnapshot::default();
        snapshot.record("billing", "invoices", Some(column("uuid")));
        snapshot.record("billing", "invoices", Some(column("text")));
        snapshot.record("public", "invoices", Some(column("integer")));
        snapshot.record("public", "empty_table", None);

        assert_eq!(snapshot.columns("invoices").map(|c| c.len()), Some(2));
        assert_eq!(snapshot.schemas.get("invoices").map(|s| s.as_str()), Some("billing"));
        assert_eq!(snapshot.columns("empty_table").map(|c| c.len()), Some(0));
        assert_eq!(snapshot.table_names(), vec!["empty_table", "invoices"]);
    }
}
