//! Audit trail for schema changes
//!
//! Every DDL operation writes one append-only row: inside the operation's
//! transaction on success, or in a separate transaction after a rollback so
//! the failure itself is recorded.

use crate::error::{EngineError, Result};
use crate::metadata::{ActorType, ChangeContext, ChangeSource, CHANGE_LOG_TABLE};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use tokio_postgres::{Row, Transaction};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Collection,
    Property,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Collection => "collection",
            EntityType::Property => "property",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaChangeLogEntry {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Option<Uuid>,
    pub entity_code: String,
    pub change_type: ChangeType,
    pub change_source: ChangeSource,
    pub before_state: Option<JsonValue>,
    pub after_state: Option<JsonValue>,
    pub ddl_statements: Vec<String>,
    /// Free-text statement that undoes a soft delete
    pub recovery_statement: Option<String>,
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SchemaChangeLogEntry {
    pub fn new(
        entity_type: EntityType,
        entity_code: &str,
        change_type: ChangeType,
        ctx: &ChangeContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id: None,
            entity_code: entity_code.to_string(),
            change_type,
            change_source: ctx.change_source(),
            before_state: None,
            after_state: None,
            ddl_statements: Vec::new(),
            recovery_statement: None,
            actor_id: ctx.user_id,
            actor_type: ctx.actor_type,
            success: false,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_entity_id(mut self, entity_id: Option<Uuid>) -> Self {
        self.entity_id = entity_id;
        self
    }

    pub fn with_states(mut self, before: Option<JsonValue>, after: Option<JsonValue>) -> Self {
        self.before_state = before;
        self.after_state = after;
        self
    }

    pub fn with_recovery(mut self, recovery: String) -> Self {
        self.recovery_statement = Some(recovery);
        self
    }

    /// Finalize as a committed change
    pub fn succeeded(mut self, statements: &[String]) -> Self {
        self.ddl_statements = statements.to_vec();
        self.success = true;
        self.error_message = None;
        self
    }

    /// Finalize as a rolled-back change
    pub fn failed(mut self, statements: &[String], error: &str) -> Self {
        self.ddl_statements = statements.to_vec();
        self.success = false;
        self.error_message = Some(error.to_string());
        self
    }

    fn from_row(row: &Row) -> Result<Self> {
        let entity_type: String = row.get("entity_type");
        let change_type: String = row.get("change_type");
        let change_source: String = row.get("change_source");
        let actor_type: String = row.get("actor_type");
        let statements: JsonValue = row.get("ddl_statements");

        Ok(Self {
            id: row.get("id"),
            entity_type: parse_label(&entity_type)?,
            entity_id: row.get("entity_id"),
            entity_code: row.get("entity_code"),
            change_type: parse_label(&change_type)?,
            change_source: parse_label(&change_source)?,
            before_state: row.get("before_state"),
            after_state: row.get("after_state"),
            ddl_statements: serde_json::from_value(statements)?,
            recovery_statement: row.get("recovery_statement"),
            actor_id: row.get("actor_id"),
            actor_type: parse_label(&actor_type)?,
            success: row.get("success"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
        })
    }
}

/// Stored labels are the serde names of the enums
fn parse_label<T: serde::de::DeserializeOwned>(label: &str) -> Result<T> {
    Ok(serde_json::from_value(JsonValue::String(label.to_string()))?)
}

#[derive(Clone)]
pub struct ChangeLogStore {
    pool: Pool,
}

impl ChangeLogStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn insert(tx: &Transaction<'_>, entry: &SchemaChangeLogEntry) -> Result<()> {
        let statements = serde_json::to_value(&entry.ddl_statements)?;

        tx.execute(
            &format!(
                r#"
                INSERT INTO {}
                    (id, entity_type, entity_id, entity_code, change_type, change_source,
                     before_state, after_state, ddl_statements, recovery_statement,
                     actor_id, actor_type, success, error_message, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
                CHANGE_LOG_TABLE
            ),
            &[
                &entry.id,
                &entry.entity_type.as_str(),
                &entry.entity_id,
                &entry.entity_code,
                &entry.change_type.as_str(),
                &entry.change_source.as_str(),
                &entry.before_state,
                &entry.after_state,
                &statements,
                &entry.recovery_statement,
                &entry.actor_id,
                &entry.actor_type.as_str(),
                &entry.success,
                &entry.error_message,
                &entry.created_at,
            ],
        )
        .await
        .map_err(|e| EngineError::query("insert change log entry", e))?;

        debug!(
            "Logged {} {} '{}' (success: {})",
            entry.change_type, entry.entity_type, entry.entity_code, entry.success
        );
        Ok(())
    }

    /// Write an entry in its own transaction
    pub async fn record(&self, entry: &SchemaChangeLogEntry) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| EngineError::query("begin change log transaction", e))?;
        Self::insert(&tx, entry).await?;
        tx.commit()
            .await
            .map_err(|e| EngineError::query("commit change log entry", e))
    }

    /// History for one entity, newest first
    pub async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_code: &str,
        limit: i64,
    ) -> Result<Vec<SchemaChangeLogEntry>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT id, entity_type, entity_id, entity_code, change_type, change_source,
                           before_state, after_state, ddl_statements, recovery_statement,
                           actor_id, actor_type, success, error_message, created_at
                    FROM {}
                    WHERE entity_type = $1 AND entity_code = $2
                    ORDER BY created_at DESC
                    LIMIT $3
                    "#,
                    CHANGE_LOG_TABLE
                ),
                &[&entity_type.as_str(), &entity_code, &limit],
            )
            .await
            .map_err(|e| EngineError::query("list change log", e))?;

        rows.iter().map(SchemaChangeLogEntry::from_row).collect()
    }
}
