//! Engine table bootstrap
//!
//! Creates the metadata, audit, version and sync-state tables the engine
//! reads and writes. Every statement is idempotent so this runs on each start.

use crate::error::{EngineError, Result};
use crate::metadata::{
    CHANGE_LOG_TABLE, COLLECTIONS_TABLE, PROPERTIES_TABLE, SYNC_STATE_TABLE, TOUCH_UPDATED_AT_FN,
    VERSIONS_TABLE,
};
use deadpool_postgres::Pool;
use tracing::{debug, info};

/// Statements that create the engine's own tables, in dependency order
pub fn bootstrap_statements() -> Vec<String> {
    vec![
        format!(
            r#"
            CREATE OR REPLACE FUNCTION {fn_name}() RETURNS TRIGGER AS $$
            BEGIN
                NEW.updated_at = NOW();
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql
            "#,
            fn_name = TOUCH_UPDATED_AT_FN
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {COLLECTIONS_TABLE} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT,
                table_name TEXT NOT NULL UNIQUE,
                owner_type TEXT NOT NULL CHECK (owner_type IN ('system', 'module', 'custom')),
                is_extensible BOOLEAN NOT NULL DEFAULT TRUE,
                attachments_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                activity_log_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                audit_enabled BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {PROPERTIES_TABLE} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                collection_id UUID NOT NULL REFERENCES {COLLECTIONS_TABLE}(id) ON DELETE CASCADE,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                property_type TEXT NOT NULL,
                storage_column TEXT,
                is_required BOOLEAN NOT NULL DEFAULT FALSE,
                is_unique BOOLEAN NOT NULL DEFAULT FALSE,
                is_indexed BOOLEAN NOT NULL DEFAULT FALSE,
                owner_type TEXT NOT NULL CHECK (owner_type IN ('system', 'module', 'custom')),
                position INTEGER NOT NULL,
                default_value TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (collection_id, code),
                UNIQUE (collection_id, position)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {CHANGE_LOG_TABLE} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                entity_type TEXT NOT NULL,
                entity_id UUID,
                entity_code TEXT NOT NULL,
                change_type TEXT NOT NULL,
                change_source TEXT NOT NULL,
                before_state JSONB,
                after_state JSONB,
                ddl_statements JSONB NOT NULL DEFAULT '[]'::jsonb,
                recovery_statement TEXT,
                actor_id UUID,
                actor_type TEXT NOT NULL,
                success BOOLEAN NOT NULL,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_schema_change_log_entity ON {CHANGE_LOG_TABLE} (entity_type, entity_code, created_at DESC)"
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {VERSIONS_TABLE} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                collection_id UUID NOT NULL,
                version INTEGER NOT NULL,
                parent_version_id UUID REFERENCES {VERSIONS_TABLE}(id),
                change_type TEXT NOT NULL,
                description TEXT,
                snapshot JSONB NOT NULL,
                checksum TEXT NOT NULL,
                metadata JSONB,
                created_by UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (collection_id, version)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {SYNC_STATE_TABLE} (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_check_at TIMESTAMPTZ,
                last_check_duration_ms BIGINT,
                last_check_result TEXT,
                drift_detected BOOLEAN NOT NULL DEFAULT FALSE,
                collections_checked INTEGER NOT NULL DEFAULT 0,
                tables_checked INTEGER NOT NULL DEFAULT 0,
                issue_count INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                warning_count INTEGER NOT NULL DEFAULT 0,
                drift_details JSONB NOT NULL DEFAULT '[]'::jsonb,
                lock_holder TEXT,
                lock_acquired_at TIMESTAMPTZ,
                lock_expires_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!("INSERT INTO {SYNC_STATE_TABLE} (id) VALUES (1) ON CONFLICT (id) DO NOTHING"),
    ]
}

/// Ensure every engine table exists
pub async fn ensure_engine_tables(pool: &Pool) -> Result<()> {
    let client = pool.get().await.map_err(|e| EngineError::ConnectionFailed {
        cause: e.to_string(),
    })?;

    for statement in bootstrap_statements() {
        client
            .batch_execute(&statement)
            .await
            .map_err(|e| EngineError::query("engine table bootstrap", e))?;
    }

    debug!("Engine tables ensured");
    info!("Schema engine metadata tables ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_is_idempotent_sql() {
        for statement in bootstrap_statements() {
            let upper = statement.to_uppercase();
            assert!(
                upper.contains("IF NOT EXISTS")
                    || upper.contains("OR REPLACE")
                    || upper.contains("ON CONFLICT"),
                "not idempotent: {}",
                statement
            );
        }
    }

    #[test]
    fn test_collections_created_before_properties() {
        let statements = bootstrap_statements();
        let collections = statements
            .iter()
            .position(|s| s.contains(&format!("TABLE IF NOT EXISTS {}", COLLECTIONS_TABLE)))
            .unwrap();
        let properties = statements
            .iter()
            .position(|s| s.contains(&format!("TABLE IF NOT EXISTS {}", PROPERTIES_TABLE)))
            .unwrap();
        assert!(collections < properties);
    }
}
