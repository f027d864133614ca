use crate::error::{EngineError, Result};
use crate::metadata::{
    Collection, CollectionDefinition, CollectionMetadata, Property, COLLECTIONS_TABLE,
    PROPERTIES_TABLE,
};
use deadpool_postgres::{Client, Pool};
use std::collections::HashMap;
use tokio_postgres::Transaction;
use tracing::debug;
use uuid::Uuid;

const COLLECTION_COLUMNS: &str = "id, code, name, description, table_name, owner_type, is_extensible, \
     attachments_enabled, activity_log_enabled, audit_enabled, created_at, updated_at";

const PROPERTY_COLUMNS: &str = "id, collection_id, code, name, property_type, storage_column, \
     is_required, is_unique, is_indexed, owner_type, position, default_value";

/// Reads and writes collection/property metadata rows
#[derive(Clone)]
pub struct MetadataStore {
    pool: Pool,
}

impl MetadataStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn client(&self) -> Result<Client> {
        self.pool.get().await.map_err(|e| EngineError::ConnectionFailed {
            cause: e.to_string(),
        })
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM {} ORDER BY code",
                    COLLECTION_COLUMNS, COLLECTIONS_TABLE
                ),
                &[],
            )
            .await
            .map_err(|e| EngineError::query("list collections", e))?;

        rows.iter().map(Collection::from_row).collect()
    }

    /// Every collection with its properties, used by drift checks
    pub async fn list_definitions(&self) -> Result<Vec<CollectionDefinition>> {
        let collections = self.list_collections().await?;

        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM {} ORDER BY collection_id, position",
                    PROPERTY_COLUMNS, PROPERTIES_TABLE
                ),
                &[],
            )
            .await
            .map_err(|e| EngineError::query("list properties", e))?;

        let mut by_collection: HashMap<Uuid, Vec<Property>> = HashMap::new();
        for row in &rows {
            let property = Property::from_row(row)?;
            by_collection
                .entry(property.collection_id)
                .or_default()
                .push(property);
        }

        debug!(
            "Loaded {} collections and {} properties",
            collections.len(),
            rows.len()
        );

        Ok(collections
            .into_iter()
            .map(|collection| {
                let properties = by_collection.remove(&collection.id).unwrap_or_default();
                CollectionDefinition {
                    collection,
                    properties,
                }
            })
            .collect())
    }

    pub async fn get_collection(&self, id: Uuid) -> Result<Option<Collection>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM {} WHERE id = $1",
                    COLLECTION_COLUMNS, COLLECTIONS_TABLE
                ),
                &[&id],
            )
            .await
            .map_err(|e| EngineError::query("get collection", e))?;

        row.as_ref().map(Collection::from_row).transpose()
    }

    pub async fn get_collection_by_code(&self, code: &str) -> Result<Option<Collection>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM {} WHERE code = $1",
                    COLLECTION_COLUMNS, COLLECTIONS_TABLE
                ),
                &[&code],
            )
            .await
            .map_err(|e| EngineError::query("get collection by code", e))?;

        row.as_ref().map(Collection::from_row).transpose()
    }

    pub async fn get_properties(&self, collection_id: Uuid) -> Result<Vec<Property>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM {} WHERE collection_id = $1 ORDER BY position",
                    PROPERTY_COLUMNS, PROPERTIES_TABLE
                ),
                &[&collection_id],
            )
            .await
            .map_err(|e| EngineError::query("get properties", e))?;

        rows.iter().map(Property::from_row).collect()
    }

    pub async fn get_definition(&self, collection_id: Uuid) -> Result<CollectionDefinition> {
        let collection = self
            .get_collection(collection_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Collection", collection_id))?;
        let properties = self.get_properties(collection_id).await?;

        Ok(CollectionDefinition {
            collection,
            properties,
        })
    }

    pub async fn collection_code_exists(&self, code: &str) -> Result<bool> {
        self.exists(
            &format!("SELECT 1 FROM {} WHERE code = $1", COLLECTIONS_TABLE),
            code,
        )
        .await
    }

    pub async fn table_name_claimed(&self, table_name: &str) -> Result<bool> {
        self.exists(
            &format!("SELECT 1 FROM {} WHERE table_name = $1", COLLECTIONS_TABLE),
            table_name,
        )
        .await
    }

    async fn exists(&self, sql: &str, value: &str) -> Result<bool> {
        let client = self.client().await?;
        let row = client
            .query_opt(sql, &[&value])
            .await
            .map_err(|e| EngineError::query("metadata existence check", e))?;
        Ok(row.is_some())
    }

    pub async fn property_code_exists(&self, collection_id: Uuid, code: &str) -> Result<bool> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT 1 FROM {} WHERE collection_id = $1 AND (code = $2 OR storage_column = $2)",
                    PROPERTIES_TABLE
                ),
                &[&collection_id, &code],
            )
            .await
            .map_err(|e| EngineError::query("property existence check", e))?;
        Ok(row.is_some())
    }

    /// Next free position; positions only need to be unique, not dense
    pub async fn next_property_position(&self, collection_id: Uuid) -> Result<i32> {
        let client = self.client().await?;
        let row = client
            .query_one(
                &format!(
                    "SELECT COALESCE(MAX(position), 0) + 1 FROM {} WHERE collection_id = $1",
                    PROPERTIES_TABLE
                ),
                &[&collection_id],
            )
            .await
            .map_err(|e| EngineError::query("next property position", e))?;
        Ok(row.get(0))
    }

    pub async fn insert_collection(tx: &Transaction<'_>, collection: &Collection) -> Result<()> {
        tx.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                COLLECTIONS_TABLE, COLLECTION_COLUMNS
            ),
            &[
                &collection.id,
                &collection.code,
                &collection.name,
                &collection.description,
                &collection.table_name,
                &collection.owner_type.as_str(),
                &collection.is_extensible,
                &collection.attachments_enabled,
                &collection.activity_log_enabled,
                &collection.audit_enabled,
                &collection.created_at,
                &collection.updated_at,
            ],
        )
        .await
        .map_err(|e| EngineError::query("insert collection", e))?;

        Ok(())
    }

    pub async fn insert_property(tx: &Transaction<'_>, property: &Property) -> Result<()> {
        tx.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                PROPERTIES_TABLE, PROPERTY_COLUMNS
            ),
            &[
                &property.id,
                &property.collection_id,
                &property.code,
                &property.name,
                &property.property_type.code(),
                &property.storage_column,
                &property.is_required,
                &property.is_unique,
                &property.is_indexed,
                &property.owner_type.as_str(),
                &property.position,
                &property.default_value,
            ],
        )
        .await
        .map_err(|e| EngineError::query("insert property", e))?;

        Ok(())
    }

    /// Lock the collection row until the transaction ends. False when it does not exist.
    pub async fn lock_collection(tx: &Transaction<'_>, collection_id: Uuid) -> Result<bool> {
        let row = tx
            .query_opt(
                &format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", COLLECTIONS_TABLE),
                &[&collection_id],
            )
            .await
            .map_err(|e| EngineError::query("lock collection", e))?;
        Ok(row.is_some())
    }

    /// Overwrite the non-structural collection fields. Returns affected row count.
    pub async fn apply_collection_metadata(
        tx: &Transaction<'_>,
        collection_id: Uuid,
        metadata: &CollectionMetadata,
    ) -> Result<u64> {
        tx.execute(
            &format!(
                r#"
                UPDATE {}
                SET name = $2,
                    description = $3,
                    is_extensible = $4,
                    attachments_enabled = $5,
                    activity_log_enabled = $6,
                    audit_enabled = $7,
                    updated_at = NOW()
                WHERE id = $1
                "#,
                COLLECTIONS_TABLE
            ),
            &[
                &collection_id,
                &metadata.name,
                &metadata.description,
                &metadata.is_extensible,
                &metadata.attachments_enabled,
                &metadata.activity_log_enabled,
                &metadata.audit_enabled,
            ],
        )
        .await
        .map_err(|e| EngineError::query("apply collection metadata", e))
    }

    pub async fn rename_storage_column(
        tx: &Transaction<'_>,
        property_id: Uuid,
        column: &str,
    ) -> Result<u64> {
        tx.execute(
            &format!(
                "UPDATE {} SET storage_column = $2, updated_at = NOW() WHERE id = $1",
                PROPERTIES_TABLE
            ),
            &[&property_id, &column],
        )
        .await
        .map_err(|e| EngineError::query("rename storage column", e))
    }

    pub async fn delete_collection(tx: &Transaction<'_>, collection_id: Uuid) -> Result<u64> {
        tx.execute(
            &format!("DELETE FROM {} WHERE id = $1", COLLECTIONS_TABLE),
            &[&collection_id],
        )
        .await
        .map_err(|e| EngineError::query("delete collection", e))
    }

    pub async fn delete_property(tx: &Transaction<'_>, property_id: Uuid) -> Result<u64> {
        tx.execute(
            &format!("DELETE FROM {} WHERE id = $1", PROPERTIES_TABLE),
            &[&property_id],
        )
        .await
        .map_err(|e| EngineError::query("delete property", e))
    }
}
