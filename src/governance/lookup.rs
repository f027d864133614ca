use crate::catalog::CatalogIntrospector;
use crate::error::Result;
use crate::metadata::MetadataStore;
use async_trait::async_trait;
use uuid::Uuid;

/// Read-only state governance decisions depend on
#[async_trait]
pub trait GovernanceLookup: Send + Sync {
    async fn collection_code_exists(&self, code: &str) -> Result<bool>;

    /// True when a collection claims the name or a physical table already has it
    async fn table_name_taken(&self, table_name: &str) -> Result<bool>;

    async fn property_code_exists(&self, collection_id: Uuid, code: &str) -> Result<bool>;

    async fn column_has_nulls(&self, table: &str, column: &str) -> Result<bool>;
}

/// Lookup backed by the metadata tables and the live catalog
#[derive(Clone)]
pub struct PgGovernanceLookup {
    metadata: MetadataStore,
    catalog: CatalogIntrospector,
}

impl PgGovernanceLookup {
    pub fn new(metadata: MetadataStore, catalog: CatalogIntrospector) -> Self {
        Self { metadata, catalog }
    }
}

#[async_trait]
impl GovernanceLookup for PgGovernanceLookup {
    async fn collection_code_exists(&self, code: &str) -> Result<bool> {
        self.metadata.collection_code_exists(code).await
    }

    async fn table_name_taken(&self, table_name: &str) -> Result<bool> {
        if self.metadata.table_name_claimed(table_name).await? {
            return Ok(true);
        }
        self.catalog.table_exists(table_name).await
    }

    async fn property_code_exists(&self, collection_id: Uuid, code: &str) -> Result<bool> {
        self.metadata.property_code_exists(collection_id, code).await
    }

    async fn column_has_nulls(&self, table: &str, column: &str) -> Result<bool> {
        self.catalog.has_null_values(table, column).await
    }
}
