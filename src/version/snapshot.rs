use crate::catalog::CatalogIndex;
use crate::error::{EngineError, Result};
use crate::metadata::{CollectionDefinition, CollectionMetadata, OwnerType, Property};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tokio_postgres::Row;
use uuid::Uuid;

/// Identity plus the restorable metadata fields of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCollection {
    pub id: Uuid,
    pub code: String,
    pub table_name: String,
    pub owner_type: OwnerType,
    #[serde(flatten)]
    pub metadata: CollectionMetadata,
}

/// Full capture of a collection's definition. Timestamps are left out so two
/// captures of an unchanged collection are identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub collection: SnapshotCollection,
    /// Ordered by position
    pub properties: Vec<Property>,
    pub indexes: Vec<CatalogIndex>,
}

impl CollectionSnapshot {
    pub fn new(definition: &CollectionDefinition, indexes: Vec<CatalogIndex>) -> Self {
        let collection = &definition.collection;
        let mut properties = definition.properties.clone();
        properties.sort_by_key(|p| p.position);

        Self {
            collection: SnapshotCollection {
                id: collection.id,
                code: collection.code.clone(),
                table_name: collection.table_name.clone(),
                owner_type: collection.owner_type,
                metadata: collection.metadata(),
            },
            properties,
            indexes,
        }
    }

    pub fn property(&self, code: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.code == code)
    }

    /// SHA-256 over the canonical JSON encoding
    pub fn checksum(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Why a version was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionChangeType {
    Initial,
    Create,
    Update,
    Delete,
    Rollback,
}

impl VersionChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionChangeType::Initial => "initial",
            VersionChangeType::Create => "create",
            VersionChangeType::Update => "update",
            VersionChangeType::Delete => "delete",
            VersionChangeType::Rollback => "rollback",
        }
    }
}

impl fmt::Display for VersionChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionChangeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initial" => Ok(VersionChangeType::Initial),
            "create" => Ok(VersionChangeType::Create),
            "update" => Ok(VersionChangeType::Update),
            "delete" => Ok(VersionChangeType::Delete),
            "rollback" => Ok(VersionChangeType::Rollback),
            other => Err(EngineError::Internal(format!(
                "Unknown version change type '{}'",
                other
            ))),
        }
    }
}

/// One immutable entry in a collection's version chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub version: i32,
    pub parent_version_id: Option<Uuid>,
    pub change_type: VersionChangeType,
    pub description: Option<String>,
    pub snapshot: CollectionSnapshot,
    pub checksum: String,
    pub metadata: Option<JsonValue>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SchemaVersion {
    pub fn from_row(row: &Row) -> Result<Self> {
        let change_type: String = row.get("change_type");
        let snapshot: JsonValue = row.get("snapshot");
        Ok(Self {
            id: row.get("id"),
            collection_id: row.get("collection_id"),
            version: row.get("version"),
            parent_version_id: row.get("parent_version_id"),
            change_type: change_type.parse()?,
            description: row.get("description"),
            snapshot: serde_json::from_value(snapshot)?,
            checksum: row.get("checksum"),
            metadata: row.get("metadata"),
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
        })
    }
}

/// What to record with a new version
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub collection_id: Uuid,
    pub change_type: VersionChangeType,
    pub description: Option<String>,
    pub snapshot: CollectionSnapshot,
    pub metadata: Option<JsonValue>,
    pub created_by: Option<Uuid>,
}

impl NewVersion {
    pub fn new(
        change_type: VersionChangeType,
        snapshot: CollectionSnapshot,
        created_by: Option<Uuid>,
    ) -> Self {
        Self {
            collection_id: snapshot.collection.id,
            change_type,
            description: None,
            snapshot,
            metadata: None,
            created_by,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Look a version up by number or by row id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRef {
    Number(i32),
    Id(Uuid),
}

impl From<i32> for VersionRef {
    fn from(number: i32) -> Self {
        VersionRef::Number(number)
    }
}

impl From<Uuid> for VersionRef {
    fn from(id: Uuid) -> Self {
        VersionRef::Id(id)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::metadata::Collection;
    use crate::types::LogicalType;

    pub fn snapshot() -> CollectionSnapshot {
        let collection = Collection::new("orders", "Orders", "orders", OwnerType::Custom);
        let mut total = Property::new(
            collection.id,
            "total",
            "Total",
            LogicalType::Currency,
            OwnerType::Custom,
            2,
        );
        total.is_required = true;
        let status = Property::new(
            collection.id,
            "status",
            "Status",
            LogicalType::Text,
            OwnerType::Custom,
            1,
        );

        let definition = CollectionDefinition {
            collection,
            properties: vec![total, status],
        };
        CollectionSnapshot::new(
            &definition,
            vec![CatalogIndex {
                name: "orders_pkey".to_string(),
                table: "orders".to_string(),
                columns: vec!["id".to_string()],
                is_unique: true,
                is_primary: true,
                definition: "CREATE UNIQUE INDEX orders_pkey ON public.orders USING btree (id)"
                    .to_string(),
            }],
        )
    }
}
