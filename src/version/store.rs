use crate::error::{EngineError, Result};
use crate::metadata::VERSIONS_TABLE;
use crate::version::snapshot::{NewVersion, SchemaVersion, VersionRef};
use chrono::Utc;
use deadpool_postgres::{Client, Pool};
use serde::Serialize;
use tokio_postgres::Transaction;
use tracing::info;
use uuid::Uuid;

const VERSION_COLUMNS: &str = "id, collection_id, version, parent_version_id, change_type, \
     description, snapshot, checksum, metadata, created_by, created_at";

/// One page of a collection's history, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionPage {
    pub versions: Vec<SchemaVersion>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl VersionPage {
    pub fn has_more(&self) -> bool {
        self.offset + (self.versions.len() as i64) < self.total
    }
}

/// Append-only storage for version rows
#[derive(Clone)]
pub struct VersionStore {
    pool: Pool,
}

impl VersionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<Client> {
        self.pool.get().await.map_err(|e| EngineError::ConnectionFailed {
            cause: e.to_string(),
        })
    }

    /// Append the next version (`max + 1`) linked to the current latest.
    /// The latest row is locked so concurrent writers queue behind each other;
    /// the first version of a collection relies on the unique constraint.
    pub async fn insert(tx: &Transaction<'_>, new: &NewVersion) -> Result<SchemaVersion> {
        let parent = tx
            .query_opt(
                &format!(
                    "SELECT id, version FROM {} WHERE collection_id = $1 ORDER BY version DESC LIMIT 1 FOR UPDATE",
                    VERSIONS_TABLE
                ),
                &[&new.collection_id],
            )
            .await
            .map_err(|e| EngineError::query("lock latest version", e))?;

        let (parent_version_id, version) = match parent {
            Some(row) => (Some(row.get::<_, Uuid>("id")), row.get::<_, i32>("version") + 1),
            None => (None, 1),
        };

        let record = SchemaVersion {
            id: Uuid::new_v4(),
            collection_id: new.collection_id,
            version,
            parent_version_id,
            change_type: new.change_type,
            description: new.description.clone(),
            checksum: new.snapshot.checksum()?,
            snapshot: new.snapshot.clone(),
            metadata: new.metadata.clone(),
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        let snapshot = serde_json::to_value(&record.snapshot)?;

        tx.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                VERSIONS_TABLE, VERSION_COLUMNS
            ),
            &[
                &record.id,
                &record.collection_id,
                &record.version,
                &record.parent_version_id,
                &record.change_type.as_str(),
                &record.description,
                &snapshot,
                &record.checksum,
                &record.metadata,
                &record.created_by,
                &record.created_at,
            ],
        )
        .await
        .map_err(|e| EngineError::query("insert version", e))?;

        info!(
            "Recorded version {} ({}) of collection {}",
            record.version, record.change_type, record.collection_id
        );
        Ok(record)
    }

    /// Latest version read inside `tx`, locked until the transaction ends
    pub async fn latest_for_update(
        tx: &Transaction<'_>,
        collection_id: Uuid,
    ) -> Result<Option<SchemaVersion>> {
        let row = tx
            .query_opt(
                &format!(
                    "SELECT {} FROM {} WHERE collection_id = $1 ORDER BY version DESC LIMIT 1 FOR UPDATE",
                    VERSION_COLUMNS, VERSIONS_TABLE
                ),
                &[&collection_id],
            )
            .await
            .map_err(|e| EngineError::query("lock latest version", e))?;

        row.as_ref().map(SchemaVersion::from_row).transpose()
    }

    /// A version by number, read inside `tx`
    pub async fn get_numbered(
        tx: &Transaction<'_>,
        collection_id: Uuid,
        number: i32,
    ) -> Result<Option<SchemaVersion>> {
        let row = tx
            .query_opt(
                &format!(
                    "SELECT {} FROM {} WHERE collection_id = $1 AND version = $2",
                    VERSION_COLUMNS, VERSIONS_TABLE
                ),
                &[&collection_id, &number],
            )
            .await
            .map_err(|e| EngineError::query("get version", e))?;

        row.as_ref().map(SchemaVersion::from_row).transpose()
    }

    pub async fn list(&self, collection_id: Uuid, limit: i64, offset: i64) -> Result<VersionPage> {
        let client = self.client().await?;

        let total: i64 = client
            .query_one(
                &format!("SELECT COUNT(*) FROM {} WHERE collection_id = $1", VERSIONS_TABLE),
                &[&collection_id],
            )
            .await
            .map_err(|e| EngineError::query("count versions", e))?
            .get(0);

        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM {} WHERE collection_id = $1 ORDER BY version DESC LIMIT $2 OFFSET $3",
                    VERSION_COLUMNS, VERSIONS_TABLE
                ),
                &[&collection_id, &limit, &offset],
            )
            .await
            .map_err(|e| EngineError::query("list versions", e))?;

        Ok(VersionPage {
            versions: rows.iter().map(SchemaVersion::from_row).collect::<Result<_>>()?,
            total,
            limit,
            offset,
        })
    }

    pub async fn get(&self, collection_id: Uuid, by: VersionRef) -> Result<Option<SchemaVersion>> {
        let client = self.client().await?;
        let row = match by {
            VersionRef::Number(number) => {
                client
                    .query_opt(
                        &format!(
                            "SELECT {} FROM {} WHERE collection_id = $1 AND version = $2",
                            VERSION_COLUMNS, VERSIONS_TABLE
                        ),
                        &[&collection_id, &number],
                    )
                    .await
            }
            VersionRef::Id(id) => {
                client
                    .query_opt(
                        &format!(
                            "SELECT {} FROM {} WHERE collection_id = $1 AND id = $2",
                            VERSION_COLUMNS, VERSIONS_TABLE
                        ),
                        &[&collection_id, &id],
                    )
                    .await
            }
        }
        .map_err(|e| EngineError::query("get version", e))?;

        row.as_ref().map(SchemaVersion::from_row).transpose()
    }

    pub async fn latest(&self, collection_id: Uuid) -> Result<Option<SchemaVersion>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM {} WHERE collection_id = $1 ORDER BY version DESC LIMIT 1",
                    VERSION_COLUMNS, VERSIONS_TABLE
                ),
                &[&collection_id],
            )
            .await
            .map_err(|e| EngineError::query("get latest version", e))?;

        row.as_ref().map(SchemaVersion::from_row).transpose()
    }
}
