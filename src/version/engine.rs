use crate::catalog::CatalogIntrospector;
use crate::error::{EngineError, Result};
use crate::metadata::{ChangeContext, MetadataStore};
use crate::version::diff::VersionDiff;
use crate::version::snapshot::{
    CollectionSnapshot, NewVersion, SchemaVersion, VersionChangeType, VersionRef,
};
use crate::version::store::{VersionPage, VersionStore};
use deadpool_postgres::Pool;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

/// Result of a rollback. Failures are reported here rather than as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackOutcome {
    pub success: bool,
    /// The new `rollback` version on success
    pub version: Option<SchemaVersion>,
    pub target_version: i32,
    pub error: Option<String>,
}

impl RollbackOutcome {
    fn succeeded(version: SchemaVersion, target_version: i32) -> Self {
        Self {
            success: true,
            version: Some(version),
            target_version,
            error: None,
        }
    }

    fn failed(target_version: i32, error: &EngineError) -> Self {
        Self {
            success: false,
            version: None,
            target_version,
            error: Some(error.to_string()),
        }
    }
}

/// Only strictly older versions can be restored
pub fn check_rollback_target(latest: i32, target: i32) -> Result<()> {
    if target >= latest {
        return Err(EngineError::validation(
            "cannot rollback to a newer or same version",
        ));
    }
    Ok(())
}

/// The version recorded by a rollback: the target's snapshot with both
/// endpoints noted in its metadata
pub fn plan_rollback(
    latest: &SchemaVersion,
    target: &SchemaVersion,
    ctx: &ChangeContext,
) -> Result<NewVersion> {
    check_rollback_target(latest.version, target.version)?;

    Ok(
        NewVersion::new(VersionChangeType::Rollback, target.snapshot.clone(), ctx.user_id)
            .with_description(format!(
                "Rollback from version {} to version {}",
                latest.version, target.version
            ))
            .with_metadata(json!({
                "rolled_back_from": latest.version,
                "rolled_back_from_id": latest.id,
                "rolled_back_to": target.version,
                "rolled_back_to_id": target.id,
                "actor_type": ctx.actor_type.as_str(),
            })),
    )
}

/// Snapshots, history, comparison and metadata rollback for collections
#[derive(Clone)]
pub struct VersionEngine {
    pool: Pool,
    metadata: MetadataStore,
    catalog: CatalogIntrospector,
    store: VersionStore,
}

impl VersionEngine {
    pub fn new(pool: Pool) -> Self {
        Self {
            metadata: MetadataStore::new(pool.clone()),
            catalog: CatalogIntrospector::new(pool.clone()),
            store: VersionStore::new(pool.clone()),
            pool,
        }
    }

    pub async fn create_version(&self, new: NewVersion) -> Result<SchemaVersion> {
        let mut client = self.pool.get().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| EngineError::query("begin version transaction", e))?;

        let version = VersionStore::insert(&tx, &new).await?;

        tx.commit()
            .await
            .map_err(|e| EngineError::query("commit version", e))?;
        Ok(version)
    }

    /// Capture the collection as it is now and record it as a new version
    pub async fn record_current(
        &self,
        collection_id: Uuid,
        change_type: VersionChangeType,
        description: Option<String>,
        ctx: &ChangeContext,
    ) -> Result<SchemaVersion> {
        let snapshot = self.capture_current_snapshot(collection_id).await?;
        let mut new = NewVersion::new(change_type, snapshot, ctx.user_id);
        new.description = description;
        self.create_version(new).await
    }

    /// Newest first. `limit` is clamped to 1..=100.
    pub async fn get_version_history(
        &self,
        collection_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<VersionPage> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        self.store.list(collection_id, limit, offset).await
    }

    pub async fn get_version(
        &self,
        collection_id: Uuid,
        by: impl Into<VersionRef>,
    ) -> Result<SchemaVersion> {
        let by = by.into();
        self.store
            .get(collection_id, by)
            .await?
            .ok_or_else(|| match by {
                VersionRef::Number(number) => EngineError::not_found("Version", number),
                VersionRef::Id(id) => EngineError::not_found("Version", id),
            })
    }

    pub async fn get_latest_version(&self, collection_id: Uuid) -> Result<Option<SchemaVersion>> {
        self.store.latest(collection_id).await
    }

    pub async fn compare_versions(
        &self,
        collection_id: Uuid,
        from: i32,
        to: i32,
    ) -> Result<VersionDiff> {
        let from = self.get_version(collection_id, from).await?;
        let to = self.get_version(collection_id, to).await?;
        Ok(VersionDiff::between(&from, &to))
    }

    /// Restore the collection metadata captured in `target` and record the
    /// restoration as a new version. Properties and the physical table are
    /// left alone.
    pub async fn rollback_to_version(
        &self,
        collection_id: Uuid,
        target: i32,
        ctx: &ChangeContext,
    ) -> RollbackOutcome {
        match self.rollback(collection_id, target, ctx).await {
            Ok(version) => {
                info!(
                    "Rolled back collection {} to version {} as version {}",
                    collection_id, target, version.version
                );
                RollbackOutcome::succeeded(version, target)
            }
            Err(e) => {
                error!(
                    "Rollback of collection {} to version {} failed: {}",
                    collection_id, target, e
                );
                RollbackOutcome::failed(target, &e)
            }
        }
    }

    /// Everything happens in one transaction. The collection row is locked
    /// first, so the latest version read here is still the latest when the
    /// rollback version is appended.
    async fn rollback(
        &self,
        collection_id: Uuid,
        target: i32,
        ctx: &ChangeContext,
    ) -> Result<SchemaVersion> {
        let mut client = self.pool.get().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| EngineError::query("begin rollback transaction", e))?;

        if !MetadataStore::lock_collection(&tx, collection_id).await? {
            return Err(EngineError::not_found("Collection", collection_id));
        }

        let Some(latest) = VersionStore::latest_for_update(&tx, collection_id).await? else {
            return Err(EngineError::validation(
                "collection has no versions to rollback to",
            ));
        };
        check_rollback_target(latest.version, target)?;

        let target = VersionStore::get_numbered(&tx, collection_id, target)
            .await?
            .ok_or_else(|| EngineError::not_found("Version", target))?;
        let new = plan_rollback(&latest, &target, ctx)?;

        MetadataStore::apply_collection_metadata(
            &tx,
            collection_id,
            &target.snapshot.collection.metadata,
        )
        .await?;

        let version = VersionStore::insert(&tx, &new).await?;

        tx.commit()
            .await
            .map_err(|e| EngineError::query("commit rollback", e))?;
        Ok(version)
    }

    pub async fn capture_current_snapshot(&self, collection_id: Uuid) -> Result<CollectionSnapshot> {
        let definition = self.metadata.get_definition(collection_id).await?;
        let indexes = self
            .catalog
            .list_indexes(&definition.collection.table_name)
            .await?;

        debug!(
            "Captured snapshot of '{}': {} properties, {} indexes",
            definition.collection.code,
            definition.properties.len(),
            indexes.len()
        );
        Ok(CollectionSnapshot::new(&definition, indexes))
    }

    /// Record version 1 for a collection that has no history yet. A collection
    /// that already has versions returns its latest unchanged.
    pub async fn create_initial_snapshot(
        &self,
        collection_id: Uuid,
        ctx: &ChangeContext,
    ) -> Result<SchemaVersion> {
        if let Some(latest) = self.store.latest(collection_id).await? {
            debug!(
                "Collection {} already has {} version(s)",
                collection_id, latest.version
            );
            return Ok(latest);
        }

        self.record_current(
            collection_id,
            VersionChangeType::Initial,
            Some("Initial snapshot".to_string()),
            ctx,
        )
        .await
    }
}
