use crate::catalog::CatalogIntrospector;
use crate::ddl::{ChangeLogStore, ChangeType, EntityType, SchemaChangeLogEntry};
use crate::error::{EngineError, Result};
use crate::metadata::{ChangeContext, MetadataStore};
use crate::sync::discovery::{
    naming_errors, synthesize_collection, DiscoveryFailure, DiscoveryOptions, DiscoveryResult,
};
use crate::sync::drift::{detect_drift, SyncCheckResult};
use crate::sync::lock::{LockBackend, PgLockBackend, SyncLockGuard, DEFAULT_LOCK_TTL};
use crate::sync::state::{SyncState, SyncStateStore, SyncSummary};
use chrono::Utc;
use deadpool_postgres::Pool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drift detection and table discovery
#[derive(Clone)]
pub struct SyncEngine {
    pool: Pool,
    metadata: MetadataStore,
    catalog: CatalogIntrospector,
    state: SyncStateStore,
    lock: Arc<dyn LockBackend>,
    instance_id: String,
    lock_ttl: Duration,
}

impl SyncEngine {
    pub fn new(pool: Pool, instance_id: impl Into<String>) -> Self {
        Self {
            metadata: MetadataStore::new(pool.clone()),
            catalog: CatalogIntrospector::new(pool.clone()),
            state: SyncStateStore::new(pool.clone()),
            lock: Arc::new(PgLockBackend::new(pool.clone())),
            pool,
            instance_id: instance_id.into(),
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_lock_backend(mut self, lock: Arc<dyn LockBackend>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Run a drift check unless another caller holds the lock, in which case
    /// the result is skipped with zero issues.
    pub async fn perform_drift_check(&self) -> Result<SyncCheckResult> {
        // Unique per run so concurrent in-process callers never release each other's lock
        let holder = format!("{}:{}", self.instance_id, Uuid::new_v4());

        let Some(guard) = SyncLockGuard::acquire(self.lock.clone(), holder, self.lock_ttl).await?
        else {
            info!("Drift check skipped: sync lock held elsewhere");
            return Ok(SyncCheckResult::skipped());
        };

        let outcome = self.check_drift().await;

        if let Err(e) = guard.release().await {
            warn!("Failed to release sync lock: {}", e);
        }

        outcome
    }

    async fn check_drift(&self) -> Result<SyncCheckResult> {
        let started = Instant::now();

        let definitions = self.metadata.list_definitions().await?;
        let catalog = self.catalog.snapshot().await?;
        let issues = detect_drift(&definitions, &catalog);

        let result = SyncCheckResult::completed(
            issues,
            definitions.len(),
            catalog.tables.len(),
            started.elapsed(),
        );
        self.state.record_check(&result).await?;

        if result.error_count() > 0 {
            warn!(
                "Drift check found {} issue(s), {} error(s), in {}ms",
                result.issues.len(),
                result.error_count(),
                result.duration_ms
            );
        } else {
            info!(
                "Drift check found {} issue(s) in {}ms",
                result.issues.len(),
                result.duration_ms
            );
        }

        Ok(result)
    }

    pub async fn get_sync_state(&self) -> Result<SyncState> {
        self.state.get().await
    }

    pub async fn get_sync_summary(&self) -> Result<SyncSummary> {
        let state = self.state.get().await?;
        Ok(SyncSummary::from_state(&state, Utc::now()))
    }

    /// Register existing tables as collections. Each table is handled on its
    /// own; a failure is recorded and the batch continues.
    pub async fn discover_and_register_tables(
        &self,
        table_names: &[String],
        options: &DiscoveryOptions,
        ctx: &ChangeContext,
    ) -> DiscoveryResult {
        let mut result = DiscoveryResult::default();

        for table_name in table_names {
            match self.discover_table(table_name, options, ctx).await {
                Ok(Some(code)) => {
                    info!("Registered table '{}' as collection '{}'", table_name, code);
                    result.registered.push(code);
                }
                Ok(None) => {
                    debug!("Table '{}' already registered, skipping", table_name);
                    result.skipped.push(table_name.clone());
                }
                Err(e) => {
                    warn!("Discovery failed for '{}': {}", table_name, e);
                    result.failed.push(DiscoveryFailure {
                        table_name: table_name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Discovery finished: {} registered, {} skipped, {} failed",
            result.registered.len(),
            result.skipped.len(),
            result.failed.len()
        );
        result
    }

    async fn discover_table(
        &self,
        table_name: &str,
        options: &DiscoveryOptions,
        ctx: &ChangeContext,
    ) -> Result<Option<String>> {
        if self.metadata.table_name_claimed(table_name).await? {
            return Ok(None);
        }

        if !self.catalog.table_exists(table_name).await? {
            return Err(EngineError::not_found("Table", table_name));
        }

        let columns = self.catalog.list_columns(table_name).await?;
        let definition = synthesize_collection(table_name, &columns, options);
        let code = definition.collection.code.clone();

        let errors = naming_errors(&definition);
        if !errors.is_empty() {
            return Err(EngineError::validation(errors.join("; ")));
        }
        if self.metadata.collection_code_exists(&code).await? {
            return Err(EngineError::Conflict {
                message: format!("Collection code '{}' is already in use", code),
            });
        }

        let entry = SchemaChangeLogEntry::new(EntityType::Collection, &code, ChangeType::Create, ctx)
            .with_entity_id(Some(definition.collection.id))
            .with_states(None, Some(serde_json::to_value(&definition)?))
            .succeeded(&[]);

        let mut client = self.pool.get().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| EngineError::query("begin discovery transaction", e))?;

        MetadataStore::insert_collection(&tx, &definition.collection).await?;
        for property in &definition.properties {
            MetadataStore::insert_property(&tx, property).await?;
        }
        ChangeLogStore::insert(&tx, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| EngineError::query("commit discovery", e))?;

        Ok(Some(code))
    }
}
