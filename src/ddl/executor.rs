use crate::ddl::builder::{
    add_column_statements, alter_column_statements, create_table_statements,
    rename_column_statement, soft_delete_column, soft_delete_table, ColumnAlteration, ColumnSpec,
};
use crate::ddl::changelog::{ChangeLogStore, ChangeType, EntityType, SchemaChangeLogEntry};
use crate::error::{describe_pg_error, EngineError, Result};
use crate::metadata::{ChangeContext, CollectionDefinition, MetadataStore, Property};
use chrono::Utc;
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_postgres::Transaction;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableIntent {
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
    pub include_standard_columns: bool,
    /// Metadata rows to insert in the same transaction
    pub register: Option<CollectionDefinition>,
}

impl CreateTableIntent {
    pub fn new(table_name: &str, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns,
            include_standard_columns: true,
            register: None,
        }
    }

    /// Intent that materializes a collection and registers its metadata
    pub fn for_definition(definition: CollectionDefinition) -> Self {
        let columns = definition
            .properties
            .iter()
            .map(ColumnSpec::from_property)
            .collect();
        Self {
            table_name: definition.collection.table_name.clone(),
            columns,
            include_standard_columns: true,
            register: Some(definition),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropTableIntent {
    pub table_name: String,
    /// Collection row removed after the rename succeeds
    pub collection_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddColumnIntent {
    pub table_name: String,
    pub column: ColumnSpec,
    pub register: Option<Property>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropColumnIntent {
    pub table_name: String,
    pub column_name: String,
    /// Property row removed after the rename succeeds
    pub property_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlterColumnIntent {
    pub table_name: String,
    pub column_name: String,
    pub alteration: ColumnAlteration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameColumnIntent {
    pub table_name: String,
    pub from: String,
    pub to: String,
    pub property_id: Option<Uuid>,
}

/// Result of a DDL operation. Failures are data, not errors.
#[must_use = "a DDL outcome may carry a failure that must be handled"]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DdlOutcome {
    pub success: bool,
    pub ddl_statements: Vec<String>,
    pub error: Option<String>,
}

impl DdlOutcome {
    fn succeeded(ddl_statements: Vec<String>) -> Self {
        Self {
            success: true,
            ddl_statements,
            error: None,
        }
    }

    fn failed(ddl_statements: Vec<String>, error: String) -> Self {
        Self {
            success: false,
            ddl_statements,
            error: Some(error),
        }
    }

    /// Executed statements on success, `EngineError::Execution` otherwise
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.success {
            Ok(self.ddl_statements)
        } else {
            Err(EngineError::Execution {
                executed: self.ddl_statements,
                cause: self.error.unwrap_or_else(|| "unknown failure".to_string()),
            })
        }
    }
}

/// Metadata row changes applied after the DDL, inside the same transaction
#[derive(Debug, Clone)]
enum MetadataWrite {
    Register(CollectionDefinition),
    AddProperty(Property),
    RenameProperty { property_id: Uuid, column: String },
    DeleteCollection(Uuid),
    DeleteProperty(Uuid),
}

impl MetadataWrite {
    async fn apply(&self, tx: &Transaction<'_>) -> Result<()> {
        match self {
            MetadataWrite::Register(definition) => {
                MetadataStore::insert_collection(tx, &definition.collection).await?;
                for property in &definition.properties {
                    MetadataStore::insert_property(tx, property).await?;
                }
            }
            MetadataWrite::AddProperty(property) => {
                MetadataStore::insert_property(tx, property).await?;
            }
            MetadataWrite::RenameProperty {
                property_id,
                column,
            } => {
                MetadataStore::rename_storage_column(tx, *property_id, column).await?;
            }
            MetadataWrite::DeleteCollection(id) => {
                MetadataStore::delete_collection(tx, *id).await?;
            }
            MetadataWrite::DeleteProperty(id) => {
                MetadataStore::delete_property(tx, *id).await?;
            }
        }
        Ok(())
    }
}

/// Everything an operation will do, computed before touching the database
#[derive(Debug, Clone)]
struct DdlPlan {
    statements: Vec<String>,
    metadata: Vec<MetadataWrite>,
    audit: SchemaChangeLogEntry,
}

fn plan_create_table(intent: &CreateTableIntent, ctx: &ChangeContext) -> Result<DdlPlan> {
    let statements = create_table_statements(
        &intent.table_name,
        &intent.columns,
        intent.include_standard_columns,
    )?;

    let entity_id = intent.register.as_ref().map(|d| d.collection.id);
    let after = serde_json::to_value(intent)?;

    Ok(DdlPlan {
        statements,
        metadata: intent
            .register
            .clone()
            .map(MetadataWrite::Register)
            .into_iter()
            .collect(),
        audit: SchemaChangeLogEntry::new(
            EntityType::Collection,
            &intent.table_name,
            ChangeType::Create,
            ctx,
        )
        .with_entity_id(entity_id)
        .with_states(None, Some(after)),
    })
}

fn plan_drop_table(intent: &DropTableIntent, ctx: &ChangeContext, timestamp_millis: i64) -> DdlPlan {
    let soft = soft_delete_table(&intent.table_name, timestamp_millis);

    DdlPlan {
        statements: soft.statements,
        metadata: intent
            .collection_id
            .map(MetadataWrite::DeleteCollection)
            .into_iter()
            .collect(),
        audit: SchemaChangeLogEntry::new(
            EntityType::Collection,
            &intent.table_name,
            ChangeType::Delete,
            ctx,
        )
        .with_entity_id(intent.collection_id)
        .with_states(
            Some(json!({ "table_name": intent.table_name })),
            Some(json!({ "table_name": soft.renamed_to })),
        )
        .with_recovery(soft.recovery),
    }
}

fn plan_add_column(intent: &AddColumnIntent, ctx: &ChangeContext) -> Result<DdlPlan> {
    let after = serde_json::to_value(&intent.column)?;

    Ok(DdlPlan {
        statements: add_column_statements(&intent.table_name, &intent.column),
        metadata: intent
            .register
            .clone()
            .map(MetadataWrite::AddProperty)
            .into_iter()
            .collect(),
        audit: SchemaChangeLogEntry::new(
            EntityType::Property,
            &column_code(&intent.table_name, &intent.column.name),
            ChangeType::Create,
            ctx,
        )
        .with_entity_id(intent.register.as_ref().map(|p| p.id))
        .with_states(None, Some(after)),
    })
}

fn plan_drop_column(
    intent: &DropColumnIntent,
    ctx: &ChangeContext,
    timestamp_millis: i64,
) -> DdlPlan {
    let soft = soft_delete_column(&intent.table_name, &intent.column_name, timestamp_millis);

    DdlPlan {
        statements: soft.statements,
        metadata: intent
            .property_id
            .map(MetadataWrite::DeleteProperty)
            .into_iter()
            .collect(),
        audit: SchemaChangeLogEntry::new(
            EntityType::Property,
            &column_code(&intent.table_name, &intent.column_name),
            ChangeType::Delete,
            ctx,
        )
        .with_entity_id(intent.property_id)
        .with_states(
            Some(json!({ "column_name": intent.column_name })),
            Some(json!({ "column_name": soft.renamed_to })),
        )
        .with_recovery(soft.recovery),
    }
}

fn plan_alter_column(intent: &AlterColumnIntent, ctx: &ChangeContext) -> Result<DdlPlan> {
    Ok(DdlPlan {
        statements: alter_column_statements(
            &intent.table_name,
            &intent.column_name,
            &intent.alteration,
        ),
        metadata: Vec::new(),
        audit: SchemaChangeLogEntry::new(
            EntityType::Property,
            &column_code(&intent.table_name, &intent.column_name),
            ChangeType::Update,
            ctx,
        )
        .with_states(None, Some(serde_json::to_value(&intent.alteration)?)),
    })
}

fn plan_rename_column(intent: &RenameColumnIntent, ctx: &ChangeContext) -> DdlPlan {
    DdlPlan {
        statements: vec![rename_column_statement(
            &intent.table_name,
            &intent.from,
            &intent.to,
        )],
        metadata: intent
            .property_id
            .map(|property_id| MetadataWrite::RenameProperty {
                property_id,
                column: intent.to.clone(),
            })
            .into_iter()
            .collect(),
        audit: SchemaChangeLogEntry::new(
            EntityType::Property,
            &column_code(&intent.table_name, &intent.from),
            ChangeType::Update,
            ctx,
        )
        .with_entity_id(intent.property_id)
        .with_states(
            Some(json!({ "column_name": intent.from })),
            Some(json!({ "column_name": intent.to })),
        )
        .with_recovery(rename_column_statement(
            &intent.table_name,
            &intent.to,
            &intent.from,
        )),
    }
}

fn column_code(table: &str, column: &str) -> String {
    format!("{}.{}", table, column)
}

/// Runs structural changes, one transaction per operation, with an audit row.
/// Nothing is retried.
#[derive(Clone)]
pub struct DdlExecutor {
    pool: Pool,
    changelog: ChangeLogStore,
}

impl DdlExecutor {
    pub fn new(pool: Pool) -> Self {
        Self {
            changelog: ChangeLogStore::new(pool.clone()),
            pool,
        }
    }

    pub async fn create_table(&self, intent: &CreateTableIntent, ctx: &ChangeContext) -> DdlOutcome {
        let fallback = SchemaChangeLogEntry::new(
            EntityType::Collection,
            &intent.table_name,
            ChangeType::Create,
            ctx,
        );
        self.run_planned(plan_create_table(intent, ctx), fallback).await
    }

    /// Soft delete: the table is renamed, never dropped
    pub async fn drop_table(&self, intent: &DropTableIntent, ctx: &ChangeContext) -> DdlOutcome {
        self.run(plan_drop_table(intent, ctx, Utc::now().timestamp_millis()))
            .await
    }

    pub async fn add_column(&self, intent: &AddColumnIntent, ctx: &ChangeContext) -> DdlOutcome {
        let fallback = SchemaChangeLogEntry::new(
            EntityType::Property,
            &column_code(&intent.table_name, &intent.column.name),
            ChangeType::Create,
            ctx,
        );
        self.run_planned(plan_add_column(intent, ctx), fallback).await
    }

    /// Soft delete: the column is renamed, never dropped
    pub async fn drop_column(&self, intent: &DropColumnIntent, ctx: &ChangeContext) -> DdlOutcome {
        self.run(plan_drop_column(intent, ctx, Utc::now().timestamp_millis()))
            .await
    }

    pub async fn alter_column(&self, intent: &AlterColumnIntent, ctx: &ChangeContext) -> DdlOutcome {
        let fallback = SchemaChangeLogEntry::new(
            EntityType::Property,
            &column_code(&intent.table_name, &intent.column_name),
            ChangeType::Update,
            ctx,
        );
        self.run_planned(plan_alter_column(intent, ctx), fallback).await
    }

    pub async fn rename_column(&self, intent: &RenameColumnIntent, ctx: &ChangeContext) -> DdlOutcome {
        self.run(plan_rename_column(intent, ctx)).await
    }

    async fn run_planned(
        &self,
        plan: Result<DdlPlan>,
        fallback: SchemaChangeLogEntry,
    ) -> DdlOutcome {
        match plan {
            Ok(plan) => self.run(plan).await,
            Err(e) => {
                let message = e.to_string();
                warn!("DDL planning failed for '{}': {}", fallback.entity_code, message);
                self.record_failure(fallback.failed(&[], &message)).await;
                DdlOutcome::failed(Vec::new(), message)
            }
        }
    }

    async fn run(&self, plan: DdlPlan) -> DdlOutcome {
        let mut executed = Vec::new();

        match self.execute(&plan, &mut executed).await {
            Ok(()) => {
                info!(
                    "{} {} '{}': {} statement(s) committed",
                    plan.audit.change_type,
                    plan.audit.entity_type,
                    plan.audit.entity_code,
                    executed.len()
                );
                DdlOutcome::succeeded(executed)
            }
            Err(e) => {
                let message = match &e {
                    EngineError::Execution { cause, .. } => cause.clone(),
                    other => other.to_string(),
                };
                error!(
                    "{} {} '{}' rolled back: {}",
                    plan.audit.change_type, plan.audit.entity_type, plan.audit.entity_code, message
                );
                self.record_failure(plan.audit.failed(&executed, &message))
                    .await;
                DdlOutcome::failed(executed, message)
            }
        }
    }

    /// DDL, then metadata, then the audit row, then commit.
    /// Returning early drops the transaction, which rolls it back.
    async fn execute(&self, plan: &DdlPlan, executed: &mut Vec<String>) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| EngineError::query("begin DDL transaction", e))?;

        for statement in &plan.statements {
            debug!("Executing DDL: {}", statement);
            tx.batch_execute(statement)
                .await
                .map_err(|e| EngineError::Execution {
                    executed: executed.clone(),
                    cause: describe_pg_error(&e),
                })?;
            executed.push(statement.clone());
        }

        for write in &plan.metadata {
            write.apply(&tx).await?;
        }

        let entry = plan.audit.clone().succeeded(executed);
        ChangeLogStore::insert(&tx, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| EngineError::query("commit DDL transaction", e))
    }

    /// Best effort: a failed audit write is logged and never replaces the original error
    async fn record_failure(&self, entry: SchemaChangeLogEntry) {
        if let Err(e) = self.changelog.record(&entry).await {
            warn!(
                "Could not record failed {} of '{}' in the change log: {}",
                entry.change_type, entry.entity_code, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Collection, OwnerType};
    use crate::types::LogicalType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_outcome_into_result() {
        let ok = DdlOutcome::succeeded(vec!["ALTER TABLE \"a\" RENAME TO \"b\"".to_string()]);
        assert_eq!(ok.into_result().unwrap().len(), 1);

        let failed = DdlOutcome::failed(
            vec!["CREATE TABLE \"t\" ()".to_string()],
            "relation \"t_idx\" already exists".to_string(),
        );
        match failed.into_result() {
            Err(EngineError::Execution { executed, cause }) => {
                assert_eq!(executed.len(), 1);
                assert!(cause.contains("already exists"));
            }
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_table_plan_registers_metadata() {
        let collection = Collection::new("orders", "Orders", "orders", OwnerType::Custom);
        let mut total = Property::new(
            collection.id,
            "total",
            "Total",
            LogicalType::Currency,
            OwnerType::Custom,
            1,
        );
        total.is_required = true;
        let definition = CollectionDefinition {
            collection: collection.clone(),
            properties: vec![total],
        };

        let plan = plan_create_table(
            &CreateTableIntent::for_definition(definition),
            &ChangeContext::system(),
        )
        .unwrap();

        assert!(plan.statements[0].contains("\"total\" NUMERIC(19,4) NOT NULL"));
        assert_eq!(plan.metadata.len(), 1);
        assert_eq!(plan.audit.entity_type, EntityType::Collection);
        assert_eq!(plan.audit.change_type, ChangeType::Create);
        assert_eq!(plan.audit.entity_id, Some(collection.id));
        assert!(plan.audit.after_state.is_some());
    }

    #[test]
    fn test_create_table_plan_rejects_empty_table() {
        let mut intent = CreateTableIntent::new("empty", Vec::new());
        intent.include_standard_columns = false;
        assert!(plan_create_table(&intent, &ChangeContext::system()).is_err());
    }

    #[test]
    fn test_drop_table_plan_is_a_rename_with_recovery() {
        let collection_id = Uuid::new_v4();
        let plan = plan_drop_table(
            &DropTableIntent {
                table_name: "orders".to_string(),
                collection_id: Some(collection_id),
            },
            &ChangeContext::user(Uuid::new_v4()),
            1_700_000_000_000,
        );

        assert_eq!(plan.statements.len(), 2);
        assert!(plan.statements[0].contains("'_deleted_1700000000000_' || idx.name"));
        assert_eq!(
            plan.statements[1],
            "ALTER TABLE \"orders\" RENAME TO \"_deleted_1700000000000_orders\""
        );
        assert!(plan.statements.iter().all(|s| !s.contains("DROP")));
        assert!(matches!(
            plan.metadata.as_slice(),
            [MetadataWrite::DeleteCollection(id)] if *id == collection_id
        ));
        let recovery = plan.audit.recovery_statement.unwrap();
        assert!(recovery
            .starts_with("ALTER TABLE \"_deleted_1700000000000_orders\" RENAME TO \"orders\";"));
        assert_eq!(plan.audit.change_type, ChangeType::Delete);
    }

    #[test]
    fn test_drop_column_plan() {
        let plan = plan_drop_column(
            &DropColumnIntent {
                table_name: "orders".to_string(),
                column_name: "notes".to_string(),
                property_id: None,
            },
            &ChangeContext::migration(),
            7,
        );

        assert_eq!(plan.statements.len(), 2);
        assert!(plan.statements[0].contains("a.attname = 'notes'"));
        assert_eq!(
            plan.statements[1],
            "ALTER TABLE \"orders\" RENAME COLUMN \"notes\" TO \"_deleted_7_notes\""
        );
        assert!(plan.metadata.is_empty());
        assert_eq!(plan.audit.entity_code, "orders.notes");
        assert!(plan.audit.recovery_statement.is_some());
    }

    #[test]
    fn test_add_reference_column_plan() {
        let plan = plan_add_column(
            &AddColumnIntent {
                table_name: "orders".to_string(),
                column: ColumnSpec::new("customer_id", LogicalType::Reference),
                register: None,
            },
            &ChangeContext::system(),
        )
        .unwrap();

        assert_eq!(plan.statements.len(), 2);
        assert!(plan.statements[1].contains("\"idx_orders_customer_id\""));
    }

    #[test]
    fn test_rename_column_plan_updates_property() {
        let property_id = Uuid::new_v4();
        let plan = plan_rename_column(
            &RenameColumnIntent {
                table_name: "orders".to_string(),
                from: "ref".to_string(),
                to: "reference_code".to_string(),
                property_id: Some(property_id),
            },
            &ChangeContext::migration(),
        );

        assert_eq!(
            plan.statements,
            vec!["ALTER TABLE \"orders\" RENAME COLUMN \"ref\" TO \"reference_code\"".to_string()]
        );
        assert!(matches!(
            plan.metadata.as_slice(),
            [MetadataWrite::RenameProperty { property_id: id, column }]
                if *id == property_id && column == "reference_code"
        ));
    }

    /// Live database tests run only when TEST_DATABASE_URL is set
    mod live {
        use super::*;
        use pretty_assertions::assert_eq;
        use crate::catalog::CatalogIntrospector;
        use crate::ddl::is_soft_deleted;
        use crate::pool::test_pool;
        use crate::sql::quote_ident;

        fn unique_table(base: &str) -> String {
            format!("{}_{}", base, &Uuid::new_v4().simple().to_string()[..12])
        }

        fn definition(table: &str) -> CollectionDefinition {
            let collection = Collection::new(table, "Test", table, OwnerType::Custom);
            let customer = Property::new(
                collection.id,
                "customer_id",
                "Customer",
                LogicalType::Reference,
                OwnerType::Custom,
                1,
            );
            let mut email = Property::new(
                collection.id,
                "email",
                "Email",
                LogicalType::Email,
                OwnerType::Custom,
                2,
            );
            email.is_unique = true;
            CollectionDefinition {
                collection,
                properties: vec![customer, email],
            }
        }

        /// Drop the table and anything soft-deleted from it
        async fn cleanup(pool: &Pool, table: &str) {
            let client = pool.get().await.unwrap();
            let rows = client
                .query(
                    "SELECT tablename::text FROM pg_tables \
                     WHERE tablename = $1 OR tablename LIKE '%\\_' || $1",
                    &[&table],
                )
                .await
                .unwrap();
            for row in rows {
                let name: String = row.get(0);
                client
                    .batch_execute(&format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(&name)))
                    .await
                    .unwrap();
            }
        }

        #[tokio::test]
        async fn test_failed_create_leaves_no_metadata_and_logs_failure() {
            let Some(pool) = test_pool().await else {
                return;
            };
            let table = unique_table("failing");
            let blocker = format!("{}_blocker", table);
            let client = pool.get().await.unwrap();

            // Claim the name of the second statement's index on another table
            client
                .batch_execute(&format!(
                    "CREATE TABLE {blocker} (x INT); CREATE INDEX idx_{table}_created_at ON {blocker} (x)",
                ))
                .await
                .unwrap();

            let definition = definition(&table);
            let collection_id = definition.collection.id;
            let executor = DdlExecutor::new(pool.clone());
            let outcome = executor
                .create_table(
                    &CreateTableIntent::for_definition(definition),
                    &ChangeContext::system(),
                )
                .await;

            assert!(!outcome.success);
            assert_eq!(outcome.ddl_statements.len(), 1);
            let error = outcome.error.unwrap();
            assert!(error.contains("already exists"), "unexpected error: {}", error);

            let metadata = MetadataStore::new(pool.clone());
            assert!(metadata.get_collection(collection_id).await.unwrap().is_none());
            assert!(!CatalogIntrospector::new(pool.clone())
                .table_exists(&table)
                .await
                .unwrap());

            let log = ChangeLogStore::new(pool.clone())
                .list_for_entity(EntityType::Collection, &table, 10)
                .await
                .unwrap();
            assert_eq!(log.len(), 1);
            assert!(!log[0].success);
            assert!(log[0].error_message.as_deref().unwrap_or("").contains("already exists"));

            client
                .batch_execute(&format!("DROP TABLE {} CASCADE", blocker))
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_table_name_reusable_after_drop() {
            let Some(pool) = test_pool().await else {
                return;
            };
            let table = unique_table("reused");
            let executor = DdlExecutor::new(pool.clone());
            let ctx = ChangeContext::system();

            let first = definition(&table);
            let outcome = executor
                .create_table(&CreateTableIntent::for_definition(first.clone()), &ctx)
                .await;
            assert!(outcome.success, "{:?}", outcome.error);

            let dropped = executor
                .drop_table(
                    &DropTableIntent {
                        table_name: table.clone(),
                        collection_id: Some(first.collection.id),
                    },
                    &ctx,
                )
                .await;
            assert!(dropped.success, "{:?}", dropped.error);

            let again = executor
                .create_table(&CreateTableIntent::for_definition(definition(&table)), &ctx)
                .await;
            assert!(again.success, "{:?}", again.error);

            let indexes = CatalogIntrospector::new(pool.clone())
                .list_indexes(&table)
                .await
                .unwrap();
            assert!(indexes
                .iter()
                .any(|i| i.name == format!("idx_{}_customer_id", table)));

            cleanup(&pool, &table).await;
        }

        #[tokio::test]
        async fn test_column_name_reusable_after_drop() {
            let Some(pool) = test_pool().await else {
                return;
            };
            let table = unique_table("columns");
            let executor = DdlExecutor::new(pool.clone());
            let ctx = ChangeContext::system();

            let intent = CreateTableIntent::new(&table, Vec::new());
            assert!(executor.create_table(&intent, &ctx).await.success);

            let add = AddColumnIntent {
                table_name: table.clone(),
                column: ColumnSpec::new("owner_id", LogicalType::Reference),
                register: None,
            };
            let added = executor.add_column(&add, &ctx).await;
            assert!(added.success, "{:?}", added.error);

            let dropped = executor
                .drop_column(
                    &DropColumnIntent {
                        table_name: table.clone(),
                        column_name: "owner_id".to_string(),
                        property_id: None,
                    },
                    &ctx,
                )
                .await;
            assert!(dropped.success, "{:?}", dropped.error);

            let readded = executor.add_column(&add, &ctx).await;
            assert!(readded.success, "{:?}", readded.error);

            // Indexes not covering the column keep their names
            let indexes = CatalogIntrospector::new(pool.clone())
                .list_indexes(&table)
                .await
                .unwrap();
            assert!(indexes
                .iter()
                .any(|i| i.name == format!("idx_{}_created_at", table)));
            assert_eq!(
                indexes.iter().filter(|i| is_soft_deleted(&i.name)).count(),
                1
            );

            cleanup(&pool, &table).await;
        }
    }
}
