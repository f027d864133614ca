use crate::error::Result;
use crate::governance::gates::{check_delete, check_protected_field, check_type_change, ValidationResult};
use crate::governance::lookup::GovernanceLookup;
use crate::governance::naming::{validate_identifier, validate_reserved_prefix};
use crate::governance::permissions::CollectionPermissions;
use crate::metadata::{ChangeContext, Collection, OwnerType, Property};
use crate::types::LogicalType;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A collection about to be created
#[derive(Debug, Clone)]
pub struct NewCollection {
    pub code: String,
    pub name: String,
    /// Defaults to the code
    pub table_name: Option<String>,
    pub owner_type: OwnerType,
}

impl NewCollection {
    pub fn table_name(&self) -> &str {
        self.table_name.as_deref().unwrap_or(&self.code)
    }
}

/// Requested collection changes; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct CollectionChanges {
    pub code: Option<String>,
    pub table_name: Option<String>,
    pub owner_type: Option<OwnerType>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_extensible: Option<bool>,
    pub attachments_enabled: Option<bool>,
    pub activity_log_enabled: Option<bool>,
    pub audit_enabled: Option<bool>,
}

impl CollectionChanges {
    fn touches_metadata(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.is_extensible.is_some()
            || self.attachments_enabled.is_some()
            || self.activity_log_enabled.is_some()
            || self.audit_enabled.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum CollectionOperation {
    Create(NewCollection),
    Update {
        existing: Collection,
        changes: CollectionChanges,
    },
    Delete {
        existing: Collection,
        explicit_approval: bool,
    },
}

/// A property about to be added to a collection
#[derive(Debug, Clone)]
pub struct NewProperty {
    pub code: String,
    pub name: String,
    pub property_type: LogicalType,
    pub owner_type: OwnerType,
    /// Defaults to the code
    pub storage_column: Option<String>,
    pub is_required: bool,
    pub default_value: Option<String>,
}

impl NewProperty {
    pub fn storage_column(&self) -> &str {
        self.storage_column.as_deref().unwrap_or(&self.code)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PropertyChanges {
    pub code: Option<String>,
    pub storage_column: Option<String>,
    pub owner_type: Option<OwnerType>,
    pub name: Option<String>,
    pub property_type: Option<LogicalType>,
    pub is_required: Option<bool>,
    pub is_unique: Option<bool>,
    pub is_indexed: Option<bool>,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone)]
pub enum PropertyOperation {
    Create {
        collection: Collection,
        property: NewProperty,
    },
    Update {
        collection: Collection,
        existing: Property,
        changes: PropertyChanges,
    },
    Delete {
        collection: Collection,
        existing: Property,
        explicit_approval: bool,
    },
}

/// Decides whether metadata operations may proceed. Never writes.
#[derive(Clone)]
pub struct GovernanceEngine {
    lookup: Arc<dyn GovernanceLookup>,
    reserved_prefix: String,
}

impl GovernanceEngine {
    pub fn new(lookup: Arc<dyn GovernanceLookup>, reserved_prefix: impl Into<String>) -> Self {
        Self {
            lookup,
            reserved_prefix: reserved_prefix.into(),
        }
    }

    pub fn get_collection_permissions(&self, collection: &Collection) -> CollectionPermissions {
        CollectionPermissions::for_owner(collection.owner_type, &self.reserved_prefix)
    }

    pub async fn is_collection_code_available(&self, code: &str) -> Result<bool> {
        Ok(!self.lookup.collection_code_exists(code).await?)
    }

    pub async fn is_table_name_available(&self, table_name: &str) -> Result<bool> {
        Ok(!self.lookup.table_name_taken(table_name).await?)
    }

    pub async fn is_property_code_available(&self, collection_id: Uuid, code: &str) -> Result<bool> {
        Ok(!self.lookup.property_code_exists(collection_id, code).await?)
    }

    /// Naming rules plus availability of a collection code
    pub async fn validate_collection_code(&self, code: &str) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.extend_errors(validate_identifier("Collection code", code));

        match self.is_collection_code_available(code).await {
            Ok(true) => {}
            Ok(false) => result.error(format!("Collection code '{}' is already in use", code)),
            Err(e) => result.error(format!("Could not check collection code '{}': {}", code, e)),
        }

        result
    }

    /// Naming rules, the module prefix rule and availability of a property code
    pub async fn validate_property_code(
        &self,
        collection: &Collection,
        code: &str,
        owner_type: OwnerType,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.extend_errors(validate_identifier("Property code", code));

        if collection.owner_type == OwnerType::Module && owner_type == OwnerType::Custom {
            if let Some(error) = validate_reserved_prefix("Property code", code, &self.reserved_prefix) {
                result.error(error);
            }
        }

        self.check_property_available(&mut result, collection, code).await;
        result
    }

    pub async fn validate_collection_operation(
        &self,
        op: &CollectionOperation,
        ctx: &ChangeContext,
    ) -> ValidationResult {
        let result = match op {
            CollectionOperation::Create(new) => self.validate_collection_create(new).await,
            CollectionOperation::Update { existing, changes } => {
                self.validate_collection_update(existing, changes, ctx).await
            }
            CollectionOperation::Delete {
                existing,
                explicit_approval,
            } => {
                let mut result = ValidationResult::new();
                check_delete(
                    &mut result,
                    &format!("collection '{}'", existing.code),
                    existing.owner_type,
                    *explicit_approval,
                );
                result
            }
        };

        log_decision("collection", &result);
        result
    }

    pub async fn validate_property_operation(
        &self,
        op: &PropertyOperation,
        ctx: &ChangeContext,
    ) -> ValidationResult {
        let result = match op {
            PropertyOperation::Create {
                collection,
                property,
            } => self.validate_property_create(collection, property, ctx).await,
            PropertyOperation::Update {
                collection,
                existing,
                changes,
            } => {
                self.validate_property_update(collection, existing, changes, ctx)
                    .await
            }
            PropertyOperation::Delete {
                collection,
                existing,
                explicit_approval,
            } => {
                let mut result = ValidationResult::new();
                check_delete(
                    &mut result,
                    &format!("property '{}' on '{}'", existing.code, collection.code),
                    existing.owner_type,
                    *explicit_approval,
                );
                result
            }
        };

        log_decision("property", &result);
        result
    }

    async fn validate_collection_create(&self, new: &NewCollection) -> ValidationResult {
        let mut result = self.validate_collection_code(&new.code).await;

        if new.name.trim().is_empty() {
            result.error("Collection name is required");
        }

        let table_name = new.table_name();
        if table_name != new.code {
            result.extend_errors(validate_identifier("Table name", table_name));
        }
        self.check_table_available(&mut result, table_name).await;

        result
    }

    async fn validate_collection_update(
        &self,
        existing: &Collection,
        changes: &CollectionChanges,
        ctx: &ChangeContext,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        let entity = format!("collection '{}'", existing.code);

        let new_code = changes.code.as_deref().filter(|c| *c != existing.code);
        let new_table = changes.table_name.as_deref().filter(|t| *t != existing.table_name);
        let new_owner = changes.owner_type.filter(|o| *o != existing.owner_type);

        check_protected_field(&mut result, ctx, &entity, "Code", new_code.is_some());
        check_protected_field(&mut result, ctx, &entity, "Table name", new_table.is_some());
        check_protected_field(&mut result, ctx, &entity, "Owner type", new_owner.is_some());

        // Renames still have to produce legal, free names
        if let Some(code) = new_code {
            let renamed = self.validate_collection_code(code).await;
            result.extend_errors(renamed.errors);
        }
        if let Some(table) = new_table {
            result.extend_errors(validate_identifier("Table name", table));
            self.check_table_available(&mut result, table).await;
        }

        let permissions = self.get_collection_permissions(existing);
        if changes.touches_metadata() && !permissions.can_modify_metadata && !ctx.is_migration() {
            result.error(format!(
                "Metadata of {}-owned {} cannot be modified",
                existing.owner_type, entity
            ));
        }

        if matches!(changes.name.as_deref(), Some(name) if name.trim().is_empty()) {
            result.error("Collection name cannot be empty");
        }

        result
    }

    async fn validate_property_create(
        &self,
        collection: &Collection,
        property: &NewProperty,
        ctx: &ChangeContext,
    ) -> ValidationResult {
        // Only migrations may register system or module properties
        let owner_type = if ctx.is_migration() {
            property.owner_type
        } else {
            OwnerType::Custom
        };
        let mut result = self
            .validate_property_code(collection, &property.code, owner_type)
            .await;

        let column = property.storage_column();
        if column != property.code {
            result.extend_errors(validate_identifier("Storage column", column));
            self.check_property_available(&mut result, collection, column).await;
        }

        if property.name.trim().is_empty() {
            result.error("Property name is required");
        }

        let permissions = self.get_collection_permissions(collection);
        if !ctx.is_migration() {
            if !permissions.can_add_properties {
                result.error(format!(
                    "{}-owned collection '{}' does not accept new properties",
                    collection.owner_type, collection.code
                ));
            } else if !collection.is_extensible {
                result.error(format!("Collection '{}' is not extensible", collection.code));
            }
        }

        if property.is_required && property.default_value.is_none() {
            result.warn(format!(
                "Required property '{}' has no default; adding it fails if '{}' already has rows",
                property.code, collection.table_name
            ));
        }

        result
    }

    async fn validate_property_update(
        &self,
        collection: &Collection,
        existing: &Property,
        changes: &PropertyChanges,
        ctx: &ChangeContext,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        let entity = format!("property '{}' on '{}'", existing.code, collection.code);

        let new_code = changes.code.as_deref().filter(|c| *c != existing.code);
        let new_column = changes
            .storage_column
            .as_deref()
            .filter(|c| Some(*c) != existing.storage_column.as_deref());
        let new_owner = changes.owner_type.filter(|o| *o != existing.owner_type);

        check_protected_field(&mut result, ctx, &entity, "Code", new_code.is_some());
        check_protected_field(&mut result, ctx, &entity, "Storage column", new_column.is_some());
        check_protected_field(&mut result, ctx, &entity, "Owner type", new_owner.is_some());

        for (label, name) in [("Property code", new_code), ("Storage column", new_column)] {
            if let Some(name) = name {
                result.extend_errors(validate_identifier(label, name));
                self.check_property_available(&mut result, collection, name).await;
            }
        }

        let type_change = changes
            .property_type
            .filter(|t| *t != existing.property_type);
        let nullability_change = changes.is_required.filter(|r| *r != existing.is_required);
        let uniqueness_change = changes.is_unique.filter(|u| *u != existing.is_unique);
        let physical_change = nullability_change.is_some() || uniqueness_change.is_some();

        match existing.owner_type {
            OwnerType::System if !ctx.is_migration() => {
                let metadata_change = changes.name.is_some()
                    || type_change.is_some()
                    || changes.default_value.is_some()
                    || changes.is_indexed.is_some()
                    || physical_change;
                if metadata_change {
                    result.error(format!("System-owned {} cannot be modified", entity));
                }
            }
            OwnerType::Module if !ctx.is_migration() => {
                let base_changes = type_change
                    .map(|t| t.base_type() != existing.property_type.base_type())
                    .unwrap_or(false);
                if physical_change || base_changes {
                    result.error(format!(
                        "Physical schema of module-owned {} cannot be changed",
                        entity
                    ));
                }
            }
            _ => {}
        }

        if let Some(to) = type_change {
            check_type_change(
                &mut result,
                &entity,
                existing.owner_type,
                existing.property_type,
                to,
            );
        }

        if nullability_change == Some(true) {
            self.check_not_null(&mut result, collection, existing, changes)
                .await;
        }

        result
    }

    /// NOT NULL gate: a default backfills, otherwise existing NULLs block the change
    async fn check_not_null(
        &self,
        result: &mut ValidationResult,
        collection: &Collection,
        existing: &Property,
        changes: &PropertyChanges,
    ) {
        let column = existing.storage_column.as_deref().unwrap_or(&existing.code);

        // Only a default supplied with this change backfills; the column's
        // current default never applied to rows that are already NULL
        let default = changes
            .default_value
            .as_deref()
            .filter(|d| !d.trim().is_empty());

        if let Some(default) = default {
            result.warn(format!(
                "Existing NULL values in '{}.{}' will be backfilled with {}",
                collection.table_name, column, default
            ));
            return;
        }

        match self
            .lookup
            .column_has_nulls(&collection.table_name, column)
            .await
        {
            Ok(false) => {}
            Ok(true) => result.error(format!(
                "Cannot make '{}.{}' required: column contains NULL values and no default was supplied",
                collection.table_name, column
            )),
            Err(e) => {
                warn!(
                    "NULL probe on {}.{} failed: {}",
                    collection.table_name, column, e
                );
                result.error(format!(
                    "Cannot make '{}.{}' required: NULL check failed: {}",
                    collection.table_name, column, e
                ));
            }
        }
    }

    async fn check_table_available(&self, result: &mut ValidationResult, table_name: &str) {
        match self.is_table_name_available(table_name).await {
            Ok(true) => {}
            Ok(false) => result.error(format!("Table name '{}' is already in use", table_name)),
            Err(e) => result.error(format!("Could not check table name '{}': {}", table_name, e)),
        }
    }

    async fn check_property_available(
        &self,
        result: &mut ValidationResult,
        collection: &Collection,
        code: &str,
    ) {
        match self.is_property_code_available(collection.id, code).await {
            Ok(true) => {}
            Ok(false) => result.error(format!(
                "Property '{}' already exists on collection '{}'",
                code, collection.code
            )),
            Err(e) => result.error(format!("Could not check property '{}': {}", code, e)),
        }
    }
}

fn log_decision(kind: &str, result: &ValidationResult) {
    if result.allowed {
        debug!(
            "Governance allowed {} operation ({} warnings)",
            kind,
            result.warnings.len()
        );
    } else {
        debug!(
            "Governance denied {} operation: {}",
            kind,
            result.errors.join("; ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::types::check_conversion;
    use async_trait::async_trait;
    use std::collections::HashSet;

    #[derive(Default)]
    struct StubLookup {
        codes: HashSet<String>,
        tables: HashSet<String>,
        properties: HashSet<(Uuid, String)>,
        null_columns: HashSet<(String, String)>,
        null_check_fails: bool,
    }

    #[async_trait]
    impl GovernanceLookup for StubLookup {
        async fn collection_code_exists(&self, code: &str) -> Result<bool> {
            Ok(self.codes.contains(code))
        }

        async fn table_name_taken(&self, table_name: &str) -> Result<bool> {
            Ok(self.tables.contains(table_name))
        }

        async fn property_code_exists(&self, collection_id: Uuid, code: &str) -> Result<bool> {
            Ok(self.properties.contains(&(collection_id, code.to_string())))
        }

        async fn column_has_nulls(&self, table: &str, column: &str) -> Result<bool> {
            if self.null_check_fails {
                return Err(EngineError::IntrospectionFailed {
                    target: format!("{}.{}", table, column),
                    cause: "canceling statement due to statement timeout".to_string(),
                });
            }
            Ok(self
                .null_columns
                .contains(&(table.to_string(), column.to_string())))
        }
    }

    fn engine(lookup: StubLookup) -> GovernanceEngine {
        GovernanceEngine::new(Arc::new(lookup), "x_")
    }

    fn collection(code: &str, owner_type: OwnerType) -> Collection {
        Collection::new(code, "Test", code, owner_type)
    }

    fn property(collection: &Collection, code: &str, owner_type: OwnerType) -> Property {
        Property::new(collection.id, code, "Test", LogicalType::Text, owner_type, 1)
    }

    fn user() -> ChangeContext {
        ChangeContext::user(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_create_collection_collects_every_violation() {
        let mut lookup = StubLookup::default();
        lookup.tables.insert("orders".to_string());
        let engine = engine(lookup);

        let op = CollectionOperation::Create(NewCollection {
            code: "Select".to_string(),
            name: " ".to_string(),
            table_name: Some("orders".to_string()),
            owner_type: OwnerType::Custom,
        });

        let result = engine.validate_collection_operation(&op, &user()).await;
        assert!(!result.allowed);
        // bad pattern, empty name, table taken
        assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
    }

    #[tokio::test]
    async fn test_create_collection_conflict() {
        let mut lookup = StubLookup::default();
        lookup.codes.insert("orders".to_string());
        let engine = engine(lookup);

        let result = engine.validate_collection_code("orders").await;
        assert_eq!(
            result.errors,
            vec!["Collection code 'orders' is already in use".to_string()]
        );
        assert!(!engine.is_collection_code_available("orders").await.unwrap());
        assert!(engine.is_collection_code_available("invoices").await.unwrap());
    }

    #[tokio::test]
    async fn test_system_delete_rejected_for_every_actor() {
        let engine = engine(StubLookup::default());
        let users = collection("users_profile", OwnerType::System);

        for ctx in [user(), ChangeContext::system(), ChangeContext::migration()] {
            for explicit_approval in [false, true] {
                let op = CollectionOperation::Delete {
                    existing: users.clone(),
                    explicit_approval,
                };
                assert!(!engine.validate_collection_operation(&op, &ctx).await.allowed);

                let op = PropertyOperation::Delete {
                    collection: users.clone(),
                    existing: property(&users, "email", OwnerType::System),
                    explicit_approval,
                };
                assert!(!engine.validate_property_operation(&op, &ctx).await.allowed);
            }
        }
    }

    #[tokio::test]
    async fn test_module_delete_requires_approval() {
        let engine = engine(StubLookup::default());
        let leads = collection("crm_leads", OwnerType::Module);

        for explicit_approval in [false, true] {
            let op = CollectionOperation::Delete {
                existing: leads.clone(),
                explicit_approval,
            };
            let result = engine.validate_collection_operation(&op, &user()).await;
            assert_eq!(result.allowed, explicit_approval);
        }
    }

    #[tokio::test]
    async fn test_protected_fields_need_migration_actor() {
        let engine = engine(StubLookup::default());
        let orders = collection("orders", OwnerType::Custom);
        let changes = CollectionChanges {
            code: Some("purchase_orders".to_string()),
            owner_type: Some(OwnerType::Module),
            ..Default::default()
        };

        let op = CollectionOperation::Update {
            existing: orders.clone(),
            changes: changes.clone(),
        };
        let denied = engine.validate_collection_operation(&op, &user()).await;
        assert_eq!(denied.errors.len(), 2, "{:?}", denied.errors);

        let allowed = engine
            .validate_collection_operation(&op, &ChangeContext::migration())
            .await;
        assert!(allowed.allowed, "{:?}", allowed.errors);
    }

    #[tokio::test]
    async fn test_system_collection_metadata_is_read_only() {
        let engine = engine(StubLookup::default());
        let op = CollectionOperation::Update {
            existing: collection("users_profile", OwnerType::System),
            changes: CollectionChanges {
                name: Some("People".to_string()),
                ..Default::default()
            },
        };

        assert!(!engine.validate_collection_operation(&op, &user()).await.allowed);
        assert!(
            engine
                .validate_collection_operation(&op, &ChangeContext::migration())
                .await
                .allowed
        );
    }

    #[tokio::test]
    async fn test_module_collection_requires_reserved_prefix() {
        let engine = engine(StubLookup::default());
        let leads = collection("crm_leads", OwnerType::Module);

        let new_property = |code: &str| PropertyOperation::Create {
            collection: leads.clone(),
            property: NewProperty {
                code: code.to_string(),
                name: "Tier".to_string(),
                property_type: LogicalType::Choice,
                owner_type: OwnerType::Custom,
                storage_column: None,
                is_required: false,
                default_value: None,
            },
        };

        let denied = engine
            .validate_property_operation(&new_property("tier"), &user())
            .await;
        assert!(!denied.allowed);
        assert!(denied.errors[0].contains("'x_'"));

        let allowed = engine
            .validate_property_operation(&new_property("x_tier"), &user())
            .await;
        assert!(allowed.allowed, "{:?}", allowed.errors);
    }

    #[tokio::test]
    async fn test_claimed_owner_does_not_skip_reserved_prefix() {
        let engine = engine(StubLookup::default());
        let leads = collection("crm_leads", OwnerType::Module);

        for claimed in [OwnerType::Module, OwnerType::System] {
            let op = PropertyOperation::Create {
                collection: leads.clone(),
                property: NewProperty {
                    code: "tier".to_string(),
                    name: "Tier".to_string(),
                    property_type: LogicalType::Choice,
                    owner_type: claimed,
                    storage_column: None,
                    is_required: false,
                    default_value: None,
                },
            };

            let denied = engine.validate_property_operation(&op, &user()).await;
            assert!(!denied.allowed, "owner {} skipped the prefix rule", claimed);
            assert!(denied.errors[0].contains("'x_'"));

            let migrated = engine
                .validate_property_operation(&op, &ChangeContext::migration())
                .await;
            assert!(migrated.allowed, "{:?}", migrated.errors);
        }
    }

    #[tokio::test]
    async fn test_system_collection_rejects_new_properties() {
        let engine = engine(StubLookup::default());
        let op = PropertyOperation::Create {
            collection: collection("users_profile", OwnerType::System),
            property: NewProperty {
                code: "nickname".to_string(),
                name: "Nickname".to_string(),
                property_type: LogicalType::Text,
                owner_type: OwnerType::Custom,
                storage_column: None,
                is_required: false,
                default_value: None,
            },
        };

        assert!(!engine.validate_property_operation(&op, &user()).await.allowed);
    }

    #[tokio::test]
    async fn test_duplicate_property_code() {
        let orders = collection("orders", OwnerType::Custom);
        let mut lookup = StubLookup::default();
        lookup.properties.insert((orders.id, "status".to_string()));
        let engine = engine(lookup);

        let result = engine
            .validate_property_code(&orders, "status", OwnerType::Custom)
            .await;
        assert_eq!(
            result.errors,
            vec!["Property 'status' already exists on collection 'orders'".to_string()]
        );
    }

    #[tokio::test]
    async fn test_system_property_type_is_read_only() {
        let engine = engine(StubLookup::default());
        let users = collection("users_profile", OwnerType::System);
        let mut email = property(&users, "email", OwnerType::System);
        email.property_type = LogicalType::Email;

        // Same base type, so the conversion itself is safe
        let op = PropertyOperation::Update {
            collection: users,
            existing: email,
            changes: PropertyChanges {
                property_type: Some(LogicalType::Url),
                ..Default::default()
            },
        };

        let denied = engine.validate_property_operation(&op, &user()).await;
        assert!(!denied.allowed);
        assert!(denied.errors[0].contains("System-owned"));

        assert!(
            engine
                .validate_property_operation(&op, &ChangeContext::migration())
                .await
                .allowed
        );
    }

    #[tokio::test]
    async fn test_type_changes_match_conversion_table() {
        let engine = engine(StubLookup::default());
        let orders = collection("orders", OwnerType::Custom);

        for from in LogicalType::ALL {
            for to in LogicalType::ALL {
                let mut existing = property(&orders, "amount", OwnerType::Custom);
                existing.property_type = from;
                let op = PropertyOperation::Update {
                    collection: orders.clone(),
                    existing,
                    changes: PropertyChanges {
                        property_type: Some(to),
                        ..Default::default()
                    },
                };

                let result = engine.validate_property_operation(&op, &user()).await;
                let safe = check_conversion(from.base_type(), to.base_type()).is_safe();
                assert_eq!(result.allowed, safe, "{} -> {}", from, to);
            }
        }
    }

    fn require(orders: &Collection, default_value: Option<&str>) -> PropertyOperation {
        PropertyOperation::Update {
            collection: orders.clone(),
            existing: property(orders, "status", OwnerType::Custom),
            changes: PropertyChanges {
                is_required: Some(true),
                default_value: default_value.map(str::to_string),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_not_null_rejected_only_when_nulls_exist() {
        let orders = collection("orders", OwnerType::Custom);

        let clean = engine(StubLookup::default());
        assert!(clean.validate_property_operation(&require(&orders, None), &user()).await.allowed);

        let mut lookup = StubLookup::default();
        lookup
            .null_columns
            .insert(("orders".to_string(), "status".to_string()));
        let dirty = engine(lookup);

        let result = dirty
            .validate_property_operation(&require(&orders, None), &user())
            .await;
        assert!(!result.allowed);
        assert!(result.errors[0].contains("NULL"));

        // A default always allows it, with a backfill warning
        let result = dirty
            .validate_property_operation(&require(&orders, Some("'draft'")), &user())
            .await;
        assert!(result.allowed);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_default_does_not_backfill() {
        let orders = collection("orders", OwnerType::Custom);
        let mut lookup = StubLookup::default();
        lookup
            .null_columns
            .insert(("orders".to_string(), "status".to_string()));
        let engine = engine(lookup);

        let mut status = property(&orders, "status", OwnerType::Custom);
        status.default_value = Some("draft".to_string());
        let op = PropertyOperation::Update {
            collection: orders.clone(),
            existing: status,
            changes: PropertyChanges {
                is_required: Some(true),
                ..Default::default()
            },
        };

        let result = engine.validate_property_operation(&op, &user()).await;
        assert!(!result.allowed);
        assert!(result.errors[0].contains("no default was supplied"));
    }

    #[tokio::test]
    async fn test_failed_null_check_denies() {
        let orders = collection("orders", OwnerType::Custom);
        let engine = engine(StubLookup {
            null_check_fails: true,
            ..Default::default()
        });

        let result = engine
            .validate_property_operation(&require(&orders, None), &user())
            .await;
        assert!(!result.allowed);
        assert!(result.errors[0].contains("statement timeout"));
    }

    #[tokio::test]
    async fn test_denial_surfaces_as_permission_error() {
        let engine = engine(StubLookup::default());
        let op = CollectionOperation::Delete {
            existing: collection("users_profile", OwnerType::System),
            explicit_approval: true,
        };

        let err = engine
            .validate_collection_operation(&op, &ChangeContext::migration())
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(err.code(), "permission_denied");
        assert!(err.to_string().contains("cannot be deleted"));
    }
}
