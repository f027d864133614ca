//! Collection and property metadata records plus the caller identity that
//! accompanies every mutating call.

use crate::error::{EngineError, Result};
use crate::types::LogicalType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_postgres::Row;
use uuid::Uuid;

/// Ownership tier controlling what may be changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    System,
    Module,
    Custom,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::System => "system",
            OwnerType::Module => "module",
            OwnerType::Custom => "custom",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(OwnerType::System),
            "module" | "platform" => Ok(OwnerType::Module),
            "custom" => Ok(OwnerType::Custom),
            other => Err(EngineError::validation(format!(
                "Unknown owner type '{}'. Valid types: system, module, custom",
                other
            ))),
        }
    }
}

/// Who is performing a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    System,
    Migration,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::System => "system",
            ActorType::Migration => "migration",
        }
    }
}

/// Origin recorded on audit entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Api,
    Migration,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSource::Api => "api",
            ChangeSource::Migration => "migration",
        }
    }
}

/// Identity supplied by the orchestrator on every mutating call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeContext {
    pub user_id: Option<Uuid>,
    pub actor_type: ActorType,
}

impl ChangeContext {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            actor_type: ActorType::User,
        }
    }

    pub fn system() -> Self {
        Self {
            user_id: None,
            actor_type: ActorType::System,
        }
    }

    pub fn migration() -> Self {
        Self {
            user_id: None,
            actor_type: ActorType::Migration,
        }
    }

    pub fn is_migration(&self) -> bool {
        self.actor_type == ActorType::Migration
    }

    pub fn change_source(&self) -> ChangeSource {
        match self.actor_type {
            ActorType::Migration => ChangeSource::Migration,
            ActorType::User | ActorType::System => ChangeSource::Api,
        }
    }
}

/// Logical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub table_name: String,
    pub owner_type: OwnerType,
    pub is_extensible: bool,
    pub attachments_enabled: bool,
    pub activity_log_enabled: bool,
    pub audit_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(code: &str, name: &str, table_name: &str, owner_type: OwnerType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            description: None,
            table_name: table_name.to_string(),
            owner_type,
            is_extensible: owner_type != OwnerType::System,
            attachments_enabled: false,
            activity_log_enabled: false,
            audit_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        let owner_type: String = row.get("owner_type");
        Ok(Self {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            description: row.get("description"),
            table_name: row.get("table_name"),
            owner_type: owner_type.parse()?,
            is_extensible: row.get("is_extensible"),
            attachments_enabled: row.get("attachments_enabled"),
            activity_log_enabled: row.get("activity_log_enabled"),
            audit_enabled: row.get("audit_enabled"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    pub fn metadata(&self) -> CollectionMetadata {
        CollectionMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            is_extensible: self.is_extensible,
            attachments_enabled: self.attachments_enabled,
            activity_log_enabled: self.activity_log_enabled,
            audit_enabled: self.audit_enabled,
        }
    }
}

/// The mutable, non-structural fields of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub name: String,
    pub description: Option<String>,
    pub is_extensible: bool,
    pub attachments_enabled: bool,
    pub activity_log_enabled: bool,
    pub audit_enabled: bool,
}

/// Logical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub code: String,
    pub name: String,
    pub property_type: LogicalType,
    pub storage_column: Option<String>,
    pub is_required: bool,
    pub is_unique: bool,
    pub is_indexed: bool,
    pub owner_type: OwnerType,
    pub position: i32,
    pub default_value: Option<String>,
}

impl Property {
    pub fn new(
        collection_id: Uuid,
        code: &str,
        name: &str,
        property_type: LogicalType,
        owner_type: OwnerType,
        position: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection_id,
            code: code.to_string(),
            name: name.to_string(),
            property_type,
            storage_column: Some(code.to_string()),
            is_required: false,
            is_unique: false,
            is_indexed: false,
            owner_type,
            position,
            default_value: None,
        }
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        let property_type: String = row.get("property_type");
        let owner_type: String = row.get("owner_type");
        Ok(Self {
            id: row.get("id"),
            collection_id: row.get("collection_id"),
            code: row.get("code"),
            name: row.get("name"),
            property_type: property_type.parse()?,
            storage_column: row.get("storage_column"),
            is_required: row.get("is_required"),
            is_unique: row.get("is_unique"),
            is_indexed: row.get("is_indexed"),
            owner_type: owner_type.parse()?,
            position: row.get("position"),
            default_value: row.get("default_value"),
        })
    }
}

/// A collection together with its properties ordered by position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDefinition {
    pub collection: Collection,
    pub properties: Vec<Property>,
}

impl CollectionDefinition {
    pub fn property(&self, code: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.code == code)
    }
}
