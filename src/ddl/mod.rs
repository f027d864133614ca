//! DDL Executor
//!
//! Materializes structural intents as DDL. Each operation runs in a single
//! transaction together with its audit row; deletes are reversible renames.

mod builder;
mod changelog;
mod executor;

pub use builder::{
    is_soft_deleted, is_standard_column, soft_delete_name, ColumnAlteration, ColumnSpec,
    DELETED_PREFIX, STANDARD_COLUMNS,
};
pub use changelog::{ChangeLogStore, ChangeType, EntityType, SchemaChangeLogEntry};
pub use executor::{
    AddColumnIntent, AlterColumnIntent, CreateTableIntent, DdlExecutor, DdlOutcome,
    DropColumnIntent, DropTableIntent, RenameColumnIntent,
};
