//! Collection Metadata
//!
//! The engine's own bookkeeping tables and the records stored in them.
//! Every engine table carries the `_schema_` prefix so drift detection and
//! naming validation can recognize them.

mod bootstrap;
mod model;
mod store;

pub use bootstrap::{bootstrap_statements, ensure_engine_tables};
pub use model::{
    ActorType, ChangeContext, ChangeSource, Collection, CollectionDefinition, CollectionMetadata,
    OwnerType, Property,
};
pub use store::MetadataStore;

pub const ENGINE_TABLE_PREFIX: &str = "_schema_";
pub const COLLECTIONS_TABLE: &str = "_schema_collections";
pub const PROPERTIES_TABLE: &str = "_schema_properties";
pub const CHANGE_LOG_TABLE: &str = "_schema_change_log";
pub const VERSIONS_TABLE: &str = "_schema_versions";
pub const SYNC_STATE_TABLE: &str = "_schema_sync_state";
pub const TOUCH_UPDATED_AT_FN: &str = "_schema_touch_updated_at";
