//! Catalog Introspector
//!
//! Read-only queries against the PostgreSQL catalog: tables, columns,
//! indexes and nullability. Used by the sync engine, the version engine
//! (index discovery) and the governance NULL probe.

mod introspector;

pub use introspector::{
    CatalogColumn, CatalogIndex, CatalogIntrospector, CatalogSnapshot, SYSTEM_SCHEMAS,
};
