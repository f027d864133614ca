//! Schema Engine
//!
//! Metadata-driven schema management for PostgreSQL. Collections and
//! properties are defined as metadata, checked by the governance rules,
//! materialized as audited DDL, versioned as snapshots and continuously
//! compared against the physical catalog.

pub mod catalog;
pub mod config;
pub mod ddl;
pub mod error;
pub mod governance;
pub mod metadata;
pub mod pool;
pub mod sql;
pub mod sync;
pub mod types;
pub mod version;

pub use error::{EngineError, Result};
