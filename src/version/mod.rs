//! Version Engine
//!
//! Append-only history of collection snapshots. Each version links to its
//! predecessor; versions are compared structurally and a collection's
//! metadata can be restored from an older one.

mod diff;
mod engine;
mod snapshot;
mod store;

pub use diff::{diff_snapshots, DiffItem, DiffKind, DiffSummary, DiffTarget, VersionDiff};
pub use engine::{
    check_rollback_target, plan_rollback, RollbackOutcome, VersionEngine, DEFAULT_HISTORY_LIMIT,
};
pub use snapshot::{
    CollectionSnapshot, NewVersion, SchemaVersion, SnapshotCollection, VersionChangeType,
    VersionRef,
};
pub use store::{VersionPage, VersionStore};
