//! Sync Engine
//!
//! Detects drift between collection metadata and the physical catalog and
//! imports existing tables as collections. Checks are serialized across
//! instances by a lock in the sync-state row.

mod discovery;
mod drift;
mod engine;
mod lock;
mod scheduler;
mod state;

pub use discovery::{
    derive_code, synthesize_collection, title_case, DiscoveryFailure, DiscoveryOptions,
    DiscoveryResult, DEFAULT_STRIP_PREFIXES,
};
pub use drift::{detect_drift, Severity, SyncCheckResult, SyncIssue, SyncIssueType};
pub use engine::SyncEngine;
pub use lock::{LockBackend, PgLockBackend, SyncLockGuard, DEFAULT_LOCK_TTL};
pub use scheduler::SyncScheduler;
pub use state::{LockStatus, SyncState, SyncStateStore, SyncSummary};
