//! Cross-instance lock for drift checks.
//!
//! The lock lives in the singleton sync-state row and is claimed with a
//! conditional UPDATE that must affect exactly one row. A holder that crashes
//! leaves the lock to expire after its TTL.

use crate::error::{EngineError, Result};
use crate::metadata::SYNC_STATE_TABLE;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);

#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Claim the lock if it is free or expired. Returns whether it was claimed.
    async fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<bool>;

    /// Clear the lock if `holder` still owns it
    async fn release(&self, holder: &str) -> Result<()>;
}

pub struct PgLockBackend {
    pool: Pool,
}

impl PgLockBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockBackend for PgLockBackend {
    async fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                &format!(
                    r#"
                    UPDATE {}
                    SET lock_holder = $1,
                        lock_acquired_at = NOW(),
                        lock_expires_at = NOW() + make_interval(secs => $2::float8),
                        updated_at = NOW()
                    WHERE id = 1
                        AND (lock_holder IS NULL OR lock_expires_at < NOW())
                    "#,
                    SYNC_STATE_TABLE
                ),
                &[&holder, &ttl.as_secs_f64()],
            )
            .await
            .map_err(|e| EngineError::query("acquire sync lock", e))?;

        Ok(affected == 1)
    }

    async fn release(&self, holder: &str) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                &format!(
                    r#"
                    UPDATE {}
                    SET lock_holder = NULL,
                        lock_acquired_at = NULL,
                        lock_expires_at = NULL,
                        updated_at = NOW()
                    WHERE id = 1 AND lock_holder = $1
                    "#,
                    SYNC_STATE_TABLE
                ),
                &[&holder],
            )
            .await
            .map_err(|e| EngineError::query("release sync lock", e))?;

        Ok(())
    }
}

/// Held sync lock. Call [`SyncLockGuard::release`]; if the guard is dropped
/// instead (early return, panic) a release is spawned on the runtime.
pub struct SyncLockGuard {
    backend: Arc<dyn LockBackend>,
    holder: String,
    released: bool,
}

impl SyncLockGuard {
    /// `Ok(None)` when another holder owns the lock
    pub async fn acquire(
        backend: Arc<dyn LockBackend>,
        holder: String,
        ttl: Duration,
    ) -> Result<Option<Self>> {
        if !backend.try_acquire(&holder, ttl).await? {
            debug!("Sync lock busy, {} not acquired", holder);
            return Ok(None);
        }

        debug!("Sync lock acquired by {} for {:?}", holder, ttl);
        Ok(Some(Self {
            backend,
            holder,
            released: false,
        }))
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.backend.release(&self.holder).await?;
        debug!("Sync lock released by {}", self.holder);
        Ok(())
    }
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let backend = self.backend.clone();
        let holder = std::mem::take(&mut self.holder);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = backend.release(&holder).await {
                        warn!("Failed to release sync lock held by {}: {}", holder, e);
                    }
                });
            }
            Err(_) => {
                warn!(
                    "No runtime to release sync lock held by {}; it expires with its TTL",
                    holder
                );
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryLockBackend;
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_only_one_holder_at_a_time() {
        let backend: Arc<dyn LockBackend> = Arc::new(MemoryLockBackend::default());

        let first = SyncLockGuard::acquire(backend.clone(), "a".to_string(), DEFAULT_LOCK_TTL)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = SyncLockGuard::acquire(backend.clone(), "b".to_string(), DEFAULT_LOCK_TTL)
            .await
            .unwrap();
        assert!(second.is_none());

        assert_ok!(first.unwrap().release().await);

        let third = SyncLockGuard::acquire(backend.clone(), "b".to_string(), DEFAULT_LOCK_TTL)
            .await
            .unwrap();
        assert!(third.is_some());
        assert_ok!(third.unwrap().release().await);
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_reclaimed() {
        let backend: Arc<dyn LockBackend> = Arc::new(MemoryLockBackend::default());

        let stale = SyncLockGuard::acquire(backend.clone(), "crashed".to_string(), Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        // Simulate a crash: the holder never releases
        std::mem::forget(stale);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let fresh = SyncLockGuard::acquire(backend, "fresh".to_string(), DEFAULT_LOCK_TTL)
            .await
            .unwrap();
        assert!(fresh.is_some());
    }

    #[tokio::test]
    async fn test_dropped_guard_releases() {
        let memory = Arc::new(MemoryLockBackend::default());
        let backend: Arc<dyn LockBackend> = memory.clone();

        {
            let _guard = SyncLockGuard::acquire(backend.clone(), "a".to_string(), DEFAULT_LOCK_TTL)
                .await
                .unwrap()
                .unwrap();
        }

        // Give the spawned release a chance to run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(*memory.releases.lock().unwrap(), vec!["a".to_string()]);
        assert!(SyncLockGuard::acquire(backend, "b".to_string(), DEFAULT_LOCK_TTL)
            .await
            .unwrap()
            .is_some());
    }
}
