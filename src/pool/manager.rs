use crate::config::Config;
use crate::error::{describe_pg_error, EngineError, Result};
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::info;

/// Build the engine pool from configuration and verify it with a ping.
pub async fn connect(config: &Config) -> Result<Pool> {
    let pool = create_pool(&config.database_url, config.max_connections)?;

    let client = pool.get().await.map_err(|e| EngineError::ConnectionFailed {
        cause: e.to_string(),
    })?;

    client
        .execute("SELECT 1", &[])
        .await
        .map_err(|e| EngineError::ConnectionFailed {
            cause: format!("Ping failed: {}", describe_pg_error(&e)),
        })?;

    info!("Connected to PostgreSQL (max {} connections)", config.max_connections);

    Ok(pool)
}

pub fn create_pool(database_url: &str, max_size: u32) -> Result<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());

    cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size: max_size.max(1) as usize,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(5)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| EngineError::Internal(format!("Failed to create pool: {}", e)))
}

/// Pool for tests against a live database, with engine tables in place.
/// `None` when TEST_DATABASE_URL is unset, so those tests return early.
#[cfg(test)]
pub(crate) async fn test_pool() -> Option<Pool> {
    use tokio::sync::OnceCell;

    static BOOTSTRAP: OnceCell<()> = OnceCell::const_new();

    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = create_pool(&url, 2).ok()?;
    BOOTSTRAP
        .get_or_init(|| async {
            crate::metadata::ensure_engine_tables(&pool)
                .await
                .expect("engine tables bootstrap");
        })
        .await;
    Some(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_is_lazy() {
        // Pool creation does not open a connection until first checkout
        let pool = create_pool("postgres://user:pw@127.0.0.1:1/none", 0).unwrap();
        assert_eq!(pool.status().max_size, 1);
    }
}
