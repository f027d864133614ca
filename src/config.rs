use std::env;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub sync_interval: Duration,
    pub sync_lock_ttl: Duration,
    pub sync_on_startup: bool,
    pub instance_id: String,
    pub reserved_property_prefix: String,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Build database_url from individual fields or use DATABASE_URL if provided
        let database_url = if let Ok(url) = env::var("DATABASE_URL") {
            url
        } else {
            let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
            let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
            let db_name = env::var("DB_NAME").unwrap_or_else(|_| "postgres".to_string());
            let db_user = env::var("DB_USER").unwrap_or_else(|_| "schema_engine".to_string());
            let db_password = env::var("DB_PASSWORD").unwrap_or_else(|_| "password".to_string());

            // URL-encode password to handle special characters
            let encoded_password = urlencoding::encode(&db_password);

            format!("postgres://{}:{}@{}:{}/{}", db_user, encoded_password, db_host, db_port, db_name)
        };

        let max_connections = env::var("MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let sync_interval_secs: u64 = env::var("SYNC_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let sync_lock_ttl_secs: u64 = env::var("SYNC_LOCK_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        let sync_on_startup = env::var("SYNC_ON_STARTUP")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        // Each process needs a distinct lock holder identity
        let instance_id = env::var("INSTANCE_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("schema-engine-{}", Uuid::new_v4()));

        let reserved_property_prefix =
            env::var("RESERVED_PROPERTY_PREFIX").unwrap_or_else(|_| "x_".to_string());

        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "/var/log/schema-engine".to_string());

        check_sync_timing(sync_interval_secs, sync_lock_ttl_secs)?;

        Ok(Config {
            database_url,
            max_connections,
            sync_interval: Duration::from_secs(sync_interval_secs),
            sync_lock_ttl: Duration::from_secs(sync_lock_ttl_secs),
            sync_on_startup,
            instance_id,
            reserved_property_prefix,
            log_dir,
        })
    }
}

/// A zero TTL would expire the lock as soon as it is taken
fn check_sync_timing(interval_secs: u64, lock_ttl_secs: u64) -> anyhow::Result<()> {
    if interval_secs == 0 {
        anyhow::bail!("SYNC_INTERVAL_SECS must be greater than zero");
    }
    if lock_ttl_secs == 0 {
        anyhow::bail!("SYNC_LOCK_TTL_SECS must be greater than zero");
    }
    Ok(())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
