use crate::error::{EngineError, Result};
use crate::metadata::SYNC_STATE_TABLE;
use crate::sync::drift::{SyncCheckResult, SyncIssue};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tokio_postgres::Row;
use tracing::debug;

/// The singleton sync-state row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_check_duration_ms: Option<i64>,
    pub last_check_result: Option<String>,
    pub drift_detected: bool,
    pub collections_checked: i32,
    pub tables_checked: i32,
    pub issue_count: i32,
    pub error_count: i32,
    pub warning_count: i32,
    pub drift_details: Vec<SyncIssue>,
    pub lock_holder: Option<String>,
    pub lock_acquired_at: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
}

impl SyncState {
    fn from_row(row: &Row) -> Result<Self> {
        let details: JsonValue = row.get("drift_details");
        Ok(Self {
            last_check_at: row.get("last_check_at"),
            last_check_duration_ms: row.get("last_check_duration_ms"),
            last_check_result: row.get("last_check_result"),
            drift_detected: row.get("drift_detected"),
            collections_checked: row.get("collections_checked"),
            tables_checked: row.get("tables_checked"),
            issue_count: row.get("issue_count"),
            error_count: row.get("error_count"),
            warning_count: row.get("warning_count"),
            drift_details: serde_json::from_value(details)?,
            lock_holder: row.get("lock_holder"),
            lock_acquired_at: row.get("lock_acquired_at"),
            lock_expires_at: row.get("lock_expires_at"),
        })
    }

    /// Held and not yet expired
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        match (&self.lock_holder, self.lock_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockStatus {
    pub locked: bool,
    pub holder: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Aggregated view of the last drift check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSummary {
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_check_result: Option<String>,
    pub drift_detected: bool,
    pub total_issues: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub auto_resolvable: usize,
    pub lock: LockStatus,
}

impl SyncSummary {
    pub fn from_state(state: &SyncState, now: DateTime<Utc>) -> Self {
        let mut by_severity = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        for issue in &state.drift_details {
            *by_severity.entry(issue.severity.to_string()).or_insert(0) += 1;
            *by_type.entry(issue.issue_type.to_string()).or_insert(0) += 1;
        }

        let locked = state.is_locked(now);
        Self {
            last_check_at: state.last_check_at,
            last_check_result: state.last_check_result.clone(),
            drift_detected: state.drift_detected,
            total_issues: state.drift_details.len(),
            by_severity,
            by_type,
            auto_resolvable: state
                .drift_details
                .iter()
                .filter(|i| i.auto_resolvable)
                .count(),
            lock: LockStatus {
                locked,
                holder: if locked { state.lock_holder.clone() } else { None },
                expires_at: if locked { state.lock_expires_at } else { None },
            },
        }
    }
}

#[derive(Clone)]
pub struct SyncStateStore {
    pool: Pool,
}

impl SyncStateStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<SyncState> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT last_check_at, last_check_duration_ms, last_check_result,
                           drift_detected, collections_checked, tables_checked,
                           issue_count, error_count, warning_count, drift_details,
                           lock_holder, lock_acquired_at, lock_expires_at
                    FROM {}
                    WHERE id = 1
                    "#,
                    SYNC_STATE_TABLE
                ),
                &[],
            )
            .await
            .map_err(|e| EngineError::query("get sync state", e))?
            .ok_or_else(|| EngineError::not_found("Sync state", 1))?;

        SyncState::from_row(&row)
    }

    /// Persist the outcome of a completed check. The lock columns are untouched.
    pub async fn record_check(&self, result: &SyncCheckResult) -> Result<()> {
        let details = serde_json::to_value(&result.issues)?;
        let client = self.pool.get().await?;

        client
            .execute(
                &format!(
                    r#"
                    UPDATE {}
                    SET last_check_at = $1,
                        last_check_duration_ms = $2,
                        last_check_result = $3,
                        drift_detected = $4,
                        collections_checked = $5,
                        tables_checked = $6,
                        issue_count = $7,
                        error_count = $8,
                        warning_count = $9,
                        drift_details = $10,
                        updated_at = NOW()
                    WHERE id = 1
                    "#,
                    SYNC_STATE_TABLE
                ),
                &[
                    &result.checked_at,
                    &result.duration_ms,
                    &result.status(),
                    &result.drift_detected,
                    &(result.collections_checked as i32),
                    &(result.tables_checked as i32),
                    &(result.issues.len() as i32),
                    &(result.error_count() as i32),
                    &(result.warning_count() as i32),
                    &details,
                ],
            )
            .await
            .map_err(|e| EngineError::query("record sync check", e))?;

        debug!("Recorded sync check: {}", result.status());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::drift::{Severity, SyncIssueType};
    use chrono::Duration;

    fn issue(issue_type: SyncIssueType, severity: Severity, auto_resolvable: bool) -> SyncIssue {
        SyncIssue {
            issue_type,
            severity,
            auto_resolvable,
            message: String::new(),
            collection_code: None,
            table_name: "t".to_string(),
            column_name: None,
        }
    }

    fn state() -> SyncState {
        SyncState {
            last_check_at: Some(Utc::now()),
            last_check_duration_ms: Some(40),
            last_check_result: Some("drift_errors".to_string()),
            drift_detected: true,
            collections_checked: 3,
            tables_checked: 5,
            issue_count: 3,
            error_count: 1,
            warning_count: 1,
            drift_details: vec![
                issue(SyncIssueType::MissingTable, Severity::Error, true),
                issue(SyncIssueType::OrphanedColumn, Severity::Warning, false),
                issue(SyncIssueType::OrphanedTable, Severity::Info, false),
            ],
            lock_holder: None,
            lock_acquired_at: None,
            lock_expires_at: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = SyncSummary::from_state(&state(), Utc::now());
        assert_eq!(summary.total_issues, 3);
        assert_eq!(summary.by_severity.get("error"), Some(&1));
        assert_eq!(summary.by_severity.get("info"), Some(&1));
        assert_eq!(summary.by_type.get("missing_table"), Some(&1));
        assert_eq!(summary.auto_resolvable, 1);
        assert!(!summary.lock.locked);
    }

    #[test]
    fn test_expired_lock_reported_free() {
        let now = Utc::now();
        let mut held = state();
        held.lock_holder = Some("instance-a".to_string());
        held.lock_acquired_at = Some(now - Duration::minutes(1));
        held.lock_expires_at = Some(now + Duration::minutes(4));
        assert!(held.is_locked(now));
        assert_eq!(
            SyncSummary::from_state(&held, now).lock.holder.as_deref(),
            Some("instance-a")
        );

        held.lock_expires_at = Some(now - Duration::seconds(1));
        assert!(!held.is_locked(now));
        assert!(SyncSummary::from_state(&held, now).lock.holder.is_none());
    }
}
