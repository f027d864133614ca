//! Drift detection between collection metadata and the physical catalog.
//!
//! Detection only: issues are reported, never applied.

use crate::catalog::CatalogSnapshot;
use crate::ddl::{is_soft_deleted, is_standard_column};
use crate::metadata::{CollectionDefinition, OwnerType, ENGINE_TABLE_PREFIX};
use crate::types::BaseType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Tables owned by PostgreSQL extensions or migration tools, never reported as orphans
pub const SYSTEM_TABLE_PREFIXES: &[&str] = &[
    ENGINE_TABLE_PREFIX,
    "pg_",
    "sql_",
    "_sqlx_migrations",
    "__diesel_schema_migrations",
    "schema_migrations",
    "spatial_ref_sys",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncIssueType {
    OrphanedTable,
    OrphanedColumn,
    MissingTable,
    MissingColumn,
    TypeMismatch,
    ConstraintMismatch,
}

impl SyncIssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncIssueType::OrphanedTable => "orphaned_table",
            SyncIssueType::OrphanedColumn => "orphaned_column",
            SyncIssueType::MissingTable => "missing_table",
            SyncIssueType::MissingColumn => "missing_column",
            SyncIssueType::TypeMismatch => "type_mismatch",
            SyncIssueType::ConstraintMismatch => "constraint_mismatch",
        }
    }
}

impl fmt::Display for SyncIssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncIssue {
    pub issue_type: SyncIssueType,
    pub severity: Severity,
    pub auto_resolvable: bool,
    pub message: String,
    pub collection_code: Option<String>,
    pub table_name: String,
    pub column_name: Option<String>,
}

/// Outcome of one drift check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCheckResult {
    pub checked_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub drift_detected: bool,
    /// Another instance held the lock; nothing was checked
    pub skipped: bool,
    pub collections_checked: usize,
    pub tables_checked: usize,
    pub issues: Vec<SyncIssue>,
}

impl SyncCheckResult {
    pub fn completed(
        issues: Vec<SyncIssue>,
        collections_checked: usize,
        tables_checked: usize,
        duration: Duration,
    ) -> Self {
        Self {
            checked_at: Utc::now(),
            duration_ms: duration.as_millis() as i64,
            drift_detected: !issues.is_empty(),
            skipped: false,
            collections_checked,
            tables_checked,
            issues,
        }
    }

    /// Lock contention: zero issues and no drift
    pub fn skipped() -> Self {
        Self {
            checked_at: Utc::now(),
            duration_ms: 0,
            drift_detected: false,
            skipped: true,
            collections_checked: 0,
            tables_checked: 0,
            issues: Vec::new(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Short label stored as the last check result
    pub fn status(&self) -> &'static str {
        if self.skipped {
            "skipped"
        } else if self.error_count() > 0 {
            "drift_errors"
        } else if self.drift_detected {
            "drift_warnings"
        } else {
            "clean"
        }
    }

    pub fn report(&self) -> String {
        let mut output = String::new();

        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str("                      SCHEMA DRIFT REPORT\n");
        output.push_str("═══════════════════════════════════════════════════════════════\n\n");

        if self.skipped {
            output.push_str("Check skipped: another instance holds the sync lock.\n");
            return output;
        }

        output.push_str(&format!(
            "Checked {} collection(s) against {} table(s) in {}ms\n\n",
            self.collections_checked, self.tables_checked, self.duration_ms
        ));

        if self.issues.is_empty() {
            output.push_str("No drift detected.\n");
            return output;
        }

        for (severity, marker) in [
            (Severity::Error, "✗"),
            (Severity::Warning, "⚠"),
            (Severity::Info, "ℹ"),
        ] {
            let issues: Vec<&SyncIssue> = self
                .issues
                .iter()
                .filter(|i| i.severity == severity)
                .collect();
            if issues.is_empty() {
                continue;
            }

            output.push_str(&format!(
                "{} ({}):\n",
                severity.as_str().to_uppercase(),
                issues.len()
            ));
            output.push_str("───────────────────────────────────────────────────────────────\n");
            for issue in issues {
                output.push_str(&format!("  {} [{}] {}", marker, issue.issue_type, issue.message));
                if issue.auto_resolvable {
                    output.push_str(" (auto-resolvable)");
                }
                output.push('\n');
            }
            output.push('\n');
        }

        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str(&format!("Result: {}\n", self.status().to_uppercase()));
        output
    }
}

fn is_system_table(table: &str) -> bool {
    SYSTEM_TABLE_PREFIXES.iter().any(|p| table.starts_with(p))
}

/// Compare every collection with the catalog snapshot
pub fn detect_drift(definitions: &[CollectionDefinition], catalog: &CatalogSnapshot) -> Vec<SyncIssue> {
    let mut issues = Vec::new();
    let mut claimed: HashSet<&str> = HashSet::new();

    for definition in definitions {
        let collection = &definition.collection;
        claimed.insert(collection.table_name.as_str());

        let Some(columns) = catalog.columns(&collection.table_name) else {
            issues.push(SyncIssue {
                issue_type: SyncIssueType::MissingTable,
                severity: Severity::Error,
                // System and module tables come from a pending platform migration
                auto_resolvable: collection.owner_type == OwnerType::Custom,
                message: format!(
                    "Table '{}' for collection '{}' does not exist",
                    collection.table_name, collection.code
                ),
                collection_code: Some(collection.code.clone()),
                table_name: collection.table_name.clone(),
                column_name: None,
            });
            continue;
        };

        let mut known: HashSet<&str> = HashSet::new();
        for property in &definition.properties {
            let Some(column_name) = property.storage_column.as_deref() else {
                continue;
            };
            known.insert(column_name);

            let issue = |issue_type, severity, message| SyncIssue {
                issue_type,
                severity,
                auto_resolvable: false,
                message,
                collection_code: Some(collection.code.clone()),
                table_name: collection.table_name.clone(),
                column_name: Some(column_name.to_string()),
            };

            let Some(column) = columns.iter().find(|c| c.name == column_name) else {
                issues.push(issue(
                    SyncIssueType::MissingColumn,
                    Severity::Error,
                    format!(
                        "Column '{}.{}' for property '{}' does not exist",
                        collection.table_name, column_name, property.code
                    ),
                ));
                continue;
            };

            let expected = property.property_type.base_type();
            if let Some(actual) = BaseType::from_sql(&column.data_type) {
                if actual != expected {
                    issues.push(issue(
                        SyncIssueType::TypeMismatch,
                        Severity::Warning,
                        format!(
                            "Column '{}.{}' is {} but property '{}' ({}) expects {}",
                            collection.table_name,
                            column_name,
                            actual,
                            property.code,
                            property.property_type,
                            expected
                        ),
                    ));
                }
            }

            if property.is_required && column.is_nullable {
                issues.push(issue(
                    SyncIssueType::ConstraintMismatch,
                    Severity::Warning,
                    format!(
                        "Property '{}' is required but column '{}.{}' allows NULL",
                        property.code, collection.table_name, column_name
                    ),
                ));
            }
        }

        for column in columns {
            let name = column.name.as_str();
            if is_standard_column(name) || known.contains(name) || is_soft_deleted(name) {
                continue;
            }
            issues.push(SyncIssue {
                issue_type: SyncIssueType::OrphanedColumn,
                severity: Severity::Warning,
                auto_resolvable: false,
                message: format!(
                    "Column '{}.{}' is not described by any property of '{}'",
                    collection.table_name, name, collection.code
                ),
                collection_code: Some(collection.code.clone()),
                table_name: collection.table_name.clone(),
                column_name: Some(name.to_string()),
            });
        }
    }

    for table in catalog.table_names() {
        if claimed.contains(table) || is_system_table(table) || is_soft_deleted(table) {
            continue;
        }
        issues.push(SyncIssue {
            issue_type: SyncIssueType::OrphanedTable,
            severity: Severity::Info,
            auto_resolvable: false,
            message: format!("Table '{}' is not registered as a collection", table),
            collection_code: None,
            table_name: table.to_string(),
            column_name: None,
        });
    }

    issues
}
