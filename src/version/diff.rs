//! Structural comparison of two collection snapshots.

use crate::version::snapshot::{CollectionSnapshot, SchemaVersion};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffTarget {
    Collection,
    Property,
    Index,
}

impl fmt::Display for DiffTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiffTarget::Collection => "collection",
            DiffTarget::Property => "property",
            DiffTarget::Index => "index",
        })
    }
}

/// A single difference between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffItem {
    pub kind: DiffKind,
    pub target: DiffTarget,
    /// Property code or index name; the field name for collection changes
    pub name: String,
    /// Changed field, for modifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<JsonValue>,
}

impl DiffItem {
    fn added(target: DiffTarget, name: &str, after: JsonValue) -> Self {
        Self {
            kind: DiffKind::Added,
            target,
            name: name.to_string(),
            field: None,
            description: format!("{} '{}' added", capitalize(target), name),
            before: None,
            after: Some(after),
        }
    }

    fn removed(target: DiffTarget, name: &str, before: JsonValue) -> Self {
        Self {
            kind: DiffKind::Removed,
            target,
            name: name.to_string(),
            field: None,
            description: format!("{} '{}' removed", capitalize(target), name),
            before: Some(before),
            after: None,
        }
    }

    fn modified(
        target: DiffTarget,
        name: &str,
        field: &str,
        description: String,
        before: JsonValue,
        after: JsonValue,
    ) -> Self {
        Self {
            kind: DiffKind::Modified,
            target,
            name: name.to_string(),
            field: Some(field.to_string()),
            description,
            before: Some(before),
            after: Some(after),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub collection_modified: usize,
    pub properties_added: usize,
    pub properties_removed: usize,
    pub properties_modified: usize,
    pub indexes_added: usize,
    pub indexes_removed: usize,
    pub total_changes: usize,
}

impl DiffSummary {
    fn from_items(items: &[DiffItem]) -> Self {
        let mut summary = DiffSummary {
            total_changes: items.len(),
            ..Default::default()
        };
        for item in items {
            let counter = match (item.target, item.kind) {
                (DiffTarget::Collection, _) => &mut summary.collection_modified,
                (DiffTarget::Property, DiffKind::Added) => &mut summary.properties_added,
                (DiffTarget::Property, DiffKind::Removed) => &mut summary.properties_removed,
                (DiffTarget::Property, DiffKind::Modified) => &mut summary.properties_modified,
                (DiffTarget::Index, DiffKind::Added) => &mut summary.indexes_added,
                (DiffTarget::Index, _) => &mut summary.indexes_removed,
            };
            *counter += 1;
        }
        summary
    }
}

/// Differences between two versions of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub collection_id: Uuid,
    pub from_version: i32,
    pub to_version: i32,
    pub from_checksum: String,
    pub to_checksum: String,
    pub changes: Vec<DiffItem>,
    pub summary: DiffSummary,
}

impl VersionDiff {
    pub fn between(from: &SchemaVersion, to: &SchemaVersion) -> Self {
        // Matching checksums mean identical snapshots
        let changes = if from.checksum == to.checksum {
            Vec::new()
        } else {
            diff_snapshots(&from.snapshot, &to.snapshot)
        };

        Self {
            collection_id: to.collection_id,
            from_version: from.version,
            to_version: to.version,
            from_checksum: from.checksum.clone(),
            to_checksum: to.checksum.clone(),
            summary: DiffSummary::from_items(&changes),
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn report(&self) -> String {
        let mut output = String::new();

        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str("                     COLLECTION VERSION DIFF\n");
        output.push_str("═══════════════════════════════════════════════════════════════\n\n");
        output.push_str(&format!(
            "Collection {}: v{} → v{}\n\n",
            self.collection_id, self.from_version, self.to_version
        ));

        if self.changes.is_empty() {
            output.push_str("✓ No differences\n");
            return output;
        }

        for (kind, marker, title) in [
            (DiffKind::Added, "+", "ADDED"),
            (DiffKind::Removed, "✗", "REMOVED"),
            (DiffKind::Modified, "⚠", "MODIFIED"),
        ] {
            let items: Vec<&DiffItem> = self.changes.iter().filter(|c| c.kind == kind).collect();
            if items.is_empty() {
                continue;
            }

            output.push_str(&format!("{} ({}):\n", title, items.len()));
            output.push_str("───────────────────────────────────────────────────────────────\n");
            for item in items {
                output.push_str(&format!("  {} {}\n", marker, item.description));
            }
            output.push('\n');
        }

        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str(&format!("Total: {} change(s)\n", self.summary.total_changes));
        output
    }
}

/// Compare collection fields, then properties by code, then indexes by name.
/// Index shape changes appear as a removal plus an addition.
pub fn diff_snapshots(from: &CollectionSnapshot, to: &CollectionSnapshot) -> Vec<DiffItem> {
    let mut changes = Vec::new();
    diff_collection(from, to, &mut changes);
    diff_properties(from, to, &mut changes);
    diff_indexes(from, to, &mut changes);
    changes
}

fn diff_collection(from: &CollectionSnapshot, to: &CollectionSnapshot, changes: &mut Vec<DiffItem>) {
    let (old, new) = (&from.collection.metadata, &to.collection.metadata);

    if old.name != new.name {
        changes.push(DiffItem::modified(
            DiffTarget::Collection,
            "name",
            "name",
            format!("Collection name changed from '{}' to '{}'", old.name, new.name),
            json!(old.name),
            json!(new.name),
        ));
    }

    if old.description != new.description {
        changes.push(DiffItem::modified(
            DiffTarget::Collection,
            "description",
            "description",
            "Collection description changed".to_string(),
            json!(old.description),
            json!(new.description),
        ));
    }
}

fn diff_properties(from: &CollectionSnapshot, to: &CollectionSnapshot, changes: &mut Vec<DiffItem>) {
    let old_by_code: HashMap<&str, _> = from.properties.iter().map(|p| (p.code.as_str(), p)).collect();
    let new_by_code: HashMap<&str, _> = to.properties.iter().map(|p| (p.code.as_str(), p)).collect();

    for new in &to.properties {
        let code = new.code.as_str();
        let Some(old) = old_by_code.get(code) else {
            changes.push(DiffItem::added(DiffTarget::Property, code, json!(new)));
            continue;
        };

        if old.name != new.name {
            changes.push(DiffItem::modified(
                DiffTarget::Property,
                code,
                "name",
                format!("Property '{}' renamed from '{}' to '{}'", code, old.name, new.name),
                json!(old.name),
                json!(new.name),
            ));
        }
        if old.property_type != new.property_type {
            changes.push(DiffItem::modified(
                DiffTarget::Property,
                code,
                "type",
                format!(
                    "Property '{}' type changed from {} to {}",
                    code, old.property_type, new.property_type
                ),
                json!(old.property_type),
                json!(new.property_type),
            ));
        }
        if old.is_required != new.is_required {
            changes.push(DiffItem::modified(
                DiffTarget::Property,
                code,
                "required",
                format!(
                    "Property '{}' is {} required",
                    code,
                    if new.is_required { "now" } else { "no longer" }
                ),
                json!(old.is_required),
                json!(new.is_required),
            ));
        }
        if old.is_unique != new.is_unique {
            changes.push(DiffItem::modified(
                DiffTarget::Property,
                code,
                "unique",
                format!(
                    "Property '{}' is {} unique",
                    code,
                    if new.is_unique { "now" } else { "no longer" }
                ),
                json!(old.is_unique),
                json!(new.is_unique),
            ));
        }
    }

    for old in &from.properties {
        if !new_by_code.contains_key(old.code.as_str()) {
            changes.push(DiffItem::removed(DiffTarget::Property, &old.code, json!(old)));
        }
    }
}

fn diff_indexes(from: &CollectionSnapshot, to: &CollectionSnapshot, changes: &mut Vec<DiffItem>) {
    let old_names: HashMap<&str, _> = from.indexes.iter().map(|i| (i.name.as_str(), i)).collect();
    let new_names: HashMap<&str, _> = to.indexes.iter().map(|i| (i.name.as_str(), i)).collect();

    for index in &to.indexes {
        if !old_names.contains_key(index.name.as_str()) {
            changes.push(DiffItem::added(DiffTarget::Index, &index.name, json!(index)));
        }
    }
    for index in &from.indexes {
        if !new_names.contains_key(index.name.as_str()) {
            changes.push(DiffItem::removed(DiffTarget::Index, &index.name, json!(index)));
        }
    }
}

fn capitalize(target: DiffTarget) -> &'static str {
    match target {
        DiffTarget::Collection => "Collection",
        DiffTarget::Property => "Property",
        DiffTarget::Index => "Index",
    }
}
