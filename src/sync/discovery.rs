//! Brownfield import: turn existing physical tables into collections.

use crate::catalog::CatalogColumn;
use crate::ddl::{is_soft_deleted, is_standard_column};
use crate::governance::validate_identifier;
use crate::metadata::{Collection, CollectionDefinition, OwnerType, Property};
use crate::types::LogicalType;
use serde::Serialize;

/// Prefixes stripped from table names when deriving collection codes
pub const DEFAULT_STRIP_PREFIXES: &[&str] = &["t_", "tbl_", "legacy_"];

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub owner_type: OwnerType,
    pub strip_prefixes: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            owner_type: OwnerType::Custom,
            strip_prefixes: DEFAULT_STRIP_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryFailure {
    pub table_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveryResult {
    /// Codes of the collections created
    pub registered: Vec<String>,
    /// Tables already backed by a collection
    pub skipped: Vec<String>,
    pub failed: Vec<DiscoveryFailure>,
}

/// Strip the first matching prefix, keeping the name when nothing would remain
pub fn derive_code(table_name: &str, strip_prefixes: &[String]) -> String {
    let lowered = table_name.to_lowercase();
    for prefix in strip_prefixes {
        if let Some(rest) = lowered.strip_prefix(prefix.as_str()) {
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    lowered
}

/// `order_lines` -> `Order Lines`
pub fn title_case(code: &str) -> String {
    code.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the collection and properties describing an existing table.
/// Standard and soft-deleted columns are skipped.
pub fn synthesize_collection(
    table_name: &str,
    columns: &[CatalogColumn],
    options: &DiscoveryOptions,
) -> CollectionDefinition {
    let code = derive_code(table_name, &options.strip_prefixes);
    let collection = Collection::new(&code, &title_case(&code), table_name, options.owner_type);

    let properties = columns
        .iter()
        .filter(|c| !is_standard_column(&c.name) && !is_soft_deleted(&c.name))
        .enumerate()
        .map(|(index, column)| {
            let mut property = Property::new(
                collection.id,
                &column.name,
                &title_case(&column.name),
                LogicalType::from_physical(&column.data_type),
                options.owner_type,
                index as i32 + 1,
            );
            property.is_required = !column.is_nullable;
            property
        })
        .collect();

    CollectionDefinition {
        collection,
        properties,
    }
}

/// Naming violations of a synthesized collection and its property codes.
/// Column names are taken as-is, so they can fail the same rules as codes
/// entered by hand.
pub fn naming_errors(definition: &CollectionDefinition) -> Vec<String> {
    let mut errors = validate_identifier("Collection code", &definition.collection.code);
    for property in &definition.properties {
        errors.extend(validate_identifier("Property code", &property.code));
    }
    errors
}
