//! PostgreSQL Base Type Conversion Matrix
//!
//! Defines which base type changes are SAFE vs DATALOSS vs INCOMPATIBLE.
//! Governance consults this before allowing a property type change.
//!
//! Classification:
//! - SAFE: listed in the widening table, no data loss
//! - DATALOSS: the reverse direction is a safe widening (truncation, overflow, precision)
//! - INCOMPATIBLE: anything else (casts may fail to parse)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical base type, stripped of length/precision parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    Smallint,
    Integer,
    Bigint,
    Numeric,
    Real,
    DoublePrecision,
    Varchar,
    Text,
    Boolean,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    Uuid,
    Json,
    Jsonb,
}

impl BaseType {
    pub const ALL: [BaseType; 16] = [
        BaseType::Smallint,
        BaseType::Integer,
        BaseType::Bigint,
        BaseType::Numeric,
        BaseType::Real,
        BaseType::DoublePrecision,
        BaseType::Varchar,
        BaseType::Text,
        BaseType::Boolean,
        BaseType::Date,
        BaseType::Time,
        BaseType::Timestamp,
        BaseType::Timestamptz,
        BaseType::Uuid,
        BaseType::Json,
        BaseType::Jsonb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::Smallint => "smallint",
            BaseType::Integer => "integer",
            BaseType::Bigint => "bigint",
            BaseType::Numeric => "numeric",
            BaseType::Real => "real",
            BaseType::DoublePrecision => "double precision",
            BaseType::Varchar => "varchar",
            BaseType::Text => "text",
            BaseType::Boolean => "boolean",
            BaseType::Date => "date",
            BaseType::Time => "time",
            BaseType::Timestamp => "timestamp",
            BaseType::Timestamptz => "timestamptz",
            BaseType::Uuid => "uuid",
            BaseType::Json => "json",
            BaseType::Jsonb => "jsonb",
        }
    }

    /// Parse a catalog or DDL type name (e.g. `character varying(100)`, `INT4`,
    /// `timestamp with time zone`) into its base type.
    pub fn from_sql(type_name: &str) -> Option<BaseType> {
        let normalized = type_name.trim().to_lowercase();
        let base = match normalized.find('(') {
            Some(paren_pos) => normalized[..paren_pos].trim().to_string(),
            None => normalized,
        };

        let parsed = match base.as_str() {
            "smallint" | "int2" | "smallserial" => BaseType::Smallint,
            "integer" | "int" | "int4" | "serial" => BaseType::Integer,
            "bigint" | "int8" | "bigserial" => BaseType::Bigint,
            "numeric" | "decimal" => BaseType::Numeric,
            "real" | "float4" => BaseType::Real,
            "double precision" | "float8" => BaseType::DoublePrecision,
            "varchar" | "character varying" | "char" | "character" | "bpchar" => BaseType::Varchar,
            "text" | "citext" => BaseType::Text,
            "boolean" | "bool" => BaseType::Boolean,
            "date" => BaseType::Date,
            "time" | "time without time zone" | "time with time zone" | "timetz" => BaseType::Time,
            "timestamp" | "timestamp without time zone" => BaseType::Timestamp,
            "timestamptz" | "timestamp with time zone" => BaseType::Timestamptz,
            "uuid" => BaseType::Uuid,
            "json" => BaseType::Json,
            "jsonb" => BaseType::Jsonb,
            _ => return None,
        };

        Some(parsed)
    }

    /// Target base types this type can be converted to without data loss
    pub fn safe_targets(&self) -> &'static [BaseType] {
        use BaseType::*;

        match self {
            // Integer widenings
            Smallint => &[Integer, Bigint, Numeric, Real, DoublePrecision, Varchar, Text],
            Integer => &[Bigint, Numeric, DoublePrecision, Varchar, Text],
            Bigint => &[Numeric, Varchar, Text],

            // Floating point / exact numeric
            Numeric => &[Varchar, Text],
            Real => &[DoublePrecision, Numeric, Varchar, Text],
            DoublePrecision => &[Numeric, Varchar, Text],

            // Strings
            Varchar => &[Text, Varchar],
            Text => &[Text],

            Boolean => &[Varchar, Text],

            // Date/time: widening adds a zero time component or a zone
            Date => &[Timestamp, Timestamptz, Varchar, Text],
            Time => &[Varchar, Text],
            Timestamp => &[Timestamptz, Varchar, Text],
            Timestamptz => &[Varchar, Text],

            Uuid => &[Varchar, Text],

            Json => &[Jsonb, Text],
            Jsonb => &[Json, Text],
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a type conversion check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeCompatibility {
    /// Same base type, no change needed
    Identical,
    /// Safe to change, no data loss
    Safe,
    /// May cause data loss (truncation, overflow, precision loss)
    DataLoss { reason: String },
    /// Types are not convertible without risking parse failures
    Incompatible { reason: String },
}

impl TypeCompatibility {
    pub fn is_safe(&self) -> bool {
        matches!(self, TypeCompatibility::Identical | TypeCompatibility::Safe)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            TypeCompatibility::DataLoss { reason } | TypeCompatibility::Incompatible { reason } => {
                Some(reason)
            }
            _ => None,
        }
    }
}

/// Check whether a base type change is safe
pub fn check_conversion(from: BaseType, to: BaseType) -> TypeCompatibility {
    if from == to {
        return TypeCompatibility::Identical;
    }

    if from.safe_targets().contains(&to) {
        return TypeCompatibility::Safe;
    }

    // Reverse direction is a widening, so this one narrows
    if to.safe_targets().contains(&from) {
        return TypeCompatibility::DataLoss {
            reason: narrowing_reason(from, to),
        };
    }

    TypeCompatibility::Incompatible {
        reason: format!(
            "Converting {} to {} is not in the safe conversion table and may fail to parse existing values",
            from, to
        ),
    }
}

fn narrowing_reason(from: BaseType, to: BaseType) -> String {
    use BaseType::*;

    match (from, to) {
        (Text, _) | (Varchar, _) => format!(
            "Converting {} to {} may fail to parse or truncate existing values",
            from, to
        ),
        (Timestamp, Date) | (Timestamptz, Date) | (Timestamptz, Timestamp) => {
            format!("Converting {} to {} loses time or zone information", from, to)
        }
        (Bigint, _) | (Integer, _) => format!("Converting {} to {} may overflow", from, to),
        _ => format!("Converting {} to {} may lose precision", from, to),
    }
}

/// Format the conversion matrix as a readable string
pub fn format_matrix() -> String {
    let mut output = String::new();

    output.push_str("═══════════════════════════════════════════════════════════════\n");
    output.push_str("              BASE TYPE CONVERSION MATRIX\n");
    output.push_str("═══════════════════════════════════════════════════════════════\n\n");

    output.push_str("SAFE CONVERSIONS (no data loss):\n");
    output.push_str("───────────────────────────────────────────────────────────────\n");

    for from in BaseType::ALL {
        let targets: Vec<&str> = from
            .safe_targets()
            .iter()
            .filter(|t| **t != from)
            .map(|t| t.as_str())
            .collect();
        output.push_str(&format!("  {} → {}\n", from, targets.join(", ")));
    }

    output.push_str("\nEvery other pair is rejected.\n");
    output.push_str("═══════════════════════════════════════════════════════════════\n");

    output
}
