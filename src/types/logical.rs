//! Application-level property types and their physical column mapping.

use crate::error::{EngineError, Result};
use crate::types::conversion::BaseType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical property type as seen by applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Text,
    LongText,
    RichText,
    Integer,
    BigInteger,
    Decimal,
    Currency,
    Percent,
    Boolean,
    Date,
    DateTime,
    Time,
    Email,
    Url,
    Phone,
    Uuid,
    Json,
    Choice,
    MultiChoice,
    Reference,
    MultiReference,
}

/// Concrete column type a logical type materializes as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalType {
    pub sql_type: &'static str,
    pub base: BaseType,
    /// Default applied when the caller supplies none
    pub default: Option<&'static str>,
}

impl LogicalType {
    pub const ALL: [LogicalType; 21] = [
        LogicalType::Text,
        LogicalType::LongText,
        LogicalType::RichText,
        LogicalType::Integer,
        LogicalType::BigInteger,
        LogicalType::Decimal,
        LogicalType::Currency,
        LogicalType::Percent,
        LogicalType::Boolean,
        LogicalType::Date,
        LogicalType::DateTime,
        LogicalType::Time,
        LogicalType::Email,
        LogicalType::Url,
        LogicalType::Phone,
        LogicalType::Uuid,
        LogicalType::Json,
        LogicalType::Choice,
        LogicalType::MultiChoice,
        LogicalType::Reference,
        LogicalType::MultiReference,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            LogicalType::Text => "text",
            LogicalType::LongText => "long_text",
            LogicalType::RichText => "rich_text",
            LogicalType::Integer => "integer",
            LogicalType::BigInteger => "big_integer",
            LogicalType::Decimal => "decimal",
            LogicalType::Currency => "currency",
            LogicalType::Percent => "percent",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::DateTime => "datetime",
            LogicalType::Time => "time",
            LogicalType::Email => "email",
            LogicalType::Url => "url",
            LogicalType::Phone => "phone",
            LogicalType::Uuid => "uuid",
            LogicalType::Json => "json",
            LogicalType::Choice => "choice",
            LogicalType::MultiChoice => "multi_choice",
            LogicalType::Reference => "reference",
            LogicalType::MultiReference => "multi_reference",
        }
    }

    pub fn physical(&self) -> PhysicalType {
        let (sql_type, base, default) = match self {
            LogicalType::Text => ("VARCHAR(255)", BaseType::Varchar, None),
            LogicalType::LongText => ("TEXT", BaseType::Text, None),
            LogicalType::RichText => ("TEXT", BaseType::Text, None),
            LogicalType::Integer => ("INTEGER", BaseType::Integer, None),
            LogicalType::BigInteger => ("BIGINT", BaseType::Bigint, None),
            LogicalType::Decimal => ("NUMERIC(18,6)", BaseType::Numeric, None),
            LogicalType::Currency => ("NUMERIC(19,4)", BaseType::Numeric, None),
            LogicalType::Percent => ("NUMERIC(7,4)", BaseType::Numeric, None),
            LogicalType::Boolean => ("BOOLEAN", BaseType::Boolean, Some("FALSE")),
            LogicalType::Date => ("DATE", BaseType::Date, None),
            LogicalType::DateTime => ("TIMESTAMPTZ", BaseType::Timestamptz, None),
            LogicalType::Time => ("TIME", BaseType::Time, None),
            LogicalType::Email => ("VARCHAR(320)", BaseType::Varchar, None),
            LogicalType::Url => ("VARCHAR(2048)", BaseType::Varchar, None),
            LogicalType::Phone => ("VARCHAR(32)", BaseType::Varchar, None),
            LogicalType::Uuid => ("UUID", BaseType::Uuid, None),
            LogicalType::Json => ("JSONB", BaseType::Jsonb, None),
            LogicalType::Choice => ("VARCHAR(100)", BaseType::Varchar, None),
            LogicalType::MultiChoice => ("JSONB", BaseType::Jsonb, Some("'[]'::jsonb")),
            LogicalType::Reference => ("UUID", BaseType::Uuid, None),
            LogicalType::MultiReference => ("JSONB", BaseType::Jsonb, Some("'[]'::jsonb")),
        };

        PhysicalType {
            sql_type,
            base,
            default,
        }
    }

    pub fn base_type(&self) -> BaseType {
        self.physical().base
    }

    /// Single-row references get a supporting index when materialized
    pub fn is_reference(&self) -> bool {
        matches!(self, LogicalType::Reference)
    }

    /// Best-effort inference from a catalog `data_type`; unresolvable types become text
    pub fn from_physical(data_type: &str) -> LogicalType {
        match BaseType::from_sql(data_type) {
            Some(BaseType::Smallint) | Some(BaseType::Integer) => LogicalType::Integer,
            Some(BaseType::Bigint) => LogicalType::BigInteger,
            Some(BaseType::Numeric) | Some(BaseType::Real) | Some(BaseType::DoublePrecision) => {
                LogicalType::Decimal
            }
            Some(BaseType::Varchar) => LogicalType::Text,
            Some(BaseType::Text) => LogicalType::LongText,
            Some(BaseType::Boolean) => LogicalType::Boolean,
            Some(BaseType::Date) => LogicalType::Date,
            Some(BaseType::Time) => LogicalType::Time,
            Some(BaseType::Timestamp) | Some(BaseType::Timestamptz) => LogicalType::DateTime,
            Some(BaseType::Uuid) => LogicalType::Uuid,
            Some(BaseType::Json) | Some(BaseType::Jsonb) => LogicalType::Json,
            None => LogicalType::Text,
        }
    }

    pub fn valid_codes() -> Vec<&'static str> {
        LogicalType::ALL.iter().map(|t| t.code()).collect()
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LogicalType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_lowercase();
        LogicalType::ALL
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "Unknown property type '{}'. Valid types: {}",
                    s,
                    LogicalType::valid_codes().join(", ")
                ))
            })
    }
}

/// Format the logical type mapping as a readable string
pub fn format_mapping() -> String {
    let mut output = String::new();

    output.push_str("═══════════════════════════════════════════════════════════════\n");
    output.push_str("              LOGICAL TYPE → PHYSICAL COLUMN\n");
    output.push_str("═══════════════════════════════════════════════════════════════\n\n");

    for logical in LogicalType::ALL {
        let physical = logical.physical();
        match physical.default {
            Some(default) => output.push_str(&format!(
                "  {:<16} {} DEFAULT {}\n",
                logical.code(),
                physical.sql_type,
                default
            )),
            None => output.push_str(&format!("  {:<16} {}\n", logical.code(), physical.sql_type)),
        }
    }

    output.push('\n');
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trips_through_from_str() {
        for logical in LogicalType::ALL {
            assert_eq!(logical.code().parse::<LogicalType>().unwrap(), logical);
        }
    }

    #[test]
    fn test_unknown_type_lists_valid_types() {
        let err = "money_bag".parse::<LogicalType>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("money_bag"));
        assert!(message.contains("currency"));
        assert!(message.contains("multi_reference"));
    }

    #[test]
    fn test_physical_mapping() {
        assert_eq!(LogicalType::Currency.physical().sql_type, "NUMERIC(19,4)");
        let multi = LogicalType::MultiReference.physical();
        assert_eq!(multi.sql_type, "JSONB");
        assert_eq!(multi.default, Some("'[]'::jsonb"));
        assert_eq!(LogicalType::RichText.base_type(), BaseType::Text);
    }

    #[test]
    fn test_physical_sql_type_parses_to_declared_base() {
        for logical in LogicalType::ALL {
            let physical = logical.physical();
            assert_eq!(BaseType::from_sql(physical.sql_type), Some(physical.base), "{}", logical);
        }
    }

    #[test]
    fn test_reverse_mapping() {
        assert_eq!(LogicalType::from_physical("character varying"), LogicalType::Text);
        assert_eq!(LogicalType::from_physical("integer"), LogicalType::Integer);
        assert_eq!(
            LogicalType::from_physical("timestamp without time zone"),
            LogicalType::DateTime
        );
        assert_eq!(LogicalType::from_physical("jsonb"), LogicalType::Json);
        assert_eq!(LogicalType::from_physical("tsvector"), LogicalType::Text);
    }

    #[test]
    fn test_only_reference_is_reference() {
        assert!(LogicalType::Reference.is_reference());
        assert!(!LogicalType::MultiReference.is_reference());
        assert!(!LogicalType::Uuid.is_reference());
    }
}
