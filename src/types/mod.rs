mod conversion;
mod logical;

pub use conversion::{check_conversion, format_matrix, BaseType, TypeCompatibility};
pub use logical::{format_mapping, LogicalType, PhysicalType};
