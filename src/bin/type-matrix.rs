//! CLI tool to display the logical type mapping and base type conversion matrix
//!
//! Usage:
//!   cargo run --bin type-matrix
//!   cargo run --bin type-matrix -- VARCHAR(100) TEXT
//!   cargo run --bin type-matrix -- currency integer

use schema_engine::types::{check_conversion, format_mapping, format_matrix, BaseType, LogicalType, TypeCompatibility};
use std::env;
use std::process;

/// A SQL type name or a logical type code
fn resolve(arg: &str) -> Option<BaseType> {
    BaseType::from_sql(arg).or_else(|| arg.parse::<LogicalType>().ok().map(|t| t.base_type()))
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() == 3 {
        let (Some(from), Some(to)) = (resolve(&args[1]), resolve(&args[2])) else {
            eprintln!("Unknown type. Valid logical types: {}", LogicalType::valid_codes().join(", "));
            process::exit(3);
        };

        println!("Checking: {} ({}) -> {} ({})", args[1], from, args[2], to);
        println!();

        match check_conversion(from, to) {
            TypeCompatibility::Identical => {
                println!("Result: IDENTICAL");
                println!("  Same base type, no change needed.");
            }
            TypeCompatibility::Safe => {
                println!("Result: SAFE");
                println!("  This type change can be performed without data loss.");
            }
            TypeCompatibility::DataLoss { reason } => {
                println!("Result: DATALOSS");
                println!("  This type change may cause data loss!");
                println!("  Reason: {}", reason);
                process::exit(1);
            }
            TypeCompatibility::Incompatible { reason } => {
                println!("Result: INCOMPATIBLE");
                println!("  These types cannot be converted!");
                println!("  Reason: {}", reason);
                process::exit(2);
            }
        }
    } else if args.len() == 1 {
        print!("{}", format_mapping());
        println!();
        print!("{}", format_matrix());
    } else {
        eprintln!("Usage:");
        eprintln!("  {} <from_type> <to_type>  - Check specific conversion", args[0]);
        eprintln!("  {}                        - Display mapping and matrix", args[0]);
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  {} INTEGER BIGINT", args[0]);
        eprintln!("  {} \"VARCHAR(100)\" TEXT", args[0]);
        eprintln!("  {} currency integer", args[0]);
        process::exit(1);
    }
}
