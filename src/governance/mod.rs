//! Governance Engine
//!
//! Decides whether a collection or property operation may proceed, based on
//! the ownership tier, the actor, naming rules and data-safety gates. It reads
//! metadata and the catalog but never writes. Every violation is collected so
//! a caller sees all reasons at once.

mod engine;
mod gates;
mod lookup;
mod naming;
mod permissions;

pub use engine::{
    CollectionChanges, CollectionOperation, GovernanceEngine, NewCollection, NewProperty,
    PropertyChanges, PropertyOperation,
};
pub use gates::ValidationResult;
pub use lookup::{GovernanceLookup, PgGovernanceLookup};
pub use naming::{is_reserved_word, validate_identifier};
pub use permissions::CollectionPermissions;
