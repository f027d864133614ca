//! Safety gates applied to update and delete operations.
//!
//! Each gate appends to a [`ValidationResult`] instead of returning early so a
//! caller sees every reason an operation is refused.

use crate::error::{EngineError, Result};
use crate::metadata::{ChangeContext, OwnerType};
use crate::types::{check_conversion, LogicalType, TypeCompatibility};
use serde::Serialize;

/// Outcome of a governance decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub allowed: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            allowed: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.allowed = false;
    }

    pub fn extend_errors(&mut self, messages: impl IntoIterator<Item = String>) {
        for message in messages {
            self.error(message);
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Convert a denial into `EngineError::PermissionDenied` carrying every error.
    /// On success the warnings are handed back to the caller.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.allowed {
            Ok(self.warnings)
        } else {
            Err(EngineError::PermissionDenied {
                reasons: self.errors,
            })
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete gate: system never, module only with approval, custom with a warning
pub fn check_delete(
    result: &mut ValidationResult,
    entity: &str,
    owner_type: OwnerType,
    explicit_approval: bool,
) {
    match owner_type {
        OwnerType::System => {
            result.error(format!("System-owned {} cannot be deleted", entity));
        }
        OwnerType::Module if !explicit_approval => {
            result.error(format!(
                "Module-owned {} can only be deleted with explicit approval",
                entity
            ));
        }
        OwnerType::Module => {
            result.warn(format!(
                "Deleting module-owned {} with explicit approval; dependent module features may break",
                entity
            ));
        }
        OwnerType::Custom => {
            result.warn(format!(
                "Deleting {} removes it from active use; data is kept only in the renamed _deleted_ artifact",
                entity
            ));
        }
    }
}

/// Protected fields change only under a migration actor
pub fn check_protected_field(
    result: &mut ValidationResult,
    ctx: &ChangeContext,
    entity: &str,
    field: &str,
    changed: bool,
) {
    if changed && !ctx.is_migration() {
        result.error(format!(
            "{} of {} can only be changed by a migration (actor: {})",
            field,
            entity,
            ctx.actor_type.as_str()
        ));
    }
}

/// Base type change gate. Identical base types pass silently.
pub fn check_type_change(
    result: &mut ValidationResult,
    entity: &str,
    owner_type: OwnerType,
    from: LogicalType,
    to: LogicalType,
) {
    let compatibility = check_conversion(from.base_type(), to.base_type());

    if owner_type == OwnerType::System && compatibility != TypeCompatibility::Identical {
        result.error(format!(
            "Type of system-owned {} cannot be changed from {} to {}",
            entity, from, to
        ));
        return;
    }

    match compatibility {
        TypeCompatibility::Identical | TypeCompatibility::Safe => {}
        TypeCompatibility::DataLoss { reason } | TypeCompatibility::Incompatible { reason } => {
            result.error(format!(
                "Unsafe type change on {} ({} -> {}): {}",
                entity, from, to, reason
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;

    #[test]
    fn test_into_result_carries_every_error() {
        let mut result = ValidationResult::new();
        result.warn("heads up");
        assert_eq!(result.clone().into_result().unwrap(), vec!["heads up".to_string()]);

        result.error("first");
        result.error("second");
        assert!(!result.allowed);

        match result.into_result() {
            Err(EngineError::PermissionDenied { reasons }) => {
                assert_eq!(reasons, vec!["first".to_string(), "second".to_string()]);
            }
            other => panic!("expected permission denied, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_gate_by_tier() {
        for approval in [false, true] {
            let mut system = ValidationResult::new();
            check_delete(&mut system, "collection 'users'", OwnerType::System, approval);
            assert!(!system.allowed);
        }

        let mut module = ValidationResult::new();
        check_delete(&mut module, "collection 'crm_leads'", OwnerType::Module, false);
        assert!(!module.allowed);

        let mut approved = ValidationResult::new();
        check_delete(&mut approved, "collection 'crm_leads'", OwnerType::Module, true);
        assert!(approved.allowed);
        assert_eq!(approved.warnings.len(), 1);

        let mut custom = ValidationResult::new();
        check_delete(&mut custom, "collection 'orders'", OwnerType::Custom, false);
        assert!(custom.allowed);
        assert_eq!(custom.warnings.len(), 1);
    }

    #[test]
    fn test_protected_field_requires_migration() {
        let mut user = ValidationResult::new();
        check_protected_field(&mut user, &ChangeContext::system(), "collection 'orders'", "Code", true);
        assert!(!user.allowed);

        let mut migration = ValidationResult::new();
        check_protected_field(
            &mut migration,
            &ChangeContext::migration(),
            "collection 'orders'",
            "Code",
            true,
        );
        assert!(migration.allowed);

        let mut unchanged = ValidationResult::new();
        check_protected_field(&mut unchanged, &ChangeContext::system(), "collection 'orders'", "Code", false);
        assert!(unchanged.allowed);
    }

    #[test]
    fn test_type_change_follows_conversion_table() {
        // Every logical pair on a custom property agrees with the base table
        for from in LogicalType::ALL {
            for to in LogicalType::ALL {
                let mut result = ValidationResult::new();
                check_type_change(&mut result, "property 'p'", OwnerType::Custom, from, to);
                let expected = check_conversion(from.base_type(), to.base_type()).is_safe();
                assert_eq!(result.allowed, expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_system_type_change_always_rejected() {
        // integer -> big_integer is a safe widening but still refused on system properties
        assert_eq!(
            check_conversion(BaseType::Integer, BaseType::Bigint),
            TypeCompatibility::Safe
        );
        let mut result = ValidationResult::new();
        check_type_change(
            &mut result,
            "property 'status'",
            OwnerType::System,
            LogicalType::Integer,
            LogicalType::BigInteger,
        );
        assert!(!result.allowed);

        // Same base type is not a change
        let mut same = ValidationResult::new();
        check_type_change(
            &mut same,
            "property 'contact'",
            OwnerType::System,
            LogicalType::Email,
            LogicalType::Url,
        );
        assert!(same.allowed);
    }
}
