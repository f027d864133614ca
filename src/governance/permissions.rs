use crate::metadata::OwnerType;
use serde::Serialize;

/// What an ownership tier allows by default
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionPermissions {
    pub owner_type: OwnerType,
    pub can_modify_metadata: bool,
    pub can_add_properties: bool,
    pub can_delete: bool,
    pub delete_requires_approval: bool,
    pub can_modify_schema: bool,
    /// Prefix new custom properties must carry, if any
    pub required_property_prefix: Option<String>,
}

impl CollectionPermissions {
    pub fn for_owner(owner_type: OwnerType, reserved_prefix: &str) -> Self {
        match owner_type {
            OwnerType::System => Self {
                owner_type,
                can_modify_metadata: false,
                can_add_properties: false,
                can_delete: false,
                delete_requires_approval: false,
                can_modify_schema: false,
                required_property_prefix: None,
            },
            OwnerType::Module => Self {
                owner_type,
                can_modify_metadata: true,
                can_add_properties: true,
                can_delete: false,
                delete_requires_approval: true,
                can_modify_schema: false,
                required_property_prefix: Some(reserved_prefix.to_string()),
            },
            OwnerType::Custom => Self {
                owner_type,
                can_modify_metadata: true,
                can_add_properties: true,
                can_delete: true,
                delete_requires_approval: false,
                can_modify_schema: true,
                required_property_prefix: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_table() {
        let system = CollectionPermissions::for_owner(OwnerType::System, "x_");
        assert!(!system.can_modify_metadata);
        assert!(!system.can_add_properties);
        assert!(!system.can_delete);
        assert!(!system.can_modify_schema);

        let module = CollectionPermissions::for_owner(OwnerType::Module, "x_");
        assert!(module.can_modify_metadata);
        assert!(module.can_add_properties);
        assert!(!module.can_delete);
        assert!(module.delete_requires_approval);
        assert!(!module.can_modify_schema);
        assert_eq!(module.required_property_prefix.as_deref(), Some("x_"));

        let custom = CollectionPermissions::for_owner(OwnerType::Custom, "x_");
        assert!(custom.can_modify_metadata && custom.can_add_properties);
        assert!(custom.can_delete && custom.can_modify_schema);
        assert!(custom.required_property_prefix.is_none());
    }
}
