use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::{Action, Permission, Principal, Resource};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny { required: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Role → permission mapping.
///
/// Only elevated roles (super_admin, admin, manager) can change on-hand
/// quantities. Unknown roles grant nothing.
pub fn permissions_for_role(role: &str) -> Vec<Permission> {
    match role.to_ascii_lowercase().as_str() {
        "super_admin" | "admin" => vec![Permission::WILDCARD],
        "manager" => vec![
            Permission::new("inventory.read"),
            Permission::new("inventory.manage"),
            Permission::new("inventory.adjust"),
            Permission::new("inventory.reserve"),
            Permission::new("inventory.audit"),
            Permission::new("catalog.write"),
        ],
        "staff" => vec![
            Permission::new("inventory.read"),
            Permission::new("inventory.reserve"),
        ],
        "viewer" => vec![Permission::new("inventory.read")],
        _ => Vec::new(),
    }
}

/// Check a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<Permission> = principal
        .roles
        .iter()
        .flat_map(|r| permissions_for_role(r.as_str()))
        .collect();

    if perms.contains(&Permission::WILDCARD) || perms.contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Single policy entry point: may `principal` perform `action` on `resource`?
///
/// Every boundary operation goes through this instead of inlining role checks.
pub fn evaluate(principal: &Principal, resource: Resource, action: Action) -> Decision {
    let required = Permission::for_action(resource, action);
    match authorize(principal, &required) {
        Ok(()) => Decision::Allow,
        Err(AuthzError::Forbidden(required)) => {
            tracing::debug!(
                user_id = %principal.user_id,
                permission = %required,
                "authorization denied"
            );
            Decision::Deny { required }
        }
    }
}
