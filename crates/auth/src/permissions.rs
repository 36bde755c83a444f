use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings of the form `"<resource>.<action>"`
/// (e.g. "inventory.adjust"). A special wildcard permission `"*"` grants
/// everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The permission guarding `action` on `resource`.
    pub fn for_action(resource: Resource, action: Action) -> Self {
        Self(Cow::Owned(format!("{}.{}", resource.as_str(), action.as_str())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Protected resource families.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Inventory,
    Catalog,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Inventory => "inventory",
            Resource::Catalog => "catalog",
        }
    }
}

/// Operations a principal can attempt on a resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    /// Open records and edit thresholds.
    Manage,
    /// Change on-hand quantity (adjust, recount, transfer).
    Adjust,
    /// Reserve and release stock.
    Reserve,
    /// Reconcile the movement log.
    Audit,
    Write,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Manage => "manage",
            Action::Adjust => "adjust",
            Action::Reserve => "reserve",
            Action::Audit => "audit",
            Action::Write => "write",
        }
    }
}
