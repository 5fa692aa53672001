//! Policy model
//!
//! Two backing shapes express permissions in the platform: the role-array
//! engine (`role`) and the older target-priority documents (`legacy`).
//! Both answer the same question through the [`PolicyAdapter`] contract so
//! call sites never need to know which shape is in play.

pub mod legacy;
pub mod patch;
pub mod role;

pub use legacy::{
    LegacyFlags, LegacyPrincipal, LegacyTableAcl, TableViewDecision, TargetScopedPerm, TargetType,
};
pub use patch::{ArrayPatch, PermsPatch};
pub use role::{
    CellRuleLock, ColumnPerm, EditLevel, LockMode, RolePolicy, RowPolicy, TablePerm, Visibility,
};

use serde::{Deserialize, Serialize};

use super::error::DenyReason;

/// A data-level action on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

/// The principal a rule is evaluated against: the caller plus the role
/// their membership resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal<'a> {
    pub user_id: &'a str,
    pub role_id: &'a str,
}

/// Empty-or-contains matching for the `roles`/`users` scoping lists
/// carried by overrides, manual locks and cell rule locks. An empty list
/// applies to every principal.
pub fn applies_to_principal(roles: &[String], users: &[String], principal: Principal<'_>) -> bool {
    let role_ok = roles.is_empty() || roles.iter().any(|r| r == principal.role_id);
    let user_ok = users.is_empty() || users.iter().any(|u| u == principal.user_id);
    role_ok && user_ok
}

/// What a policy shape is being asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessScope {
    pub table_id: String,
    pub action: Action,
}

impl AccessScope {
    pub fn new(table_id: impl Into<String>, action: Action) -> Self {
        Self {
            table_id: table_id.into(),
            action,
        }
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allowed,
    Denied(DenyReason),
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allowed)
    }
}

/// Common evaluation contract over the two backing policy shapes.
pub trait PolicyAdapter {
    fn decide(&self, principal: Principal<'_>, scope: &AccessScope) -> PermissionDecision;
}
