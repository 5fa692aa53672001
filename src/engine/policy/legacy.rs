//! Target-priority permission layer
//!
//! The older, table-scoped model: permission documents tagged with a
//! target type, resolved by priority `specific_user > specific_role >
//! all_members`. A flag left undefined on the highest-priority match
//! falls through to the next match; only the terminal lookup applies the
//! default. Managerial roles bypass the layer entirely.

use serde::{Deserialize, Serialize};

use super::{AccessScope, Action, PermissionDecision, PolicyAdapter, Principal};
use crate::engine::error::DenyReason;
use crate::engine::filter::RowFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    AllMembers,
    SpecificUser,
    SpecificRole,
}

impl TargetType {
    fn priority(self) -> u8 {
        match self {
            TargetType::SpecificUser => 3,
            TargetType::SpecificRole => 2,
            TargetType::AllMembers => 1,
        }
    }
}

/// Optional flags carried by a target-scoped document. `None` means the
/// document does not speak to that flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyFlags {
    pub can_view: Option<bool>,
    pub can_edit: Option<bool>,
    pub can_view_all_records: Option<bool>,
    pub is_hidden: Option<bool>,
}

/// One permission document in the legacy layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetScopedPerm {
    #[serde(rename = "_id")]
    pub id: String,
    pub table_id: String,
    pub target_type: TargetType,
    /// Set when `target_type` is `specific_user`.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Role name, set when `target_type` is `specific_role`.
    #[serde(default)]
    pub role: Option<String>,
    pub permissions: LegacyFlags,
}

/// The principal evaluated against the legacy layer. `managerial`
/// reflects the caller's role flags; managerial callers bypass the layer.
#[derive(Debug, Clone, Copy)]
pub struct LegacyPrincipal<'a> {
    pub user_id: &'a str,
    pub role_name: &'a str,
    pub managerial: bool,
}

impl TargetScopedPerm {
    fn matches(&self, principal: LegacyPrincipal<'_>) -> bool {
        match self.target_type {
            TargetType::AllMembers => true,
            TargetType::SpecificUser => self.user_id.as_deref() == Some(principal.user_id),
            TargetType::SpecificRole => self.role.as_deref() == Some(principal.role_name),
        }
    }
}

/// Outcome of a table-view check. A hidden table the caller may not see
/// reads as not-found so its existence is never leaked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableViewDecision {
    Allowed,
    Forbidden,
    NotFound,
}

/// The legacy documents governing one table.
#[derive(Debug, Clone, Default)]
pub struct LegacyTableAcl {
    pub table_id: String,
    pub perms: Vec<TargetScopedPerm>,
}

impl LegacyTableAcl {
    pub fn new(table_id: impl Into<String>, perms: Vec<TargetScopedPerm>) -> Self {
        Self {
            table_id: table_id.into(),
            perms,
        }
    }

    /// Resolve a single flag for the principal: highest-priority match
    /// first, undefined falls through, terminal lookup defaults.
    pub fn resolve_flag(
        &self,
        principal: LegacyPrincipal<'_>,
        pick: impl Fn(&LegacyFlags) -> Option<bool>,
        default: bool,
    ) -> bool {
        if principal.managerial {
            return true;
        }

        let mut matching: Vec<&TargetScopedPerm> = self
            .perms
            .iter()
            .filter(|p| p.matches(principal))
            .collect();
        matching.sort_by(|a, b| b.target_type.priority().cmp(&a.target_type.priority()));

        for perm in matching {
            if let Some(value) = pick(&perm.permissions) {
                return value;
            }
        }
        default
    }

    /// "Can view all records" defaults to deny: an unconfigured member
    /// only sees their own rows.
    pub fn can_view_all_records(&self, principal: LegacyPrincipal<'_>) -> bool {
        self.resolve_flag(principal, |f| f.can_view_all_records, false)
    }

    /// Row filter implementing the view scope: empty for view-all,
    /// creator-constrained otherwise.
    pub fn record_view_filter(&self, principal: LegacyPrincipal<'_>) -> RowFilter {
        let mut filter = RowFilter::new();
        if !self.can_view_all_records(principal) {
            filter.insert("createdBy", serde_json::Value::String(principal.user_id.to_string()));
        }
        filter
    }

    /// Table-view check honoring the hidden flag: hidden without view
    /// permission is reported as not-found.
    pub fn table_view(&self, principal: LegacyPrincipal<'_>) -> TableViewDecision {
        if principal.managerial {
            return TableViewDecision::Allowed;
        }
        let can_view = self.resolve_flag(principal, |f| f.can_view, false);
        let is_hidden = self.resolve_flag(principal, |f| f.is_hidden, false);
        if is_hidden && !can_view {
            TableViewDecision::NotFound
        } else if !can_view {
            TableViewDecision::Forbidden
        } else {
            TableViewDecision::Allowed
        }
    }
}

/// Adapter view: read maps to `canView`, everything else to `canEdit`.
/// The adapter sees the caller's role id as the role name the legacy
/// documents were written against.
impl PolicyAdapter for LegacyTableAcl {
    fn decide(&self, principal: Principal<'_>, scope: &AccessScope) -> PermissionDecision {
        let legacy = LegacyPrincipal {
            user_id: principal.user_id,
            role_name: principal.role_id,
            managerial: false,
        };
        let allowed = match scope.action {
            Action::Read => self.resolve_flag(legacy, |f| f.can_view, false),
            _ => self.resolve_flag(legacy, |f| f.can_edit, false),
        };
        if allowed {
            PermissionDecision::Allowed
        } else {
            PermissionDecision::Denied(DenyReason::TableDeny)
        }
    }
}
