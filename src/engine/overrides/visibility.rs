//! Column visibility overrides
//!
//! Per-column rules scoped to specific roles/users, layered on top of the
//! role's static column perms. Role-level `hidden` stays a hard floor; an
//! override can only soft-hide a visible column or re-show a soft-hidden
//! one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::policy::role::Visibility;
use crate::engine::policy::{applies_to_principal, Principal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnVisibilityOverride {
    #[serde(rename = "_id")]
    pub id: String,
    pub base_id: String,
    pub table_id: String,
    pub column_key: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
    pub created_by: String,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ColumnVisibilityOverride {
    pub fn applies_to(&self, principal: Principal<'_>) -> bool {
        applies_to_principal(&self.roles, &self.users, principal)
    }

    /// At most one logical override exists per (table, columnKey,
    /// roles-set, users-set); a second write overlays the first.
    pub fn same_scope(&self, other: &ColumnVisibilityOverride) -> bool {
        self.table_id == other.table_id
            && self.column_key == other.column_key
            && same_set(&self.roles, &other.roles)
            && same_set(&self.users, &other.users)
    }
}

fn same_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(roles: &[&str], users: &[&str], visibility: Visibility) -> ColumnVisibilityOverride {
        ColumnVisibilityOverride {
            id: "v1".into(),
            base_id: "b1".into(),
            table_id: "t1".into(),
            column_key: "salary".into(),
            visibility,
            roles: roles.iter().map(|s| s.to_string()).collect(),
            users: users.iter().map(|s| s.to_string()).collect(),
            created_by: "admin".into(),
            note: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_lists_apply_to_all() {
        let r = rule(&[], &[], Visibility::Hidden);
        assert!(r.applies_to(Principal {
            user_id: "anyone",
            role_id: "any-role"
        }));
    }

    #[test]
    fn test_scoped_to_role() {
        let r = rule(&["role1"], &[], Visibility::Hidden);
        assert!(r.applies_to(Principal {
            user_id: "u1",
            role_id: "role1"
        }));
        assert!(!r.applies_to(Principal {
            user_id: "u1",
            role_id: "role2"
        }));
    }

    #[test]
    fn test_same_scope_ignores_list_order() {
        let a = rule(&["r1", "r2"], &[], Visibility::Hidden);
        let b = rule(&["r2", "r1"], &[], Visibility::Visible);
        assert!(a.same_scope(&b));

        let c = rule(&["r1"], &[], Visibility::Visible);
        assert!(!a.same_scope(&c));
    }
}
