//! Effective-Permission Resolver
//!
//! The central read-and-compose pipeline: membership → role → table gate
//! → row policy → column policy → cell rule locks. The table gate is
//! evaluated first and nothing downstream can grant what it denies.

use tracing::debug;

use super::context::PermContext;
use super::error::{DenyReason, EngineError, Result};
use super::filter::RowFilter;
use super::policy::role::{CellRuleLock, ColumnPerm, RolePolicy};
use super::policy::{AccessScope, Action, PermissionDecision, PolicyAdapter, Principal};
use super::store::{Membership, MembershipStore, RoleStore};

/// The resolved policy attached to a request for downstream use.
#[derive(Debug, Clone)]
pub struct ResolvedPerms {
    pub role_id: String,
    pub role_name: String,
    /// AND-composition of every row policy for the table, placeholders
    /// already substituted. Empty means all rows pass.
    pub row_filter: RowFilter,
    pub column_perms: Vec<ColumnPerm>,
    /// Cell rule locks for the table, `where` clauses substituted.
    pub cell_rule_locks: Vec<CellRuleLock>,
    pub can_create: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl ResolvedPerms {
    pub fn principal<'a>(&'a self, user_id: &'a str) -> Principal<'a> {
        Principal {
            user_id,
            role_id: &self.role_id,
        }
    }
}

/// Load membership and role for a caller, with the shared deny taxonomy.
pub fn load_member_role(
    members: &dyn MembershipStore,
    roles: &dyn RoleStore,
    base_id: &str,
    user_id: &str,
) -> Result<(Membership, RolePolicy)> {
    let membership = members
        .find(base_id, user_id)
        .ok_or(EngineError::Denied(DenyReason::NotAMember))?;
    let role = roles
        .find_by_id(&membership.role_id)
        .ok_or(EngineError::Denied(DenyReason::RoleNotFound))?;
    Ok((membership, role))
}

/// Resolve the effective permissions of (user, base, table, action).
pub fn resolve_effective_perms(
    members: &dyn MembershipStore,
    roles: &dyn RoleStore,
    ctx: &PermContext,
    table_id: &str,
    action: Action,
) -> Result<ResolvedPerms> {
    let (membership, role) = load_member_role(members, roles, &ctx.base_id, &ctx.user_id)?;

    let principal = Principal {
        user_id: &ctx.user_id,
        role_id: &membership.role_id,
    };
    let scope = AccessScope::new(table_id, action);
    if let PermissionDecision::Denied(reason) = role.decide(principal, &scope) {
        debug!(
            user = %ctx.user_id,
            table = %table_id,
            action = ?action,
            %reason,
            "table gate denied"
        );
        return Err(EngineError::Denied(reason));
    }

    let mut row_filter = RowFilter::new();
    for policy in role.row_policies_for(table_id) {
        row_filter.and(policy.query_template.substituted(ctx));
    }

    let cell_rule_locks = role
        .cell_rule_locks_for(table_id)
        .map(|lock| CellRuleLock {
            where_clause: lock.where_clause.substituted(ctx),
            ..lock.clone()
        })
        .collect();

    let gate = role
        .table_perm(table_id)
        .ok_or(EngineError::Denied(DenyReason::TableDeny))?;

    Ok(ResolvedPerms {
        role_id: role.id.clone(),
        role_name: role.name.clone(),
        row_filter,
        column_perms: role.column_perms_for(table_id),
        cell_rule_locks,
        can_create: gate.create,
        can_update: gate.update,
        can_delete: gate.delete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::policy::role::{LockMode, RowPolicy, TablePerm, Visibility};
    use crate::engine::store::{MemoryStore, RowStore};
    use serde_json::json;

    fn seeded() -> (MemoryStore, PermContext, String) {
        let store = MemoryStore::new();
        let table = store.add_table("b1", "invoices", &["status", "amount", "ownerId"]);

        let mut role = RolePolicy::new("role1", "b1", "member");
        role.table_perms.push(TablePerm {
            table_id: table.id.clone(),
            create: true,
            read: true,
            update: true,
            delete: false,
        });
        role.column_perms.push(ColumnPerm {
            table_id: table.id.clone(),
            column_id: None,
            column_key: "amount".into(),
            visibility: Visibility::Visible,
            edit: crate::engine::policy::role::EditLevel::Rw,
            deletable: false,
        });
        role.row_policies.push(RowPolicy {
            table_id: table.id.clone(),
            query_template: serde_json::from_value(json!({"data.ownerId": "$ctx.userId"}))
                .unwrap(),
        });
        role.cell_rule_locks.push(CellRuleLock {
            table_id: table.id.clone(),
            where_clause: serde_json::from_value(json!({"data.status": "Approved"})).unwrap(),
            columns: vec!["amount".into()],
            mode: LockMode::ReadOnly,
            roles: vec![],
            users: vec![],
        });
        RoleStore::insert(&store, role);
        MembershipStore::insert(&store, Membership::new("b1", "u1", "role1"));

        let ctx = PermContext::new("u1", None, "b1");
        (store, ctx, table.id)
    }

    #[test]
    fn test_missing_membership_denies() {
        let (store, _, table_id) = seeded();
        let ctx = PermContext::new("stranger", None, "b1");
        for action in [Action::Create, Action::Read, Action::Update, Action::Delete] {
            let err = resolve_effective_perms(&store, &store, &ctx, &table_id, action).unwrap_err();
            assert!(matches!(err, EngineError::Denied(DenyReason::NotAMember)));
        }
    }

    #[test]
    fn test_missing_role_denies() {
        let (store, ctx, table_id) = seeded();
        MembershipStore::insert(&store, Membership::new("b1", "u2", "ghost-role"));
        let ctx2 = PermContext::new("u2", None, ctx.base_id.clone());
        let err = resolve_effective_perms(&store, &store, &ctx2, &table_id, Action::Read).unwrap_err();
        assert!(matches!(err, EngineError::Denied(DenyReason::RoleNotFound)));
    }

    #[test]
    fn test_table_gate_denies_missing_flag() {
        let (store, ctx, table_id) = seeded();
        let err =
            resolve_effective_perms(&store, &store, &ctx, &table_id, Action::Delete).unwrap_err();
        assert!(matches!(err, EngineError::Denied(DenyReason::TableDeny)));
    }

    #[test]
    fn test_row_filter_substituted_and_composed() {
        let (store, ctx, table_id) = seeded();
        let perms = resolve_effective_perms(&store, &store, &ctx, &table_id, Action::Read).unwrap();
        assert!(perms.row_filter.matches(&json!({"data": {"ownerId": "u1"}})));
        assert!(!perms.row_filter.matches(&json!({"data": {"ownerId": "u9"}})));
    }

    #[test]
    fn test_resolved_capabilities_and_locks() {
        let (store, ctx, table_id) = seeded();
        let perms = resolve_effective_perms(&store, &store, &ctx, &table_id, Action::Read).unwrap();
        assert!(perms.can_create);
        assert!(perms.can_update);
        assert!(!perms.can_delete);
        assert_eq!(perms.role_name, "member");
        assert_eq!(perms.cell_rule_locks.len(), 1);
        assert_eq!(perms.column_perms.len(), 1);
    }

    #[test]
    fn test_row_filter_constrains_query() {
        let (store, ctx, table_id) = seeded();
        let mut mine = serde_json::Map::new();
        mine.insert("ownerId".to_string(), json!("u1"));
        RowStore::insert(&store, crate::engine::store::RowRecord::new("b1", &table_id, mine, "u1"));
        let mut theirs = serde_json::Map::new();
        theirs.insert("ownerId".to_string(), json!("u2"));
        RowStore::insert(&store, crate::engine::store::RowRecord::new("b1", &table_id, theirs, "u2"));

        let perms = resolve_effective_perms(&store, &store, &ctx, &table_id, Action::Read).unwrap();
        let page = store.find_page("b1", &table_id, &perms.row_filter, &[], 0, 50);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].data["ownerId"], json!("u1"));
    }
}
