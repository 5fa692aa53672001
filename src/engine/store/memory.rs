//! In-memory store
//!
//! Backs the HTTP surface and the test suite. Every collection sits
//! behind its own lock; reads clone out so callers never hold a guard
//! across composition.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    ColumnInfo, ManualLockStore, Membership, MembershipStore, RoleStore, RowRecord, RowStore,
    TableCatalog, TableInfo, VisibilityRuleStore,
};
use crate::engine::error::{EngineError, Result};
use crate::engine::filter::{compare_envelopes, RowFilter, SortRule};
use crate::engine::overrides::{
    apply_principal_patch, ColumnVisibilityOverride, ManualCellLock, PrincipalListPatch,
};
use crate::engine::policy::role::RolePolicy;

#[derive(Default)]
pub struct MemoryStore {
    memberships: RwLock<Vec<Membership>>,
    roles: RwLock<HashMap<String, RolePolicy>>,
    visibility_rules: RwLock<Vec<ColumnVisibilityOverride>>,
    manual_locks: RwLock<Vec<ManualCellLock>>,
    tables: RwLock<Vec<TableInfo>>,
    columns: RwLock<Vec<ColumnInfo>>,
    rows: RwLock<Vec<RowRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with its columns, generating ids.
    pub fn add_table(&self, base_id: &str, name: &str, column_keys: &[&str]) -> TableInfo {
        let table = TableInfo {
            id: Uuid::new_v4().to_string(),
            base_id: base_id.to_string(),
            name: name.to_string(),
        };
        self.tables.write().unwrap().push(table.clone());

        let mut columns = self.columns.write().unwrap();
        for key in column_keys {
            columns.push(ColumnInfo {
                id: Uuid::new_v4().to_string(),
                table_id: table.id.clone(),
                key: key.to_string(),
                name: key.to_string(),
            });
        }
        table
    }
}

impl MembershipStore for MemoryStore {
    fn find(&self, base_id: &str, user_id: &str) -> Option<Membership> {
        self.memberships
            .read()
            .unwrap()
            .iter()
            .find(|m| m.base_id == base_id && m.user_id == user_id)
            .cloned()
    }

    fn insert(&self, membership: Membership) {
        self.memberships.write().unwrap().push(membership);
    }

    fn set_role(&self, base_id: &str, user_id: &str, role_id: &str) -> bool {
        let mut memberships = self.memberships.write().unwrap();
        match memberships
            .iter_mut()
            .find(|m| m.base_id == base_id && m.user_id == user_id)
        {
            Some(m) => {
                m.role_id = role_id.to_string();
                true
            }
            None => false,
        }
    }

    fn remove(&self, base_id: &str, user_id: &str) -> bool {
        let mut memberships = self.memberships.write().unwrap();
        let before = memberships.len();
        memberships.retain(|m| !(m.base_id == base_id && m.user_id == user_id));
        memberships.len() != before
    }

    fn list(&self, base_id: &str) -> Vec<Membership> {
        self.memberships
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.base_id == base_id)
            .cloned()
            .collect()
    }

    fn count(&self, base_id: &str) -> usize {
        self.memberships
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.base_id == base_id)
            .count()
    }
}

impl RoleStore for MemoryStore {
    fn find_by_id(&self, role_id: &str) -> Option<RolePolicy> {
        self.roles.read().unwrap().get(role_id).cloned()
    }

    fn insert(&self, role: RolePolicy) {
        self.roles.write().unwrap().insert(role.id.clone(), role);
    }

    fn update(&self, mut role: RolePolicy) -> Result<RolePolicy> {
        let mut roles = self.roles.write().unwrap();
        let stored = roles.get(&role.id).ok_or(EngineError::InvalidRole)?;
        if stored.version != role.version {
            return Err(EngineError::RoleVersionConflict);
        }
        role.version += 1;
        roles.insert(role.id.clone(), role.clone());
        Ok(role)
    }

    fn list(&self, base_id: &str) -> Vec<RolePolicy> {
        let mut roles: Vec<RolePolicy> = self
            .roles
            .read()
            .unwrap()
            .values()
            .filter(|r| r.base_id == base_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }
}

impl VisibilityRuleStore for MemoryStore {
    fn find_for_table(&self, base_id: &str, table_id: &str) -> Vec<ColumnVisibilityOverride> {
        self.visibility_rules
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.base_id == base_id && r.table_id == table_id)
            .cloned()
            .collect()
    }

    fn upsert(&self, rule: ColumnVisibilityOverride) -> (ColumnVisibilityOverride, bool) {
        let mut rules = self.visibility_rules.write().unwrap();
        match rules.iter_mut().find(|existing| existing.same_scope(&rule)) {
            Some(existing) => {
                existing.visibility = rule.visibility;
                existing.note = rule.note;
                existing.created_by = rule.created_by;
                (existing.clone(), false)
            }
            None => {
                rules.push(rule.clone());
                (rule, true)
            }
        }
    }

    fn patch_users(&self, rule_id: &str, patch: &PrincipalListPatch) -> Result<ColumnVisibilityOverride> {
        let mut rules = self.visibility_rules.write().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or(EngineError::RuleNotFound)?;
        apply_principal_patch(&mut rule.users, patch);
        Ok(rule.clone())
    }

    fn patch_roles(&self, rule_id: &str, patch: &PrincipalListPatch) -> Result<ColumnVisibilityOverride> {
        let mut rules = self.visibility_rules.write().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or(EngineError::RuleNotFound)?;
        apply_principal_patch(&mut rule.roles, patch);
        Ok(rule.clone())
    }

    fn delete(&self, rule_id: &str) -> bool {
        let mut rules = self.visibility_rules.write().unwrap();
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        rules.len() != before
    }
}

impl ManualLockStore for MemoryStore {
    fn find_for_table(&self, base_id: &str, table_id: &str) -> Vec<ManualCellLock> {
        self.manual_locks
            .read()
            .unwrap()
            .iter()
            .filter(|l| l.base_id == base_id && l.table_id == table_id)
            .cloned()
            .collect()
    }

    fn insert(&self, lock: ManualCellLock) {
        self.manual_locks.write().unwrap().push(lock);
    }

    fn patch_users(&self, lock_id: &str, patch: &PrincipalListPatch) -> Result<ManualCellLock> {
        let mut locks = self.manual_locks.write().unwrap();
        let lock = locks
            .iter_mut()
            .find(|l| l.id == lock_id)
            .ok_or(EngineError::LockNotFound)?;
        apply_principal_patch(&mut lock.users, patch);
        Ok(lock.clone())
    }

    fn patch_roles(&self, lock_id: &str, patch: &PrincipalListPatch) -> Result<ManualCellLock> {
        let mut locks = self.manual_locks.write().unwrap();
        let lock = locks
            .iter_mut()
            .find(|l| l.id == lock_id)
            .ok_or(EngineError::LockNotFound)?;
        apply_principal_patch(&mut lock.roles, patch);
        Ok(lock.clone())
    }

    fn delete(&self, lock_id: &str) -> bool {
        let mut locks = self.manual_locks.write().unwrap();
        let before = locks.len();
        locks.retain(|l| l.id != lock_id);
        locks.len() != before
    }
}

impl TableCatalog for MemoryStore {
    fn table(&self, table_id: &str) -> Option<TableInfo> {
        self.tables
            .read()
            .unwrap()
            .iter()
            .find(|t| t.id == table_id)
            .cloned()
    }

    fn table_by_name(&self, base_id: &str, name: &str) -> Option<TableInfo> {
        self.tables
            .read()
            .unwrap()
            .iter()
            .find(|t| t.base_id == base_id && t.name == name)
            .cloned()
    }

    fn columns(&self, table_id: &str) -> Vec<ColumnInfo> {
        self.columns
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.table_id == table_id)
            .cloned()
            .collect()
    }

    fn tables_in_base(&self, base_id: &str) -> Vec<TableInfo> {
        self.tables
            .read()
            .unwrap()
            .iter()
            .filter(|t| t.base_id == base_id)
            .cloned()
            .collect()
    }
}

impl RowStore for MemoryStore {
    fn find_page(
        &self,
        base_id: &str,
        table_id: &str,
        filter: &RowFilter,
        sort: &[SortRule],
        skip: usize,
        limit: usize,
    ) -> Vec<RowRecord> {
        let rows = self.rows.read().unwrap();
        let mut matched: Vec<(RowRecord, Value)> = rows
            .iter()
            .filter(|r| r.base_id == base_id && r.table_id == table_id)
            .map(|r| (r.clone(), r.envelope()))
            .filter(|(_, envelope)| filter.matches(envelope))
            .collect();

        matched.sort_by(|(_, a), (_, b)| compare_envelopes(a, b, sort));

        matched
            .into_iter()
            .map(|(row, _)| row)
            .skip(skip)
            .take(limit)
            .collect()
    }

    fn get(&self, row_id: &str) -> Option<RowRecord> {
        self.rows
            .read()
            .unwrap()
            .iter()
            .find(|r| r.id == row_id)
            .cloned()
    }

    fn insert(&self, row: RowRecord) {
        self.rows.write().unwrap().push(row);
    }

    fn patch(&self, row_id: &str, patch: &Map<String, Value>) -> Option<RowRecord> {
        let mut rows = self.rows.write().unwrap();
        let row = rows.iter_mut().find(|r| r.id == row_id)?;
        for (key, value) in patch {
            row.data.insert(key.clone(), value.clone());
        }
        row.updated_at = Utc::now();
        Some(row.clone())
    }

    fn delete(&self, row_id: &str) -> bool {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id != row_id);
        rows.len() != before
    }
}
