//! Administrative role-policy patches
//!
//! The admin API mutates a role's permission arrays through a structured
//! patch: each array section accepts `replaceAll`, `upsert` and `remove`
//! operations, applied in that order. Application is pure; persistence
//! goes through the role store's compare-and-swap update.

use serde::{Deserialize, Serialize};

use super::role::{CellRuleLock, ColumnPerm, RolePolicy, RowPolicy, TablePerm};
use crate::engine::filter::RowFilter;

/// Flag updates. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlagsPatch {
    pub can_manage_members: Option<bool>,
    pub can_manage_schema: Option<bool>,
    pub can_create_tables: Option<bool>,
}

/// Array mutation section: `replace_all` wins over `upsert`; `remove`
/// is applied last.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArrayPatch<T, K> {
    pub upsert: Vec<T>,
    pub remove: Vec<K>,
    pub replace_all: Option<Vec<T>>,
}

impl<T, K> Default for ArrayPatch<T, K> {
    fn default() -> Self {
        Self {
            upsert: Vec::new(),
            remove: Vec::new(),
            replace_all: None,
        }
    }
}

impl<T, K> ArrayPatch<T, K> {
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty() && self.replace_all.is_none()
    }
}

/// Identity of a column perm entry within a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnPermKey {
    pub table_id: String,
    pub column_key: String,
}

/// Identity of a cell rule lock within a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellLockKey {
    pub table_id: String,
    #[serde(rename = "where")]
    pub where_clause: RowFilter,
    pub columns: Vec<String>,
}

/// A full admin patch against one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermsPatch {
    pub flags: FlagsPatch,
    pub table_perms: ArrayPatch<TablePerm, String>,
    pub column_perms: ArrayPatch<ColumnPerm, ColumnPermKey>,
    pub row_policies: ArrayPatch<RowPolicy, String>,
    pub cell_rule_locks: ArrayPatch<CellRuleLock, CellLockKey>,
}

impl PermsPatch {
    /// Apply the patch to a role in place. Returns whether anything
    /// changed (callers skip the store write otherwise).
    pub fn apply(&self, role: &mut RolePolicy) -> bool {
        let mut dirty = false;

        if let Some(v) = self.flags.can_manage_members {
            dirty |= role.can_manage_members != v;
            role.can_manage_members = v;
        }
        if let Some(v) = self.flags.can_manage_schema {
            dirty |= role.can_manage_schema != v;
            role.can_manage_schema = v;
        }
        if let Some(v) = self.flags.can_create_tables {
            dirty |= role.can_create_tables != v;
            role.can_create_tables = v;
        }

        dirty |= apply_array(
            &mut role.table_perms,
            &self.table_perms,
            |existing, new| existing.table_id == new.table_id,
            |existing, key| &existing.table_id == key,
        );
        dirty |= apply_array(
            &mut role.column_perms,
            &self.column_perms,
            |existing, new| {
                existing.table_id == new.table_id && existing.column_key == new.column_key
            },
            |existing, key| existing.table_id == key.table_id && existing.column_key == key.column_key,
        );
        dirty |= apply_array(
            &mut role.row_policies,
            &self.row_policies,
            |existing, new| existing.table_id == new.table_id,
            |existing, key| &existing.table_id == key,
        );
        dirty |= apply_array(
            &mut role.cell_rule_locks,
            &self.cell_rule_locks,
            |existing, new| {
                existing.table_id == new.table_id
                    && existing.where_clause == new.where_clause
                    && existing.columns == new.columns
            },
            |existing, key| {
                existing.table_id == key.table_id
                    && existing.where_clause == key.where_clause
                    && existing.columns == key.columns
            },
        );

        dirty
    }
}

fn apply_array<T: Clone + PartialEq, K>(
    target: &mut Vec<T>,
    patch: &ArrayPatch<T, K>,
    same_entry: impl Fn(&T, &T) -> bool,
    matches_key: impl Fn(&T, &K) -> bool,
) -> bool {
    let mut dirty = false;

    if let Some(replacement) = &patch.replace_all {
        if target != replacement {
            *target = replacement.clone();
            dirty = true;
        }
    } else {
        for entry in &patch.upsert {
            match target.iter_mut().find(|existing| same_entry(existing, entry)) {
                Some(existing) => {
                    if existing != entry {
                        *existing = entry.clone();
                        dirty = true;
                    }
                }
                None => {
                    target.push(entry.clone());
                    dirty = true;
                }
            }
        }
    }

    if !patch.remove.is_empty() {
        let before = target.len();
        target.retain(|existing| !patch.remove.iter().any(|key| matches_key(existing, key)));
        dirty |= target.len() != before;
    }

    dirty
}
