//! Cell Lock Compositor & Redactor
//!
//! Per result row, merges the role's static column policy, visibility
//! overrides, rule-based locks and manual locks into a finalized
//! visible-key set and a per-cell lock map. Composition is deny-first:
//! role-level `hidden` is a hard floor, a `hidden` override beats a
//! `visible` one, and lock priority is hidden > readOnly > editable.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{DenyReason, EngineError, Result};
use super::overrides::{ColumnVisibilityOverride, ManualCellLock};
use super::policy::role::{CellRuleLock, ColumnPerm, LockMode, Visibility};
use super::policy::Principal;
use super::store::{ColumnInfo, RowRecord};

/// Value substituted for cells whose resolved lock mode is `hidden`.
pub const REDACTION_MARKER: &str = "🔒";

/// Wildcard entry in a rule lock's column list.
pub const ALL_COLUMNS: &str = "*";

/// Resolved lock state of a single cell. Editable modes clear an entry
/// rather than storing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellLockState {
    ReadOnly,
    Hidden,
}

/// Column key → resolved lock state for one row.
pub type LockMap = BTreeMap<String, CellLockState>;

/// A row as it leaves the engine: hidden columns removed, hidden cells
/// redacted, lock map attached so the caller can disable editing without
/// a further round trip.
#[derive(Debug, Clone, Serialize)]
pub struct ShapedRow {
    #[serde(flatten)]
    pub row: RowRecord,
    pub locks: LockMap,
}

/// Request-scoped compositor for one (principal, table) pair.
pub struct CellShaper<'a> {
    visible: HashSet<String>,
    key_set: HashSet<String>,
    rule_locks: &'a [CellRuleLock],
    manual_locks: &'a [ManualCellLock],
    principal: Principal<'a>,
}

impl<'a> CellShaper<'a> {
    pub fn new(
        columns: &[ColumnInfo],
        column_perms: &[ColumnPerm],
        overrides: &[ColumnVisibilityOverride],
        rule_locks: &'a [CellRuleLock],
        manual_locks: &'a [ManualCellLock],
        principal: Principal<'a>,
    ) -> Self {
        let key_set: HashSet<String> = columns.iter().map(|c| c.key.clone()).collect();
        let visible = finalize_visible_keys(&key_set, column_perms, overrides, principal);
        Self {
            visible,
            key_set,
            rule_locks,
            manual_locks,
            principal,
        }
    }

    pub fn visible_keys(&self) -> &HashSet<String> {
        &self.visible
    }

    /// Column metadata restricted to the finalized visible set.
    pub fn visible_columns(&self, columns: &[ColumnInfo]) -> Vec<ColumnInfo> {
        columns
            .iter()
            .filter(|c| self.visible.contains(&c.key))
            .cloned()
            .collect()
    }

    /// Compose rule-based and manual locks against one row's current
    /// state.
    pub fn locks_for_row(&self, row: &RowRecord) -> LockMap {
        let envelope = row.envelope();
        let mut locks = LockMap::new();

        for rule in self.rule_locks {
            if !rule.applies_to(self.principal) {
                continue;
            }
            if !rule.where_clause.matches(&envelope) {
                continue;
            }
            for key in self.expand_target_columns(&rule.columns) {
                apply_mode(&mut locks, &key, rule.mode);
            }
        }

        for lock in self.manual_locks {
            if !lock.applies_to(self.principal) {
                continue;
            }
            for target in lock.targets_for_row(&row.id) {
                if !self.visible.contains(&target.column_key) {
                    continue;
                }
                apply_mode(&mut locks, &target.column_key, lock.mode);
            }
        }

        locks
    }

    /// Shape one row for a response: drop non-visible columns, redact
    /// hidden cells, attach the lock map.
    pub fn shape_row(&self, mut row: RowRecord) -> ShapedRow {
        let locks = self.locks_for_row(&row);

        row.data.retain(|key, _| self.visible.contains(key));
        for (key, state) in &locks {
            if *state == CellLockState::Hidden {
                if let Some(cell) = row.data.get_mut(key) {
                    *cell = Value::String(REDACTION_MARKER.to_string());
                }
            }
        }

        ShapedRow { row, locks }
    }

    pub fn shape_page(&self, rows: Vec<RowRecord>) -> Vec<ShapedRow> {
        rows.into_iter().map(|row| self.shape_row(row)).collect()
    }

    /// Write gate: a patch touching a hidden column or a locked cell is
    /// rejected as a whole, evaluated against the row's current stored
    /// state rather than the patch being applied.
    pub fn check_patch<'k>(
        &self,
        current: &RowRecord,
        patch_keys: impl Iterator<Item = &'k String>,
    ) -> Result<()> {
        let locks = self.locks_for_row(current);
        for key in patch_keys {
            if !self.visible.contains(key) {
                return Err(EngineError::Denied(DenyReason::ColumnHidden(key.clone())));
            }
            if locks.contains_key(key) {
                return Err(EngineError::Denied(DenyReason::CellLocked(key.clone())));
            }
        }
        Ok(())
    }

    fn expand_target_columns(&self, columns: &[String]) -> Vec<String> {
        if columns.iter().any(|c| c == ALL_COLUMNS) {
            self.visible.iter().cloned().collect()
        } else {
            columns
                .iter()
                .filter(|key| self.key_set.contains(*key) && self.visible.contains(*key))
                .cloned()
                .collect()
        }
    }
}

/// Finalize the visible-key set for a principal.
///
/// Start from the table's full key set minus the role's `hidden` entries
/// (the hard floor), then apply overrides: `hidden` soft-hides, `visible`
/// re-adds only keys the role did not statically hide, and a `hidden`
/// override on a key beats a `visible` one on the same key.
pub fn finalize_visible_keys(
    all_keys: &HashSet<String>,
    column_perms: &[ColumnPerm],
    overrides: &[ColumnVisibilityOverride],
    principal: Principal<'_>,
) -> HashSet<String> {
    let role_hidden: HashSet<&String> = column_perms
        .iter()
        .filter(|cp| cp.visibility == Visibility::Hidden)
        .map(|cp| &cp.column_key)
        .collect();

    let mut override_hidden: HashSet<&String> = HashSet::new();
    let mut override_visible: HashSet<&String> = HashSet::new();
    for rule in overrides {
        if !rule.applies_to(principal) {
            continue;
        }
        match rule.visibility {
            Visibility::Hidden => {
                override_hidden.insert(&rule.column_key);
            }
            Visibility::Visible => {
                override_visible.insert(&rule.column_key);
            }
        }
    }

    let mut visible: HashSet<String> = all_keys
        .iter()
        .filter(|key| !role_hidden.contains(key) && !override_hidden.contains(key))
        .cloned()
        .collect();

    for key in override_visible {
        if all_keys.contains(key) && !role_hidden.contains(key) && !override_hidden.contains(key) {
            visible.insert(key.clone());
        }
    }

    visible
}

/// Lock priority: hidden > readOnly; editable modes clear a non-hidden
/// lock.
fn apply_mode(locks: &mut LockMap, key: &str, mode: LockMode) {
    match mode {
        LockMode::Hidden => {
            locks.insert(key.to_string(), CellLockState::Hidden);
        }
        LockMode::ReadOnly => {
            if locks.get(key) != Some(&CellLockState::Hidden) {
                locks.insert(key.to_string(), CellLockState::ReadOnly);
            }
        }
        LockMode::EditableByRole | LockMode::EditableByUser => {
            if locks.get(key) == Some(&CellLockState::ReadOnly) {
                locks.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::filter::RowFilter;
    use crate::engine::overrides::CellTarget;
    use crate::engine::policy::role::EditLevel;
    use chrono::Utc;
    use serde_json::{json, Map};

    fn principal() -> Principal<'static> {
        Principal {
            user_id: "u1",
            role_id: "role1",
        }
    }

    fn columns(keys: &[&str]) -> Vec<ColumnInfo> {
        keys.iter()
            .map(|key| ColumnInfo {
                id: format!("col-{key}"),
                table_id: "t1".into(),
                key: key.to_string(),
                name: key.to_string(),
            })
            .collect()
    }

    fn hidden_perm(key: &str) -> ColumnPerm {
        ColumnPerm {
            table_id: "t1".into(),
            column_id: None,
            column_key: key.to_string(),
            visibility: Visibility::Hidden,
            edit: EditLevel::None,
            deletable: false,
        }
    }

    fn override_rule(key: &str, visibility: Visibility) -> ColumnVisibilityOverride {
        ColumnVisibilityOverride {
            id: format!("ov-{key}"),
            base_id: "b1".into(),
            table_id: "t1".into(),
            column_key: key.to_string(),
            visibility,
            roles: vec![],
            users: vec![],
            created_by: "admin".into(),
            note: None,
            created_at: Utc::now(),
        }
    }

    fn rule_lock(where_clause: Value, columns: &[&str], mode: LockMode) -> CellRuleLock {
        CellRuleLock {
            table_id: "t1".into(),
            where_clause: serde_json::from_value(where_clause).unwrap(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            mode,
            roles: vec![],
            users: vec![],
        }
    }

    fn row(data: Value) -> RowRecord {
        let data: Map<String, Value> = serde_json::from_value(data).unwrap();
        RowRecord::new("b1", "t1", data, "u1")
    }

    #[test]
    fn test_role_hidden_beats_visible_override() {
        let cols = columns(&["status", "salary"]);
        let keys: HashSet<String> = cols.iter().map(|c| c.key.clone()).collect();
        let visible = finalize_visible_keys(
            &keys,
            &[hidden_perm("salary")],
            &[override_rule("salary", Visibility::Visible)],
            principal(),
        );
        assert!(!visible.contains("salary"));
        assert!(visible.contains("status"));
    }

    #[test]
    fn test_hidden_override_beats_visible_override() {
        let cols = columns(&["status"]);
        let keys: HashSet<String> = cols.iter().map(|c| c.key.clone()).collect();
        let visible = finalize_visible_keys(
            &keys,
            &[],
            &[
                override_rule("status", Visibility::Visible),
                override_rule("status", Visibility::Hidden),
            ],
            principal(),
        );
        assert!(visible.is_empty());
    }

    #[test]
    fn test_lock_priority_hidden_over_read_only() {
        let cols = columns(&["amount"]);
        let locks = [
            rule_lock(json!({"data.status": "Approved"}), &["amount"], LockMode::Hidden),
            rule_lock(
                json!({"data.status": "Approved"}),
                &["amount"],
                LockMode::EditableByRole,
            ),
        ];
        let shaper = CellShaper::new(&cols, &[], &[], &locks, &[], principal());
        let row = row(json!({"status": "Approved", "amount": 10}));
        let map = shaper.locks_for_row(&row);
        assert_eq!(map.get("amount"), Some(&CellLockState::Hidden));
    }

    #[test]
    fn test_editable_clears_read_only_lock() {
        let cols = columns(&["amount"]);
        let locks = [
            rule_lock(json!({"data.status": "Approved"}), &["amount"], LockMode::ReadOnly),
            rule_lock(
                json!({"data.status": "Approved"}),
                &["amount"],
                LockMode::EditableByUser,
            ),
        ];
        let shaper = CellShaper::new(&cols, &[], &[], &locks, &[], principal());
        let map = shaper.locks_for_row(&row(json!({"status": "Approved", "amount": 10})));
        assert!(map.is_empty());
    }

    #[test]
    fn test_where_mismatch_leaves_cell_unlocked() {
        let cols = columns(&["amount"]);
        let locks = [rule_lock(
            json!({"data.status": "Approved"}),
            &["amount"],
            LockMode::ReadOnly,
        )];
        let shaper = CellShaper::new(&cols, &[], &[], &locks, &[], principal());
        let map = shaper.locks_for_row(&row(json!({"status": "Draft", "amount": 10})));
        assert!(map.is_empty());
    }

    #[test]
    fn test_wildcard_expands_to_visible_columns() {
        let cols = columns(&["status", "amount", "salary"]);
        let locks = [rule_lock(json!({"data.status": "Approved"}), &["*"], LockMode::ReadOnly)];
        let shaper = CellShaper::new(
            &cols,
            &[hidden_perm("salary")],
            &[],
            &locks,
            &[],
            principal(),
        );
        let map = shaper.locks_for_row(&row(json!({"status": "Approved", "amount": 1})));
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("status"));
        assert!(map.contains_key("amount"));
        assert!(!map.contains_key("salary"));
    }

    #[test]
    fn test_manual_lock_overlay() {
        let cols = columns(&["amount"]);
        let target_row = row(json!({"amount": 10}));
        let manual = [ManualCellLock {
            id: "l1".into(),
            base_id: "b1".into(),
            table_id: "t1".into(),
            targets: vec![CellTarget {
                row_id: target_row.id.clone(),
                column_key: "amount".into(),
            }],
            mode: LockMode::Hidden,
            roles: vec![],
            users: vec![],
            locked_by: "admin".into(),
            locked_at: Utc::now(),
            note: None,
        }];
        let shaper = CellShaper::new(&cols, &[], &[], &[], &manual, principal());
        let shaped = shaper.shape_row(target_row);
        assert_eq!(shaped.row.data["amount"], json!(REDACTION_MARKER));
        assert_eq!(shaped.locks.get("amount"), Some(&CellLockState::Hidden));
    }

    #[test]
    fn test_hidden_column_never_serialized() {
        let cols = columns(&["status", "salary"]);
        let shaper = CellShaper::new(&cols, &[hidden_perm("salary")], &[], &[], &[], principal());
        let shaped = shaper.shape_row(row(json!({"status": "Open", "salary": 90000})));
        assert!(!shaped.row.data.contains_key("salary"));
        assert!(shaped.row.data.contains_key("status"));

        let cols_meta = shaper.visible_columns(&cols);
        assert!(cols_meta.iter().all(|c| c.key != "salary"));
    }

    #[test]
    fn test_check_patch_rejects_hidden_column() {
        let cols = columns(&["status", "salary"]);
        let shaper = CellShaper::new(&cols, &[hidden_perm("salary")], &[], &[], &[], principal());
        let current = row(json!({"status": "Open", "salary": 90000}));
        let keys = vec!["salary".to_string()];
        let err = shaper.check_patch(&current, keys.iter()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Denied(DenyReason::ColumnHidden(ref k)) if k == "salary"
        ));
    }

    #[test]
    fn test_check_patch_rejects_locked_cell() {
        let cols = columns(&["status", "amount"]);
        let locks = [rule_lock(
            json!({"data.status": "Approved"}),
            &["amount"],
            LockMode::ReadOnly,
        )];
        let shaper = CellShaper::new(&cols, &[], &[], &locks, &[], principal());
        let current = row(json!({"status": "Approved", "amount": 10}));
        let keys = vec!["amount".to_string()];
        let err = shaper.check_patch(&current, keys.iter()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Denied(DenyReason::CellLocked(ref k)) if k == "amount"
        ));

        // The same patch passes once the row no longer matches the rule.
        let unlocked = row(json!({"status": "Draft", "amount": 10}));
        assert!(shaper.check_patch(&unlocked, keys.iter()).is_ok());
    }

    #[test]
    fn test_principal_scoped_rule_skipped_for_other_role() {
        let cols = columns(&["amount"]);
        let mut lock = rule_lock(json!({"data.status": "Approved"}), &["amount"], LockMode::Hidden);
        lock.roles = vec!["other-role".into()];
        let locks = [lock];
        let shaper = CellShaper::new(&cols, &[], &[], &locks, &[], principal());
        let map = shaper.locks_for_row(&row(json!({"status": "Approved", "amount": 1})));
        assert!(map.is_empty());
    }
}
