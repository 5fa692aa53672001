//! Role policy documents
//!
//! One `RolePolicy` per custom role, scoped to a base. The arrays are
//! administrator-authored and read-composed by the resolver; the engine
//! never mutates them outside the admin patch API.

use serde::{Deserialize, Serialize};

use super::{AccessScope, Action, PermissionDecision, PolicyAdapter, Principal};
use crate::engine::error::{DenyReason, EngineError, Result};
use crate::engine::filter::RowFilter;

/// Column visibility at role level. `hidden` is a hard floor no override
/// can lift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Column edit capability at role level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditLevel {
    None,
    Ro,
    Rw,
}

/// Lock mode for rule-based and manual cell locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockMode {
    ReadOnly,
    Hidden,
    EditableByRole,
    EditableByUser,
}

/// Per-table CRUD gate. Absence of an entry means no access at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePerm {
    pub table_id: String,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
}

impl TablePerm {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Create => self.create,
            Action::Read => self.read,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }
}

/// Per-column visibility/edit statement. The engine addresses columns by
/// their stable key; `column_id` is carried for admin tooling that still
/// references catalog ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnPerm {
    pub table_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    pub column_key: String,
    pub visibility: Visibility,
    #[serde(default = "EditLevel::default_none")]
    pub edit: EditLevel,
    #[serde(default)]
    pub deletable: bool,
}

impl EditLevel {
    fn default_none() -> Self {
        EditLevel::None
    }
}

/// Declarative row filter template with `$ctx.*` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPolicy {
    pub table_id: String,
    pub query_template: RowFilter,
}

/// Condition-triggered lock on specific columns of matching rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRuleLock {
    pub table_id: String,
    #[serde(rename = "where")]
    pub where_clause: RowFilter,
    pub columns: Vec<String>,
    pub mode: LockMode,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
}

impl CellRuleLock {
    pub fn applies_to(&self, principal: Principal<'_>) -> bool {
        super::applies_to_principal(&self.roles, &self.users, principal)
    }
}

/// A named, base-scoped bundle of permission statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePolicy {
    #[serde(rename = "_id")]
    pub id: String,
    pub base_id: String,
    pub name: String,
    #[serde(default)]
    pub builtin: bool,

    #[serde(default)]
    pub can_manage_members: bool,
    #[serde(default)]
    pub can_manage_schema: bool,
    #[serde(default)]
    pub can_create_tables: bool,

    #[serde(default)]
    pub table_perms: Vec<TablePerm>,
    #[serde(default)]
    pub column_perms: Vec<ColumnPerm>,
    #[serde(default)]
    pub row_policies: Vec<RowPolicy>,
    #[serde(default)]
    pub cell_rule_locks: Vec<CellRuleLock>,

    /// Optimistic-concurrency counter, bumped by the role store on every
    /// successful update.
    #[serde(default)]
    pub version: u64,
}

impl RolePolicy {
    pub fn new(id: impl Into<String>, base_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_id: base_id.into(),
            name: name.into(),
            builtin: false,
            can_manage_members: false,
            can_manage_schema: false,
            can_create_tables: false,
            table_perms: Vec::new(),
            column_perms: Vec::new(),
            row_policies: Vec::new(),
            cell_rule_locks: Vec::new(),
            version: 0,
        }
    }

    /// Whether this role carries base-administration capability.
    pub fn is_managerial(&self) -> bool {
        self.can_manage_members || self.can_manage_schema
    }

    pub fn table_perm(&self, table_id: &str) -> Option<&TablePerm> {
        self.table_perms.iter().find(|tp| tp.table_id == table_id)
    }

    pub fn column_perms_for(&self, table_id: &str) -> Vec<ColumnPerm> {
        self.column_perms
            .iter()
            .filter(|cp| cp.table_id == table_id)
            .cloned()
            .collect()
    }

    pub fn row_policies_for<'a>(&'a self, table_id: &'a str) -> impl Iterator<Item = &'a RowPolicy> + 'a {
        self.row_policies
            .iter()
            .filter(move |rp| rp.table_id == table_id)
    }

    pub fn cell_rule_locks_for<'a>(&'a self, table_id: &'a str) -> impl Iterator<Item = &'a CellRuleLock> + 'a {
        self.cell_rule_locks
            .iter()
            .filter(move |rl| rl.table_id == table_id)
    }

    /// Every array entry must reference a table inside the given base.
    /// `known_tables` is the base's table-id set from the catalog.
    pub fn validate_for_base(&self, known_tables: &[String]) -> Result<()> {
        let check = |table_id: &str, what: &str| -> Result<()> {
            if known_tables.iter().any(|t| t == table_id) {
                Ok(())
            } else {
                Err(EngineError::InvalidPolicy(format!(
                    "{what} references table {table_id} outside base {}",
                    self.base_id
                )))
            }
        };

        for tp in &self.table_perms {
            check(&tp.table_id, "tablePerm")?;
        }
        for cp in &self.column_perms {
            check(&cp.table_id, "columnPerm")?;
        }
        for rp in &self.row_policies {
            check(&rp.table_id, "rowPolicy")?;
        }
        for rl in &self.cell_rule_locks {
            check(&rl.table_id, "cellRuleLock")?;
            if rl.columns.is_empty() {
                return Err(EngineError::InvalidPolicy(
                    "cellRuleLock requires at least one column".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl PolicyAdapter for RolePolicy {
    /// The table gate: first, non-overridable. Nothing downstream can
    /// grant access this denies.
    fn decide(&self, _principal: Principal<'_>, scope: &AccessScope) -> PermissionDecision {
        match self.table_perm(&scope.table_id) {
            Some(tp) if tp.allows(scope.action) => PermissionDecision::Allowed,
            _ => PermissionDecision::Denied(DenyReason::TableDeny),
        }
    }
}
