//! Manual cell locks
//!
//! Explicit, administrator-placed locks on resolved row/column targets,
//! independent of any condition. Overlaid on top of rule-based locks by
//! the compositor under the same hidden > readOnly priority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::policy::role::LockMode;
use crate::engine::policy::{applies_to_principal, Principal};

/// A single locked cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellTarget {
    pub row_id: String,
    pub column_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCellLock {
    #[serde(rename = "_id")]
    pub id: String,
    pub base_id: String,
    pub table_id: String,
    pub targets: Vec<CellTarget>,
    pub mode: LockMode,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ManualCellLock {
    pub fn applies_to(&self, principal: Principal<'_>) -> bool {
        applies_to_principal(&self.roles, &self.users, principal)
    }

    /// Targets on one row of the lock.
    pub fn targets_for_row<'a>(&'a self, row_id: &'a str) -> impl Iterator<Item = &'a CellTarget> {
        self.targets.iter().filter(move |t| t.row_id == row_id)
    }
}
