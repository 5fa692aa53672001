//! Override stores
//!
//! Two narrow stores layer on top of role policy: column visibility
//! overrides and manual cell locks. Both scope to principals through the
//! same empty-or-contains role/user lists and share the add/remove
//! principal-list editing used by the admin routes.

pub mod locks;
pub mod visibility;

pub use locks::{CellTarget, ManualCellLock};
pub use visibility::ColumnVisibilityOverride;

use serde::{Deserialize, Serialize};

/// Add/remove edit against a rule's `roles` or `users` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrincipalListPatch {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl PrincipalListPatch {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Set-union add then set-difference remove, preserving order.
pub fn apply_principal_patch(list: &mut Vec<String>, patch: &PrincipalListPatch) {
    for id in &patch.add {
        if !list.contains(id) {
            list.push(id.clone());
        }
    }
    list.retain(|id| !patch.remove.contains(id));
}
