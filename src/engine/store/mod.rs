//! Storage collaborators
//!
//! The engine never performs storage I/O itself; it reads and composes
//! through these traits and hands row queries a filter/sort/projection
//! contract. `MemoryStore` implements every trait for the bundled HTTP
//! surface and the tests.

pub mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::Result;
use super::filter::{RowFilter, SortRule};
use super::overrides::{ColumnVisibilityOverride, ManualCellLock, PrincipalListPatch};
use super::policy::role::RolePolicy;

/// Binding of a user to exactly one role within a base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub base_id: String,
    pub user_id: String,
    pub role_id: String,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(base_id: impl Into<String>, user_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            base_id: base_id.into(),
            user_id: user_id.into(),
            role_id: role_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Catalog entry for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    #[serde(rename = "_id")]
    pub id: String,
    pub base_id: String,
    pub name: String,
}

/// Catalog entry for a column. Columns are addressed by their stable
/// `key`, independent of which storage engine holds the cell values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    #[serde(rename = "_id")]
    pub id: String,
    pub table_id: String,
    pub key: String,
    pub name: String,
}

/// A stored row. `data` maps column key → cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub base_id: String,
    pub table_id: String,
    pub data: Map<String, Value>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RowRecord {
    pub fn new(
        base_id: impl Into<String>,
        table_id: impl Into<String>,
        data: Map<String, Value>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            base_id: base_id.into(),
            table_id: table_id.into(),
            data,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The JSON envelope dotted-path filters evaluate against.
    pub fn envelope(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub trait MembershipStore {
    fn find(&self, base_id: &str, user_id: &str) -> Option<Membership>;
    fn insert(&self, membership: Membership);
    fn set_role(&self, base_id: &str, user_id: &str, role_id: &str) -> bool;
    fn remove(&self, base_id: &str, user_id: &str) -> bool;
    fn list(&self, base_id: &str) -> Vec<Membership>;
    fn count(&self, base_id: &str) -> usize;
}

pub trait RoleStore {
    fn find_by_id(&self, role_id: &str) -> Option<RolePolicy>;
    fn insert(&self, role: RolePolicy);
    /// Compare-and-swap on the role's `version`; fails with
    /// `role_version_conflict` on a stale write.
    fn update(&self, role: RolePolicy) -> Result<RolePolicy>;
    fn list(&self, base_id: &str) -> Vec<RolePolicy>;
}

pub trait VisibilityRuleStore {
    fn find_for_table(&self, base_id: &str, table_id: &str) -> Vec<ColumnVisibilityOverride>;
    /// Last-write overlay on (table, columnKey, roles-set, users-set).
    /// Returns the stored rule and whether it was newly created.
    fn upsert(&self, rule: ColumnVisibilityOverride) -> (ColumnVisibilityOverride, bool);
    fn patch_users(&self, rule_id: &str, patch: &PrincipalListPatch) -> Result<ColumnVisibilityOverride>;
    fn patch_roles(&self, rule_id: &str, patch: &PrincipalListPatch) -> Result<ColumnVisibilityOverride>;
    fn delete(&self, rule_id: &str) -> bool;
}

pub trait ManualLockStore {
    fn find_for_table(&self, base_id: &str, table_id: &str) -> Vec<ManualCellLock>;
    fn insert(&self, lock: ManualCellLock);
    fn patch_users(&self, lock_id: &str, patch: &PrincipalListPatch) -> Result<ManualCellLock>;
    fn patch_roles(&self, lock_id: &str, patch: &PrincipalListPatch) -> Result<ManualCellLock>;
    fn delete(&self, lock_id: &str) -> bool;
}

pub trait TableCatalog {
    fn table(&self, table_id: &str) -> Option<TableInfo>;
    fn table_by_name(&self, base_id: &str, name: &str) -> Option<TableInfo>;
    fn columns(&self, table_id: &str) -> Vec<ColumnInfo>;
    fn tables_in_base(&self, base_id: &str) -> Vec<TableInfo>;
}

pub trait RowStore {
    /// Fetch a page under an already-composed filter and guarded sort.
    fn find_page(
        &self,
        base_id: &str,
        table_id: &str,
        filter: &RowFilter,
        sort: &[SortRule],
        skip: usize,
        limit: usize,
    ) -> Vec<RowRecord>;
    fn get(&self, row_id: &str) -> Option<RowRecord>;
    fn insert(&self, row: RowRecord);
    /// Set the given data keys on a row, bumping `updatedAt`.
    fn patch(&self, row_id: &str, patch: &Map<String, Value>) -> Option<RowRecord>;
    fn delete(&self, row_id: &str) -> bool;
}
