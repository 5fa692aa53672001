//! Engine Error Types
//!
//! Failures are classified, never thrown opaque: authorization denials
//! carry a stable machine-readable reason code that the HTTP layer maps
//! onto a status.

use thiserror::Error;

/// A classified authorization denial.
///
/// The `Display` form is the wire-level reason code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    #[error("baseId_required")]
    BaseIdRequired,

    #[error("tableId_required")]
    TableIdRequired,

    /// No authenticated principal on the request.
    #[error("unauthorized")]
    Unauthorized,

    #[error("not_a_member")]
    NotAMember,

    #[error("role_not_found")]
    RoleNotFound,

    #[error("no_manage_permission")]
    NoManagePermission,

    /// The table-level gate denied the action. Non-overridable.
    #[error("table_deny")]
    TableDeny,

    /// A write touched a column outside the caller's visible set.
    #[error("column_hidden:{0}")]
    ColumnHidden(String),

    /// A write touched a cell resolved to `hidden` or `readOnly`.
    #[error("cell_locked:{0}")]
    CellLocked(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Denied(#[from] DenyReason),

    #[error("table_not_found")]
    TableNotFound,

    #[error("row_not_found")]
    RowNotFound,

    #[error("rule_not_found")]
    RuleNotFound,

    #[error("lock_not_found")]
    LockNotFound,

    #[error("member_not_found")]
    MemberNotFound,

    #[error("user_already_member")]
    AlreadyMember,

    #[error("per_base_user_limit")]
    MemberLimitReached,

    #[error("invalid_role")]
    InvalidRole,

    #[error("role_not_found_in_base")]
    RoleNotFoundInBase,

    #[error("cannot_change_own_role")]
    CannotChangeOwnRole,

    #[error("cannot_remove_last_manager")]
    CannotRemoveLastManager,

    /// Compare-and-swap failure on a role policy update.
    #[error("role_version_conflict")]
    RoleVersionConflict,

    #[error("invalid_policy: {0}")]
    InvalidPolicy(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the failure is an authorization denial (vs. a lookup or
    /// state error).
    pub fn is_denial(&self) -> bool {
        matches!(self, EngineError::Denied(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
