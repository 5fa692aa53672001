//! Visibility-rule & manual-lock handlers
//!
//! Visibility rules sit behind the schema capability; manual locks ride
//! the table's own update/read gates.

use axum::{extract::Path, http::HeaderMap, response::Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{can, can_create_table, ApiResult, AppState, TableRef};
use crate::engine::error::EngineError;
use crate::engine::overrides::{
    CellTarget, ColumnVisibilityOverride, ManualCellLock, PrincipalListPatch,
};
use crate::engine::policy::role::{LockMode, Visibility};
use crate::engine::policy::Action;
use crate::engine::store::{ManualLockStore, VisibilityRuleStore};

#[derive(Deserialize)]
pub(super) struct VisibilityRuleBody {
    visibility: Visibility,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    note: Option<String>,
}

pub(super) async fn create_visibility_rule(
    state: AppState,
    Path((base_id, table_id, column_key)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<VisibilityRuleBody>,
) -> ApiResult<Json<Value>> {
    let (caller, _) = can_create_table(&state, &headers, &base_id)?;

    let rule = ColumnVisibilityOverride {
        id: Uuid::new_v4().to_string(),
        base_id,
        table_id,
        column_key,
        visibility: body.visibility,
        roles: body.roles,
        users: body.users,
        created_by: caller.user_id,
        note: body.note,
        created_at: Utc::now(),
    };
    let (stored, created) = state.store.upsert(rule);
    let message = if created {
        "created_new_rule"
    } else {
        "updated_existing_rule"
    };
    Ok(Json(json!({"ok": true, "data": stored, "message": message})))
}

fn require_nonempty(patch: &PrincipalListPatch) -> ApiResult<()> {
    if patch.is_empty() {
        return Err(EngineError::InvalidPolicy("add_or_remove_required".to_string()).into());
    }
    Ok(())
}

pub(super) async fn patch_visibility_rule_users(
    state: AppState,
    Path((base_id, _table_id, _column_key, rule_id)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Json(patch): Json<PrincipalListPatch>,
) -> ApiResult<Json<Value>> {
    can_create_table(&state, &headers, &base_id)?;
    require_nonempty(&patch)?;
    let updated = VisibilityRuleStore::patch_users(&*state.store, &rule_id, &patch)?;
    Ok(Json(json!({"ok": true, "data": updated})))
}

pub(super) async fn patch_visibility_rule_roles(
    state: AppState,
    Path((base_id, _table_id, _column_key, rule_id)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Json(patch): Json<PrincipalListPatch>,
) -> ApiResult<Json<Value>> {
    can_create_table(&state, &headers, &base_id)?;
    require_nonempty(&patch)?;
    let updated = VisibilityRuleStore::patch_roles(&*state.store, &rule_id, &patch)?;
    Ok(Json(json!({"ok": true, "data": updated})))
}

pub(super) async fn delete_visibility_rule(
    state: AppState,
    Path((base_id, _table_id, _column_key, rule_id)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    can_create_table(&state, &headers, &base_id)?;
    if !VisibilityRuleStore::delete(&*state.store, &rule_id) {
        return Err(EngineError::RuleNotFound.into());
    }
    Ok(Json(json!({"ok": true, "message": "rule_deleted"})))
}

#[derive(Deserialize)]
pub(super) struct CreateLockBody {
    #[serde(default)]
    targets: Vec<CellTarget>,
    mode: LockMode,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    note: Option<String>,
}

pub(super) async fn create_lock(
    state: AppState,
    Path((base_id, table_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<CreateLockBody>,
) -> ApiResult<Json<Value>> {
    let access = can(
        &state,
        &headers,
        &base_id,
        TableRef::Id(table_id),
        Action::Update,
    )?;
    if body.targets.is_empty() {
        return Err(EngineError::InvalidPolicy("targets_required".to_string()).into());
    }

    let lock = ManualCellLock {
        id: Uuid::new_v4().to_string(),
        base_id,
        table_id: access.table.id,
        targets: body.targets,
        mode: body.mode,
        roles: body.roles,
        users: body.users,
        locked_by: access.caller.user_id,
        locked_at: Utc::now(),
        note: body.note,
    };
    ManualLockStore::insert(&*state.store, lock.clone());
    Ok(Json(json!({"ok": true, "data": lock})))
}

pub(super) async fn list_locks(
    state: AppState,
    Path((base_id, table_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let access = can(
        &state,
        &headers,
        &base_id,
        TableRef::Id(table_id),
        Action::Read,
    )?;
    let locks = ManualLockStore::find_for_table(&*state.store, &base_id, &access.table.id);
    Ok(Json(json!({"ok": true, "data": locks})))
}

pub(super) async fn delete_lock(
    state: AppState,
    Path((base_id, table_id, lock_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    can(
        &state,
        &headers,
        &base_id,
        TableRef::Id(table_id),
        Action::Update,
    )?;
    let deleted = ManualLockStore::delete(&*state.store, &lock_id);
    Ok(Json(json!({"ok": true, "deleted": if deleted { 1 } else { 0 }})))
}

pub(super) async fn patch_lock_users(
    state: AppState,
    Path((base_id, table_id, lock_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(patch): Json<PrincipalListPatch>,
) -> ApiResult<Json<Value>> {
    can(
        &state,
        &headers,
        &base_id,
        TableRef::Id(table_id),
        Action::Update,
    )?;
    require_nonempty(&patch)?;
    let updated = ManualLockStore::patch_users(&*state.store, &lock_id, &patch)?;
    Ok(Json(json!({"ok": true, "data": updated})))
}

pub(super) async fn patch_lock_roles(
    state: AppState,
    Path((base_id, table_id, lock_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(patch): Json<PrincipalListPatch>,
) -> ApiResult<Json<Value>> {
    can(
        &state,
        &headers,
        &base_id,
        TableRef::Id(table_id),
        Action::Update,
    )?;
    require_nonempty(&patch)?;
    let updated = ManualLockStore::patch_roles(&*state.store, &lock_id, &patch)?;
    Ok(Json(json!({"ok": true, "data": updated})))
}
