//! Role & membership administration handlers

use axum::{extract::Path, http::HeaderMap, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{can_manage_members, require_member, ApiResult, AppState};
use crate::engine::error::EngineError;
use crate::engine::members;
use crate::engine::policy::patch::PermsPatch;
use crate::engine::policy::role::RolePolicy;
use crate::engine::store::{MembershipStore, RoleStore, TableCatalog};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateRoleBody {
    name: String,
    #[serde(default)]
    can_manage_members: bool,
    #[serde(default)]
    can_manage_schema: bool,
    #[serde(default)]
    can_create_tables: bool,
}

pub(super) async fn create_role(
    state: AppState,
    Path(base_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CreateRoleBody>,
) -> ApiResult<Json<Value>> {
    can_manage_members(&state, &headers, &base_id)?;

    let mut role = RolePolicy::new(Uuid::new_v4().to_string(), &base_id, &body.name);
    role.can_manage_members = body.can_manage_members;
    role.can_manage_schema = body.can_manage_schema;
    role.can_create_tables = body.can_create_tables;
    RoleStore::insert(&*state.store, role.clone());

    Ok(Json(json!({"ok": true, "data": role})))
}

pub(super) async fn list_roles(
    state: AppState,
    Path(base_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_member(&state, &headers, &base_id)?;
    let roles = RoleStore::list(&*state.store, &base_id);
    Ok(Json(json!({"ok": true, "data": roles})))
}

/// Apply a structured perms patch to a role: validate table scoping,
/// apply in memory, persist through the version CAS.
pub(super) async fn patch_role_perms(
    state: AppState,
    Path((base_id, role_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(patch): Json<PermsPatch>,
) -> ApiResult<Json<Value>> {
    can_manage_members(&state, &headers, &base_id)?;

    let mut role = state
        .store
        .find_by_id(&role_id)
        .filter(|r| r.base_id == base_id)
        .ok_or(EngineError::RoleNotFoundInBase)?;

    let dirty = patch.apply(&mut role);
    if dirty {
        let known_tables: Vec<String> = state
            .store
            .tables_in_base(&base_id)
            .into_iter()
            .map(|t| t.id)
            .collect();
        role.validate_for_base(&known_tables)?;
        role = state.store.update(role)?;
    }

    Ok(Json(json!({"ok": true, "message": "perms_updated", "data": role})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AddMemberBody {
    user_id: String,
    role_id: String,
}

pub(super) async fn add_member(
    state: AppState,
    Path(base_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddMemberBody>,
) -> ApiResult<Json<Value>> {
    can_manage_members(&state, &headers, &base_id)?;
    let membership = members::add_member(
        &*state.store,
        &*state.store,
        &base_id,
        &body.user_id,
        &body.role_id,
        state.member_limit,
    )?;
    Ok(Json(json!({"ok": true, "data": membership})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ChangeRoleBody {
    role_id: String,
}

pub(super) async fn change_member_role(
    state: AppState,
    Path((base_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ChangeRoleBody>,
) -> ApiResult<Json<Value>> {
    let (caller, _) = can_manage_members(&state, &headers, &base_id)?;
    let membership = members::change_role(
        &*state.store,
        &*state.store,
        &base_id,
        &caller.user_id,
        &user_id,
        &body.role_id,
    )?;
    Ok(Json(json!({"ok": true, "data": membership})))
}

pub(super) async fn remove_member(
    state: AppState,
    Path((base_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    can_manage_members(&state, &headers, &base_id)?;
    members::remove_member(&*state.store, &*state.store, &base_id, &user_id)?;
    Ok(Json(json!({"ok": true, "message": "member_removed"})))
}

pub(super) async fn list_members(
    state: AppState,
    Path(base_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    can_manage_members(&state, &headers, &base_id)?;

    let memberships = MembershipStore::list(&*state.store, &base_id);
    let data: Vec<Value> = memberships
        .into_iter()
        .map(|m| {
            let role = state.store.find_by_id(&m.role_id);
            json!({
                "userId": m.user_id,
                "roleId": m.role_id,
                "roleName": role.as_ref().map(|r| r.name.clone()),
                "canManageBase": role.map(|r| r.is_managerial()).unwrap_or(false),
                "createdAt": m.created_at,
            })
        })
        .collect();

    Ok(Json(json!({"ok": true, "data": data})))
}

pub(super) async fn my_membership(
    state: AppState,
    Path(base_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let caller = super::caller(&headers)?;
    let me = members::my_membership(&*state.store, &*state.store, &base_id, &caller.user_id);
    Ok(Json(json!({"ok": true, "member": me})))
}
