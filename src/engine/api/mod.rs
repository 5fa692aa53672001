//! GridGate API Module
//! REST surface over the permission engine: row CRUD behind `can(action)`,
//! plus the administrative routes for roles, members, visibility rules and
//! manual locks.

mod admin;
mod overrides;
mod rows;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::context::PermContext;
use crate::engine::error::{DenyReason, EngineError};
use crate::engine::policy::role::RolePolicy;
use crate::engine::policy::Action;
use crate::engine::resolver::{load_member_role, resolve_effective_perms, ResolvedPerms};
use crate::engine::store::{MemoryStore, TableCatalog, TableInfo};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<MemoryStore>,
    /// Per-base member quota from config.
    pub member_limit: usize,
}

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        // Row CRUD, by table id and by table name
        .route(
            "/api/bases/{base_id}/tables/{table_id}/rows",
            get(rows::list_rows).post(rows::create_row),
        )
        .route(
            "/api/bases/{base_id}/tables/{table_id}/rows/{row_id}",
            patch(rows::update_row).delete(rows::delete_row),
        )
        .route(
            "/api/bases/{base_id}/tables/by-name/{table_name}/rows",
            get(rows::list_rows_by_name).post(rows::create_row_by_name),
        )
        .route(
            "/api/bases/{base_id}/tables/by-name/{table_name}/rows/{row_id}",
            patch(rows::update_row_by_name).delete(rows::delete_row_by_name),
        )
        // Role administration
        .route(
            "/api/bases/{base_id}/roles",
            get(admin::list_roles).post(admin::create_role),
        )
        .route(
            "/api/bases/{base_id}/roles/{role_id}/perms",
            post(admin::patch_role_perms),
        )
        // Membership administration
        .route(
            "/api/bases/{base_id}/members",
            get(admin::list_members).post(admin::add_member),
        )
        .route("/api/bases/{base_id}/members/me", get(admin::my_membership))
        .route(
            "/api/bases/{base_id}/members/{user_id}",
            patch(admin::change_member_role).delete(admin::remove_member),
        )
        // Column visibility overrides
        .route(
            "/api/bases/{base_id}/tables/{table_id}/columns/{column_key}/visibility-rules",
            post(overrides::create_visibility_rule),
        )
        .route(
            "/api/bases/{base_id}/tables/{table_id}/columns/{column_key}/visibility-rules/{rule_id}",
            delete(overrides::delete_visibility_rule),
        )
        .route(
            "/api/bases/{base_id}/tables/{table_id}/columns/{column_key}/visibility-rules/{rule_id}/users",
            patch(overrides::patch_visibility_rule_users),
        )
        .route(
            "/api/bases/{base_id}/tables/{table_id}/columns/{column_key}/visibility-rules/{rule_id}/roles",
            patch(overrides::patch_visibility_rule_roles),
        )
        // Manual cell locks
        .route(
            "/api/bases/{base_id}/tables/{table_id}/locks",
            get(overrides::list_locks).post(overrides::create_lock),
        )
        .route(
            "/api/bases/{base_id}/tables/{table_id}/locks/{lock_id}",
            delete(overrides::delete_lock),
        )
        .route(
            "/api/bases/{base_id}/tables/{table_id}/locks/{lock_id}/users",
            patch(overrides::patch_lock_users),
        )
        .route(
            "/api/bases/{base_id}/tables/{table_id}/locks/{lock_id}/roles",
            patch(overrides::patch_lock_roles),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Engine failure carried to the HTTP boundary.
pub struct ApiError(EngineError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl From<DenyReason> for ApiError {
    fn from(reason: DenyReason) -> Self {
        ApiError(EngineError::Denied(reason))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::Denied(reason) => match reason {
                DenyReason::BaseIdRequired | DenyReason::TableIdRequired => StatusCode::BAD_REQUEST,
                DenyReason::Unauthorized => StatusCode::UNAUTHORIZED,
                _ => StatusCode::FORBIDDEN,
            },
            EngineError::TableNotFound
            | EngineError::RowNotFound
            | EngineError::RuleNotFound
            | EngineError::LockNotFound
            | EngineError::MemberNotFound
            | EngineError::RoleNotFoundInBase => StatusCode::NOT_FOUND,
            EngineError::AlreadyMember
            | EngineError::InvalidRole
            | EngineError::CannotChangeOwnRole
            | EngineError::InvalidPolicy(_) => StatusCode::BAD_REQUEST,
            EngineError::MemberLimitReached | EngineError::CannotRemoveLastManager => {
                StatusCode::FORBIDDEN
            }
            EngineError::RoleVersionConflict => StatusCode::CONFLICT,
            EngineError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({"ok": false, "error": self.0.to_string()});
        (status, Json(body)).into_response()
    }
}

/// The authenticated principal, supplied by the auth layer in front of
/// this service (authentication itself is out of scope here).
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub org_id: Option<String>,
}

pub(super) fn caller(headers: &HeaderMap) -> ApiResult<Caller> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(DenyReason::Unauthorized)?
        .to_string();
    let org_id = headers
        .get("x-org-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok(Caller { user_id, org_id })
}

/// A table addressed directly or by name.
pub(super) enum TableRef {
    Id(String),
    Name(String),
}

/// The resolved policy attached to a request by `can(action)`.
pub(super) struct TableAccess {
    pub caller: Caller,
    pub table: TableInfo,
    pub perms: ResolvedPerms,
    pub ctx: PermContext,
}

/// `can(action)`: resolve the table, run the permission resolver, 403 on
/// deny. Handlers receive the resolved policy for downstream shaping.
pub(super) fn can(
    state: &ApiState,
    headers: &HeaderMap,
    base_id: &str,
    table: TableRef,
    action: Action,
) -> ApiResult<TableAccess> {
    let caller = caller(headers)?;
    if base_id.is_empty() {
        return Err(DenyReason::BaseIdRequired.into());
    }

    let table = match table {
        TableRef::Id(id) => {
            if id.is_empty() {
                return Err(DenyReason::TableIdRequired.into());
            }
            state.store.table(&id).ok_or(EngineError::TableNotFound)?
        }
        TableRef::Name(name) => state
            .store
            .table_by_name(base_id, &name)
            .ok_or(EngineError::TableNotFound)?,
    };

    let ctx = PermContext::new(caller.user_id.clone(), caller.org_id.clone(), base_id);
    let perms = resolve_effective_perms(&*state.store, &*state.store, &ctx, &table.id, action)?;

    Ok(TableAccess {
        caller,
        table,
        perms,
        ctx,
    })
}

/// `canManageMembers()`: single-flag check, no row/column composition.
pub(super) fn can_manage_members(
    state: &ApiState,
    headers: &HeaderMap,
    base_id: &str,
) -> ApiResult<(Caller, RolePolicy)> {
    let caller = caller(headers)?;
    if base_id.is_empty() {
        return Err(DenyReason::BaseIdRequired.into());
    }
    let (_, role) = load_member_role(&*state.store, &*state.store, base_id, &caller.user_id)?;
    if !role.can_manage_members {
        return Err(DenyReason::NoManagePermission.into());
    }
    Ok((caller, role))
}

/// `canCreateTable()`: schema-capability check used by the
/// visibility-rule admin routes.
pub(super) fn can_create_table(
    state: &ApiState,
    headers: &HeaderMap,
    base_id: &str,
) -> ApiResult<(Caller, RolePolicy)> {
    let caller = caller(headers)?;
    if base_id.is_empty() {
        return Err(DenyReason::BaseIdRequired.into());
    }
    let (_, role) = load_member_role(&*state.store, &*state.store, base_id, &caller.user_id)?;
    if !role.can_create_tables && !role.can_manage_schema {
        return Err(DenyReason::NoManagePermission.into());
    }
    Ok((caller, role))
}

/// Any-member check for read-only admin listings.
pub(super) fn require_member(
    state: &ApiState,
    headers: &HeaderMap,
    base_id: &str,
) -> ApiResult<(Caller, RolePolicy)> {
    let caller = caller(headers)?;
    if base_id.is_empty() {
        return Err(DenyReason::BaseIdRequired.into());
    }
    let (_, role) = load_member_role(&*state.store, &*state.store, base_id, &caller.user_id)?;
    Ok((caller, role))
}

// State extractor alias used by the handler modules.
pub(super) type AppState = State<ApiState>;
