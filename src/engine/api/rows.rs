//! Row CRUD handlers
//!
//! Every handler runs behind `can(action)`. Reads compose the role's row
//! filter with the guarded caller query, then shape each page row through
//! the cell lock compositor; writes re-check lock state against the row's
//! current stored values before any key is applied.

use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::{can, ApiResult, AppState, TableAccess, TableRef};
use crate::engine::error::EngineError;
use crate::engine::filter::{RowFilter, SortRule};
use crate::engine::guard::guard_user_query;
use crate::engine::overrides::{ColumnVisibilityOverride, ManualCellLock};
use crate::engine::policy::Action;
use crate::engine::shape::CellShaper;
use crate::engine::store::{
    ColumnInfo, ManualLockStore, RowRecord, RowStore, TableCatalog, VisibilityRuleStore,
};

#[derive(Deserialize)]
pub(super) struct ListParams {
    #[serde(default)]
    skip: usize,
    #[serde(default = "default_limit")]
    limit: usize,
    /// JSON-encoded filter document.
    filter: Option<String>,
    /// JSON-encoded sort rule list.
    sort: Option<String>,
}

fn default_limit() -> usize {
    50
}

/// Malformed caller JSON falls back to the empty default rather than an
/// error; the guard drops anything it cannot vouch for anyway.
fn parse_or_default<T: Default + for<'de> Deserialize<'de>>(raw: &Option<String>) -> T {
    match raw {
        Some(s) => serde_json::from_str(s).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring malformed query document");
            T::default()
        }),
        None => T::default(),
    }
}

/// Everything the compositor needs beyond the resolved perms.
struct ShaperInputs {
    columns: Vec<ColumnInfo>,
    vis_rules: Vec<ColumnVisibilityOverride>,
    manual_locks: Vec<ManualCellLock>,
}

impl ShaperInputs {
    fn load(state: &AppState, access: &TableAccess) -> Self {
        Self {
            columns: state.store.columns(&access.table.id),
            vis_rules: VisibilityRuleStore::find_for_table(
                &*state.store,
                &access.ctx.base_id,
                &access.table.id,
            ),
            manual_locks: ManualLockStore::find_for_table(
                &*state.store,
                &access.ctx.base_id,
                &access.table.id,
            ),
        }
    }

    fn shaper<'a>(&'a self, access: &'a TableAccess) -> CellShaper<'a> {
        CellShaper::new(
            &self.columns,
            &access.perms.column_perms,
            &self.vis_rules,
            &access.perms.cell_rule_locks,
            &self.manual_locks,
            access.perms.principal(&access.caller.user_id),
        )
    }
}

async fn list_rows_inner(
    state: AppState,
    headers: HeaderMap,
    base_id: String,
    table: TableRef,
    params: ListParams,
) -> ApiResult<Json<Value>> {
    let access = can(&state, &headers, &base_id, table, Action::Read)?;

    let inputs = ShaperInputs::load(&state, &access);
    let shaper = inputs.shaper(&access);

    let user_filter: RowFilter = parse_or_default(&params.filter);
    let user_sort: Vec<SortRule> = parse_or_default(&params.sort);
    let guarded = guard_user_query(&user_filter, &user_sort, shaper.visible_keys());

    let mut match_filter = access.perms.row_filter.clone();
    match_filter.and(guarded.filter);

    let page = state.store.find_page(
        &base_id,
        &access.table.id,
        &match_filter,
        &guarded.sort,
        params.skip,
        params.limit,
    );
    let shaped = shaper.shape_page(page);

    Ok(Json(json!({
        "ok": true,
        "data": shaped,
        "columns": shaper.visible_columns(&inputs.columns),
        "_table": {
            "canCreate": access.perms.can_create,
            "canUpdate": access.perms.can_update,
            "canDelete": access.perms.can_delete,
        },
    })))
}

#[derive(Deserialize)]
pub(super) struct RowBody {
    #[serde(default)]
    data: Map<String, Value>,
}

async fn create_row_inner(
    state: AppState,
    headers: HeaderMap,
    base_id: String,
    table: TableRef,
    body: RowBody,
) -> ApiResult<Json<Value>> {
    let access = can(&state, &headers, &base_id, table, Action::Create)?;
    let row = RowRecord::new(
        &base_id,
        &access.table.id,
        body.data,
        &access.caller.user_id,
    );
    RowStore::insert(&*state.store, row.clone());
    Ok(Json(json!({"ok": true, "data": row})))
}

async fn update_row_inner(
    state: AppState,
    headers: HeaderMap,
    base_id: String,
    table: TableRef,
    row_id: String,
    body: RowBody,
) -> ApiResult<Json<Value>> {
    let access = can(&state, &headers, &base_id, table, Action::Update)?;

    let current = state
        .store
        .get(&row_id)
        .filter(|r| r.base_id == base_id && r.table_id == access.table.id)
        .ok_or(EngineError::RowNotFound)?;

    let inputs = ShaperInputs::load(&state, &access);
    let shaper = inputs.shaper(&access);

    // All-or-nothing: no key is written unless every key passes.
    shaper.check_patch(&current, body.data.keys())?;

    let updated = state
        .store
        .patch(&row_id, &body.data)
        .ok_or(EngineError::RowNotFound)?;
    Ok(Json(json!({"ok": true, "data": shaper.shape_row(updated)})))
}

async fn delete_row_inner(
    state: AppState,
    headers: HeaderMap,
    base_id: String,
    table: TableRef,
    row_id: String,
) -> ApiResult<Json<Value>> {
    let access = can(&state, &headers, &base_id, table, Action::Delete)?;
    let exists = state
        .store
        .get(&row_id)
        .filter(|r| r.base_id == base_id && r.table_id == access.table.id)
        .is_some();
    if !exists {
        return Err(EngineError::RowNotFound.into());
    }
    RowStore::delete(&*state.store, &row_id);
    Ok(Json(json!({"ok": true})))
}

// By-id routes

pub(super) async fn list_rows(
    state: AppState,
    Path((base_id, table_id)): Path<(String, String)>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    list_rows_inner(state, headers, base_id, TableRef::Id(table_id), params).await
}

pub(super) async fn create_row(
    state: AppState,
    Path((base_id, table_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<RowBody>,
) -> ApiResult<Json<Value>> {
    create_row_inner(state, headers, base_id, TableRef::Id(table_id), body).await
}

pub(super) async fn update_row(
    state: AppState,
    Path((base_id, table_id, row_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<RowBody>,
) -> ApiResult<Json<Value>> {
    update_row_inner(state, headers, base_id, TableRef::Id(table_id), row_id, body).await
}

pub(super) async fn delete_row(
    state: AppState,
    Path((base_id, table_id, row_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    delete_row_inner(state, headers, base_id, TableRef::Id(table_id), row_id).await
}

// By-name routes share the same handlers through TableRef::Name.

pub(super) async fn list_rows_by_name(
    state: AppState,
    Path((base_id, table_name)): Path<(String, String)>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    list_rows_inner(state, headers, base_id, TableRef::Name(table_name), params).await
}

pub(super) async fn create_row_by_name(
    state: AppState,
    Path((base_id, table_name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<RowBody>,
) -> ApiResult<Json<Value>> {
    create_row_inner(state, headers, base_id, TableRef::Name(table_name), body).await
}

pub(super) async fn update_row_by_name(
    state: AppState,
    Path((base_id, table_name, row_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<RowBody>,
) -> ApiResult<Json<Value>> {
    update_row_inner(
        state,
        headers,
        base_id,
        TableRef::Name(table_name),
        row_id,
        body,
    )
    .await
}

pub(super) async fn delete_row_by_name(
    state: AppState,
    Path((base_id, table_name, row_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    delete_row_inner(state, headers, base_id, TableRef::Name(table_name), row_id).await
}
