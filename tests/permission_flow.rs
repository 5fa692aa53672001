use serde_json::{json, Map, Value};

use gridgate::engine::context::PermContext;
use gridgate::engine::error::{DenyReason, EngineError};
use gridgate::engine::filter::SortRule;
use gridgate::engine::guard::guard_user_query;
use gridgate::engine::policy::role::{
    CellRuleLock, ColumnPerm, EditLevel, LockMode, RolePolicy, RowPolicy, TablePerm, Visibility,
};
use gridgate::engine::policy::Action;
use gridgate::engine::resolver::resolve_effective_perms;
use gridgate::engine::shape::{CellLockState, CellShaper, REDACTION_MARKER};
use gridgate::engine::overrides::ColumnVisibilityOverride;
use gridgate::engine::store::{
    ColumnInfo, ManualLockStore, Membership, MembershipStore, MemoryStore, RoleStore, RowRecord,
    RowStore, TableCatalog, TableInfo, VisibilityRuleStore,
};

fn data(pairs: Value) -> Map<String, Value> {
    serde_json::from_value(pairs).unwrap()
}

struct Fixture {
    store: MemoryStore,
    table: TableInfo,
}

/// One base, one table, one member role gated to read+update.
fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let table = store.add_table("b1", "invoices", &["status", "amount", "salary", "ownerId"]);

    let mut role = RolePolicy::new("member-role", "b1", "member");
    role.table_perms.push(TablePerm {
        table_id: table.id.clone(),
        create: true,
        read: true,
        update: true,
        delete: false,
    });
    RoleStore::insert(&store, role);
    MembershipStore::insert(&store, Membership::new("b1", "u1", "member-role"));

    Fixture { store, table }
}

fn update_role(store: &MemoryStore, edit: impl FnOnce(&mut RolePolicy)) {
    let mut role = store.find_by_id("member-role").unwrap();
    edit(&mut role);
    RoleStore::update(store, role).unwrap();
}

fn resolve(fx: &Fixture, user: &str, action: Action) -> Result<gridgate::ResolvedPerms, EngineError> {
    let ctx = PermContext::new(user, None, "b1");
    resolve_effective_perms(&fx.store, &fx.store, &ctx, &fx.table.id, action)
}

fn shaper<'a>(
    perms: &'a gridgate::ResolvedPerms,
    columns: &'a [ColumnInfo],
    vis_rules: &'a [gridgate::engine::overrides::ColumnVisibilityOverride],
    manual: &'a [gridgate::engine::overrides::ManualCellLock],
) -> CellShaper<'a> {
    CellShaper::new(
        columns,
        &perms.column_perms,
        vis_rules,
        &perms.cell_rule_locks,
        manual,
        perms.principal("u1"),
    )
}

#[test]
fn scenario_a_hidden_column_never_leaves_the_engine() -> Result<(), Box<dyn std::error::Error>> {
    let fx = fixture();

    // 1. Role statically hides `salary` for the table.
    update_role(&fx.store, |role| {
        role.column_perms.push(ColumnPerm {
            table_id: fx.table.id.clone(),
            column_id: None,
            column_key: "salary".into(),
            visibility: Visibility::Hidden,
            edit: EditLevel::None,
            deletable: false,
        });
    });

    // 2. A row with a salary value is stored.
    RowStore::insert(
        &fx.store,
        RowRecord::new(
            "b1",
            &fx.table.id,
            data(json!({"status": "Open", "salary": 90000, "ownerId": "u1"})),
            "u1",
        ),
    );

    // 3. A visible override scoped to every principal must not lift the
    // role-level hidden (deny-first).
    let (_, created) = fx.store.upsert(ColumnVisibilityOverride {
        id: "ov1".into(),
        base_id: "b1".into(),
        table_id: fx.table.id.clone(),
        column_key: "salary".into(),
        visibility: Visibility::Visible,
        roles: vec![],
        users: vec![],
        created_by: "admin".into(),
        note: None,
        created_at: chrono::Utc::now(),
    });
    assert!(created);

    // 4. Fetch as the member: salary appears neither in data nor columns.
    let perms = resolve(&fx, "u1", Action::Read)?;
    let columns = fx.store.columns(&fx.table.id);
    let vis = VisibilityRuleStore::find_for_table(&fx.store, "b1", &fx.table.id);
    let manual = ManualLockStore::find_for_table(&fx.store, "b1", &fx.table.id);
    let shaper = shaper(&perms, &columns, &vis, &manual);

    let page = fx
        .store
        .find_page("b1", &fx.table.id, &perms.row_filter, &[SortRule::asc("_id")], 0, 50);
    let shaped = shaper.shape_page(page);

    assert_eq!(shaped.len(), 1);
    assert!(!shaped[0].row.data.contains_key("salary"));
    assert!(shaped[0].row.data.contains_key("status"));
    assert!(shaper.visible_columns(&columns).iter().all(|c| c.key != "salary"));

    // 5. The serialized response shape carries no trace of the column.
    let serialized = serde_json::to_value(&shaped[0])?;
    assert!(serialized["data"].get("salary").is_none());

    Ok(())
}

#[test]
fn scenario_b_rule_lock_blocks_patch() -> Result<(), Box<dyn std::error::Error>> {
    let fx = fixture();

    // 1. readOnly rule lock on `amount` for approved rows.
    update_role(&fx.store, |role| {
        role.cell_rule_locks.push(CellRuleLock {
            table_id: fx.table.id.clone(),
            where_clause: serde_json::from_value(json!({"data.status": "Approved"})).unwrap(),
            columns: vec!["amount".into()],
            mode: LockMode::ReadOnly,
            roles: vec![],
            users: vec![],
        });
    });

    let approved = RowRecord::new(
        "b1",
        &fx.table.id,
        data(json!({"status": "Approved", "amount": 100})),
        "u1",
    );
    RowStore::insert(&fx.store, approved.clone());

    let perms = resolve(&fx, "u1", Action::Update)?;
    let columns = fx.store.columns(&fx.table.id);
    let shaper = shaper(&perms, &columns, &[], &[]);

    // 2. The read path reports the lock.
    let shaped = shaper.shape_row(approved.clone());
    assert_eq!(shaped.locks.get("amount"), Some(&CellLockState::ReadOnly));

    // 3. The write path rejects the patch with cell_locked:amount.
    let patch = data(json!({"amount": 200}));
    let err = shaper.check_patch(&approved, patch.keys()).unwrap_err();
    match err {
        EngineError::Denied(DenyReason::CellLocked(key)) => assert_eq!(key, "amount"),
        other => panic!("unexpected error: {other}"),
    }

    Ok(())
}

#[test]
fn scenario_c_row_policy_restricts_to_own_rows() -> Result<(), Box<dyn std::error::Error>> {
    let fx = fixture();

    update_role(&fx.store, |role| {
        role.row_policies.push(RowPolicy {
            table_id: fx.table.id.clone(),
            query_template: serde_json::from_value(json!({"data.ownerId": "$ctx.userId"}))
                .unwrap(),
        });
    });

    RowStore::insert(
        &fx.store,
        RowRecord::new("b1", &fx.table.id, data(json!({"ownerId": "u1", "amount": 1})), "u1"),
    );
    RowStore::insert(
        &fx.store,
        RowRecord::new("b1", &fx.table.id, data(json!({"ownerId": "u2", "amount": 2})), "u2"),
    );

    let perms = resolve(&fx, "u1", Action::Read)?;
    let page = fx
        .store
        .find_page("b1", &fx.table.id, &perms.row_filter, &[SortRule::asc("_id")], 0, 50);

    assert_eq!(page.len(), 1);
    assert_eq!(page[0].data["ownerId"], json!("u1"));
    Ok(())
}

#[test]
fn table_gate_is_non_overridable() -> Result<(), Box<dyn std::error::Error>> {
    let fx = fixture();

    // Remove the read flag; row policies and column perms cannot help.
    update_role(&fx.store, |role| {
        role.table_perms[0].read = false;
        role.row_policies.push(RowPolicy {
            table_id: fx.table.id.clone(),
            query_template: Default::default(),
        });
    });

    let err = resolve(&fx, "u1", Action::Read).unwrap_err();
    assert!(matches!(err, EngineError::Denied(DenyReason::TableDeny)));
    Ok(())
}

#[test]
fn missing_membership_denies_every_action() {
    let fx = fixture();
    for action in [Action::Create, Action::Read, Action::Update, Action::Delete] {
        let err = resolve(&fx, "stranger", action).unwrap_err();
        assert!(matches!(err, EngineError::Denied(DenyReason::NotAMember)));
    }
}

#[test]
fn guard_drops_hidden_keys_and_falls_back_deterministically() {
    let visible: std::collections::HashSet<String> = ["status".to_string()].into_iter().collect();

    let user_filter = serde_json::from_value(json!({
        "data.status": "Open",
        "data.salary": {"$gte": 0}
    }))
    .unwrap();
    let user_sort = vec![SortRule::desc("data.salary")];

    let guarded = guard_user_query(&user_filter, &user_sort, &visible);
    assert_eq!(guarded.filter.len(), 1);
    assert_eq!(guarded.filter.clauses()[0].0, "data.status");
    assert_eq!(guarded.sort, vec![SortRule::asc("_id")]);
}

#[test]
fn write_rejection_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let fx = fixture();

    update_role(&fx.store, |role| {
        role.cell_rule_locks.push(CellRuleLock {
            table_id: fx.table.id.clone(),
            where_clause: serde_json::from_value(json!({"data.status": "Approved"})).unwrap(),
            columns: vec!["amount".into()],
            mode: LockMode::ReadOnly,
            roles: vec![],
            users: vec![],
        });
    });

    let row = RowRecord::new(
        "b1",
        &fx.table.id,
        data(json!({"status": "Approved", "amount": 100})),
        "u1",
    );
    let row_id = row.id.clone();
    RowStore::insert(&fx.store, row.clone());

    let perms = resolve(&fx, "u1", Action::Update)?;
    let columns = fx.store.columns(&fx.table.id);
    let shaper = shaper(&perms, &columns, &[], &[]);

    // Patch touches one locked key and one unlocked key.
    let patch = data(json!({"amount": 999, "status": "Draft"}));
    assert!(shaper.check_patch(&row, patch.keys()).is_err());

    // Nothing was applied: the unlocked key keeps its stored value.
    let stored = fx.store.get(&row_id).unwrap();
    assert_eq!(stored.data["status"], json!("Approved"));
    assert_eq!(stored.data["amount"], json!(100));
    Ok(())
}

#[test]
fn redaction_marker_for_hidden_cells() -> Result<(), Box<dyn std::error::Error>> {
    let fx = fixture();

    update_role(&fx.store, |role| {
        role.cell_rule_locks.push(CellRuleLock {
            table_id: fx.table.id.clone(),
            where_clause: serde_json::from_value(json!({"data.status": "Confidential"})).unwrap(),
            columns: vec!["amount".into()],
            mode: LockMode::Hidden,
            roles: vec![],
            users: vec![],
        });
    });

    let row = RowRecord::new(
        "b1",
        &fx.table.id,
        data(json!({"status": "Confidential", "amount": 5000})),
        "u1",
    );

    let perms = resolve(&fx, "u1", Action::Read)?;
    let columns = fx.store.columns(&fx.table.id);
    let shaper = shaper(&perms, &columns, &[], &[]);
    let shaped = shaper.shape_row(row);

    assert_eq!(shaped.row.data["amount"], json!(REDACTION_MARKER));
    assert_eq!(shaped.locks.get("amount"), Some(&CellLockState::Hidden));
    Ok(())
}
