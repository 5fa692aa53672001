//! Row Query Guard
//!
//! Caller-supplied filter/sort expressions are sanitized against the
//! finalized visible-key set before they reach the row store, so they
//! cannot probe hidden columns. Disallowed entries are dropped silently;
//! an error here would itself leak that the column exists.

use std::collections::HashSet;

use super::filter::{RowFilter, SortRule};

/// Row metadata fields always sortable regardless of column visibility.
pub const SYSTEM_SORT_FIELDS: [&str; 3] = ["_id", "createdAt", "updatedAt"];

/// Namespace prefix addressing cell values in a row envelope.
pub const DATA_PREFIX: &str = "data.";

/// A sanitized filter/sort pair, safe to hand to the row store.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedQuery {
    pub filter: RowFilter,
    pub sort: Vec<SortRule>,
}

/// The column key a data-namespace path addresses, if any.
fn addressed_column(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(DATA_PREFIX)?;
    rest.split('.').next().filter(|k| !k.is_empty())
}

/// Sanitize a caller-supplied query against the visible column keys.
pub fn guard_user_query(
    user_filter: &RowFilter,
    user_sort: &[SortRule],
    visible_keys: &HashSet<String>,
) -> GuardedQuery {
    let mut filter = RowFilter::new();
    for (path, expected) in user_filter.clauses() {
        match addressed_column(path) {
            Some(key) if visible_keys.contains(key) => filter.insert(path.clone(), expected.clone()),
            _ => {}
        }
    }

    let mut sort: Vec<SortRule> = user_sort
        .iter()
        .filter(|rule| {
            SYSTEM_SORT_FIELDS.contains(&rule.field.as_str())
                || addressed_column(&rule.field)
                    .map(|key| visible_keys.contains(key))
                    .unwrap_or(false)
        })
        .cloned()
        .collect();

    // Deterministic fallback keeps pagination stable.
    if sort.is_empty() {
        sort.push(SortRule::asc("_id"));
    }

    GuardedQuery { filter, sort }
}
