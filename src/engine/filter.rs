//! Row filter documents
//!
//! Row policies, lock `where` clauses and caller-supplied filters all
//! share one structured shape: a map of dotted path → expected value,
//! AND-composed. Paths resolve against the full row envelope, so
//! `data.status` addresses a cell and `createdBy` addresses row metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::PermContext;

/// An AND-composed set of dotted-path equality clauses.
///
/// Composing two filters that constrain the same path keeps both
/// clauses; an impossible conjunction simply matches no rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, Value>")]
pub struct RowFilter {
    clauses: Vec<(String, Value)>,
}

impl From<BTreeMap<String, Value>> for RowFilter {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self {
            clauses: map.into_iter().collect(),
        }
    }
}

impl From<RowFilter> for BTreeMap<String, Value> {
    fn from(filter: RowFilter) -> Self {
        filter.clauses.into_iter().collect()
    }
}

impl RowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn insert(&mut self, path: impl Into<String>, expected: Value) {
        self.clauses.push((path.into(), expected));
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    /// AND-compose another filter into this one.
    pub fn and(&mut self, other: RowFilter) {
        self.clauses.extend(other.clauses);
    }

    /// Replace `$ctx.*` placeholders in every expected value.
    pub fn substituted(&self, ctx: &PermContext) -> RowFilter {
        RowFilter {
            clauses: self
                .clauses
                .iter()
                .map(|(path, expected)| (path.clone(), ctx.substitute(expected)))
                .collect(),
        }
    }

    /// True when every clause holds against the row envelope.
    pub fn matches(&self, envelope: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(path, expected)| resolve_path(envelope, path) == Some(expected))
    }
}

/// Resolve a dotted path against a JSON value.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Sort direction for a single sort rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A caller- or engine-supplied sort entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortRule {
    pub field: String,
    pub direction: SortDirection,
}

impl SortRule {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Compare two JSON values for ordering purposes.
pub fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Order two row envelopes under a sort rule list. Missing values sort
/// after present ones.
pub fn compare_envelopes(a: &Value, b: &Value, sort: &[SortRule]) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    for rule in sort {
        let av = resolve_path(a, &rule.field);
        let bv = resolve_path(b, &rule.field);
        let ordering = match (av, bv) {
            (Some(av), Some(bv)) => compare_values(av, bv).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = match rule.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_path_matching() {
        let row = json!({"_id": "r1", "data": {"status": "Approved", "amount": 10}});
        let filter: RowFilter = serde_json::from_value(json!({"data.status": "Approved"})).unwrap();
        assert!(filter.matches(&row));

        let miss: RowFilter = serde_json::from_value(json!({"data.status": "Draft"})).unwrap();
        assert!(!miss.matches(&row));
    }

    #[test]
    fn test_missing_path_never_matches() {
        let row = json!({"data": {}});
        let filter: RowFilter = serde_json::from_value(json!({"data.owner": "u1"})).unwrap();
        assert!(!filter.matches(&row));
    }

    #[test]
    fn test_and_compose_keeps_conflicting_clauses() {
        let mut a: RowFilter = serde_json::from_value(json!({"data.owner": "u1"})).unwrap();
        let b: RowFilter = serde_json::from_value(json!({"data.owner": "u2"})).unwrap();
        a.and(b);
        assert_eq!(a.len(), 2);
        assert!(!a.matches(&json!({"data": {"owner": "u1"}})));
        assert!(!a.matches(&json!({"data": {"owner": "u2"}})));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(RowFilter::new().matches(&json!({"data": {"x": 1}})));
    }

    #[test]
    fn test_substitution() {
        let ctx = PermContext::new("u7", None, "b1");
        let filter: RowFilter =
            serde_json::from_value(json!({"data.ownerId": "$ctx.userId"})).unwrap();
        let resolved = filter.substituted(&ctx);
        assert!(resolved.matches(&json!({"data": {"ownerId": "u7"}})));
        assert!(!resolved.matches(&json!({"data": {"ownerId": "u8"}})));
    }

    #[test]
    fn test_envelope_ordering() {
        let a = json!({"_id": "a", "data": {"n": 1}});
        let b = json!({"_id": "b", "data": {"n": 2}});
        let sort = vec![SortRule::desc("data.n")];
        assert_eq!(compare_envelopes(&a, &b, &sort), std::cmp::Ordering::Greater);

        let tie = vec![SortRule::asc("data.n"), SortRule::asc("_id")];
        assert_eq!(compare_envelopes(&a, &a, &tie), std::cmp::Ordering::Equal);
    }
}
