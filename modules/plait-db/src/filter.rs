//! Composable query predicates compiled to parameterized SQL.
//!
//! A filter is `(column, comparator, argument)`. Filters compose with AND;
//! callers that need OR build parenthesised groups by hand. Collection
//! arguments expand to one placeholder per element; an `in` over an empty
//! collection compiles to `1 = 0` so the query matches nothing instead of
//! erroring.

use sqlx::sqlite::{Sqlite, SqliteArguments};

/// A single bindable argument. Byte slices are scalars (opaque blobs), not
/// collections.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    IntList(Vec<i64>),
    TextList(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Gte,
    Lte,
    Is,
    IsNot,
    In,
}

impl Cmp {
    fn sql(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "<>",
            Cmp::Gte => ">=",
            Cmp::Lte => "<=",
            Cmp::Is => "is",
            Cmp::IsNot => "is not",
            Cmp::In => "in",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Filter {
    column: String,
    cmp: Cmp,
    value: FilterValue,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Cmp::Eq, value.into())
    }

    pub fn ne(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Cmp::Ne, value.into())
    }

    pub fn gte(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Cmp::Gte, value.into())
    }

    pub fn lte(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Cmp::Lte, value.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, Cmp::Is, FilterValue::Null)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::new(column, Cmp::IsNot, FilterValue::Null)
    }

    /// Membership test. Accepts [`FilterValue::TextList`] or
    /// [`FilterValue::IntList`]; a scalar argument degrades to `=`-like
    /// single-placeholder membership.
    pub fn r#in(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Cmp::In, value.into())
    }

    fn new(column: impl Into<String>, cmp: Cmp, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            cmp,
            value,
        }
    }

    /// The SQL fragment for this filter, placeholders included.
    pub fn condition(&self) -> String {
        match (self.cmp, &self.value) {
            (Cmp::In, FilterValue::TextList(xs)) => in_condition(&self.column, xs.len()),
            (Cmp::In, FilterValue::IntList(xs)) => in_condition(&self.column, xs.len()),
            (Cmp::In, _) => format!("{} in (?)", self.column),
            (Cmp::Is, FilterValue::Null) => format!("{} is null", self.column),
            (Cmp::IsNot, FilterValue::Null) => format!("{} is not null", self.column),
            (cmp, _) => format!("{} {} ?", self.column, cmp.sql()),
        }
    }

    /// The bind parameters for [`Self::condition`], collections spread into
    /// scalars. An empty `in` yields no parameters to match its `1 = 0`
    /// condition.
    pub fn args(&self) -> Vec<FilterValue> {
        match &self.value {
            FilterValue::Null => vec![],
            FilterValue::TextList(xs) => xs.iter().cloned().map(FilterValue::Text).collect(),
            FilterValue::IntList(xs) => xs.iter().copied().map(FilterValue::Int).collect(),
            scalar => vec![scalar.clone()],
        }
    }
}

fn in_condition(column: &str, n: usize) -> String {
    if n == 0 {
        // Matches nothing; keeps the composed WHERE clause well-formed.
        return "1 = 0".to_string();
    }
    let placeholders = vec!["?"; n].join(", ");
    format!("{column} in ({placeholders})")
}

/// AND-join a filter set into a `WHERE …` clause (empty string when there
/// are no filters) plus the flattened bind parameters.
pub fn where_clause(filters: &[Filter]) -> (String, Vec<FilterValue>) {
    if filters.is_empty() {
        return (String::new(), vec![]);
    }
    let conditions: Vec<String> = filters.iter().map(Filter::condition).collect();
    let args = filters.iter().flat_map(Filter::args).collect();
    (format!(" where {}", conditions.join(" and ")), args)
}

/// Bind one argument onto a dynamically-built query.
pub fn bind<'q, O>(
    query: sqlx::query::QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    value: &FilterValue,
) -> sqlx::query::QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    match value {
        FilterValue::Null => query.bind(None::<String>),
        FilterValue::Bool(b) => query.bind(*b),
        FilterValue::Int(i) => query.bind(*i),
        FilterValue::Text(s) => query.bind(s.clone()),
        FilterValue::Bytes(b) => query.bind(b.clone()),
        // Collections are spread by `args()`; reaching here is a caller bug,
        // bind the raw list as a scalar so the mismatch surfaces in SQL.
        FilterValue::TextList(xs) => query.bind(xs.join(",")),
        FilterValue::IntList(xs) => query.bind(
            xs.iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

/// [`bind`] for statements that return no rows.
pub fn bind_exec<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &FilterValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        FilterValue::Null => query.bind(None::<String>),
        FilterValue::Bool(b) => query.bind(*b),
        FilterValue::Int(i) => query.bind(*i),
        FilterValue::Text(s) => query.bind(s.clone()),
        FilterValue::Bytes(b) => query.bind(b.clone()),
        FilterValue::TextList(xs) => query.bind(xs.join(",")),
        FilterValue::IntList(xs) => query.bind(
            xs.iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<Vec<u8>> for FilterValue {
    fn from(v: Vec<u8>) -> Self {
        FilterValue::Bytes(v)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(v: Vec<String>) -> Self {
        FilterValue::TextList(v)
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(v: Vec<&str>) -> Self {
        FilterValue::TextList(v.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<i64>> for FilterValue {
    fn from(v: Vec<i64>) -> Self {
        FilterValue::IntList(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_condition() {
        let f = Filter::eq("did", "did:plc:abc");
        assert_eq!(f.condition(), "did = ?");
        assert_eq!(f.args(), vec![FilterValue::Text("did:plc:abc".into())]);
    }

    #[test]
    fn in_spreads_placeholders() {
        let f = Filter::r#in("repo_at", vec!["a", "b", "c"]);
        assert_eq!(f.condition(), "repo_at in (?, ?, ?)");
        assert_eq!(f.args().len(), 3);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let f = Filter::r#in("repo_at", Vec::<String>::new());
        assert_eq!(f.condition(), "1 = 0");
        assert!(f.args().is_empty());
    }

    #[test]
    fn null_comparisons_take_no_args() {
        assert_eq!(Filter::is_null("deleted").condition(), "deleted is null");
        assert!(Filter::is_null("deleted").args().is_empty());
        assert_eq!(
            Filter::is_not_null("edited").condition(),
            "edited is not null"
        );
    }

    #[test]
    fn bytes_are_scalars() {
        let f = Filter::eq("tag", vec![0u8; 20]);
        assert_eq!(f.condition(), "tag = ?");
        assert_eq!(f.args().len(), 1);
    }

    #[test]
    fn where_clause_composes_with_and() {
        let (sql, args) = where_clause(&[
            Filter::eq("did", "did:plc:abc"),
            Filter::r#in("state", vec![0i64, 2]),
        ]);
        assert_eq!(sql, " where did = ? and state in (?, ?)");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn empty_filters_yield_empty_clause() {
        let (sql, args) = where_clause(&[]);
        assert!(sql.is_empty());
        assert!(args.is_empty());
    }
}
