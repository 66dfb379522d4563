// 🔎 Query - table filters/order/range rendered as PostgREST parameters
//
// Pages build a Query the same way for every backend; RestBackend renders it
// into URL parameters, the in-memory test backend evaluates it directly.

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    /// Case-insensitive LIKE; `%` is the wildcard
    ILike(String, String),
    Gte(String, String),
    Lte(String, String),
    Lt(String, String),
    In(String, Vec<String>),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::ILike(c, _)
            | Filter::Gte(c, _)
            | Filter::Lte(c, _)
            | Filter::Lt(c, _)
            | Filter::In(c, _) => c,
        }
    }

    fn render(&self) -> String {
        match self {
            Filter::Eq(_, v) => format!("eq.{}", v),
            Filter::ILike(_, v) => format!("ilike.{}", v),
            Filter::Gte(_, v) => format!("gte.{}", v),
            Filter::Lte(_, v) => format!("lte.{}", v),
            Filter::Lt(_, v) => format!("lt.{}", v),
            Filter::In(_, values) => {
                let items: Vec<String> = values.iter().map(|v| quote_list_item(v)).collect();
                format!("in.({})", items.join(","))
            }
        }
    }
}

/// Values containing reserved characters must be double-quoted inside in.()
fn quote_list_item(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    columns: Option<String>,
    filters: Vec<Filter>,
    order: Vec<Order>,
    range: Option<(u64, u64)>,
    count: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column list, including embedded relations such as
    /// `category:category_id(name,color)`
    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.to_string()));
        self
    }

    pub fn ilike(mut self, column: &str, pattern: impl ToString) -> Self {
        self.filters.push(Filter::ILike(column.to_string(), pattern.to_string()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.to_string()));
        self
    }

    pub fn lte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Lte(column.to_string(), value.to_string()));
        self
    }

    pub fn lt(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Lt(column.to_string(), value.to_string()));
        self
    }

    pub fn in_list<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.filters.push(Filter::In(column.to_string(), values));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Inclusive row range, e.g. `range(0, 9)` for the first ten rows
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to.max(from)));
        self
    }

    /// Ask for the exact total row count alongside the rows
    pub fn count_exact(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn columns(&self) -> Option<&str> {
        self.columns.as_deref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> &[Order] {
        &self.order
    }

    pub fn bounds(&self) -> Option<(u64, u64)> {
        self.range
    }

    pub fn wants_count(&self) -> bool {
        self.count
    }

    /// Render as PostgREST query-string pairs (unencoded; the HTTP client
    /// percent-encodes them).
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();

        if let Some(columns) = &self.columns {
            params.push(("select".to_string(), compact_columns(columns)));
        }

        for filter in &self.filters {
            params.push((filter.column().to_string(), filter.render()));
        }

        if !self.order.is_empty() {
            let rendered: Vec<String> = self
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                .collect();
            params.push(("order".to_string(), rendered.join(",")));
        }

        if let Some((from, to)) = self.range {
            params.push(("offset".to_string(), from.to_string()));
            params.push(("limit".to_string(), (to - from + 1).to_string()));
        }

        params
    }
}

/// PostgREST rejects whitespace inside the select list
fn compact_columns(columns: &str) -> String {
    columns.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Total from a `Content-Range` header: `0-9/23` → 23, `*/0` → 0.
/// Returns None when the total is unknown (`0-9/*`).
pub fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

/// Timestamp filter/RPC argument, e.g. `2025-01-01T00:00:00Z`
pub fn timestamp_param(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
