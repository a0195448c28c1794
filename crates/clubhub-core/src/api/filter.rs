//! Row filters understood by the hosted backend's REST dialect.

use serde_json::{json, Value};

/// Characters the backend treats as syntax inside an `in.(...)` list.
const RESERVED: &[char] = &[',', '.', ':', '(', ')', '"', '\\'];

/// A single filter, ordering or paging clause applied to a table read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `column = value`
    Eq(String, String),
    /// `column IN (values...)`
    In(String, Vec<String>),
    Order { column: String, ascending: bool },
    Limit(usize),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn is_in<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    /// Render as a `(name, value)` query-string pair, e.g. `("club_id", "eq.7")`.
    pub fn to_query_pair(&self) -> (String, String) {
        match self {
            Filter::Eq(column, value) => (column.clone(), format!("eq.{}", value)),
            Filter::In(column, values) => {
                let list: Vec<String> = values.iter().map(|v| quote_list_item(v)).collect();
                (column.clone(), format!("in.({})", list.join(",")))
            }
            Filter::Order { column, ascending } => {
                let dir = if *ascending { "asc" } else { "desc" };
                ("order".to_string(), format!("{}.{}", column, dir))
            }
            Filter::Limit(n) => ("limit".to_string(), n.to_string()),
        }
    }
}

/// Double-quote a list item that contains reserved characters or whitespace,
/// escaping `"` and `\` inside it.
fn quote_list_item(value: &str) -> String {
    if !value.contains(|c: char| RESERVED.contains(&c) || c.is_whitespace()) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

impl Filter {
    /// Structured form of the filter; distinct filters never share one.
    fn to_json(&self) -> Value {
        match self {
            Filter::Eq(column, value) => json!(["eq", column, value]),
            Filter::In(column, values) => json!(["in", column, values]),
            Filter::Order { column, ascending } => json!(["order", column, ascending]),
            Filter::Limit(n) => json!(["limit", n]),
        }
    }
}

/// Unambiguous textual description of a filter list, used in cache keys.
pub fn describe(filters: &[Filter]) -> String {
    Value::Array(filters.iter().map(Filter::to_json).collect()).to_string()
}
