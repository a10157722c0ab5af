//! Backend-neutral description of a filtered read.
//!
//! A `Query` names the table, the exact column projection and the filters; the
//! backend decides how to execute it. `to_params` renders the PostgREST form used
//! by the remote client.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Workspaces,
    Desktops,
    Notes,
    Folders,
    Connections,
    Assets,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Workspaces => "workspaces",
            Table::Desktops => "desktops",
            Table::Notes => "notes",
            Table::Folders => "folders",
            Table::Connections => "connections",
            Table::Assets => "assets",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    In(&'static str, Vec<String>),
    /// Case-insensitive substring match. Holds the raw needle, not a pattern.
    ILike(&'static str, String),
    IsNull(&'static str),
    /// Matches when any inner filter matches. Inner filters must not nest `AnyOf`.
    AnyOf(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Eq(column, value.into())
    }

    /// Column touched by this filter, `None` for disjunctions.
    pub fn column(&self) -> Option<&'static str> {
        match self {
            Filter::Eq(c, _) | Filter::In(c, _) | Filter::ILike(c, _) | Filter::IsNull(c) => Some(c),
            Filter::AnyOf(_) => None,
        }
    }

    /// PostgREST operator expression, e.g. `eq.abc` or `in.(a,b)`.
    ///
    /// Inside an `or=(...)` tree the value is one list item, so values that would
    /// break the tree are quoted as a whole. Top-level values are taken literally.
    fn operator(&self, in_tree: bool) -> String {
        let value = |text: String| if in_tree { quote_list_item(&text) } else { text };
        match self {
            Filter::Eq(_, v) => format!("eq.{}", value(scalar_text(v))),
            Filter::In(_, values) => {
                let quoted: Vec<String> = values.iter().map(|v| quote_list_item(v)).collect();
                format!("in.({})", quoted.join(","))
            }
            Filter::ILike(_, needle) => format!("ilike.{}", value(format!("*{}*", escape_like(needle)))),
            Filter::IsNull(_) => "is.null".to_string(),
            Filter::AnyOf(_) => String::new(),
        }
    }

    /// Single query parameter (`key`, `value`) for the PostgREST URL.
    pub fn to_param(&self) -> (String, String) {
        match self {
            Filter::AnyOf(inner) => {
                let parts: Vec<String> = inner
                    .iter()
                    .filter_map(|f| f.column().map(|c| format!("{}.{}", c, f.operator(true))))
                    .collect();
                ("or".to_string(), format!("({})", parts.join(",")))
            }
            other => (other.column().unwrap_or_default().to_string(), other.operator(false)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    /// Comma-separated projection, `*` for all columns
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(table: Table, columns: &str) -> Self {
        Self {
            table,
            columns: columns.to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn in_list(mut self, column: &'static str, values: &[String]) -> Self {
        self.filters.push(Filter::In(column, values.to_vec()));
        self
    }

    pub fn ilike(mut self, column: &'static str, needle: &str) -> Self {
        self.filters.push(Filter::ILike(column, needle.to_string()));
        self
    }

    pub fn is_null(mut self, column: &'static str) -> Self {
        self.filters.push(Filter::IsNull(column));
        self
    }

    pub fn any_of(mut self, filters: Vec<Filter>) -> Self {
        self.filters.push(Filter::AnyOf(filters));
        self
    }

    pub fn order(mut self, column: &'static str, descending: bool) -> Self {
        self.order.push(Order { column, descending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Projected column names, empty when the projection is `*`.
    pub fn column_names(&self) -> Vec<&str> {
        if self.columns.trim() == "*" {
            return Vec::new();
        }
        self.columns.split(',').map(|c| c.trim()).filter(|c| !c.is_empty()).collect()
    }

    /// PostgREST query parameters, unencoded.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let select: String = self.columns.split(',').map(|c| c.trim()).collect::<Vec<_>>().join(",");
        let mut params = vec![("select".to_string(), select)];
        params.extend(self.filters.iter().map(Filter::to_param));
        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.descending { "desc" } else { "asc" }))
                .collect();
            params.push(("order".to_string(), order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// Values inside `in.(...)` and `or=(...)` lists are comma/paren separated, so anything
// that could break the list is double-quoted.
fn quote_list_item(value: &str) -> String {
    if value.contains([',', '(', ')', '"', '\\']) || value.contains(' ') {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn escape_like(needle: &str) -> String {
    needle.replace('\\', "\\\\").replace('*', "\\*").replace('%', "\\%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_basic_select() {
        let q = Query::new(Table::Desktops, "id, name, parent_id")
            .eq("workspace_id", "w1")
            .order("position_order", false);
        assert_eq!(
            q.to_params(),
            vec![
                ("select".to_string(), "id,name,parent_id".to_string()),
                ("workspace_id".to_string(), "eq.w1".to_string()),
                ("order".to_string(), "position_order.asc".to_string()),
            ]
        );
    }

    #[test]
    fn test_renders_membership_and_null() {
        let q = Query::new(Table::Notes, "id")
            .in_list("desktop_id", &["a".to_string(), "b".to_string()])
            .is_null("deleted_at")
            .eq("is_default", true)
            .limit(5);
        let params = q.to_params();
        assert!(params.contains(&("desktop_id".to_string(), "in.(a,b)".to_string())));
        assert!(params.contains(&("deleted_at".to_string(), "is.null".to_string())));
        assert!(params.contains(&("is_default".to_string(), "eq.true".to_string())));
        assert!(params.contains(&("limit".to_string(), "5".to_string())));
    }

    #[test]
    fn test_renders_disjunction() {
        let q = Query::new(Table::Notes, "id").any_of(vec![
            Filter::ILike("title", "plan".to_string()),
            Filter::ILike("content", "plan".to_string()),
        ]);
        assert_eq!(q.to_params()[1], ("or".to_string(), "(title.ilike.*plan*,content.ilike.*plan*)".to_string()));
    }

    #[test]
    fn test_like_needle_is_literal_at_top_level() {
        let q = Query::new(Table::Notes, "id").ilike("title", "a, b");
        assert_eq!(q.to_params()[1], ("title".to_string(), "ilike.*a, b*".to_string()));

        let (_, op) = Filter::ILike("title", "50% done, (mostly)".to_string()).to_param();
        assert_eq!(op, "ilike.*50\\% done, (mostly)*");
    }

    #[test]
    fn test_like_needle_is_quoted_whole_in_disjunction() {
        let q = Query::new(Table::Notes, "id").any_of(vec![
            Filter::ILike("title", "a, b".to_string()),
            Filter::ILike("content", "a, b".to_string()),
        ]);
        assert_eq!(
            q.to_params()[1],
            ("or".to_string(), "(title.ilike.\"*a, b*\",content.ilike.\"*a, b*\")".to_string())
        );
    }

    #[test]
    fn test_disjunction_quotes_like_escapes() {
        let (_, value) = Filter::AnyOf(vec![Filter::ILike("title", "100%".to_string())]).to_param();
        assert_eq!(value, "(title.ilike.\"*100\\\\%*\")");
    }

    #[test]
    fn test_column_names() {
        assert_eq!(Query::new(Table::Notes, "id, title").column_names(), vec!["id", "title"]);
        assert!(Query::new(Table::Notes, "*").column_names().is_empty());
    }
}
