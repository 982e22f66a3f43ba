//! Structured query descriptor handed to a [`super::SqlExecutor`].
//!
//! The resolver never emits SQL text. Everything an executor needs to build
//! and run one statement is carried here, including nested subqueries and the
//! join list parsed for the enclosing array.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::{JsonMap, RequestMethod};
use crate::resolver::join_parser::JoinSpec;

/// Column expression used for wrapped count queries.
pub const COUNT_COLUMN: &str = "count(*):count";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConditionValue {
    Value(Value),
    Subquery(Box<QueryDescriptor>),
}

/// One `key: value` filter (or assignment, for POST/PUT). The key may carry
/// an operator suffix such as `id{}` or `date>=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub value: ConditionValue,
}

impl Condition {
    pub fn value(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value: ConditionValue::Value(value),
        }
    }

    pub fn subquery(key: impl Into<String>, query: QueryDescriptor) -> Self {
        Self {
            key: key.into(),
            value: ConditionValue::Subquery(Box::new(query)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub method: RequestMethod,
    pub table: String,
    pub alias: Option<String>,
    pub columns: Vec<String>,
    pub conditions: Vec<Condition>,
    pub group: Option<String>,
    pub having: Option<String>,
    pub order: Option<String>,
    /// Rows per page; 0 means unbounded.
    pub count: usize,
    pub page: usize,
    /// Row within the page this call asks for.
    pub position: usize,
    pub explain: bool,
    pub role: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub datasource: Option<String>,
    pub namespace: Option<String>,
    pub catalog: Option<String>,
    pub cache: Option<String>,
    pub joins: Vec<JoinSpec>,
    /// Wrapped inner query (`SELECT ... FROM (<from>)`).
    pub from: Option<Box<QueryDescriptor>>,
    /// Remaining pass-through directives (`@null`, `@cast`, `@raw`, ...).
    pub directives: JsonMap,
}

impl QueryDescriptor {
    pub fn new(method: RequestMethod, table: impl Into<String>) -> Self {
        Self {
            method,
            table: table.into(),
            alias: None,
            columns: vec![],
            conditions: vec![],
            group: None,
            having: None,
            order: None,
            count: 1,
            page: 0,
            position: 0,
            explain: false,
            role: None,
            database: None,
            schema: None,
            datasource: None,
            namespace: None,
            catalog: None,
            cache: None,
            joins: vec![],
            from: None,
            directives: JsonMap::new(),
        }
    }

    /// `Table` or `Table:alias`, the key the table appears under in a request.
    pub fn table_key(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}:{}", self.table, alias),
            None => self.table.clone(),
        }
    }

    pub fn with_window(mut self, count: usize, page: usize, position: usize) -> Self {
        self.count = count;
        self.page = page;
        self.position = position;
        self
    }

    pub fn condition(&self, key: &str) -> Option<&ConditionValue> {
        self.conditions
            .iter()
            .find(|c| c.key == key)
            .map(|c| &c.value)
    }

    /// Projection contains an aggregate function call.
    pub fn has_aggregate(&self) -> bool {
        self.columns.iter().any(|c| c.contains('('))
    }

    /// Count of the unbounded query under the same filters.
    pub fn count_query(&self) -> QueryDescriptor {
        let mut query = self.clone().with_window(0, 0, 0);
        query.method = if self.method == RequestMethod::Gets {
            RequestMethod::Heads
        } else {
            RequestMethod::Head
        };
        query.explain = false;
        query
    }

    /// `SELECT count(*) FROM (<self>)`, which counts groups rather than rows
    /// when the projection aggregates.
    pub fn wrapped_count_query(&self) -> QueryDescriptor {
        let mut inner = self.clone().with_window(0, 0, 0);
        inner.explain = false;
        let mut outer = QueryDescriptor::new(RequestMethod::Get, self.table.clone());
        outer.columns = vec![COUNT_COLUMN.to_string()];
        outer.role = self.role.clone();
        outer.database = self.database.clone();
        outer.schema = self.schema.clone();
        outer.datasource = self.datasource.clone();
        outer.namespace = self.namespace.clone();
        outer.catalog = self.catalog.clone();
        outer.from = Some(Box::new(inner));
        outer
    }

    /// Key identifying the page this descriptor reads, independent of the
    /// row position within it.
    pub fn page_key(&self) -> String {
        let mut probe = self.clone();
        probe.position = 0;
        serde_json::to_string(&probe).unwrap_or_else(|_| format!("{:?}", probe))
    }
}
