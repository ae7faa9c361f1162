use sqlx::{
    postgres::{PgArguments, PgRow},
    query::{Query, QueryAs},
    Postgres,
};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub enum SqlxBinds {
    String(String),
    OptionString(Option<String>),
    Int(i32),
    Bool(bool),
    Uuid(Uuid),
}

pub fn binds_query(stmt: &str, binds: Vec<SqlxBinds>) -> Query<'_, Postgres, PgArguments> {
    let mut q: Query<'_, Postgres, PgArguments> = sqlx::query(stmt);
    for bind in binds {
        q = match bind {
            SqlxBinds::String(val) => q.bind(val),
            SqlxBinds::OptionString(val) => q.bind(val),
            SqlxBinds::Int(val) => q.bind(val),
            SqlxBinds::Bool(val) => q.bind(val),
            SqlxBinds::Uuid(val) => q.bind(val),
        };
    }
    q
}

pub fn binds_query_as<'a, T: for<'r> sqlx::FromRow<'r, PgRow>>(
    stmt: &'a str,
    binds: Vec<SqlxBinds>,
) -> QueryAs<'a, Postgres, T, PgArguments> {
    let mut q: QueryAs<'_, Postgres, T, PgArguments> = sqlx::query_as(stmt);
    for bind in binds {
        q = match bind {
            SqlxBinds::String(val) => q.bind(val),
            SqlxBinds::OptionString(val) => q.bind(val),
            SqlxBinds::Int(val) => q.bind(val),
            SqlxBinds::Bool(val) => q.bind(val),
            SqlxBinds::Uuid(val) => q.bind(val),
        };
    }
    q
}

/// Collects WHERE fragments together with their positional binds.
#[derive(Debug, Default)]
pub struct Filters {
    pub wheres: Vec<String>,
    pub binds: Vec<SqlxBinds>,
}

impl Filters {
    /// Push a bind and return its placeholder, e.g. `$3`.
    pub fn bind(&mut self, value: SqlxBinds) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }

    pub fn push(&mut self, clause: impl Into<String>) {
        self.wheres.push(clause.into());
    }

    /// Case-insensitive literal substring match over any of `columns`.
    /// No columns matches no rows.
    pub fn search(&mut self, columns: &[&str], term: &str) {
        if columns.is_empty() {
            self.wheres.push("FALSE".to_string());
            return;
        }
        let pattern = format!("%{}%", escape_like(term.trim()));
        let placeholder = self.bind(SqlxBinds::String(pattern));
        let clause = columns
            .iter()
            .map(|x| format!("{} ILIKE {} ESCAPE '\\'", x, placeholder))
            .collect::<Vec<String>>()
            .join(" OR ");
        self.wheres.push(format!("({})", clause));
    }
}

/// Escape `LIKE` wildcards so `term` only matches itself.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn query_builder(
    select: Option<String>,
    table_name: &str,
    wheres: &[String],
    order_by: Vec<String>,
    limit: Option<u32>,
    offset: Option<u32>,
) -> String {
    // Select
    let mut stmt = "SELECT ".to_string();
    match select {
        Some(val) => stmt.push_str(&val),
        None => stmt.push('*'),
    }

    // From
    stmt.push_str(&format!(" FROM {}", table_name));

    // Where
    if !wheres.is_empty() {
        stmt.push_str(" WHERE ");
        stmt.push_str(&wheres.join(" AND "));
    }

    // Order by
    if !order_by.is_empty() {
        stmt.push_str(" ORDER BY ");
        stmt.push_str(&order_by.join(", "));
    }

    if let Some(limit) = limit {
        stmt.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = offset {
        stmt.push_str(&format!(" OFFSET {}", offset));
    }
    stmt
}
