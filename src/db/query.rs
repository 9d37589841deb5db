//! Filtered, ordered selects over a single table.
//!
//! Column names are interpolated into SQL, so every one is checked against the
//! table's known columns before a statement is built. Values always travel as
//! bound parameters.

use crate::errors::{AppError, AppResult};
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Clients,
    Projects,
    ProjectPhases,
    Goals,
    DailyTasks,
    Invoices,
    ProjectCosts,
    Reminders,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Projects => "projects",
            Self::ProjectPhases => "project_phases",
            Self::Goals => "goals",
            Self::DailyTasks => "daily_tasks",
            Self::Invoices => "invoices",
            Self::ProjectCosts => "project_costs",
            Self::Reminders => "reminders",
        }
    }

    /// Columns in the order the row parsers read them.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Clients => &["id", "name", "company", "email", "phone", "notes", "status", "created_at"],
            Self::Projects => &[
                "id",
                "name",
                "client_id",
                "description",
                "status",
                "progress",
                "due_date",
                "target_revenue",
                "created_at",
                "quick_description",
                "whatsapp_group_name",
                "initial_project_scope",
                "case_study_link",
            ],
            Self::ProjectPhases => &[
                "id",
                "project_id",
                "title",
                "description",
                "milestone",
                "due_date",
                "completed",
                "created_at",
            ],
            Self::Goals => &[
                "id",
                "type",
                "title",
                "category",
                "description",
                "color",
                "target",
                "progress",
                "deadline",
                "week_end_date",
                "is_active",
                "week_titles_json",
                "week_descriptions_json",
                "created_at",
            ],
            Self::DailyTasks => &[
                "id",
                "goal_id",
                "title",
                "description",
                "date",
                "start_time",
                "end_time",
                "completed",
                "created_at",
            ],
            Self::Invoices => &[
                "id",
                "project_id",
                "amount",
                "status",
                "date_issued",
                "due_date",
                "paid",
                "pdf_url",
                "created_at",
            ],
            Self::ProjectCosts => &["id", "project_id", "title", "amount", "created_at"],
            Self::Reminders => &["id", "title", "start_time", "end_time", "description", "created_at"],
        }
    }

    fn check_column(self, column: &str) -> AppResult<()> {
        if self.columns().contains(&column) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "unknown column '{}' on {}",
                column,
                self.name()
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    fn column(&self) -> &str {
        match self {
            Self::Eq(column, _)
            | Self::Neq(column, _)
            | Self::Gte(column, _)
            | Self::Lte(column, _)
            | Self::In(column, _) => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
    pub nulls_last: bool,
}

#[derive(Debug, Clone)]
pub struct Select {
    table: Table,
    filters: Vec<Filter>,
    order: Vec<Order>,
    limit: Option<u32>,
}

pub fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

impl Select {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.to_string(), value.into()))
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Neq(column.to_string(), value.into()))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(column.to_string(), value.into()))
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lte(column.to_string(), value.into()))
    }

    pub fn any_of(self, column: &str, values: Vec<Value>) -> Self {
        self.filter(Filter::In(column.to_string(), values))
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
            nulls_last: false,
        });
        self
    }

    /// Like [`Select::order_by`] but NULLs sort after every value in either
    /// direction.
    pub fn order_by_nulls_last(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
            nulls_last: true,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_sql(&self) -> AppResult<(String, Vec<Value>)> {
        let table = self.table;
        let mut query = format!("SELECT {} FROM {} WHERE 1 = 1", table.columns().join(", "), table.name());
        let mut params: Vec<Value> = Vec::new();

        for filter in &self.filters {
            table.check_column(filter.column())?;
            match filter {
                Filter::Eq(column, Value::Null) => query.push_str(&format!(" AND {} IS NULL", column)),
                Filter::Neq(column, Value::Null) => query.push_str(&format!(" AND {} IS NOT NULL", column)),
                Filter::Eq(column, value) => {
                    query.push_str(&format!(" AND {} = ?", column));
                    params.push(value.clone());
                }
                Filter::Neq(column, value) => {
                    query.push_str(&format!(" AND {} != ?", column));
                    params.push(value.clone());
                }
                Filter::Gte(column, value) => {
                    query.push_str(&format!(" AND {} >= ?", column));
                    params.push(value.clone());
                }
                Filter::Lte(column, value) => {
                    query.push_str(&format!(" AND {} <= ?", column));
                    params.push(value.clone());
                }
                Filter::In(_, values) if values.is_empty() => query.push_str(" AND 0 = 1"),
                Filter::In(column, values) => {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    query.push_str(&format!(" AND {} IN ({})", column, placeholders));
                    params.extend(values.iter().cloned());
                }
            }
        }

        if !self.order.is_empty() {
            let mut terms = Vec::with_capacity(self.order.len());
            for order in &self.order {
                table.check_column(&order.column)?;
                let direction = if order.ascending { "ASC" } else { "DESC" };
                let nulls = if order.nulls_last { " NULLS LAST" } else { "" };
                terms.push(format!("{} {}{}", order.column, direction, nulls));
            }
            query.push_str(" ORDER BY ");
            query.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            query.push_str(" LIMIT ?");
            params.push(Value::Integer(i64::from(limit)));
        }

        Ok((query, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_filters_order_and_limit() {
        let (sql, params) = Select::from(Table::Projects)
            .neq("status", text("Inactive"))
            .gte("created_at", text("2024-05-01"))
            .order_by_nulls_last("due_date", true)
            .limit(5)
            .to_sql()
            .expect("sql");

        assert!(sql.starts_with("SELECT id, name, client_id"));
        assert!(sql.contains("FROM projects WHERE 1 = 1 AND status != ? AND created_at >= ?"));
        assert!(sql.ends_with("ORDER BY due_date ASC NULLS LAST LIMIT ?"));
        assert_eq!(params.len(), 3);
        assert_eq!(params[2], Value::Integer(5));
    }

    #[test]
    fn null_equality_and_empty_sets() {
        let (sql, params) = Select::from(Table::DailyTasks)
            .eq("goal_id", Value::Null)
            .any_of("id", Vec::new())
            .to_sql()
            .expect("sql");
        assert!(sql.contains("goal_id IS NULL"));
        assert!(sql.contains("AND 0 = 1"));
        assert!(params.is_empty());
    }

    #[test]
    fn in_filter_binds_every_value() {
        let (sql, params) = Select::from(Table::Invoices)
            .any_of("project_id", vec![text("a"), text("b")])
            .order_by("created_at", false)
            .to_sql()
            .expect("sql");
        assert!(sql.contains("project_id IN (?, ?)"));
        assert!(sql.ends_with("ORDER BY created_at DESC"));
        assert_eq!(params, vec![text("a"), text("b")]);
    }

    #[test]
    fn rejects_unknown_columns() {
        let result = Select::from(Table::Clients).eq("1=1; DROP TABLE clients", text("x")).to_sql();
        assert!(matches!(result, Err(AppError::Validation(_))));
        let result = Select::from(Table::Clients).order_by("nope", true).to_sql();
        assert!(result.is_err());
    }

    #[test]
    fn runs_against_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().expect("conn");
        conn.execute_batch(
            "CREATE TABLE reminders (id TEXT, title TEXT, start_time TEXT, end_time TEXT, description TEXT, created_at TEXT);
             INSERT INTO reminders VALUES ('a', 'x', NULL, NULL, NULL, 'now');
             INSERT INTO reminders VALUES ('b', 'y', '2024-01-02', NULL, NULL, 'now');
             INSERT INTO reminders VALUES ('c', 'z', '2024-01-01', NULL, NULL, 'now');",
        )
        .expect("seed");

        let (sql, params) = Select::from(Table::Reminders)
            .order_by_nulls_last("start_time", true)
            .to_sql()
            .expect("sql");
        let mut stmt = conn.prepare(&sql).expect("prepare");
        let ids: Vec<String> = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| row.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
